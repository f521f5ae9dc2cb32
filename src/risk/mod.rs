pub mod kill_switch;
