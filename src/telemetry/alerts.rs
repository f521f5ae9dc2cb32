use crate::config::TelemetryConfig;
use crate::models::event::EventKind;
use crate::strategies::straddle::Transition;
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

/// Pushes position transitions and errors to Telegram and/or Discord.
/// Delivery is best-effort; a failed push is logged and dropped.
pub struct AlertManager {
    config: TelemetryConfig,
    tag: String,
    http: reqwest::Client,
}

impl AlertManager {
    pub fn new(config: TelemetryConfig, tag: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build alert HTTP client")?;
        Ok(Self {
            config,
            tag: tag.into(),
            http,
        })
    }

    fn telegram(&self) -> Option<(&str, &str)> {
        match (&self.config.telegram_bot_token, &self.config.telegram_chat_id) {
            (Some(token), Some(chat)) => Some((token, chat)),
            _ => None,
        }
    }

    pub async fn send(&self, message: &str) {
        let text = format!("[{} straddle] {message}", self.tag);
        info!("ALERT: {text}");

        if let Some((token, chat)) = self.telegram() {
            if let Err(e) = self.push_telegram(token, chat, &text).await {
                warn!("Telegram alert failed: {e}");
            }
        }
        if let Some(url) = &self.config.discord_webhook_url {
            if let Err(e) = self.push_discord(url, &text).await {
                warn!("Discord alert failed: {e}");
            }
        }
    }

    async fn push_telegram(&self, token: &str, chat: &str, text: &str) -> Result<()> {
        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let body = serde_json::json!({ "chat_id": chat, "text": text });
        self.http.post(&url).json(&body).send().await?.error_for_status()?;
        Ok(())
    }

    async fn push_discord(&self, url: &str, text: &str) -> Result<()> {
        let body = serde_json::json!({ "content": text });
        self.http.post(url).json(&body).send().await?.error_for_status()?;
        Ok(())
    }

    pub async fn on_transition(&self, transition: &Transition) {
        let failed = matches!(transition, Transition::Failed { .. });
        if (failed && self.config.alert_on_error) || (!failed && self.config.alert_on_trade) {
            self.send(&describe(transition)).await;
        }
    }

    pub async fn on_error(&self, error: &str) {
        if self.config.alert_on_error {
            self.send(&format!("error: {error}")).await;
        }
    }
}

pub fn describe(transition: &Transition) -> String {
    match transition {
        Transition::Entry { strike } => format!("ENTRY long straddle at {strike}"),
        Transition::Roll { from, to, realized } => {
            format!("ROLL {from} -> {to}, closed leg pair pnl {realized:.2}")
        }
        Transition::Exit { kind, reason, realized } => format!("{kind} ({reason}) pnl {realized:.2}"),
        Transition::Failed { kind, message } => {
            let lead = if *kind == EventKind::ExitFailed { "CHECK BROKER POSITIONS" } else { "FAILED" };
            format!("{kind} {lead}: {message}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_describe_roll() {
        let msg = describe(&Transition::Roll {
            from: 22500,
            to: 22550,
            realized: dec!(-120),
        });
        assert_eq!(msg, "ROLL 22500 -> 22550, closed leg pair pnl -120.00");
    }

    #[test]
    fn test_describe_partial_exit_asks_for_reconcile() {
        let msg = describe(&Transition::Failed {
            kind: EventKind::ExitFailed,
            message: "NFO:X still open".into(),
        });
        assert!(msg.starts_with("EXIT_FAILED CHECK BROKER POSITIONS"));
    }
}
