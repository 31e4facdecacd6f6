//! # Alerter
//!
//! Forwards operator-relevant engine events (circuit-breaker trips, regime
//! changes, published generations, failed cycles) to a notification channel.
//!
//! ## Public API
//!
//! - `Notifier`: The delivery interface.
//! - `TelegramAlerter`: Telegram Bot API delivery.
//! - `LogNotifier`: Log-only fallback when Telegram is not configured.
//! - `run_alerter_service`: The long-running task fed by the engine's broadcast channel.

use async_trait::async_trait;
use configuration::TelegramConfig;
use events::{EngineEvent, LogLevel};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::broadcast;

pub mod error;

pub use error::AlerterError;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers a plain-text message.
    async fn send(&self, message: &str) -> Result<(), AlerterError>;

    fn name(&self) -> &str;
}

/// The JSON payload for the Telegram `sendMessage` endpoint.
#[derive(Debug, Serialize)]
struct SendMessagePayload<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

/// A client for sending messages to the Telegram Bot API.
pub struct TelegramAlerter {
    client: Client,
    token: String,
    chat_id: String,
}

impl TelegramAlerter {
    /// Creates a new `TelegramAlerter`.
    ///
    /// Returns `None` if the token or chat_id is missing from the configuration,
    /// allowing the system to fall back to log-only alerts.
    pub fn new(config: &TelegramConfig) -> Option<Self> {
        if config.telegram_token.is_empty() || config.telegram_chat_id.is_empty() {
            tracing::warn!("Telegram alerter is not configured (missing token or chat_id).");
            return None;
        }
        Some(Self {
            client: Client::new(),
            token: config.telegram_token.clone(),
            chat_id: config.telegram_chat_id.clone(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramAlerter {
    async fn send(&self, message: &str) -> Result<(), AlerterError> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);
        let text = escape_markdown(message);

        let payload = SendMessagePayload {
            chat_id: &self.chat_id,
            text: &text,
            parse_mode: "MarkdownV2",
        };

        let response = self.client.post(&url).json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to decode error response".to_string());
            return Err(AlerterError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

/// Writes alerts to the log instead of an external channel.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &str) -> Result<(), AlerterError> {
        tracing::warn!(alert = message, "ALERT");
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Picks Telegram when it is configured, the log otherwise.
pub fn notifier_from_config(config: &TelegramConfig) -> Box<dyn Notifier> {
    match TelegramAlerter::new(config) {
        Some(telegram) => Box::new(telegram),
        None => Box::new(LogNotifier),
    }
}

/// The alert text for an event, or `None` when the event is not alertable.
pub fn render_alert(event: &EngineEvent) -> Option<String> {
    if !event.is_alertable() {
        return None;
    }
    let icon = match event {
        EngineEvent::CircuitBreakerTripped(_) | EngineEvent::CycleFailed(_) => "🚨",
        EngineEvent::Log(log) if log.level == LogLevel::Error => "⚠️",
        EngineEvent::RegimeChanged(_) => "🧭",
        EngineEvent::GenerationPublished(_) => "🧬",
        EngineEvent::Log(_) => "ℹ️",
    };
    Some(format!("{icon} {}", event.summary()))
}

/// A long-running service that listens to a broadcast channel of `EngineEvent`s
/// and forwards the alertable ones. Ends when the channel closes.
pub async fn run_alerter_service(
    notifier: Box<dyn Notifier>,
    mut event_rx: broadcast::Receiver<EngineEvent>,
) {
    tracing::info!(notifier = notifier.name(), "Alerter service started. Listening for critical events.");

    if let Err(e) = notifier.send("✅ Evolver engine started").await {
        tracing::error!(error = %e, "Failed to send startup alert.");
    }

    loop {
        match event_rx.recv().await {
            Ok(event) => {
                if let Some(message) = render_alert(&event) {
                    if let Err(e) = notifier.send(&message).await {
                        tracing::error!(error = %e, "Failed to send alert.");
                    }
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("Alerter service lagged, skipped {} messages.", n);
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::info!("Event channel closed. Alerter service shutting down.");
                break;
            }
        }
    }
}

/// Escapes characters that have special meaning in Telegram's MarkdownV2.
fn escape_markdown(text: &str) -> String {
    let special_chars = r"\_*[]()~`>#+-=|{}.!";
    special_chars
        .chars()
        .fold(text.to_string(), |s, c| s.replace(c, &format!("\\{}", c)))
}
