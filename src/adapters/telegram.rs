//! Fire-and-forget run notifications. Delivery failures are logged and dropped.

use crate::utils::amounts::format_usdc;
use async_trait::async_trait;
use log::{info, warn};
use reqwest::Client;
use std::time::Duration;

const SEND_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Started { timestamp: String },
    NoPositions,
    PositionsFound { groups: usize, total_amount: u64 },
    RedemptionSucceeded { condition_id: String, amount: u64, tx_hash: String },
    RedemptionFailed { condition_id: String, error: String },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Must not fail the caller.
    async fn notify(&self, event: RunEvent);
}

/// Used when Telegram is not configured.
pub struct SilentNotifier;

#[async_trait]
impl Notifier for SilentNotifier {
    async fn notify(&self, _event: RunEvent) {}
}

pub struct TelegramNotifier {
    client: Client,
    api_url: String,
    chat_id: String,
}

fn shorten(s: &str) -> String {
    if s.chars().count() > 16 {
        format!("{}...", s.chars().take(16).collect::<String>())
    } else {
        s.to_string()
    }
}

/// Markdown text for an event.
pub fn render(event: &RunEvent) -> String {
    match event {
        RunEvent::Started { timestamp } => {
            format!("🔍 *Redemption Check Started*\n\n_Time: {}_", timestamp)
        }
        RunEvent::NoPositions => "ℹ️ *Redemption Check Complete*\n\nNo positions to redeem.".to_string(),
        RunEvent::PositionsFound { groups, total_amount } => format!(
            "💰 *Found Redeemable Positions*\n\nCount: {} conditions\nTotal: ${} USDC\n\n_Proceeding with redemption..._",
            groups,
            format_usdc(*total_amount)
        ),
        RunEvent::RedemptionSucceeded {
            condition_id,
            amount,
            tx_hash,
        } => format!(
            "✅ *Redemption Successful*\n\nCondition: `{}`\nAmount: ${} USDC\nTX: [{}](https://polygonscan.com/tx/{})\n",
            shorten(condition_id),
            format_usdc(*amount),
            shorten(tx_hash),
            tx_hash
        ),
        RunEvent::RedemptionFailed { condition_id, error } => format!(
            "❌ *Redemption Failed*\n\nCondition: `{}`\nError: {}\n",
            shorten(condition_id),
            error
        ),
    }
}

impl TelegramNotifier {
    pub fn new(bot_token: &str, chat_id: String) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(SEND_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            api_url: format!("https://api.telegram.org/bot{}", bot_token),
            chat_id,
        })
    }

    async fn send_message(&self, text: &str) -> anyhow::Result<()> {
        let payload = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        let response = self
            .client
            .post(format!("{}/sendMessage", self.api_url))
            .json(&payload)
            .send()
            .await?;
        if !response.status().is_success() {
            anyhow::bail!("Telegram returned {}", response.status());
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, event: RunEvent) {
        match self.send_message(&render(&event)).await {
            Ok(()) => info!("Telegram notification sent"),
            Err(e) => warn!("Failed to send Telegram notification: {}", e),
        }
    }
}
