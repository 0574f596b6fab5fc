use crate::models::{ApiPosition, Position};
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use std::time::Duration;

const MAX_PAGES: u32 = 100;

/// Where redeemable positions come from.
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn fetch_redeemable(&self) -> Result<Vec<Position>>;
}

/// Data API `GET /positions?user=…&redeemable=true`, paged by `limit`/`offset`.
pub struct DataApiPositionSource {
    client: Client,
    base_url: String,
    user: String,
    page_size: u32,
}

impl DataApiPositionSource {
    pub fn new(base_url: String, wallet: &str, page_size: u32, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        let user = if wallet.starts_with("0x") {
            wallet.to_string()
        } else {
            format!("0x{}", wallet)
        };
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user,
            page_size,
        })
    }

    async fn fetch_page(&self, offset: u32) -> Result<Vec<ApiPosition>> {
        let url = format!("{}/positions", self.base_url);
        let limit = self.page_size.to_string();
        let offset = offset.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("user", self.user.as_str()),
                ("redeemable", "true"),
                ("limit", limit.as_str()),
                ("offset", offset.as_str()),
            ])
            .send()
            .await
            .context("Failed to fetch redeemable positions")?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Data API returned {} for redeemable positions", status);
        }
        response
            .json::<Vec<ApiPosition>>()
            .await
            .context("Failed to parse positions response")
    }
}

/// Keeps redeemable, positive, well-indexed records and maps them to the core type.
pub fn into_positions(records: Vec<ApiPosition>) -> Vec<Position> {
    records
        .into_iter()
        .filter_map(|p| {
            if !p.redeemable {
                debug!("Position {} not redeemable, skipping", p.asset);
                return None;
            }
            if p.size <= rust_decimal::Decimal::ZERO {
                return None;
            }
            if p.outcome_index < 0 {
                warn!(
                    "Position {} has negative outcome index {}, skipping",
                    p.asset, p.outcome_index
                );
                return None;
            }
            let condition_id = if p.condition_id.is_empty() || p.condition_id.starts_with("0x") {
                p.condition_id
            } else {
                format!("0x{}", p.condition_id)
            };
            Some(Position {
                asset: p.asset,
                balance: p.size,
                condition_id,
                outcome_index: p.outcome_index,
                market_label: p.title.or(p.slug).unwrap_or_else(|| "Unknown".to_string()),
            })
        })
        .collect()
}

#[async_trait]
impl PositionSource for DataApiPositionSource {
    async fn fetch_redeemable(&self) -> Result<Vec<Position>> {
        info!("Fetching redeemable positions for {}", self.user);
        let mut records = Vec::new();
        let mut offset = 0u32;
        for page_no in 0..MAX_PAGES {
            let page = self.fetch_page(offset).await?;
            let len = page.len() as u32;
            debug!("Positions page {} at offset {}: {} records", page_no, offset, len);
            records.extend(page);
            if len < self.page_size {
                break;
            }
            offset += len;
        }
        let received = records.len();
        let positions = into_positions(records);
        info!(
            "Received {} position records, {} redeemable with balance > 0",
            received,
            positions.len()
        );
        Ok(positions)
    }
}
