use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

/// `parentCollectionId` for non-nested markets: bytes32(0).
pub const ROOT_PARENT_COLLECTION_ID: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000000";

/// One wallet holding in one outcome of one market.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub asset: String,
    pub balance: Decimal,
    pub condition_id: String,
    pub outcome_index: i64,
    /// Display only.
    pub market_label: String,
}

/// All positions sharing one condition, ready for a single `redeemPositions` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RedemptionGroup {
    pub condition_id: String,
    pub parent_collection_id: String,
    /// Strictly ascending, each a power of two.
    pub index_sets: Vec<u64>,
    pub positions: Vec<Position>,
    /// Sum of balances in collateral base units (6 decimals).
    pub total_amount: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Error,
}

/// Confirmed on-chain redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResult {
    pub transaction_hash: String,
    pub block_number: Option<u64>,
    pub gas_used: u64,
}

/// One line of the redemption ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub timestamp: DateTime<Utc>,
    pub condition_id: String,
    pub parent_collection_id: String,
    #[serde(with = "pipe_delimited")]
    pub index_sets: Vec<u64>,
    pub amount_redeemed: u64,
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LedgerEntry {
    pub fn success(group: &RedemptionGroup, tx: &TxResult) -> Self {
        Self {
            timestamp: Utc::now(),
            condition_id: group.condition_id.clone(),
            parent_collection_id: group.parent_collection_id.clone(),
            index_sets: group.index_sets.clone(),
            amount_redeemed: group.total_amount,
            status: OutcomeStatus::Success,
            tx_hash: Some(tx.transaction_hash.clone()),
            error: None,
        }
    }

    pub fn failure(group: &RedemptionGroup, error: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            condition_id: group.condition_id.clone(),
            parent_collection_id: group.parent_collection_id.clone(),
            index_sets: group.index_sets.clone(),
            amount_redeemed: group.total_amount,
            status: OutcomeStatus::Error,
            tx_hash: None,
            error: Some(error.into()),
        }
    }

    /// `tx_hash` present iff success, `error` present iff error.
    pub fn is_well_formed(&self) -> bool {
        if self.condition_id.is_empty() {
            return false;
        }
        match self.status {
            OutcomeStatus::Success => self.tx_hash.is_some() && self.error.is_none(),
            OutcomeStatus::Error => self.tx_hash.is_none() && self.error.is_some(),
        }
    }
}

/// Index sets are stored as `1|2` so the ledger stays greppable.
mod pipe_delimited {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(sets: &[u64], serializer: S) -> Result<S::Ok, S::Error> {
        let joined = sets
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join("|");
        serializer.serialize_str(&joined)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u64>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        raw.split('|')
            .map(|part| part.trim().parse::<u64>().map_err(D::Error::custom))
            .collect()
    }
}

/// Data API `/positions` record. Only the fields the redeemer needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiPosition {
    #[serde(default)]
    pub asset: String,
    #[serde(rename = "conditionId", default)]
    pub condition_id: String,
    #[serde(deserialize_with = "decimal_from_number_or_string")]
    pub size: Decimal,
    #[serde(rename = "outcomeIndex")]
    pub outcome_index: i64,
    #[serde(default)]
    pub redeemable: bool,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    Text(String),
}

fn decimal_from_number_or_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Decimal, D::Error> {
    use serde::de::Error;
    let text = match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => n.to_string(),
        NumberOrString::Text(s) => s,
    };
    Decimal::from_str(text.trim()).map_err(D::Error::custom)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayerTransaction {
    pub to: String,
    pub data: String,
    pub value: String,
}

/// Body of `POST /execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayerExecuteRequest {
    pub transactions: Vec<RelayerTransaction>,
    pub label: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayerSubmitResponse {
    #[serde(rename = "transactionID", alias = "transactionId", default)]
    pub transaction_id: Option<String>,
    #[serde(rename = "transactionHash", alias = "hash", default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}
