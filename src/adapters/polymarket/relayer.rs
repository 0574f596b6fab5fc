//! Redemption through the builder relayer's `/execute` endpoint.

use crate::adapters::polymarket::auth::{RelayerCredentials, SignedRequest};
use crate::adapters::polymarket::confirm::await_receipt;
use crate::adapters::polymarket::redeem::{encode_redeem_calldata, ContractParams, RedemptionSubmitter};
use crate::error::SubmissionError;
use crate::models::{
    RedemptionGroup, RelayerExecuteRequest, RelayerSubmitResponse, RelayerTransaction, TxResult,
};
use crate::utils::amounts::short_id;
use alloy::primitives::B256;
use alloy::providers::ProviderBuilder;
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use reqwest::Client;
use serde::Deserialize;
use std::str::FromStr;
use tokio::time::{sleep, Duration, Instant};

const EXECUTE_PATH: &str = "/execute";
const TRANSACTION_PATH: &str = "/transaction";
const FAILED_STATES: [&str; 2] = ["STATE_FAILED", "STATE_INVALID"];

pub struct RelayerSubmitter {
    client: Client,
    relayer_url: String,
    rpc_url: String,
    credentials: RelayerCredentials,
    confirmation_timeout: Duration,
    poll_interval: Duration,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TransactionStatusBody {
    Many(Vec<RelayerSubmitResponse>),
    One(RelayerSubmitResponse),
}

impl TransactionStatusBody {
    fn into_first(self) -> Option<RelayerSubmitResponse> {
        match self {
            TransactionStatusBody::Many(list) => list.into_iter().next(),
            TransactionStatusBody::One(one) => Some(one),
        }
    }
}

/// Builds the exact JSON body sent to `/execute`.
pub fn build_execute_body(
    group: &RedemptionGroup,
    params: &ContractParams,
) -> Result<String, SubmissionError> {
    let calldata = encode_redeem_calldata(group, params)?;
    let request = RelayerExecuteRequest {
        transactions: vec![RelayerTransaction {
            to: params.ctf_contract.to_string(),
            data: format!("0x{}", hex::encode(calldata)),
            value: "0".to_string(),
        }],
        label: format!("Redeem position {}...", short_id(&group.condition_id)),
    };
    serde_json::to_string(&request).map_err(|e| SubmissionError::Encoding(e.to_string()))
}

fn is_failed_state(state: Option<&str>) -> bool {
    state.map(|s| FAILED_STATES.contains(&s)).unwrap_or(false)
}

/// What the `/execute` response tells us about the submission.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Accepted {
    Hash(String),
    /// Queued by the relayer; the hash must be polled for by id.
    Queued(String),
}

fn accepted_from(response: RelayerSubmitResponse) -> Result<Accepted, SubmissionError> {
    if is_failed_state(response.state.as_deref()) {
        return Err(SubmissionError::Relayer(format!(
            "relayer rejected transaction (state {})",
            response.state.as_deref().unwrap_or_default()
        )));
    }
    match (response.transaction_hash, response.transaction_id) {
        (Some(hash), _) if !hash.is_empty() => Ok(Accepted::Hash(hash)),
        (_, Some(id)) if !id.is_empty() => Ok(Accepted::Queued(id)),
        _ => Err(SubmissionError::Relayer(
            "response has neither transaction hash nor id".to_string(),
        )),
    }
}

/// `Ok(None)` while the relayer has not broadcast the transaction yet.
fn hash_from_status(
    status: RelayerSubmitResponse,
    transaction_id: &str,
) -> Result<Option<String>, SubmissionError> {
    if is_failed_state(status.state.as_deref()) {
        return Err(SubmissionError::Reverted {
            tx_hash: status
                .transaction_hash
                .unwrap_or_else(|| transaction_id.to_string()),
        });
    }
    Ok(status.transaction_hash.filter(|h| !h.is_empty()))
}

impl RelayerSubmitter {
    pub fn new(
        relayer_url: String,
        rpc_url: String,
        credentials: RelayerCredentials,
        api_timeout: Duration,
        confirmation_timeout: Duration,
        poll_interval: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(api_timeout).build()?;
        Ok(Self {
            client,
            relayer_url: relayer_url.trim_end_matches('/').to_string(),
            rpc_url,
            credentials,
            confirmation_timeout,
            poll_interval,
        })
    }

    async fn post_execute(&self, body: String) -> Result<RelayerSubmitResponse, SubmissionError> {
        let signed = SignedRequest::new(
            &self.credentials,
            "POST",
            EXECUTE_PATH,
            body,
            Utc::now().timestamp(),
        )
        .map_err(|e| SubmissionError::Relayer(e.to_string()))?;
        debug!(
            "Relayer {} {} body: {}",
            signed.method(),
            signed.path(),
            signed.body()
        );

        let url = format!("{}{}", self.relayer_url, EXECUTE_PATH);
        let response = signed
            .apply(self.client.post(&url))
            .send()
            .await
            .map_err(|e| SubmissionError::Relayer(format!("request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SubmissionError::Relayer(format!("failed to read response: {}", e)))?;
        debug!("Relayer response {}: {}", status, text);
        if !status.is_success() {
            return Err(SubmissionError::Relayer(format!("HTTP {}: {}", status, text)));
        }
        serde_json::from_str(&text)
            .map_err(|e| SubmissionError::Relayer(format!("unparsable response: {}", e)))
    }

    /// Waits for the relayer to report an on-chain hash for `transaction_id`.
    async fn await_relayer_hash(
        &self,
        transaction_id: &str,
        deadline: Instant,
    ) -> Result<String, SubmissionError> {
        let url = format!("{}{}", self.relayer_url, TRANSACTION_PATH);
        loop {
            match self.client.get(&url).query(&[("id", transaction_id)]).send().await {
                Ok(resp) if resp.status().is_success() => {
                    match resp.json::<TransactionStatusBody>().await.map(|b| b.into_first()) {
                        Ok(Some(tx)) => {
                            if let Some(hash) = hash_from_status(tx, transaction_id)? {
                                return Ok(hash);
                            }
                        }
                        Ok(None) => {}
                        Err(e) => warn!("Relayer status for {} unparsable: {}", transaction_id, e),
                    }
                }
                Ok(resp) => warn!("Relayer status for {} returned {}", transaction_id, resp.status()),
                Err(e) => warn!("Relayer status for {} failed: {}", transaction_id, e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(SubmissionError::ConfirmationTimeout { tx_hash: None });
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

#[async_trait]
impl RedemptionSubmitter for RelayerSubmitter {
    async fn submit(
        &self,
        group: &RedemptionGroup,
        params: &ContractParams,
    ) -> Result<TxResult, SubmissionError> {
        let body = build_execute_body(group, params)?;
        let deadline = Instant::now() + self.confirmation_timeout;

        info!(
            "Submitting redemption for {} via relayer (index sets {:?})",
            short_id(&group.condition_id),
            group.index_sets
        );
        let submitted = self.post_execute(body).await?;

        let hash = match accepted_from(submitted)? {
            Accepted::Hash(hash) => hash,
            Accepted::Queued(id) => {
                info!("Relayer accepted transaction {}, waiting for hash", id);
                self.await_relayer_hash(&id, deadline).await?
            }
        };
        info!("Transaction sent: {}, waiting for confirmation...", hash);

        let tx_hash = B256::from_str(&hash)
            .map_err(|e| SubmissionError::Relayer(format!("invalid transaction hash {}: {}", hash, e)))?;
        let provider = ProviderBuilder::new()
            .connect(&self.rpc_url)
            .await
            .map_err(|e| SubmissionError::Rpc(format!("failed to connect to RPC: {}", e)))?;
        await_receipt(&provider, tx_hash, deadline, self.poll_interval).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ROOT_PARENT_COLLECTION_ID;

    fn group() -> RedemptionGroup {
        RedemptionGroup {
            condition_id: "0xb2d1e0d1b7d56ac1ea8d1a48a1f0d6e0f9e3d2c1b0a9f8e7d6c5b4a392817161"
                .to_string(),
            parent_collection_id: ROOT_PARENT_COLLECTION_ID.to_string(),
            index_sets: vec![1, 2],
            positions: Vec::new(),
            total_amount: 8_000_000,
        }
    }

    fn params() -> ContractParams {
        ContractParams::parse(
            "0x4D97DCd97eC945f40cF65F87097ACe5EA0476045",
            "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174",
        )
        .unwrap()
    }

    #[test]
    fn execute_body_wraps_single_ctf_call() {
        let body = build_execute_body(&group(), &params()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        let txs = parsed["transactions"].as_array().unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(
            txs[0]["to"].as_str().unwrap().to_lowercase(),
            "0x4d97dcd97ec945f40cf65f87097ace5ea0476045"
        );
        assert_eq!(txs[0]["value"], "0");
        assert!(txs[0]["data"].as_str().unwrap().starts_with("0x01b7037c"));
        assert_eq!(parsed["label"], "Redeem position 0xb2d1e0d1...");
    }

    #[test]
    fn execute_body_is_stable_for_signing() {
        let a = build_execute_body(&group(), &params()).unwrap();
        let b = build_execute_body(&group(), &params()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn recognizes_failed_states() {
        assert!(is_failed_state(Some("STATE_FAILED")));
        assert!(is_failed_state(Some("STATE_INVALID")));
        assert!(!is_failed_state(Some("STATE_MINED")));
        assert!(!is_failed_state(None));
    }

    #[test]
    fn status_body_accepts_list_or_object() {
        let many: TransactionStatusBody =
            serde_json::from_str(r#"[{"transactionID":"1","transactionHash":"0xab","state":"STATE_MINED"}]"#)
                .unwrap();
        assert_eq!(many.into_first().unwrap().transaction_hash.as_deref(), Some("0xab"));
        let one: TransactionStatusBody =
            serde_json::from_str(r#"{"transactionID":"1","state":"STATE_NEW"}"#).unwrap();
        assert!(one.into_first().unwrap().transaction_hash.is_none());
    }

    fn response(json: &str) -> RelayerSubmitResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn execute_response_with_hash_skips_polling() {
        let accepted = accepted_from(response(
            r#"{"transactionID":"abc","transactionHash":"0xfeed","state":"STATE_NEW"}"#,
        ))
        .unwrap();
        assert_eq!(accepted, Accepted::Hash("0xfeed".to_string()));
    }

    #[test]
    fn execute_response_with_only_id_is_queued() {
        let accepted = accepted_from(response(r#"{"transactionId":"abc","hash":""}"#)).unwrap();
        assert_eq!(accepted, Accepted::Queued("abc".to_string()));
    }

    #[test]
    fn execute_response_without_hash_or_id_is_relayer_error() {
        assert!(matches!(
            accepted_from(response(r#"{"state":"STATE_NEW"}"#)),
            Err(SubmissionError::Relayer(_))
        ));
    }

    #[test]
    fn execute_response_in_failed_state_is_relayer_error() {
        let err = accepted_from(response(
            r#"{"transactionID":"abc","transactionHash":"0xfeed","state":"STATE_INVALID"}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, SubmissionError::Relayer(ref m) if m.contains("STATE_INVALID")));
    }

    #[test]
    fn failed_status_while_polling_is_revert() {
        let err = hash_from_status(response(r#"{"state":"STATE_FAILED"}"#), "abc").unwrap_err();
        assert_eq!(
            err,
            SubmissionError::Reverted {
                tx_hash: "abc".to_string()
            }
        );
        let err = hash_from_status(
            response(r#"{"transactionHash":"0xdead","state":"STATE_FAILED"}"#),
            "abc",
        )
        .unwrap_err();
        assert_eq!(
            err,
            SubmissionError::Reverted {
                tx_hash: "0xdead".to_string()
            }
        );
    }

    #[test]
    fn status_without_hash_keeps_polling() {
        assert_eq!(
            hash_from_status(response(r#"{"state":"STATE_NEW"}"#), "abc").unwrap(),
            None
        );
        assert_eq!(
            hash_from_status(
                response(r#"{"transactionHash":"0xbeef","state":"STATE_MINED"}"#),
                "abc"
            )
            .unwrap(),
            Some("0xbeef".to_string())
        );
    }
}
