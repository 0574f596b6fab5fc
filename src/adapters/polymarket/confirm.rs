//! Receipt polling shared by the relayer and direct submitters.

use crate::error::SubmissionError;
use crate::models::TxResult;
use alloy::primitives::B256;
use alloy::providers::Provider;
use log::{debug, warn};
use tokio::time::{sleep, Duration, Instant};

/// Maps a mined receipt to the redemption outcome.
pub fn classify_receipt(
    tx_hash: &str,
    status: bool,
    block_number: Option<u64>,
    gas_used: u64,
) -> Result<TxResult, SubmissionError> {
    if !status {
        return Err(SubmissionError::Reverted {
            tx_hash: tx_hash.to_string(),
        });
    }
    Ok(TxResult {
        transaction_hash: tx_hash.to_string(),
        block_number,
        gas_used,
    })
}

/// Polls `eth_getTransactionReceipt` until the tx is mined or `deadline` passes.
/// RPC errors while polling are treated as "not yet".
pub async fn await_receipt<P: Provider>(
    provider: &P,
    tx_hash: B256,
    deadline: Instant,
    poll: Duration,
) -> Result<TxResult, SubmissionError> {
    let hash_str = format!("{:?}", tx_hash);
    loop {
        match provider.get_transaction_receipt(tx_hash).await {
            Ok(Some(receipt)) => {
                debug!("Receipt for {}: status={}", hash_str, receipt.status());
                return classify_receipt(
                    &hash_str,
                    receipt.status(),
                    receipt.block_number,
                    receipt.gas_used as u64,
                );
            }
            Ok(None) => {}
            Err(e) => warn!("Receipt lookup for {} failed: {}", hash_str, e),
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(SubmissionError::ConfirmationTimeout {
                tx_hash: Some(hash_str),
            });
        }
        sleep(poll.min(deadline - now)).await;
    }
}
