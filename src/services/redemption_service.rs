use crate::adapters::polymarket::{ContractParams, RedemptionSubmitter};
use crate::adapters::telegram::{Notifier, RunEvent};
use crate::error::SubmissionError;
use crate::ledger::RedeemedLedger;
use crate::models::{LedgerEntry, RedemptionGroup, TxResult};
use crate::utils::amounts::{format_usdc, short_id};
use log::{error, info};

#[derive(Debug, Clone, PartialEq)]
pub enum GroupOutcome {
    Redeemed(TxResult),
    Failed(SubmissionError),
    /// Redeemed on chain but the ledger line could not be written.
    Unrecorded { tx: TxResult, error: String },
}

/// Submits one group, appends exactly one ledger entry and notifies.
/// Every failure is absorbed here so the run can move on to the next group.
pub async fn process_group(
    submitter: &dyn RedemptionSubmitter,
    params: &ContractParams,
    ledger: &mut RedeemedLedger,
    notifier: &dyn Notifier,
    group: &RedemptionGroup,
) -> GroupOutcome {
    let cid = short_id(&group.condition_id);
    info!(
        "Redeeming {}... index sets {:?}, ${} USDC",
        cid,
        group.index_sets,
        format_usdc(group.total_amount)
    );

    match submitter.submit(group, params).await {
        Ok(tx) => {
            info!(
                "Redeemed {}... in tx {} (block {:?}, gas {})",
                cid, tx.transaction_hash, tx.block_number, tx.gas_used
            );
            let recorded = ledger.append(&LedgerEntry::success(group, &tx));
            // The chain already moved; resubmitting this run would only revert.
            ledger.mark_redeemed(&group.condition_id);
            notifier
                .notify(RunEvent::RedemptionSucceeded {
                    condition_id: group.condition_id.clone(),
                    amount: group.total_amount,
                    tx_hash: tx.transaction_hash.clone(),
                })
                .await;
            match recorded {
                Ok(()) => GroupOutcome::Redeemed(tx),
                Err(e) => {
                    error!(
                        "Redeemed {}... but failed to record it in {}: {}",
                        cid,
                        ledger.path().display(),
                        e
                    );
                    GroupOutcome::Unrecorded {
                        tx,
                        error: e.to_string(),
                    }
                }
            }
        }
        Err(e) => {
            error!("Redemption failed for {}...: {}", cid, e);
            if let Err(write_err) = ledger.append(&LedgerEntry::failure(group, e.to_string())) {
                error!(
                    "Failed to record error entry for {}... in {}: {}",
                    cid,
                    ledger.path().display(),
                    write_err
                );
            }
            notifier
                .notify(RunEvent::RedemptionFailed {
                    condition_id: group.condition_id.clone(),
                    error: e.to_string(),
                })
                .await;
            GroupOutcome::Failed(e)
        }
    }
}
