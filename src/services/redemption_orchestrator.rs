//! One redemption run: load ledger, fetch, filter, group, process, summarize.

use crate::adapters::polymarket::{ContractParams, PositionSource, RedemptionSubmitter};
use crate::adapters::telegram::{Notifier, RunEvent};
use crate::domain::grouping::group_positions;
use crate::domain::validation::should_redeem;
use crate::ledger::RedeemedLedger;
use crate::models::RedemptionGroup;
use crate::services::redemption_service::{process_group, GroupOutcome};
use crate::utils::amounts::{format_usdc, short_id};
use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Fetch,
    Filter,
    Group,
    ProcessGroups,
    Summarize,
    Done,
    Fatal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub success: usize,
    pub errors: usize,
    pub skipped: usize,
}

impl RunSummary {
    pub fn exit_code(&self) -> u8 {
        if self.errors == 0 {
            0
        } else {
            1
        }
    }
}

pub struct RedemptionOrchestrator {
    source: Box<dyn PositionSource>,
    submitter: Box<dyn RedemptionSubmitter>,
    notifier: Box<dyn Notifier>,
    ledger: RedeemedLedger,
    params: ContractParams,
    min_amount: u64,
    dry_run: bool,
    state: RunState,
}

impl RedemptionOrchestrator {
    pub fn new(
        source: Box<dyn PositionSource>,
        submitter: Box<dyn RedemptionSubmitter>,
        notifier: Box<dyn Notifier>,
        ledger: RedeemedLedger,
        params: ContractParams,
        min_amount: u64,
    ) -> Self {
        Self {
            source,
            submitter,
            notifier,
            ledger,
            params,
            min_amount,
            dry_run: false,
            state: RunState::Init,
        }
    }

    /// Log what would be redeemed without submitting or writing the ledger.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn ledger(&self) -> &RedeemedLedger {
        &self.ledger
    }

    fn enter(&mut self, state: RunState) {
        debug!("Run state {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Runs the whole pipeline once. `Err` means the fetch failed and the
    /// ledger was left untouched; per-condition failures are counted in the summary.
    pub async fn run_once(&mut self) -> Result<RunSummary> {
        self.enter(RunState::Init);
        let report = self.ledger.load();
        if report.skipped > 0 {
            warn!(
                "{} ledger line(s) unreadable, their conditions may be resubmitted",
                report.skipped
            );
        }
        self.notifier
            .notify(RunEvent::Started {
                timestamp: Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            })
            .await;

        self.enter(RunState::Fetch);
        let positions = match self.source.fetch_redeemable().await {
            Ok(p) => p,
            Err(e) => {
                self.enter(RunState::Fatal);
                return Err(e).context("Failed to fetch redeemable positions");
            }
        };

        self.enter(RunState::Filter);
        let fetched = positions.len();
        let pending: Vec<_> = positions
            .into_iter()
            .filter(|p| !self.ledger.is_redeemed(&p.condition_id))
            .collect();
        if pending.len() < fetched {
            info!(
                "Filtered out {} position(s) already redeemed",
                fetched - pending.len()
            );
        }

        self.enter(RunState::Group);
        let grouping = group_positions(&pending);
        let mut summary = RunSummary::default();
        for rejected in &grouping.rejected {
            // No submission was attempted, so nothing goes to the ledger.
            error!("Cannot redeem condition: {}", rejected);
            summary.errors += 1;
        }
        let mut accepted: Vec<RedemptionGroup> = Vec::new();
        for group in grouping.groups {
            let verdict = should_redeem(&group, self.min_amount);
            if verdict.redeem {
                accepted.push(group);
            } else {
                info!("Skipping {}...: {}", short_id(&group.condition_id), verdict.reason);
                summary.skipped += 1;
            }
        }

        if accepted.is_empty() {
            info!("No positions to redeem");
            self.notifier.notify(RunEvent::NoPositions).await;
            return Ok(self.summarize(summary));
        }

        let total = accepted
            .iter()
            .fold(0u64, |acc, g| acc.saturating_add(g.total_amount));
        info!(
            "Found {} condition(s) to redeem, total ${} USDC",
            accepted.len(),
            format_usdc(total)
        );
        self.notifier
            .notify(RunEvent::PositionsFound {
                groups: accepted.len(),
                total_amount: total,
            })
            .await;

        self.enter(RunState::ProcessGroups);
        for group in &accepted {
            if self.dry_run {
                info!(
                    "[dry run] Would redeem {}... index sets {:?}, ${} USDC",
                    short_id(&group.condition_id),
                    group.index_sets,
                    format_usdc(group.total_amount)
                );
                summary.skipped += 1;
                continue;
            }
            let outcome = process_group(
                self.submitter.as_ref(),
                &self.params,
                &mut self.ledger,
                self.notifier.as_ref(),
                group,
            )
            .await;
            match outcome {
                GroupOutcome::Redeemed(tx) => {
                    debug!(
                        "{}... confirmed in block {:?}",
                        short_id(&group.condition_id),
                        tx.block_number
                    );
                    summary.success += 1;
                }
                GroupOutcome::Failed(e) => {
                    debug!("{}... left for the next run: {}", short_id(&group.condition_id), e);
                    summary.errors += 1;
                }
                GroupOutcome::Unrecorded { tx, error } => {
                    error!(
                        "{}... is redeemed on chain (tx {}) but missing from the ledger: {}",
                        short_id(&group.condition_id),
                        tx.transaction_hash,
                        error
                    );
                    summary.errors += 1;
                }
            }
        }

        Ok(self.summarize(summary))
    }

    fn summarize(&mut self, summary: RunSummary) -> RunSummary {
        self.enter(RunState::Summarize);
        let line = format!(
            "Redemption run complete: {} succeeded, {} failed, {} skipped",
            summary.success, summary.errors, summary.skipped
        );
        if summary.errors == 0 {
            info!("{}", line);
        } else {
            error!("{}", line);
        }
        self.enter(RunState::Done);
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SubmissionError;
    use crate::models::{LedgerEntry, OutcomeStatus, Position, TxResult};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    struct FakeSource(std::result::Result<Vec<Position>, String>);

    #[async_trait]
    impl PositionSource for FakeSource {
        async fn fetch_redeemable(&self) -> Result<Vec<Position>> {
            self.0.clone().map_err(|e| anyhow::anyhow!(e))
        }
    }

    struct FakeSubmitter {
        calls: Arc<Mutex<Vec<RedemptionGroup>>>,
        result: std::result::Result<TxResult, SubmissionError>,
    }

    #[async_trait]
    impl RedemptionSubmitter for FakeSubmitter {
        async fn submit(
            &self,
            group: &RedemptionGroup,
            _params: &ContractParams,
        ) -> std::result::Result<TxResult, SubmissionError> {
            self.calls.lock().unwrap().push(group.clone());
            self.result.clone()
        }
    }

    struct FakeNotifier(Arc<Mutex<Vec<RunEvent>>>);

    #[async_trait]
    impl Notifier for FakeNotifier {
        async fn notify(&self, event: RunEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    struct Harness {
        orchestrator: RedemptionOrchestrator,
        calls: Arc<Mutex<Vec<RedemptionGroup>>>,
        events: Arc<Mutex<Vec<RunEvent>>>,
    }

    fn position(condition_id: &str, outcome_index: i64, balance: Decimal) -> Position {
        Position {
            asset: format!("{}-{}", condition_id, outcome_index),
            balance,
            condition_id: condition_id.to_string(),
            outcome_index,
            market_label: "test market".to_string(),
        }
    }

    fn scenario_a() -> Vec<Position> {
        vec![position("0xA", 0, dec!(5.0)), position("0xA", 1, dec!(3.0))]
    }

    fn mined() -> std::result::Result<TxResult, SubmissionError> {
        Ok(TxResult {
            transaction_hash: "0xfeed".to_string(),
            block_number: Some(1),
            gas_used: 100_000,
        })
    }

    fn harness(
        ledger_path: &Path,
        positions: std::result::Result<Vec<Position>, String>,
        result: std::result::Result<TxResult, SubmissionError>,
    ) -> Harness {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let events = Arc::new(Mutex::new(Vec::new()));
        let params = ContractParams::parse(
            "0x4D97DCd97eC945f40cF65F87097ACe5EA0476045",
            "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174",
        )
        .unwrap();
        let orchestrator = RedemptionOrchestrator::new(
            Box::new(FakeSource(positions)),
            Box::new(FakeSubmitter {
                calls: calls.clone(),
                result,
            }),
            Box::new(FakeNotifier(events.clone())),
            RedeemedLedger::new(ledger_path),
            params,
            10_000,
        );
        Harness {
            orchestrator,
            calls,
            events,
        }
    }

    fn ledger_lines(path: &Path) -> Vec<LedgerEntry> {
        match std::fs::read_to_string(path) {
            Ok(s) => s.lines().map(|l| serde_json::from_str(l).unwrap()).collect(),
            Err(_) => Vec::new(),
        }
    }

    #[tokio::test]
    async fn scenario_a_redeems_one_group() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let mut h = harness(&path, Ok(scenario_a()), mined());

        let summary = h.orchestrator.run_once().await.unwrap();

        assert_eq!(summary, RunSummary { success: 1, errors: 0, skipped: 0 });
        assert_eq!(summary.exit_code(), 0);
        assert_eq!(h.orchestrator.state(), RunState::Done);
        let calls = h.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].index_sets, vec![1, 2]);
        assert_eq!(calls[0].total_amount, 8_000_000);
        let entries = ledger_lines(&path);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, OutcomeStatus::Success);
        assert_eq!(entries[0].amount_redeemed, 8_000_000);
        let events = h.events.lock().unwrap();
        assert!(matches!(events[0], RunEvent::Started { .. }));
        assert_eq!(
            events[1],
            RunEvent::PositionsFound { groups: 1, total_amount: 8_000_000 }
        );
        assert!(matches!(events[2], RunEvent::RedemptionSucceeded { .. }));
    }

    #[tokio::test]
    async fn scenario_b_skips_already_redeemed_condition() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let mut first = harness(&path, Ok(scenario_a()), mined());
        first.orchestrator.run_once().await.unwrap();

        let mut second = harness(&path, Ok(scenario_a()), mined());
        let summary = second.orchestrator.run_once().await.unwrap();

        assert_eq!(summary, RunSummary::default());
        assert!(second.calls.lock().unwrap().is_empty());
        assert_eq!(ledger_lines(&path).len(), 1);
        assert!(second.orchestrator.ledger().is_redeemed("0xA"));
        assert!(second
            .events
            .lock()
            .unwrap()
            .contains(&RunEvent::NoPositions));
    }

    #[tokio::test]
    async fn scenario_c_timeout_records_error_and_stays_eligible() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let mut h = harness(
            &path,
            Ok(scenario_a()),
            Err(SubmissionError::ConfirmationTimeout { tx_hash: None }),
        );

        let summary = h.orchestrator.run_once().await.unwrap();

        assert_eq!(summary.errors, 1);
        assert_ne!(summary.exit_code(), 0);
        let entries = ledger_lines(&path);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, OutcomeStatus::Error);
        assert!(entries[0].tx_hash.is_none());
        assert!(entries[0].error.as_deref().unwrap().contains("confirmation timeout"));

        let mut retry = harness(&path, Ok(scenario_a()), mined());
        let summary = retry.orchestrator.run_once().await.unwrap();
        assert_eq!(summary.success, 1);
        assert_eq!(retry.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn scenario_d_fetch_failure_is_fatal_without_ledger_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let mut h = harness(&path, Err("connection refused".to_string()), mined());

        let result = h.orchestrator.run_once().await;

        assert!(result.is_err());
        assert_eq!(h.orchestrator.state(), RunState::Fatal);
        assert!(!path.exists());
        assert!(h.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unusable_condition_does_not_block_the_others() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let positions = vec![position("0xGOOD", 0, dec!(1)), position("0xBAD", 64, dec!(1))];
        let mut h = harness(&path, Ok(positions), mined());

        let summary = h.orchestrator.run_once().await.unwrap();

        assert_eq!(summary, RunSummary { success: 1, errors: 1, skipped: 0 });
        assert_ne!(summary.exit_code(), 0);
        assert_eq!(h.orchestrator.state(), RunState::Done);
        let calls = h.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].condition_id, "0xGOOD");
        let entries = ledger_lines(&path);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].condition_id, "0xGOOD");
    }

    #[tokio::test]
    async fn dust_boundary_is_inclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let positions = vec![
            position("0xDUST", 0, dec!(0.009)),
            position("0xMIN", 1, dec!(0.01)),
        ];
        let mut h = harness(&path, Ok(positions), mined());

        let summary = h.orchestrator.run_once().await.unwrap();

        assert_eq!(summary, RunSummary { success: 1, errors: 0, skipped: 1 });
        let calls = h.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].condition_id, "0xMIN");
        assert_eq!(calls[0].index_sets, vec![2]);
    }

    #[tokio::test]
    async fn one_failing_group_does_not_stop_the_others() {
        struct PickySubmitter;

        #[async_trait]
        impl RedemptionSubmitter for PickySubmitter {
            async fn submit(
                &self,
                group: &RedemptionGroup,
                _params: &ContractParams,
            ) -> std::result::Result<TxResult, SubmissionError> {
                if group.condition_id == "0xBAD" {
                    Err(SubmissionError::Relayer("HTTP 500".to_string()))
                } else {
                    Ok(TxResult {
                        transaction_hash: format!("0xtx{}", group.condition_id),
                        block_number: None,
                        gas_used: 0,
                    })
                }
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let mut h = harness(
            &path,
            Ok(vec![
                position("0xBAD", 0, dec!(1)),
                position("0xGOOD", 0, dec!(2)),
            ]),
            mined(),
        );
        h.orchestrator.submitter = Box::new(PickySubmitter);

        let summary = h.orchestrator.run_once().await.unwrap();

        assert_eq!(summary, RunSummary { success: 1, errors: 1, skipped: 0 });
        let entries = ledger_lines(&path);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, OutcomeStatus::Error);
        assert_eq!(entries[1].status, OutcomeStatus::Success);
    }

    #[tokio::test]
    async fn dry_run_submits_and_records_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let h = harness(&path, Ok(scenario_a()), mined());
        let mut orchestrator = h.orchestrator.with_dry_run(true);

        let summary = orchestrator.run_once().await.unwrap();

        assert_eq!(summary, RunSummary { success: 0, errors: 0, skipped: 1 });
        assert!(h.calls.lock().unwrap().is_empty());
        assert!(!path.exists());
    }
}
