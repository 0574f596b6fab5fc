//! Append-only redemption ledger.
//!
//! One JSON object per line. The set of condition ids with at least one
//! `success` line is the authoritative "already redeemed" set.

use crate::error::LedgerError;
use crate::models::{LedgerEntry, OutcomeStatus};
use crate::utils::amounts::short_id;
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub entries: usize,
    pub redeemed: usize,
    pub skipped: usize,
}

pub struct RedeemedLedger {
    path: PathBuf,
    redeemed: HashSet<String>,
}

impl RedeemedLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            redeemed: HashSet::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rebuilds the redeemed set from disk. Never fails: a missing file is a
    /// first run, malformed lines are skipped one by one, and an unreadable
    /// file degrades to an empty set.
    pub fn load(&mut self) -> LoadReport {
        self.redeemed.clear();
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Ledger {} not found (first run?)", self.path.display());
                return LoadReport::default();
            }
            Err(e) => {
                error!(
                    "Failed to open ledger {}: {}. Continuing with empty redeemed set.",
                    self.path.display(),
                    e
                );
                return LoadReport::default();
            }
        };

        let mut report = LoadReport::default();
        for (idx, line) in BufReader::new(file).split(b'\n').enumerate() {
            let line_no = idx + 1;
            let raw = match line {
                Ok(raw) => raw,
                Err(e) => {
                    error!("Ledger read aborted at line {}: {}", line_no, e);
                    break;
                }
            };
            if raw.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }
            match serde_json::from_slice::<LedgerEntry>(&raw) {
                Ok(entry) if entry.is_well_formed() => {
                    report.entries += 1;
                    if entry.status == OutcomeStatus::Success {
                        self.redeemed.insert(entry.condition_id);
                    }
                }
                Ok(_) => {
                    warn!("Skipping inconsistent ledger line {}", line_no);
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!("Skipping malformed ledger line {}: {}", line_no, e);
                    report.skipped += 1;
                }
            }
        }
        report.redeemed = self.redeemed.len();

        info!(
            "Loaded {} previously redeemed condition(s) from {} ledger entries ({} line(s) skipped)",
            report.redeemed, report.entries, report.skipped
        );
        report
    }

    pub fn is_redeemed(&self, condition_id: &str) -> bool {
        self.redeemed.contains(condition_id)
    }

    /// In-memory only. Durability comes from `append`.
    pub fn mark_redeemed(&mut self, condition_id: &str) {
        if self.redeemed.insert(condition_id.to_string()) {
            debug!("Marked {} as redeemed", short_id(condition_id));
        }
    }

    pub fn redeemed_count(&self) -> usize {
        self.redeemed.len()
    }

    /// Durably appends one entry as a single line.
    ///
    /// A torn trailing line from an earlier crash is terminated first so it
    /// cannot swallow this record.
    pub fn append(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;

        if needs_separator(&mut file)? {
            line.insert(0, b'\n');
        }
        file.write_all(&line)?;
        file.sync_data()?;

        debug!(
            "Ledger: {} -> {:?}",
            short_id(&entry.condition_id),
            entry.status
        );
        Ok(())
    }
}

fn needs_separator(file: &mut File) -> std::io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RedemptionGroup, TxResult, ROOT_PARENT_COLLECTION_ID};

    fn group(condition_id: &str) -> RedemptionGroup {
        RedemptionGroup {
            condition_id: condition_id.to_string(),
            parent_collection_id: ROOT_PARENT_COLLECTION_ID.to_string(),
            index_sets: vec![1, 2],
            positions: Vec::new(),
            total_amount: 8_000_000,
        }
    }

    fn tx() -> TxResult {
        TxResult {
            transaction_hash: "0xfeed".to_string(),
            block_number: Some(1),
            gas_used: 90_000,
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = RedeemedLedger::new(dir.path().join("nope.jsonl"));
        assert_eq!(ledger.load(), LoadReport::default());
        assert_eq!(ledger.redeemed_count(), 0);
    }

    #[test]
    fn only_success_entries_count_as_redeemed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("redemption.jsonl");
        let ledger = RedeemedLedger::new(&path);
        ledger.append(&LedgerEntry::failure(&group("0xA"), "confirmation timeout")).unwrap();
        ledger.append(&LedgerEntry::failure(&group("0xB"), "transaction reverted")).unwrap();
        ledger.append(&LedgerEntry::success(&group("0xA"), &tx())).unwrap();

        let mut reloaded = RedeemedLedger::new(&path);
        let report = reloaded.load();
        assert_eq!(report.entries, 3);
        assert_eq!(report.redeemed, 1);
        assert!(reloaded.is_redeemed("0xA"));
        assert!(!reloaded.is_redeemed("0xB"));
    }

    #[test]
    fn malformed_lines_are_skipped_individually() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("redemption.jsonl");
        let good = serde_json::to_string(&LedgerEntry::success(&group("0xA"), &tx())).unwrap();
        let inconsistent = good.replace(",\"tx_hash\":\"0xfeed\"", "");
        let content = format!("{}\nnot json at all\n\n{{\"condition_id\":\"0xC\"}}\n{}\n", good, inconsistent);
        fs::write(&path, content).unwrap();

        let mut ledger = RedeemedLedger::new(&path);
        let report = ledger.load();
        assert_eq!(report.entries, 1);
        assert_eq!(report.skipped, 3);
        assert!(ledger.is_redeemed("0xA"));
    }

    #[test]
    fn torn_trailing_line_does_not_corrupt_next_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("redemption.jsonl");
        let good = serde_json::to_string(&LedgerEntry::success(&group("0xA"), &tx())).unwrap();
        fs::write(&path, format!("{}\n{{\"timestamp\":\"2026-", good)).unwrap();

        let ledger = RedeemedLedger::new(&path);
        ledger.append(&LedgerEntry::success(&group("0xB"), &tx())).unwrap();

        let mut reloaded = RedeemedLedger::new(&path);
        let report = reloaded.load();
        assert_eq!(report.skipped, 1);
        assert!(reloaded.is_redeemed("0xA"));
        assert!(reloaded.is_redeemed("0xB"));
    }

    #[test]
    fn load_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("redemption.jsonl");
        let ledger = RedeemedLedger::new(&path);
        ledger.append(&LedgerEntry::success(&group("0xA"), &tx())).unwrap();
        ledger.append(&LedgerEntry::success(&group("0xB"), &tx())).unwrap();

        let mut reloaded = RedeemedLedger::new(&path);
        let first = reloaded.load();
        let first_set = reloaded.redeemed.clone();
        let second = reloaded.load();
        assert_eq!(first, second);
        assert_eq!(first_set, reloaded.redeemed);
    }

    #[test]
    fn mark_redeemed_is_in_memory_and_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("redemption.jsonl");
        let mut ledger = RedeemedLedger::new(&path);
        ledger.mark_redeemed("0xA");
        ledger.mark_redeemed("0xA");
        assert_eq!(ledger.redeemed_count(), 1);
        assert!(!path.exists());
    }
}
