use crate::models::RedemptionGroup;
use crate::utils::amounts::format_usdc;

/// Outcome of the pre-submission checks. Rejected groups are skipped, not failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub redeem: bool,
    pub reason: String,
}

impl Verdict {
    fn accept() -> Self {
        Self {
            redeem: true,
            reason: "OK".to_string(),
        }
    }

    fn reject(reason: impl Into<String>) -> Self {
        Self {
            redeem: false,
            reason: reason.into(),
        }
    }
}

/// Checks run in order, first failure wins. `min_amount` is in base units and inclusive.
pub fn should_redeem(group: &RedemptionGroup, min_amount: u64) -> Verdict {
    if group.total_amount < min_amount {
        return Verdict::reject(format!(
            "amount too small: ${} < ${}",
            format_usdc(group.total_amount),
            format_usdc(min_amount)
        ));
    }
    if group.index_sets.is_empty() {
        return Verdict::reject("no index sets");
    }
    if group.condition_id.trim().is_empty() {
        return Verdict::reject("no condition id");
    }
    Verdict::accept()
}
