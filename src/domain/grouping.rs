use crate::error::GroupingError;
use crate::models::{Position, RedemptionGroup, ROOT_PARENT_COLLECTION_ID};
use crate::utils::amounts::to_base_units;
use log::warn;
use std::collections::{BTreeSet, HashMap};

/// `indexSet = 2^outcomeIndex`. Index sets are `u64`, so outcomes 0..=63 are supported.
pub fn index_set_for(position: &Position) -> Result<u64, GroupingError> {
    let idx = position.outcome_index;
    if idx < 0 {
        return Err(GroupingError::NegativeOutcomeIndex {
            condition_id: position.condition_id.clone(),
            asset: position.asset.clone(),
            outcome_index: idx,
        });
    }
    if idx >= u64::BITS as i64 {
        return Err(GroupingError::OutcomeIndexOutOfRange {
            condition_id: position.condition_id.clone(),
            asset: position.asset.clone(),
            outcome_index: idx,
        });
    }
    Ok(1u64 << idx)
}

/// Result of grouping one batch of positions.
#[derive(Debug, Default)]
pub struct Grouping {
    pub groups: Vec<RedemptionGroup>,
    /// Conditions that could not be turned into a group, one error each.
    pub rejected: Vec<GroupingError>,
}

/// Partitions positions by condition id into redemption groups.
///
/// Groups come out in the order their condition was first seen; within a group
/// index sets are deduplicated and ascending. Positions without a condition id
/// are dropped. A condition with an unusable position is rejected as a whole
/// without affecting the other conditions.
pub fn group_positions(positions: &[Position]) -> Grouping {
    let mut order: Vec<&str> = Vec::new();
    let mut by_condition: HashMap<&str, Vec<&Position>> = HashMap::new();

    for pos in positions {
        if pos.condition_id.trim().is_empty() {
            warn!("Position {} has no condition id, skipping", pos.asset);
            continue;
        }
        let members = by_condition.entry(pos.condition_id.as_str()).or_default();
        if members.is_empty() {
            order.push(pos.condition_id.as_str());
        }
        members.push(pos);
    }

    let mut grouping = Grouping::default();
    for condition_id in order {
        match build_group(condition_id, &by_condition[condition_id]) {
            Ok(group) => grouping.groups.push(group),
            Err(e) => grouping.rejected.push(e),
        }
    }
    grouping
}

fn build_group(condition_id: &str, members: &[&Position]) -> Result<RedemptionGroup, GroupingError> {
    let mut index_sets = BTreeSet::new();
    let mut total_amount: u64 = 0;

    for pos in members {
        index_sets.insert(index_set_for(pos)?);
        // Balances are positive at the source boundary; anything else contributes nothing.
        let units = to_base_units(pos.balance).unwrap_or(0);
        total_amount = total_amount
            .checked_add(units)
            .ok_or_else(|| GroupingError::AmountOverflow(condition_id.to_string()))?;
    }

    Ok(RedemptionGroup {
        condition_id: condition_id.to_string(),
        parent_collection_id: ROOT_PARENT_COLLECTION_ID.to_string(),
        index_sets: index_sets.into_iter().collect(),
        positions: members.iter().map(|p| (*p).clone()).collect(),
        total_amount,
    })
}
