use crate::error::SubmissionError;
use crate::models::{RedemptionGroup, TxResult};
use alloy::primitives::{Address, B256, U256};
use alloy::sol;
use alloy_sol_types::SolCall;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::str::FromStr;

sol! {
    interface IConditionalTokens {
        function redeemPositions(
            address collateralToken,
            bytes32 parentCollectionId,
            bytes32 conditionId,
            uint256[] indexSets
        ) external;
    }
}

/// Addresses of the settlement contract and its collateral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractParams {
    pub ctf_contract: Address,
    pub collateral_token: Address,
}

impl ContractParams {
    pub fn parse(ctf_contract: &str, collateral_token: &str) -> Result<Self> {
        Ok(Self {
            ctf_contract: Address::from_str(ctf_contract)
                .with_context(|| format!("Failed to parse CTF contract address: {}", ctf_contract))?,
            collateral_token: Address::from_str(collateral_token)
                .with_context(|| format!("Failed to parse collateral token address: {}", collateral_token))?,
        })
    }
}

/// Submits one group's redemption and waits for it to land.
#[async_trait]
pub trait RedemptionSubmitter: Send + Sync {
    async fn submit(
        &self,
        group: &RedemptionGroup,
        params: &ContractParams,
    ) -> Result<TxResult, SubmissionError>;
}

fn parse_b256(label: &str, value: &str) -> Result<B256, SubmissionError> {
    let clean = value.strip_prefix("0x").unwrap_or(value);
    B256::from_str(clean)
        .map_err(|e| SubmissionError::Encoding(format!("invalid {} {}: {}", label, value, e)))
}

/// ABI-encodes `redeemPositions(collateral, parentCollectionId, conditionId, indexSets)`.
pub fn encode_redeem_calldata(
    group: &RedemptionGroup,
    params: &ContractParams,
) -> Result<Vec<u8>, SubmissionError> {
    if group.index_sets.is_empty() {
        return Err(SubmissionError::Encoding("no index sets".to_string()));
    }
    let call = IConditionalTokens::redeemPositionsCall {
        collateralToken: params.collateral_token,
        parentCollectionId: parse_b256("parent collection id", &group.parent_collection_id)?,
        conditionId: parse_b256("condition id", &group.condition_id)?,
        indexSets: group.index_sets.iter().map(|s| U256::from(*s)).collect(),
    };
    Ok(call.abi_encode())
}
