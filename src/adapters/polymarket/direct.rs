//! Redemption by sending `redeemPositions` straight to the CTF contract.
//! Tokens must be held by the signing EOA.

use crate::adapters::polymarket::confirm::await_receipt;
use crate::adapters::polymarket::redeem::{encode_redeem_calldata, ContractParams, RedemptionSubmitter};
use crate::error::SubmissionError;
use crate::models::{RedemptionGroup, TxResult};
use crate::utils::amounts::short_id;
use alloy::primitives::{Bytes, TxKind, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::eth::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer as _;
use anyhow::Context;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::str::FromStr;
use tokio::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct GasPolicy {
    pub limit_margin_pct: u64,
    pub price_margin_pct: u64,
    pub fallback_limit: u64,
}

impl GasPolicy {
    /// Estimate plus margin, or the fixed fallback when estimation failed.
    pub fn gas_limit<E: std::fmt::Display>(&self, estimate: Result<u64, E>) -> u64 {
        match estimate {
            Ok(gas) => gas.saturating_mul(100 + self.limit_margin_pct) / 100,
            Err(e) => {
                warn!(
                    "Gas estimation failed: {}, using fallback limit {}",
                    e, self.fallback_limit
                );
                self.fallback_limit
            }
        }
    }

    pub fn gas_price(&self, network_price: u128) -> u128 {
        network_price.saturating_mul(100 + self.price_margin_pct as u128) / 100
    }
}

pub struct DirectSubmitter {
    signer: PrivateKeySigner,
    rpc_url: String,
    gas: GasPolicy,
    confirmation_timeout: Duration,
    poll_interval: Duration,
}

impl DirectSubmitter {
    pub fn new(
        private_key: &str,
        rpc_url: String,
        chain_id: u64,
        gas: GasPolicy,
        confirmation_timeout: Duration,
        poll_interval: Duration,
    ) -> anyhow::Result<Self> {
        let signer = PrivateKeySigner::from_str(private_key)
            .context("Failed to create signer from private key. Ensure private_key is a valid hex string.")?
            .with_chain_id(Some(chain_id));
        Ok(Self {
            signer,
            rpc_url,
            gas,
            confirmation_timeout,
            poll_interval,
        })
    }
}

#[async_trait]
impl RedemptionSubmitter for DirectSubmitter {
    async fn submit(
        &self,
        group: &RedemptionGroup,
        params: &ContractParams,
    ) -> Result<TxResult, SubmissionError> {
        let calldata = encode_redeem_calldata(group, params)?;
        let from = self.signer.address();
        let deadline = Instant::now() + self.confirmation_timeout;

        let provider = ProviderBuilder::new()
            .wallet(self.signer.clone())
            .connect(&self.rpc_url)
            .await
            .map_err(|e| SubmissionError::Rpc(format!("failed to connect to RPC: {}", e)))?;

        let balance = provider
            .get_balance(from)
            .await
            .map_err(|e| SubmissionError::Rpc(format!("balance lookup failed: {}", e)))?;
        debug!("Native balance of {}: {}", from, balance);
        if balance.is_zero() {
            return Err(SubmissionError::Rpc("no native balance for gas".to_string()));
        }

        let network_price = provider
            .get_gas_price()
            .await
            .map_err(|e| SubmissionError::Rpc(format!("gas price lookup failed: {}", e)))?;

        let mut tx_request = TransactionRequest {
            from: Some(from),
            to: Some(TxKind::Call(params.ctf_contract)),
            input: Bytes::from(calldata).into(),
            value: Some(U256::ZERO),
            gas_price: Some(self.gas.gas_price(network_price)),
            ..Default::default()
        };
        let estimate = provider.estimate_gas(tx_request.clone()).await;
        tx_request.gas = Some(self.gas.gas_limit(estimate));

        info!(
            "Sending redemption for {} from {} to CTF {} (gas limit {:?})",
            short_id(&group.condition_id),
            from,
            params.ctf_contract,
            tx_request.gas
        );
        let pending_tx = provider
            .send_transaction(tx_request)
            .await
            .map_err(|e| SubmissionError::Rpc(format!("failed to send redeem transaction: {}", e)))?;
        let tx_hash = *pending_tx.tx_hash();
        info!("Transaction sent: {:?}, waiting for confirmation...", tx_hash);

        await_receipt(&provider, tx_hash, deadline, self.poll_interval).await
    }
}
