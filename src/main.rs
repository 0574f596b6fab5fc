mod adapters;
mod config;
mod domain;
mod error;
mod ledger;
mod models;
mod services;
mod utils;

use crate::adapters::polymarket::auth::RelayerCredentials;
use crate::adapters::polymarket::direct::{DirectSubmitter, GasPolicy};
use crate::adapters::polymarket::relayer::RelayerSubmitter;
use crate::adapters::polymarket::{
    ContractParams, DataApiPositionSource, PositionSource, RedemptionSubmitter,
};
use crate::adapters::telegram::{Notifier, SilentNotifier, TelegramNotifier};
use crate::config::{Args, Config, SubmissionMode};
use crate::ledger::RedeemedLedger;
use crate::services::redemption_orchestrator::RedemptionOrchestrator;
use crate::utils::logging;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info, warn};
use std::process::ExitCode;
use std::str::FromStr;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let loaded = Config::load(&args.config);

    let log_file = loaded.as_ref().ok().and_then(|c| c.logging.file.clone());
    if let Err(e) = logging::init(log_file.as_deref()) {
        warn!("Log file unavailable, logging to stderr only: {}", e);
    }

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("Redemption run failed: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    match run(args, config).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("Redemption run failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, mut config: Config) -> Result<u8> {
    config.apply_env_overrides();
    let problems = config.validate();
    if !problems.is_empty() {
        for p in &problems {
            error!("Config: {}", p);
        }
        anyhow::bail!(
            "{} configuration error(s) in {}",
            problems.len(),
            args.config.display()
        );
    }

    let pm = &config.polymarket;
    let rd = &config.redemption;
    let private_key = pm
        .private_key
        .as_deref()
        .context("private_key is required")?;
    let signer = PrivateKeySigner::from_str(private_key)
        .context("Failed to create signer from private key")?;
    let signer_address = signer.address().to_string();
    let funder = pm
        .proxy_wallet_address
        .clone()
        .unwrap_or_else(|| signer_address.clone());

    info!("Polymarket redeemer starting");
    info!("   Signer: {}", signer_address);
    info!("   Funder: {}", funder);
    info!("   Mode: {:?}{}", rd.mode, if args.dry_run { " (dry run)" } else { "" });

    let params = ContractParams::parse(&rd.ctf_contract, &rd.collateral_token)?;

    let source: Box<dyn PositionSource> = Box::new(DataApiPositionSource::new(
        pm.data_api_url.clone(),
        &funder,
        rd.page_size,
        rd.api_timeout(),
    )?);

    let submitter: Box<dyn RedemptionSubmitter> = match rd.mode {
        SubmissionMode::Relayer => {
            let credentials = RelayerCredentials {
                api_key: pm.api_key.clone().unwrap_or_default(),
                secret: pm.api_secret.clone().unwrap_or_default(),
                passphrase: pm.api_passphrase.clone().unwrap_or_default(),
                wallet_address: signer_address.clone(),
            };
            Box::new(RelayerSubmitter::new(
                pm.relayer_url.clone(),
                pm.rpc_url.clone(),
                credentials,
                rd.api_timeout(),
                rd.confirmation_timeout(),
                rd.confirmation_poll(),
            )?)
        }
        SubmissionMode::Direct => {
            if !funder.eq_ignore_ascii_case(&signer_address) {
                warn!("Direct mode redeems tokens held by the signer, not the funder {}", funder);
            }
            Box::new(DirectSubmitter::new(
                private_key,
                pm.rpc_url.clone(),
                pm.chain_id,
                GasPolicy {
                    limit_margin_pct: rd.gas_limit_margin_pct,
                    price_margin_pct: rd.gas_price_margin_pct,
                    fallback_limit: rd.fallback_gas_limit,
                },
                rd.confirmation_timeout(),
                rd.confirmation_poll(),
            )?)
        }
    };

    let notifier: Box<dyn Notifier> = match (&config.telegram.bot_token, &config.telegram.chat_id) {
        (Some(token), Some(chat_id)) if !token.is_empty() && !chat_id.is_empty() => {
            Box::new(TelegramNotifier::new(token, chat_id.clone())?)
        }
        _ => {
            info!("Telegram not configured, notifications disabled");
            Box::new(SilentNotifier)
        }
    };

    let mut orchestrator = RedemptionOrchestrator::new(
        source,
        submitter,
        notifier,
        RedeemedLedger::new(rd.ledger_path.clone()),
        params,
        rd.min_redeem_units(),
    )
    .with_dry_run(args.dry_run);

    let result = orchestrator.run_once().await;
    debug!(
        "Run ended in state {:?}, {} condition(s) on record as redeemed",
        orchestrator.state(),
        orchestrator.ledger().redeemed_count()
    );
    Ok(result?.exit_code())
}
