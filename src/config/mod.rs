use alloy::primitives::Address;
use anyhow::Context;
use clap::Parser;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::utils::amounts::to_base_units;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// JSON or TOML config file. Created with defaults if missing.
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// Fetch, filter, group and validate, but submit nothing.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub polymarket: PolymarketConfig,
    #[serde(default)]
    pub redemption: RedemptionConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolymarketConfig {
    #[serde(default = "default_data_api_url")]
    pub data_api_url: String,
    #[serde(default = "default_relayer_url")]
    pub relayer_url: String,
    /// Polygon RPC used for receipts (both modes) and sending (direct mode).
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    pub private_key: Option<String>,
    /// Funder / proxy wallet that holds the positions. Defaults to the signer address.
    pub proxy_wallet_address: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub api_passphrase: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionMode {
    /// Builder relayer `/execute`, HMAC-authenticated.
    Relayer,
    /// Signed transaction sent straight to the CTF contract.
    Direct,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionConfig {
    #[serde(default = "default_mode")]
    pub mode: SubmissionMode,
    #[serde(default = "default_ctf_contract")]
    pub ctf_contract: String,
    /// USDC.e on Polygon.
    #[serde(default = "default_collateral_token")]
    pub collateral_token: String,
    /// Groups worth less than this (USDC) are skipped as dust.
    #[serde(default = "default_min_redeem_usdc")]
    pub min_redeem_usdc: Decimal,
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
    #[serde(default = "default_api_timeout_secs")]
    pub api_timeout_secs: u64,
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_confirmation_poll_secs")]
    pub confirmation_poll_secs: u64,
    #[serde(default = "default_gas_limit_margin_pct")]
    pub gas_limit_margin_pct: u64,
    #[serde(default = "default_gas_price_margin_pct")]
    pub gas_price_margin_pct: u64,
    #[serde(default = "default_fallback_gas_limit")]
    pub fallback_gas_limit: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log lines are appended here as well as written to stderr. `null` disables the file.
    #[serde(default = "default_log_file")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
        }
    }
}

fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("./logs/redemption-bot.log"))
}

fn default_data_api_url() -> String {
    "https://data-api.polymarket.com".to_string()
}
fn default_relayer_url() -> String {
    "https://relayer-v2.polymarket.com".to_string()
}
fn default_rpc_url() -> String {
    "https://polygon-rpc.com".to_string()
}
fn default_chain_id() -> u64 {
    137
}
fn default_mode() -> SubmissionMode {
    SubmissionMode::Relayer
}
fn default_ctf_contract() -> String {
    "0x4D97DCd97eC945f40cF65F87097ACe5EA0476045".to_string()
}
fn default_collateral_token() -> String {
    "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174".to_string()
}
fn default_min_redeem_usdc() -> Decimal {
    dec!(0.01)
}
fn default_ledger_path() -> PathBuf {
    PathBuf::from("./logs/redemption.jsonl")
}
fn default_api_timeout_secs() -> u64 {
    30
}
fn default_confirmation_timeout_secs() -> u64 {
    120
}
fn default_confirmation_poll_secs() -> u64 {
    3
}
fn default_gas_limit_margin_pct() -> u64 {
    20
}
fn default_gas_price_margin_pct() -> u64 {
    10
}
fn default_fallback_gas_limit() -> u64 {
    500_000
}
fn default_page_size() -> u32 {
    500
}

impl Default for PolymarketConfig {
    fn default() -> Self {
        Self {
            data_api_url: default_data_api_url(),
            relayer_url: default_relayer_url(),
            rpc_url: default_rpc_url(),
            chain_id: default_chain_id(),
            private_key: None,
            proxy_wallet_address: None,
            api_key: None,
            api_secret: None,
            api_passphrase: None,
        }
    }
}

impl Default for RedemptionConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            ctf_contract: default_ctf_contract(),
            collateral_token: default_collateral_token(),
            min_redeem_usdc: default_min_redeem_usdc(),
            ledger_path: default_ledger_path(),
            api_timeout_secs: default_api_timeout_secs(),
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            confirmation_poll_secs: default_confirmation_poll_secs(),
            gas_limit_margin_pct: default_gas_limit_margin_pct(),
            gas_price_margin_pct: default_gas_price_margin_pct(),
            fallback_gas_limit: default_fallback_gas_limit(),
            page_size: default_page_size(),
        }
    }
}

impl RedemptionConfig {
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn confirmation_poll(&self) -> Duration {
        Duration::from_secs(self.confirmation_poll_secs)
    }

    /// Dust threshold in collateral base units.
    pub fn min_redeem_units(&self) -> u64 {
        to_base_units(self.min_redeem_usdc).unwrap_or(0)
    }
}

impl Config {
    /// Reads `.toml` or JSON by extension. A missing file is written out with defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let is_toml = path.extension().map(|e| e == "toml").unwrap_or(false);
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            let config = if is_toml {
                toml::from_str(&content)
                    .with_context(|| format!("Failed to parse TOML config {}", path.display()))?
            } else {
                serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse JSON config {}", path.display()))?
            };
            Ok(config)
        } else {
            let config = Config::default();
            let content = if is_toml {
                toml::to_string_pretty(&config)?
            } else {
                serde_json::to_string_pretty(&config)?
            };
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write default config {}", path.display()))?;
            Ok(config)
        }
    }

    /// Secrets may come from the environment instead of the file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let pm = &mut self.polymarket;
        if let Some(v) = get("POLY_PRIVATE_KEY") {
            pm.private_key = Some(v);
        }
        if let Some(v) = get("POLY_FUNDER_ADDRESS") {
            pm.proxy_wallet_address = Some(v);
        }
        if let Some(v) = get("POLY_API_KEY") {
            pm.api_key = Some(v);
        }
        if let Some(v) = get("POLY_API_SECRET") {
            pm.api_secret = Some(v);
        }
        if let Some(v) = get("POLY_API_PASSPHRASE") {
            pm.api_passphrase = Some(v);
        }
        if let Some(v) = get("POLYGON_RPC_URL") {
            pm.rpc_url = v;
        }
        if let Some(v) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(v);
        }
        if let Some(v) = get("TELEGRAM_CHAT_ID") {
            self.telegram.chat_id = Some(v);
        }
    }

    /// Returns every problem found; empty means usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let pm = &self.polymarket;
        let rd = &self.redemption;

        match pm.private_key.as_deref() {
            Some(pk) if is_private_key(pk) => {}
            Some(_) => errors.push("Invalid private_key (must be 64 hex chars, optional 0x prefix)".to_string()),
            None => errors.push("private_key is required".to_string()),
        }
        if let Some(funder) = pm.proxy_wallet_address.as_deref() {
            if Address::from_str(funder).is_err() {
                errors.push(format!("Invalid proxy_wallet_address: {}", funder));
            }
        }
        if Address::from_str(&rd.ctf_contract).is_err() {
            errors.push(format!("Invalid ctf_contract: {}", rd.ctf_contract));
        }
        if Address::from_str(&rd.collateral_token).is_err() {
            errors.push(format!("Invalid collateral_token: {}", rd.collateral_token));
        }

        for (name, value) in [
            ("data_api_url", &pm.data_api_url),
            ("relayer_url", &pm.relayer_url),
            ("rpc_url", &pm.rpc_url),
        ] {
            if url::Url::parse(value).is_err() {
                errors.push(format!("Invalid {}: {}", name, value));
            }
        }

        if rd.mode == SubmissionMode::Relayer {
            let missing = [&pm.api_key, &pm.api_secret, &pm.api_passphrase]
                .iter()
                .any(|v| v.as_deref().map(str::trim).unwrap_or("").is_empty());
            if missing {
                errors.push(
                    "Relayer mode requires api_key, api_secret and api_passphrase".to_string(),
                );
            }
        }

        if rd.min_redeem_usdc.is_sign_negative() {
            errors.push("min_redeem_usdc must not be negative".to_string());
        }
        if rd.api_timeout_secs == 0 || rd.confirmation_timeout_secs == 0 {
            errors.push("Timeouts must be greater than zero".to_string());
        }
        if rd.confirmation_poll_secs == 0 {
            errors.push("confirmation_poll_secs must be greater than zero".to_string());
        }
        if rd.page_size == 0 {
            errors.push("page_size must be greater than zero".to_string());
        }

        errors
    }
}

fn is_private_key(pk: &str) -> bool {
    let hex_part = pk.strip_prefix("0x").unwrap_or(pk);
    hex_part.len() == 64 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}
