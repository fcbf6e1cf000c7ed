use anyhow::{Context, bail};
use bigdecimal::BigDecimal;
use num_bigint::{BigUint, Sign};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const ETH_DECIMALS: u32 = 18;
pub const SWAP_FEE_TIER: u32 = 3000;
pub const SWAP_DEADLINE_SECS: i64 = 60 * 10;
/// 10^78 exceeds uint256, so no token can use more decimals than this.
pub const MAX_DECIMALS: u32 = 77;
const UINT256_MAX_DIGITS: i64 = 78;

const TRANSFER_SELECTOR: &str = "a9059cbb";
const APPROVE_SELECTOR: &str = "095ea7b3";
// exactInputSingle((address,address,uint24,address,uint256,uint256,uint256,uint160))
const EXACT_INPUT_SINGLE_SELECTOR: &str = "414bf389";

/// Unsigned transaction for a wallet to sign and submit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub chain_id: u64,
    pub to: String,
    pub data: String,
    pub value: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapParams {
    pub token_in: String,
    pub token_out: String,
    pub amount: String,
    pub decimals: u32,
    pub recipient: String,
    pub deadline: Option<i64>,
}

/// Scales a decimal amount to base units, dropping digits beyond `decimals`.
pub fn parse_units(amount: &str, decimals: u32) -> anyhow::Result<BigUint> {
    if decimals > MAX_DECIMALS {
        bail!("decimals must be at most {MAX_DECIMALS}");
    }
    let amount = amount.trim();
    if amount.is_empty() {
        bail!("amount is required");
    }
    let value = BigDecimal::from_str(amount).with_context(|| format!("invalid amount {amount}"))?;
    match value.sign() {
        Sign::Minus => bail!("amount must not be negative"),
        Sign::NoSign => bail!("amount must be greater than zero"),
        Sign::Plus => {}
    }

    // Integer digits after scaling.
    let (_, exponent) = value.as_bigint_and_exponent();
    let scaled_digits = value.digits() as i64 - exponent + decimals as i64;
    if scaled_digits > UINT256_MAX_DIGITS {
        bail!("amount does not fit in uint256");
    }
    if scaled_digits <= 0 {
        bail!("amount must be greater than zero");
    }

    let (units, _) = value.with_scale(decimals as i64).into_bigint_and_exponent();
    if units.sign() == Sign::NoSign {
        bail!("amount must be greater than zero");
    }
    units
        .to_biguint()
        .context("amount must not be negative")
}

pub fn validate_address(address: &str) -> anyhow::Result<String> {
    let address = address.trim();
    let Some(hex) = address.strip_prefix("0x") else {
        bail!("address {address} must start with 0x");
    };
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("address {address} must be 20 bytes of hex");
    }
    Ok(format!("0x{}", hex.to_ascii_lowercase()))
}

fn address_word(address: &str) -> String {
    format!("{:0>64}", address.trim_start_matches("0x"))
}

fn uint_word(value: &BigUint) -> anyhow::Result<String> {
    let hex = value.to_str_radix(16);
    if hex.len() > 64 {
        bail!("value does not fit in uint256");
    }
    Ok(format!("{hex:0>64}"))
}

fn quantity(value: &BigUint) -> String {
    format!("0x{}", value.to_str_radix(16))
}

pub struct TxBuilder {
    chain_id: u64,
    swap_router: String,
}

impl TxBuilder {
    pub fn new(chain_id: u64, swap_router: &str) -> anyhow::Result<Self> {
        Ok(Self {
            chain_id,
            swap_router: validate_address(swap_router).context("invalid swap router")?,
        })
    }

    fn call(&self, to: String, data: String) -> TransactionRequest {
        TransactionRequest {
            chain_id: self.chain_id,
            to,
            data,
            value: "0x0".to_string(),
        }
    }

    /// Native ETH transfer.
    pub fn tip(&self, to: &str, amount_eth: &str) -> anyhow::Result<TransactionRequest> {
        let to = validate_address(to)?;
        let value = parse_units(amount_eth, ETH_DECIMALS)?;

        Ok(TransactionRequest {
            chain_id: self.chain_id,
            to,
            data: "0x".to_string(),
            value: quantity(&value),
        })
    }

    pub fn transfer(
        &self,
        token: &str,
        to: &str,
        amount: &str,
        decimals: u32,
    ) -> anyhow::Result<TransactionRequest> {
        let token = validate_address(token)?;
        let to = validate_address(to)?;
        let units = parse_units(amount, decimals)?;

        let data = format!("0x{TRANSFER_SELECTOR}{}{}", address_word(&to), uint_word(&units)?);
        Ok(self.call(token, data))
    }

    /// Approval of the router followed by a single-pool exact-input swap.
    pub fn swap(&self, params: &SwapParams, now: i64) -> anyhow::Result<Vec<TransactionRequest>> {
        let token_in = validate_address(&params.token_in)?;
        let token_out = validate_address(&params.token_out)?;
        let recipient = validate_address(&params.recipient)?;
        if token_in == token_out {
            bail!("cannot swap a token for itself");
        }
        let amount_in = parse_units(&params.amount, params.decimals)?;
        let deadline = params.deadline.unwrap_or(now + SWAP_DEADLINE_SECS);
        if deadline <= now {
            bail!("swap deadline is in the past");
        }

        let approve = format!(
            "0x{APPROVE_SELECTOR}{}{}",
            address_word(&self.swap_router),
            uint_word(&amount_in)?
        );

        let zero = BigUint::from(0u8);
        let exact_input_single = [
            address_word(&token_in),
            address_word(&token_out),
            uint_word(&BigUint::from(SWAP_FEE_TIER))?,
            address_word(&recipient),
            uint_word(&BigUint::from(deadline as u64))?,
            uint_word(&amount_in)?,
            uint_word(&zero)?,
            uint_word(&zero)?,
        ]
        .concat();

        Ok(vec![
            self.call(token_in, approve),
            self.call(
                self.swap_router.clone(),
                format!("0x{EXACT_INPUT_SINGLE_SELECTOR}{exact_input_single}"),
            ),
        ])
    }
}
