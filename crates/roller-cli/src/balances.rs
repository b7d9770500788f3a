//! Balance queries and the funding gate in front of on-chain transactions.

use std::fmt;

use color_eyre::eyre::{
    self,
    WrapErr as _,
};
use comfy_table::{
    presets,
    Table,
};
use serde::Deserialize;
use tracing::{
    info,
    instrument,
};

use crate::{
    hub::{
        ChainQuery,
        ChainQueryConfig,
    },
    prompt::Prompter,
};

/// Fractional digits shown when formatting a balance in display units.
const DISPLAY_PRECISION: usize = 6;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Balance {
    pub(crate) denom: String,
    /// Base units. Bank amounts are arbitrary precision on chain; anything above
    /// `u128::MAX` (about 3.4e20 whole tokens at 18 decimals) is rejected when parsed.
    pub(crate) amount: u128,
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

#[derive(Debug, Deserialize)]
struct BalancesResponse {
    #[serde(default)]
    balances: Vec<Coin>,
}

#[derive(Debug, Deserialize)]
struct Coin {
    denom: String,
    amount: String,
}

/// Extracts the balance of `denom` from a bank balances query response.
///
/// A response without an entry for `denom` is a zero balance.
pub(crate) fn parse_balance_response(out: &[u8], denom: &str) -> eyre::Result<Balance> {
    let response: BalancesResponse =
        serde_json::from_slice(out).wrap_err("failed to parse the bank balances response")?;
    let amount = match response.balances.iter().find(|coin| coin.denom == denom) {
        Some(coin) => coin
            .amount
            .parse()
            .wrap_err_with(|| {
                format!(
                    "`{}` is not a valid {denom} amount, or exceeds {}",
                    coin.amount,
                    u128::MAX
                )
            })?,
        None => 0,
    };
    Ok(Balance {
        denom: denom.to_string(),
        amount,
    })
}

/// Formats a base-unit amount in whole tokens.
pub(crate) fn format_balance(amount: u128, decimals: u32) -> String {
    let digits = amount.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }
    let padded = format!("{digits:0>width$}", width = decimals + 1);
    let (whole, fraction) = padded.split_at(padded.len() - decimals);
    let fraction = fraction[..fraction.len().min(DISPLAY_PRECISION)].trim_end_matches('0');
    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{fraction}")
    }
}

/// `adym` -> `DYM`
pub(crate) fn display_denom(denom: &str) -> String {
    let mut chars = denom.chars();
    chars.next();
    chars.as_str().to_uppercase()
}

/// A minimum balance an address must hold before the workflow can continue.
#[derive(Clone, Debug)]
pub(crate) struct RequiredBalance {
    pub(crate) key_name: String,
    pub(crate) address: String,
    pub(crate) required: u128,
    pub(crate) decimals: u32,
    pub(crate) network: String,
    pub(crate) chain: ChainQueryConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct NotFundedAddress {
    pub(crate) key_name: String,
    pub(crate) address: String,
    pub(crate) current: u128,
    pub(crate) required: u128,
    pub(crate) denom: String,
    pub(crate) decimals: u32,
    pub(crate) network: String,
}

/// Pairs each requirement with its current balance and keeps the ones strictly below it.
pub(crate) fn shortfalls(required: &[RequiredBalance], current: &[u128]) -> Vec<NotFundedAddress> {
    required
        .iter()
        .zip(current)
        .filter(|(req, current)| **current < req.required)
        .map(|(req, current)| NotFundedAddress {
            key_name: req.key_name.clone(),
            address: req.address.clone(),
            current: *current,
            required: req.required,
            denom: req.chain.denom.clone(),
            decimals: req.decimals,
            network: req.network.clone(),
        })
        .collect()
}

#[instrument(skip_all, err)]
pub(crate) async fn insufficient_balances(
    chain: &dyn ChainQuery,
    required: &[RequiredBalance],
) -> eyre::Result<Vec<NotFundedAddress>> {
    let mut current = Vec::with_capacity(required.len());
    for req in required {
        let balance = chain
            .balance(&req.chain, &req.address)
            .await
            .wrap_err_with(|| format!("failed to query the balance of `{}`", req.address))?;
        current.push(balance.amount);
    }
    Ok(shortfalls(required, &current))
}

/// Renders the addresses that need funding as a table.
pub(crate) fn render(not_funded: &[NotFundedAddress]) -> String {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_header(vec!["Name", "Address", "Current", "Required", "Network"]);
    for address in not_funded {
        let unit = display_denom(&address.denom);
        table.add_row(vec![
            address.key_name.clone(),
            address.address.clone(),
            format!("{}{unit}", format_balance(address.current, address.decimals)),
            format!("{}{unit}", format_balance(address.required, address.decimals)),
            address.network.clone(),
        ]);
    }
    table.to_string()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Funding {
    /// Every address already held its required balance.
    Sufficient,
    /// The operator confirmed having funded the listed addresses.
    Attested,
    Declined,
}

impl Funding {
    pub(crate) fn is_declined(self) -> bool {
        self == Self::Declined
    }
}

/// Checks `required` and, if anything is short, asks the operator to fund it.
///
/// Balances are not queried again after the operator confirms.
pub(crate) async fn verify(
    chain: &dyn ChainQuery,
    prompt: &dyn Prompter,
    required: &[RequiredBalance],
) -> eyre::Result<Funding> {
    let not_funded = insufficient_balances(chain, required).await?;
    if not_funded.is_empty() {
        return Ok(Funding::Sufficient);
    }
    println!("\nPlease fund the addresses below.\n");
    println!("{}\n", render(&not_funded));
    let funded = prompt.confirm("press 'y' when the wallets are funded", false)?;
    if funded {
        Ok(Funding::Attested)
    } else {
        info!("operator declined to fund the listed addresses");
        Ok(Funding::Declined)
    }
}
