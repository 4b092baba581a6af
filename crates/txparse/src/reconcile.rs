//! Swap reconciliation: extraction strategies and record assembly.
//!
//! A decoder tries its strategies in a fixed order (fixed-offset,
//! balance-delta, event-log). Each produces a pair of legs or a
//! `StrategyError`; failures fall through silently and only the most specific
//! one is reported once every strategy is spent.

use log::debug;
use serde_json::Value;
use std::cmp::Reverse;

use crate::error::{DecodeError, ErrorKind, LayoutError};
use crate::layout;
use crate::resolver::{NATIVE_MINT, TokenResolver};
use crate::swap_record::{Action, SwapRecord, format_timestamp};
use crate::tx_facts::{BalanceDelta, RawInstruction, TxFacts};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    FixedOffset,
    BalanceDelta,
    EventLog,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StrategyError {
    /// Nothing for the strategy to work on (no matching instruction or event).
    #[error("not found: {0}")]
    NotFound(String),

    /// Input was found but the token legs could not be pinned down.
    #[error("unresolved: {0}")]
    Unresolved(String),

    #[error(transparent)]
    Layout(#[from] LayoutError),
}

impl StrategyError {
    fn specificity(&self) -> u8 {
        match self {
            Self::NotFound(_) => 0,
            Self::Unresolved(_) => 1,
            Self::Layout(_) => 2,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::InvalidInstruction,
            Self::Unresolved(_) => ErrorKind::InvalidTokenAccount,
            Self::Layout(_) => ErrorKind::ParseError,
        }
    }
}

/// Collapse the failures of every strategy into the single error reported
/// for the protocol.
pub fn exhausted(tag: &str, failures: Vec<StrategyError>) -> DecodeError {
    match failures.into_iter().max_by_key(|e| e.specificity()) {
        Some(e) => DecodeError::new(e.kind(), format!("{}: {}", tag, e)),
        None => DecodeError::new(
            ErrorKind::InvalidInstruction,
            format!("{}: no strategy applies", tag),
        ),
    }
}

/// One side of a swap. `decimals` is set when the transaction itself says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leg {
    pub mint: String,
    pub amount: u128,
    pub decimals: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapLegs {
    pub input: Leg,
    pub output: Leg,
    pub signers: Vec<String>,

    /// Protocol-supplied direction, overriding mint inference.
    pub action: Option<Action>,
}

/// Positions of the user accounts in a swap instruction's account list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountPositions {
    pub source: usize,
    pub destination: usize,
    pub owner: usize,
}

/// `u8 opcode | u64 amount_in | u64 min_amount_out` swap instruction.
#[derive(Debug, Clone, Copy)]
pub struct FixedSwapLayout {
    pub program_ids: &'static [&'static str],
    pub opcodes: &'static [u8],
    pub positions: AccountPositions,
}

pub const AMOUNT_IN_OFFSET: usize = 1;
pub const AMOUNT_OUT_OFFSET: usize = 9;

/// First instruction of one of `program_ids` whose opcode byte is in `opcodes`.
pub fn find_instruction<'a>(
    facts: &'a TxFacts,
    program_ids: &[&str],
    opcodes: &[u8],
) -> Result<&'a RawInstruction, StrategyError> {
    facts
        .instructions
        .iter()
        .filter(|ix| program_ids.contains(&ix.program_id.as_str()))
        .find(|ix| ix.data.first().is_some_and(|op| opcodes.contains(op)))
        .ok_or_else(|| {
            StrategyError::NotFound(format!("no instruction with opcode in {:?}", opcodes))
        })
}

pub async fn fixed_offset(
    facts: &TxFacts,
    resolver: &TokenResolver,
    swap: &FixedSwapLayout,
) -> Result<SwapLegs, StrategyError> {
    let ix = find_instruction(facts, swap.program_ids, swap.opcodes)?;
    decode_fixed(facts, resolver, ix, swap.positions).await
}

/// Read the amounts of a fixed-layout swap instruction and resolve its user
/// accounts to mints.
pub async fn decode_fixed(
    facts: &TxFacts,
    resolver: &TokenResolver,
    ix: &RawInstruction,
    positions: AccountPositions,
) -> Result<SwapLegs, StrategyError> {
    let amount_in = layout::u64_le(&ix.data, AMOUNT_IN_OFFSET)?;
    let amount_out = layout::u64_le(&ix.data, AMOUNT_OUT_OFFSET)?;

    if let Some(missing) = ix.accounts.iter().find(|a| !facts.is_static_key(a)) {
        return Err(StrategyError::Unresolved(format!(
            "instruction account {} not in static account keys",
            missing
        )));
    }

    let account = |pos: usize| {
        ix.accounts.get(pos).ok_or_else(|| {
            StrategyError::Unresolved(format!(
                "account position {} out of {} accounts",
                pos,
                ix.accounts.len()
            ))
        })
    };
    let source = account(positions.source)?;
    let destination = account(positions.destination)?;
    let owner = account(positions.owner)?;

    let (source_mint, destination_mint) = tokio::join!(
        account_mint(facts, resolver, source, true),
        account_mint(facts, resolver, destination, false),
    );
    let (Some((in_mint, in_decimals)), Some((out_mint, out_decimals))) =
        (source_mint, destination_mint)
    else {
        return Err(StrategyError::Unresolved(format!(
            "mint unknown for {} or {}",
            source, destination
        )));
    };

    Ok(SwapLegs {
        input: Leg {
            mint: in_mint,
            amount: amount_in as u128,
            decimals: in_decimals,
        },
        output: Leg {
            mint: out_mint,
            amount: amount_out as u128,
            decimals: out_decimals,
        },
        signers: vec![owner.clone()],
        action: None,
    })
}

/// Mint of a user token account: the pre snapshot for a source, the post
/// snapshot for a destination, else the account's own data.
async fn account_mint(
    facts: &TxFacts,
    resolver: &TokenResolver,
    address: &str,
    is_source: bool,
) -> Option<(String, Option<u8>)> {
    let snapshot = if is_source {
        facts.pre_balance_of(address)
    } else {
        facts.post_balance_of(address)
    };
    if let Some(b) = snapshot {
        return Some((b.mint.clone(), b.decimals));
    }
    resolver
        .token_account_mint(address)
        .await
        .map(|mint| (mint, None))
}

/// Pick the input and output legs out of a set of balance deltas.
///
/// Input is the most negative delta; output is the largest positive delta of
/// a different mint, widened to any positive delta when none exists.
pub fn select_balance_legs(deltas: &[BalanceDelta]) -> Result<(Leg, Leg), StrategyError> {
    let mut sorted: Vec<&BalanceDelta> = deltas.iter().collect();
    sorted.sort_by_key(|d| (Reverse(d.abs_change), d.account_index));

    let input = sorted
        .iter()
        .find(|d| d.change < 0)
        .ok_or_else(|| StrategyError::Unresolved("no negative balance delta".into()))?;

    let output = match sorted.iter().find(|d| d.change > 0 && d.mint != input.mint) {
        Some(d) => d,
        None => {
            let d = sorted
                .iter()
                .find(|d| d.change > 0)
                .ok_or_else(|| StrategyError::Unresolved("no positive balance delta".into()))?;
            debug!(
                "widened: output leg account {} shares mint {} with input",
                d.account_index, d.mint
            );
            d
        }
    };

    let leg = |d: &BalanceDelta| Leg {
        mint: d.mint.clone(),
        amount: d.abs_change,
        decimals: d.decimals,
    };
    Ok((leg(*input), leg(*output)))
}

pub fn balance_delta(facts: &TxFacts) -> Result<SwapLegs, StrategyError> {
    let (input, output) = select_balance_legs(&facts.token_balance_deltas)?;

    let signers = if facts.signers.is_empty() {
        facts.fee_payer().map(|p| vec![p.to_string()]).unwrap_or_default()
    } else {
        facts.signers.clone()
    };

    Ok(SwapLegs {
        input,
        output,
        signers,
        action: None,
    })
}

/// Explicit direction wins; otherwise spending the native mint is a buy and
/// receiving it is a sell.
pub fn infer_action(explicit: Option<Action>, in_mint: &str, out_mint: &str) -> Option<Action> {
    explicit.or(if in_mint == NATIVE_MINT {
        Some(Action::Buy)
    } else if out_mint == NATIVE_MINT {
        Some(Action::Sell)
    } else {
        None
    })
}

/// Resolve both legs' decimals concurrently and build the output record.
pub async fn assemble(
    facts: &TxFacts,
    legs: SwapLegs,
    amms: Vec<String>,
    resolver: &TokenResolver,
    raw: Option<Value>,
) -> SwapRecord {
    let embedded_in = legs
        .input
        .decimals
        .or_else(|| facts.embedded_decimals(&legs.input.mint));
    let embedded_out = legs
        .output
        .decimals
        .or_else(|| facts.embedded_decimals(&legs.output.mint));

    let (token_in, token_out) = tokio::join!(
        resolver.resolve(&legs.input.mint, embedded_in),
        resolver.resolve(&legs.output.mint, embedded_out),
    );

    SwapRecord {
        signers: legs.signers,
        signatures: facts.signatures.clone(),
        amms,
        timestamp: format_timestamp(facts.block_time),
        action: infer_action(legs.action, &token_in.address, &token_out.address),
        token_in_mint: token_in.address,
        token_in_amount: legs.input.amount.to_string(),
        token_in_decimals: token_in.decimals,
        token_out_mint: token_out.address,
        token_out_amount: legs.output.amount.to_string(),
        token_out_decimals: token_out.decimals,
        raw,
    }
}
