//! Raydium AMM v4, route and CPMM programs.
//!
//! AMM v4 writes a base64 `ray_log` for every pool action. Swap logs carry
//! the executed amounts and a direction; the mints come from the pool
//! account, which is fetched once and cached.

use log::debug;

use crate::error::LayoutError;
use crate::layout::{self, LayoutReader};
use crate::logs::{self, RAY_LOG};
use crate::reconcile::{self, AccountPositions, Leg, StrategyError, SwapLegs};
use crate::resolver::{PoolMetadata, TokenResolver};
use crate::tx_facts::{RawInstruction, TxFacts};

pub const AMM_V4: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";
pub const ROUTE: &str = "routeUGWgWzqBWFcrCfv8tritsqukccJPu3q5GPP3xS";
pub const CPMM: &str = "CPMMoo8L3F4NbTegBCKVNunggL7H1ZpdTHKxQB5qKP1C";

pub const PROGRAM_IDS: &[&str] = &[AMM_V4, ROUTE, CPMM];

const SWAP_BASE_IN: u8 = 9;
const SWAP_BASE_OUT: u8 = 11;

const SWAP_BASE_IN_LOG: u8 = 3;
const SWAP_BASE_OUT_LOG: u8 = 4;

/// `SwapDirection::PC2Coin`: quote in, base out.
const DIRECTION_QUOTE_TO_BASE: u64 = 1;
/// `SwapDirection::Coin2PC`: base in, quote out.
const DIRECTION_BASE_TO_QUOTE: u64 = 2;

const POOL_ACCOUNT: usize = 1;

const BASE_DECIMAL_OFFSET: usize = 32;
const QUOTE_DECIMAL_OFFSET: usize = 40;
const BASE_MINT_OFFSET: usize = 400;
const QUOTE_MINT_OFFSET: usize = 432;

/// User accounts of an AMM v4 swap; without the optional open-orders
/// account (17 accounts) every position shifts down by one.
fn v4_positions(account_count: usize) -> AccountPositions {
    if account_count == 17 {
        AccountPositions {
            source: 14,
            destination: 15,
            owner: 16,
        }
    } else {
        AccountPositions {
            source: 15,
            destination: 16,
            owner: 17,
        }
    }
}

const ROUTE_POSITIONS: AccountPositions = AccountPositions {
    source: 3,
    destination: 4,
    owner: 8,
};

fn fixed_swap_positions(ix: &RawInstruction) -> Option<AccountPositions> {
    let opcode = *ix.data.first()?;
    match ix.program_id.as_str() {
        AMM_V4 if opcode == SWAP_BASE_IN || opcode == SWAP_BASE_OUT => {
            Some(v4_positions(ix.accounts.len()))
        }
        ROUTE if opcode == SWAP_BASE_IN => Some(ROUTE_POSITIONS),
        _ => None,
    }
}

pub async fn fixed_offset(
    facts: &TxFacts,
    resolver: &TokenResolver,
) -> Result<SwapLegs, StrategyError> {
    let (ix, positions) = facts
        .instructions
        .iter()
        .find_map(|ix| fixed_swap_positions(ix).map(|p| (ix, p)))
        .ok_or_else(|| StrategyError::NotFound("no raydium swap instruction".into()))?;

    reconcile::decode_fixed(facts, resolver, ix, positions).await
}

/// Decoded swap `ray_log`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaySwapLog {
    pub log_type: u8,
    pub amount_in: u64,
    pub amount_out: u64,
    pub direction: u64,
    pub pool_coin: u64,
    pub pool_pc: u64,
}

/// Decode a `ray_log` payload; `None` for non-swap logs and undecodable
/// base64.
pub fn parse_ray_log(payload: &str) -> Option<Result<RaySwapLog, LayoutError>> {
    use base64::Engine;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .ok()?;

    let mut r = LayoutReader::new(&bytes);
    let log_type = r.u8().ok()?;
    if log_type != SWAP_BASE_IN_LOG && log_type != SWAP_BASE_OUT_LOG {
        return None;
    }
    Some(read_swap_log(log_type, &mut r))
}

fn read_swap_log(log_type: u8, r: &mut LayoutReader<'_>) -> Result<RaySwapLog, LayoutError> {
    // base-in:  amount_in, minimum_out, direction, user_source, coin, pc, out_amount
    // base-out: max_in, amount_out, direction, user_source, coin, pc, deduct_in
    let first = r.u64()?;
    let second = r.u64()?;
    let direction = r.u64()?;
    let _user_source = r.u64()?;
    let pool_coin = r.u64()?;
    let pool_pc = r.u64()?;
    let last = r.u64()?;

    let (amount_in, amount_out) = if log_type == SWAP_BASE_IN_LOG {
        (first, last)
    } else {
        (last, second)
    };

    Ok(RaySwapLog {
        log_type,
        amount_in,
        amount_out,
        direction,
        pool_coin,
        pool_pc,
    })
}

/// Decimals are stored as u64 in the pool account.
fn decimals_at(data: &[u8], offset: usize) -> Result<u8, LayoutError> {
    let value = layout::u64_le(data, offset)?;
    u8::try_from(value).map_err(|_| LayoutError::OutOfRange { offset, value })
}

/// AMM v4 pool account: decimals and mints at fixed offsets.
pub fn parse_pool(data: &[u8]) -> Result<PoolMetadata, LayoutError> {
    Ok(PoolMetadata {
        base_decimals: decimals_at(data, BASE_DECIMAL_OFFSET)?,
        quote_decimals: decimals_at(data, QUOTE_DECIMAL_OFFSET)?,
        base_mint: layout::pubkey(data, BASE_MINT_OFFSET)?,
        quote_mint: layout::pubkey(data, QUOTE_MINT_OFFSET)?,
    })
}

/// Event-log strategy: `ray_log` lines pair positionally with AMM v4
/// instructions in flattened order; the first swap log wins.
pub async fn decode_ray_log(
    facts: &TxFacts,
    resolver: &TokenResolver,
) -> Result<SwapLegs, StrategyError> {
    let payloads = logs::scan_program_logs(&facts.logs, AMM_V4, RAY_LOG);
    let instructions: Vec<&RawInstruction> = facts
        .instructions
        .iter()
        .filter(|ix| ix.program_id == AMM_V4)
        .collect();

    let (swap, ix) = payloads
        .iter()
        .zip(instructions)
        .find_map(|(payload, ix)| parse_ray_log(payload).map(|log| (log, ix)))
        .ok_or_else(|| StrategyError::NotFound("no raydium swap ray_log".into()))?;
    let swap = swap?;

    let pool = ix
        .accounts
        .get(POOL_ACCOUNT)
        .ok_or_else(|| StrategyError::Unresolved("ray_log instruction has no pool account".into()))?;
    let meta = resolver
        .pool_metadata(pool, parse_pool)
        .await
        .ok_or_else(|| StrategyError::Unresolved(format!("pool {} metadata unavailable", pool)))?;

    let base = |amount: u64| Leg {
        mint: meta.base_mint.clone(),
        amount: amount as u128,
        decimals: Some(meta.base_decimals),
    };
    let quote = |amount: u64| Leg {
        mint: meta.quote_mint.clone(),
        amount: amount as u128,
        decimals: Some(meta.quote_decimals),
    };

    let (input, output) = match swap.direction {
        DIRECTION_BASE_TO_QUOTE => (base(swap.amount_in), quote(swap.amount_out)),
        DIRECTION_QUOTE_TO_BASE => (quote(swap.amount_in), base(swap.amount_out)),
        other => {
            return Err(StrategyError::Unresolved(format!(
                "unknown ray_log direction {}",
                other
            )));
        }
    };
    debug!(
        "ray_log swap pool={} reserves coin={} pc={}",
        pool, swap.pool_coin, swap.pool_pc
    );

    let signers = ix
        .accounts
        .last()
        .map(String::as_str)
        .or(facts.fee_payer())
        .map(|s| vec![s.to_string()])
        .unwrap_or_default();

    Ok(SwapLegs {
        input,
        output,
        signers,
        action: None,
    })
}
