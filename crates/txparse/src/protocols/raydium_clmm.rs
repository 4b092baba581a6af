//! Raydium concentrated liquidity.
//!
//! Swap data: `u8 opcode | u64 amount_in | u64 min_amount_out | u128 sqrt_price_limit`.

use log::debug;

use crate::layout;
use crate::reconcile::{self, AccountPositions, StrategyError, SwapLegs};
use crate::resolver::TokenResolver;
use crate::tx_facts::TxFacts;

pub const PROGRAM_IDS: &[&str] = &["9rpQHSyFVM1dkkHFQ2TtTzPEW7DVmEyPmN8wVniqJtuC"];

const SWAP_OPCODE: u8 = 1;
const SQRT_PRICE_LIMIT_OFFSET: usize = 17;

const POSITIONS: AccountPositions = AccountPositions {
    source: 3,
    destination: 4,
    owner: 8,
};

pub async fn fixed_offset(
    facts: &TxFacts,
    resolver: &TokenResolver,
) -> Result<SwapLegs, StrategyError> {
    let ix = reconcile::find_instruction(facts, PROGRAM_IDS, &[SWAP_OPCODE])?;
    let sqrt_price_limit = layout::u128_le(&ix.data, SQRT_PRICE_LIMIT_OFFSET)?;
    debug!("clmm swap sqrt_price_limit={}", sqrt_price_limit);

    reconcile::decode_fixed(facts, resolver, ix, POSITIONS).await
}
