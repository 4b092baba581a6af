//! Pump.fun bonding curve.
//!
//! Trades are read from the Anchor `TradeEvent` the program emits; the
//! instruction itself only carries limits.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::LayoutError;
use crate::layout::LayoutReader;
use crate::logs;
use crate::reconcile::{AccountPositions, FixedSwapLayout, Leg, StrategyError, SwapLegs};
use crate::resolver::NATIVE_MINT;
use crate::swap_record::Action;
use crate::tx_facts::TxFacts;

pub const PROGRAM_ID: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";
pub const PROGRAM_IDS: &[&str] = &[PROGRAM_ID];

pub const SWAP: FixedSwapLayout = FixedSwapLayout {
    program_ids: PROGRAM_IDS,
    opcodes: &[1],
    positions: AccountPositions {
        owner: 0,
        source: 1,
        destination: 2,
    },
};

const NATIVE_DECIMALS: u8 = 9;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEvent {
    pub name: String,
    pub symbol: String,
    pub uri: String,
    pub mint: String,
    pub bonding_curve: String,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub mint: String,
    pub sol_amount: u64,
    pub token_amount: u64,
    pub is_buy: bool,
    pub user: String,
    pub timestamp: u64,
    pub virtual_sol_reserves: u64,
    pub virtual_token_reserves: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteEvent {
    pub user: String,
    pub mint: String,
    pub bonding_curve: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpFunEvent {
    Create(CreateEvent),
    Trade(TradeEvent),
    Complete(CompleteEvent),
    Unknown,
}

impl CreateEvent {
    fn decode(body: &[u8]) -> Result<Self, LayoutError> {
        let mut r = LayoutReader::new(body);
        Ok(Self {
            name: r.fixed_string(20)?,
            symbol: r.fixed_string(9)?,
            uri: r.fixed_string(71)?,
            mint: r.pubkey()?,
            bonding_curve: r.pubkey()?,
            user: r.pubkey()?,
        })
    }
}

impl TradeEvent {
    fn decode(body: &[u8]) -> Result<Self, LayoutError> {
        let mut r = LayoutReader::new(body);
        Ok(Self {
            mint: r.pubkey()?,
            sol_amount: r.u64()?,
            token_amount: r.u64()?,
            is_buy: r.boolean()?,
            user: r.pubkey()?,
            timestamp: r.u64()?,
            virtual_sol_reserves: r.u64()?,
            virtual_token_reserves: r.u64()?,
        })
    }
}

impl CompleteEvent {
    fn decode(body: &[u8]) -> Result<Self, LayoutError> {
        let mut r = LayoutReader::new(body);
        Ok(Self {
            user: r.pubkey()?,
            mint: r.pubkey()?,
            bonding_curve: r.pubkey()?,
            timestamp: r.u64()?,
        })
    }
}

/// Decode one base64 `Program data:` payload.
pub fn decode_event(payload: &str) -> Result<PumpFunEvent, LayoutError> {
    match logs::split_event(payload) {
        Some((disc, body)) => decode_event_body(disc, &body),
        None => Ok(PumpFunEvent::Unknown),
    }
}

/// Decode an event body by its discriminator.
pub fn decode_event_body(disc: [u8; 8], body: &[u8]) -> Result<PumpFunEvent, LayoutError> {
    if disc == logs::event_discriminator("event:TradeEvent") {
        TradeEvent::decode(body).map(PumpFunEvent::Trade)
    } else if disc == logs::event_discriminator("event:CreateEvent") {
        CreateEvent::decode(body).map(PumpFunEvent::Create)
    } else if disc == logs::event_discriminator("event:CompleteEvent") {
        CompleteEvent::decode(body).map(PumpFunEvent::Complete)
    } else {
        Ok(PumpFunEvent::Unknown)
    }
}

/// Every event the program emitted, from self-CPI instructions when present,
/// else from its log lines.
pub fn events(facts: &TxFacts) -> Vec<Result<PumpFunEvent, LayoutError>> {
    logs::program_events(facts, PROGRAM_ID)
        .into_iter()
        .map(|(disc, body)| decode_event_body(disc, &body))
        .collect()
}

/// Legs of the first `TradeEvent`. Buys spend SOL for the token, sells the
/// reverse; the trader signs.
pub fn decode_trade_event(facts: &TxFacts) -> Result<SwapLegs, StrategyError> {
    let mut layout_failure = None;

    for event in events(facts) {
        match event {
            Ok(PumpFunEvent::Trade(trade)) => return Ok(trade_legs(trade)),
            Ok(PumpFunEvent::Create(c)) => debug!("pumpfun create {} ({})", c.mint, c.symbol),
            Ok(PumpFunEvent::Complete(c)) => debug!("pumpfun curve complete {}", c.mint),
            Ok(PumpFunEvent::Unknown) => {}
            Err(e) => {
                debug!("pumpfun event undecodable: {}", e);
                layout_failure.get_or_insert(e);
            }
        }
    }

    match layout_failure {
        Some(e) => Err(StrategyError::Layout(e)),
        None => Err(StrategyError::NotFound("no pumpfun TradeEvent".into())),
    }
}

fn trade_legs(trade: TradeEvent) -> SwapLegs {
    let sol = Leg {
        mint: NATIVE_MINT.to_string(),
        amount: trade.sol_amount as u128,
        decimals: Some(NATIVE_DECIMALS),
    };
    let token = Leg {
        mint: trade.mint,
        amount: trade.token_amount as u128,
        decimals: None,
    };

    let (input, output, action) = if trade.is_buy {
        (sol, token, Action::Buy)
    } else {
        (token, sol, Action::Sell)
    };

    SwapLegs {
        input,
        output,
        signers: vec![trade.user],
        action: Some(action),
    }
}
