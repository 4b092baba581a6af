//! Jupiter aggregator.
//!
//! Jupiter routes through other AMMs, so its own instruction data says little
//! about what was actually exchanged. Balance deltas come first; the
//! `SwapEvent`s it emits per hop are the fallback. Events show up either as
//! `Program data:` log lines or as Anchor self-CPI instructions whose data is
//! prefixed by the event-CPI tag.

use crate::error::LayoutError;
use crate::layout::LayoutReader;
use crate::logs;
use crate::reconcile::{Leg, StrategyError, SwapLegs};
use crate::tx_facts::TxFacts;

pub const PROGRAM_ID: &str = "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4";
pub const PROGRAM_IDS: &[&str] = &[PROGRAM_ID];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapEvent {
    pub amm: String,
    pub input_mint: String,
    pub input_amount: u64,
    pub output_mint: String,
    pub output_amount: u64,
}

impl SwapEvent {
    fn decode(body: &[u8]) -> Result<Self, LayoutError> {
        let mut r = LayoutReader::new(body);
        Ok(Self {
            amm: r.pubkey()?,
            input_mint: r.pubkey()?,
            input_amount: r.u64()?,
            output_mint: r.pubkey()?,
            output_amount: r.u64()?,
        })
    }
}

fn decode_body(disc: [u8; 8], body: &[u8]) -> Option<Result<SwapEvent, LayoutError>> {
    (disc == logs::event_discriminator("event:SwapEvent")).then(|| SwapEvent::decode(body))
}

/// Hop events in execution order, from self-CPI instructions when present,
/// else from the program's log lines.
pub fn swap_events(facts: &TxFacts) -> Vec<Result<SwapEvent, LayoutError>> {
    logs::program_events(facts, PROGRAM_ID)
        .into_iter()
        .filter_map(|(disc, body)| decode_body(disc, &body))
        .collect()
}

/// A multi-hop route spends the first hop's input and receives the last
/// hop's output.
pub fn decode_swap_events(facts: &TxFacts) -> Result<SwapLegs, StrategyError> {
    let events = swap_events(facts)
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

    let (Some(first), Some(last)) = (events.first(), events.last()) else {
        return Err(StrategyError::NotFound("no jupiter SwapEvent".into()));
    };

    Ok(SwapLegs {
        input: Leg {
            mint: first.input_mint.clone(),
            amount: first.input_amount as u128,
            decimals: None,
        },
        output: Leg {
            mint: last.output_mint.clone(),
            amount: last.output_amount as u128,
            decimals: None,
        },
        signers: facts.fee_payer().map(|p| vec![p.to_string()]).unwrap_or_default(),
        action: None,
    })
}
