//! Protocol decoder registry.
//!
//! A closed, ordered set of decoders. Lookup returns the first decoder, in
//! priority order, that recognizes any instruction of the transaction, so an
//! aggregator wins over the pools it routes through.

pub mod jupiter;
pub mod meteora;
pub mod moonshot;
pub mod orca;
pub mod pumpfun;
pub mod raydium;
pub mod raydium_clmm;

use log::debug;

use crate::error::DecodeError;
use crate::reconcile::{self, Strategy, StrategyError, SwapLegs};
use crate::resolver::TokenResolver;
use crate::tx_facts::{RawInstruction, TxFacts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decoder {
    Jupiter,
    Raydium,
    RaydiumClmm,
    Orca,
    Meteora,
    PumpFun,
    Moonshot,
}

impl Decoder {
    /// Registry in priority order.
    pub const ALL: [Decoder; 7] = [
        Decoder::Jupiter,
        Decoder::Raydium,
        Decoder::RaydiumClmm,
        Decoder::Orca,
        Decoder::Meteora,
        Decoder::PumpFun,
        Decoder::Moonshot,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            Decoder::Jupiter => "JUPITER",
            Decoder::Raydium => "RAYDIUM",
            Decoder::RaydiumClmm => "RAYDIUM_CL",
            Decoder::Orca => "ORCA",
            Decoder::Meteora => "METEORA",
            Decoder::PumpFun => "PUMPFUN",
            Decoder::Moonshot => "MOONSHOT",
        }
    }

    pub fn program_ids(self) -> &'static [&'static str] {
        match self {
            Decoder::Jupiter => jupiter::PROGRAM_IDS,
            Decoder::Raydium => raydium::PROGRAM_IDS,
            Decoder::RaydiumClmm => raydium_clmm::PROGRAM_IDS,
            Decoder::Orca => orca::PROGRAM_IDS,
            Decoder::Meteora => meteora::PROGRAM_IDS,
            Decoder::PumpFun => pumpfun::PROGRAM_IDS,
            Decoder::Moonshot => moonshot::PROGRAM_IDS,
        }
    }

    pub fn recognizes(self, program_id: &str) -> bool {
        self.program_ids().contains(&program_id)
    }

    /// Strategies, always in fixed-offset, balance-delta, event-log order.
    pub fn strategies(self) -> &'static [Strategy] {
        use Strategy::*;
        match self {
            Decoder::Jupiter => &[BalanceDelta, EventLog],
            Decoder::Raydium => &[FixedOffset, BalanceDelta, EventLog],
            Decoder::RaydiumClmm => &[FixedOffset, BalanceDelta],
            Decoder::Orca => &[FixedOffset, BalanceDelta],
            Decoder::Meteora => &[FixedOffset, BalanceDelta],
            Decoder::PumpFun => &[FixedOffset, EventLog],
            Decoder::Moonshot => &[FixedOffset, BalanceDelta],
        }
    }

    pub fn for_program(program_id: &str) -> Option<Decoder> {
        Self::ALL.into_iter().find(|d| d.recognizes(program_id))
    }

    /// Run the strategies in order; the first success wins.
    pub async fn decode(
        self,
        facts: &TxFacts,
        resolver: &TokenResolver,
    ) -> Result<SwapLegs, DecodeError> {
        let mut failures = Vec::new();

        for &strategy in self.strategies() {
            if strategy == Strategy::FixedOffset && !facts.is_success {
                debug!("{} skipping {:?}: transaction failed", self.tag(), strategy);
                failures.push(StrategyError::Unresolved(
                    "transaction failed, instruction amounts never executed".into(),
                ));
                continue;
            }
            match self.apply(strategy, facts, resolver).await {
                Ok(legs) => {
                    debug!("{} decoded by {:?}", self.tag(), strategy);
                    return Ok(legs);
                }
                Err(e) => {
                    debug!("{} {:?} fell through: {}", self.tag(), strategy, e);
                    failures.push(e);
                }
            }
        }

        Err(reconcile::exhausted(self.tag(), failures))
    }

    async fn apply(
        self,
        strategy: Strategy,
        facts: &TxFacts,
        resolver: &TokenResolver,
    ) -> Result<SwapLegs, StrategyError> {
        match (self, strategy) {
            (_, Strategy::BalanceDelta) => reconcile::balance_delta(facts),
            (Decoder::Jupiter, Strategy::EventLog) => jupiter::decode_swap_events(facts),
            (Decoder::Raydium, Strategy::FixedOffset) => raydium::fixed_offset(facts, resolver).await,
            (Decoder::Raydium, Strategy::EventLog) => raydium::decode_ray_log(facts, resolver).await,
            (Decoder::RaydiumClmm, Strategy::FixedOffset) => {
                raydium_clmm::fixed_offset(facts, resolver).await
            }
            (Decoder::Orca, Strategy::FixedOffset) => {
                reconcile::fixed_offset(facts, resolver, &orca::SWAP).await
            }
            (Decoder::Meteora, Strategy::FixedOffset) => {
                reconcile::fixed_offset(facts, resolver, &meteora::SWAP).await
            }
            (Decoder::PumpFun, Strategy::FixedOffset) => {
                reconcile::fixed_offset(facts, resolver, &pumpfun::SWAP).await
            }
            (Decoder::PumpFun, Strategy::EventLog) => pumpfun::decode_trade_event(facts),
            (Decoder::Moonshot, Strategy::FixedOffset) => {
                reconcile::fixed_offset(facts, resolver, &moonshot::SWAP).await
            }
            (d, s) => Err(StrategyError::NotFound(format!(
                "{} has no {:?} decoder",
                d.tag(),
                s
            ))),
        }
    }
}

/// First decoder in priority order recognizing any instruction.
pub fn select_decoder(instructions: &[RawInstruction]) -> Option<Decoder> {
    Decoder::ALL.into_iter().find(|d| {
        instructions
            .iter()
            .any(|ix| d.recognizes(&ix.program_id))
    })
}

/// Distinct protocol tags of all recognized instructions, in order of first
/// appearance.
pub fn recognized_amms(instructions: &[RawInstruction]) -> Vec<String> {
    let mut amms: Vec<String> = Vec::new();
    for ix in instructions {
        if let Some(d) = Decoder::for_program(&ix.program_id) {
            if !amms.iter().any(|a| a == d.tag()) {
                amms.push(d.tag().to_string());
            }
        }
    }
    amms
}
