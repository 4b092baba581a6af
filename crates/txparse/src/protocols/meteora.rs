//! Meteora DLMM and dynamic pools.

use crate::reconcile::{AccountPositions, FixedSwapLayout};

pub const PROGRAM_IDS: &[&str] = &[
    "M2mx93ekt1fmXSVkTrUL9xVFHkmME8HTUi5Cyc5aF7K",
    "HzwtjANeVzJPpnXTYt9MYMjVmkhTMfUyS8pJWqSRWLNr",
];

pub const SWAP: FixedSwapLayout = FixedSwapLayout {
    program_ids: PROGRAM_IDS,
    opcodes: &[2],
    positions: AccountPositions {
        owner: 0,
        source: 2,
        destination: 3,
    },
};
