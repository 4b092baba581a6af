use crate::reconcile::{AccountPositions, FixedSwapLayout};

pub const PROGRAM_IDS: &[&str] = &["MoonCVVNZFSYkqNXP6bxHLPL6QQJiMagDL3qcqUQTrG"];

pub const SWAP: FixedSwapLayout = FixedSwapLayout {
    program_ids: PROGRAM_IDS,
    opcodes: &[1],
    positions: AccountPositions {
        owner: 0,
        source: 1,
        destination: 2,
    },
};
