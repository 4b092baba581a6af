//! Orca (Whirlpool, token-swap v1/v2).

use crate::reconcile::{AccountPositions, FixedSwapLayout};

pub const PROGRAM_IDS: &[&str] = &[
    "whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc",
    "8i97DHS9KPnG311fSY9yin4cyk9ZzkBjLXobyEFvtfKY",
    "4ngnN8dA9sAf1sbz3m6qwquxbHkyzgXVpeTYcxKPtZuf",
];

pub const SWAP: FixedSwapLayout = FixedSwapLayout {
    program_ids: PROGRAM_IDS,
    opcodes: &[1],
    positions: AccountPositions {
        owner: 0,
        source: 2,
        destination: 3,
    },
};
