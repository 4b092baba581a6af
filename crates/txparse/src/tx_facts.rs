//! TxFacts: normalized view of a fetched transaction record.
//!
//! Everything a decoder needs is extracted from the RPC JSON once: the
//! account-key lists, the flattened instruction stream (top-level and CPI),
//! token balance snapshots and their deltas, and the log lines. Decoders work
//! against this struct and never touch the raw JSON.

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::alt_resolver::{resolve_full_account_keys, signer_keys, static_account_keys};

/// One executed instruction with its accounts resolved to addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawInstruction {
    pub program_id: String,

    /// Account addresses in instruction order.
    pub accounts: Vec<String>,

    /// Decoded instruction data; empty for fully parsed instructions.
    pub data: Vec<u8>,

    /// Index of the top-level instruction that issued this one (CPI only).
    pub outer_ix_index: Option<usize>,
}

/// Nested instructions issued while executing top-level instruction `index`.
#[derive(Debug, Clone)]
pub struct InnerGroup {
    pub index: usize,
    pub instructions: Vec<RawInstruction>,
}

/// Token balance of one account, before or after execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBalance {
    pub account_index: u32,
    pub mint: String,
    pub owner: Option<String>,

    /// Amount in base units (string for precision)
    pub amount: String,

    pub decimals: Option<u8>,
}

/// Change of one token account between the pre and post snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceDelta {
    pub account_index: u32,
    pub mint: String,
    pub owner: Option<String>,
    pub change: i128,
    pub abs_change: u128,
    pub decimals: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct TxFacts {
    pub signature: String,
    pub slot: u64,

    /// Block timestamp (Unix seconds)
    pub block_time: Option<i64>,

    /// `meta.err` is null or absent. Instruction data of a failed
    /// transaction describes a swap that never executed.
    pub is_success: bool,

    /// All transaction signatures, fee payer's first.
    pub signatures: Vec<String>,

    /// Signer-flagged account keys.
    pub signers: Vec<String>,

    /// Full account keys (accountKeys + loadedAddresses for v0)
    pub full_account_keys: Vec<String>,

    /// Number of static account keys (before loadedAddresses)
    pub static_account_keys_len: usize,

    /// Top-level instructions with their CPI groups spliced in.
    pub instructions: Vec<RawInstruction>,

    pub pre_token_balances: Vec<TokenBalance>,
    pub post_token_balances: Vec<TokenBalance>,
    pub token_balance_deltas: Vec<BalanceDelta>,

    pub logs: Vec<String>,
}

impl TxFacts {
    /// Extract all facts from a `getTransaction` result.
    pub fn from_json(tx: &Value, signature: &str) -> Self {
        let full_account_keys = resolve_full_account_keys(tx);
        let static_account_keys_len = static_account_keys(tx).len();

        let top_level = tx
            .pointer("/transaction/message/instructions")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|ix| parse_instruction(ix, &full_account_keys, None))
                    .collect()
            })
            .unwrap_or_default();

        let inner = parse_inner_groups(tx, &full_account_keys);
        let instructions = flatten_instructions(top_level, inner);

        let pre_token_balances = parse_token_balances(tx, "/meta/preTokenBalances");
        let post_token_balances = parse_token_balances(tx, "/meta/postTokenBalances");
        let token_balance_deltas = compute_token_deltas(&pre_token_balances, &post_token_balances);

        let signatures = tx
            .pointer("/transaction/signatures")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        let logs = tx
            .pointer("/meta/logMessages")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            signature: signature.to_string(),
            slot: tx.get("slot").and_then(|v| v.as_u64()).unwrap_or(0),
            block_time: tx.get("blockTime").and_then(|v| v.as_i64()),
            is_success: tx.pointer("/meta/err").map_or(true, Value::is_null),
            signatures,
            signers: signer_keys(tx),
            full_account_keys,
            static_account_keys_len,
            instructions,
            pre_token_balances,
            post_token_balances,
            token_balance_deltas,
            logs,
        }
    }

    /// Get the fee payer (first account key)
    pub fn fee_payer(&self) -> Option<&str> {
        self.full_account_keys.first().map(|s| s.as_str())
    }

    /// Whether `address` appears among the static (non lookup-table) keys.
    pub fn is_static_key(&self, address: &str) -> bool {
        self.full_account_keys[..self.static_account_keys_len.min(self.full_account_keys.len())]
            .iter()
            .any(|k| k == address)
    }

    fn account_index(&self, address: &str) -> Option<u32> {
        self.full_account_keys
            .iter()
            .position(|k| k == address)
            .and_then(|i| u32::try_from(i).ok())
    }

    /// Pre-execution snapshot of the token account at `address`.
    pub fn pre_balance_of(&self, address: &str) -> Option<&TokenBalance> {
        let idx = self.account_index(address)?;
        self.pre_token_balances.iter().find(|b| b.account_index == idx)
    }

    /// Post-execution snapshot of the token account at `address`.
    pub fn post_balance_of(&self, address: &str) -> Option<&TokenBalance> {
        let idx = self.account_index(address)?;
        self.post_token_balances.iter().find(|b| b.account_index == idx)
    }

    /// Decimals for `mint` carried by the transaction's own snapshots.
    pub fn embedded_decimals(&self, mint: &str) -> Option<u8> {
        self.pre_token_balances
            .iter()
            .chain(self.post_token_balances.iter())
            .filter(|b| b.mint == mint)
            .find_map(|b| b.decimals)
    }
}

/// Splice nested groups into the top-level list: the group issued by
/// instruction `i` follows it directly. Groups pointing past the last
/// top-level instruction are appended.
pub fn flatten_instructions(
    top_level: Vec<RawInstruction>,
    mut inner: Vec<InnerGroup>,
) -> Vec<RawInstruction> {
    if inner.is_empty() {
        return top_level;
    }

    inner.sort_by_key(|g| g.index);
    let top_len = top_level.len();
    let mut groups = inner.into_iter().peekable();
    let mut out = Vec::with_capacity(top_len);

    for (i, ix) in top_level.into_iter().enumerate() {
        out.push(ix);
        while let Some(group) = groups.next_if(|g| g.index <= i) {
            out.extend(group.instructions);
        }
    }

    for group in groups {
        debug!("inner group index {} past {} top-level instructions", group.index, top_len);
        out.extend(group.instructions);
    }

    out
}

fn parse_instruction(
    ix: &Value,
    account_keys: &[String],
    outer_ix_index: Option<usize>,
) -> Option<RawInstruction> {
    let program_id = if let Some(pid) = ix.get("programId").and_then(|v| v.as_str()) {
        pid.to_string()
    } else {
        let idx = ix.get("programIdIndex").and_then(|v| v.as_u64())?;
        account_keys.get(idx as usize)?.clone()
    };

    // jsonParsed lists addresses; json lists indices into the full key list.
    let accounts = ix
        .get("accounts")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|a| match a.as_str() {
                    Some(s) => Some(s.to_string()),
                    None => a
                        .as_u64()
                        .and_then(|n| account_keys.get(n as usize))
                        .cloned(),
                })
                .collect()
        })
        .unwrap_or_default();

    let data = match ix.get("data").and_then(|v| v.as_str()) {
        Some(encoded) => bs58::decode(encoded).into_vec().unwrap_or_else(|e| {
            debug!("undecodable instruction data for {}: {}", program_id, e);
            Vec::new()
        }),
        None => Vec::new(),
    };

    Some(RawInstruction {
        program_id,
        accounts,
        data,
        outer_ix_index,
    })
}

fn parse_inner_groups(tx: &Value, account_keys: &[String]) -> Vec<InnerGroup> {
    let Some(groups) = tx.pointer("/meta/innerInstructions").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    groups
        .iter()
        .filter_map(|group| {
            let index = group.get("index")?.as_u64()? as usize;
            let instructions = group
                .get("instructions")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|ix| parse_instruction(ix, account_keys, Some(index)))
                        .collect()
                })
                .unwrap_or_default();
            Some(InnerGroup {
                index,
                instructions,
            })
        })
        .collect()
}

fn parse_token_balances(tx: &Value, path: &str) -> Vec<TokenBalance> {
    let Some(arr) = tx.pointer(path).and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    arr.iter()
        .filter_map(|b| {
            let account_index = u32::try_from(b.get("accountIndex")?.as_u64()?).ok()?;
            let mint = b.get("mint")?.as_str()?.to_string();
            let owner = b.get("owner").and_then(|v| v.as_str()).map(|s| s.to_string());
            let amount = b
                .pointer("/uiTokenAmount/amount")
                .and_then(|v| v.as_str())
                .unwrap_or("0")
                .to_string();
            let decimals = b
                .pointer("/uiTokenAmount/decimals")
                .and_then(|v| v.as_u64())
                .and_then(|d| u8::try_from(d).ok());

            Some(TokenBalance {
                account_index,
                mint,
                owner,
                amount,
                decimals,
            })
        })
        .collect()
}

/// Pair pre and post snapshots on `(account_index, mint)`. A side missing
/// from either snapshot counts as zero; unchanged accounts are dropped.
pub fn compute_token_deltas(pre: &[TokenBalance], post: &[TokenBalance]) -> Vec<BalanceDelta> {
    let mut paired: BTreeMap<(u32, &str), (Option<&TokenBalance>, Option<&TokenBalance>)> =
        BTreeMap::new();
    for b in pre {
        paired.entry((b.account_index, b.mint.as_str())).or_default().0 = Some(b);
    }
    for b in post {
        paired.entry((b.account_index, b.mint.as_str())).or_default().1 = Some(b);
    }

    paired
        .into_iter()
        .filter_map(|((account_index, mint), (pre_bal, post_bal))| {
            let pre_amount = pre_bal.map(|b| parse_amount(&b.amount)).unwrap_or(0);
            let post_amount = post_bal.map(|b| parse_amount(&b.amount)).unwrap_or(0);
            if pre_amount == post_amount {
                return None;
            }

            let change = i128::try_from(post_amount)
                .ok()
                .zip(i128::try_from(pre_amount).ok())
                .and_then(|(post, pre)| post.checked_sub(pre));
            let Some(change) = change else {
                debug!(
                    "balance change of account {} ({}) out of range, skipped",
                    account_index, mint
                );
                return None;
            };
            Some(BalanceDelta {
                account_index,
                mint: mint.to_string(),
                owner: post_bal
                    .and_then(|b| b.owner.clone())
                    .or_else(|| pre_bal.and_then(|b| b.owner.clone())),
                change,
                abs_change: change.unsigned_abs(),
                decimals: post_bal
                    .and_then(|b| b.decimals)
                    .or_else(|| pre_bal.and_then(|b| b.decimals)),
            })
        })
        .collect()
}

fn parse_amount(raw: &str) -> u128 {
    raw.parse().unwrap_or_else(|_| {
        debug!("unparseable token amount {:?}, treating as zero", raw);
        0
    })
}
