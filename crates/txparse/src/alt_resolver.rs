/// Account key resolution for legacy and v0 transactions.
///
/// v0 transactions split their account keys across the static message keys and
/// the address-lookup-table loads in `meta.loadedAddresses`. Instruction
/// account indices address the concatenation
/// `accountKeys + loadedAddresses.writable + loadedAddresses.readonly`.
use serde_json::Value;

/// Extracts the address from an account key entry, which is a plain string in
/// `json` encoding and an object with a `pubkey` field in `jsonParsed`.
fn key_str(entry: &Value) -> Option<String> {
    entry
        .as_str()
        .or_else(|| entry.get("pubkey").and_then(|p| p.as_str()))
        .map(|s| s.to_string())
}

fn message_keys(tx: &Value) -> &[Value] {
    tx.pointer("/transaction/message/accountKeys")
        .and_then(|v| v.as_array())
        .map(|a| a.as_slice())
        .unwrap_or(&[])
}

/// Account keys listed directly in the message, without lookup-table loads.
pub fn static_account_keys(tx: &Value) -> Vec<String> {
    message_keys(tx).iter().filter_map(key_str).collect()
}

/// Full account key list in instruction-index order.
pub fn resolve_full_account_keys(tx: &Value) -> Vec<String> {
    let mut keys = static_account_keys(tx);

    if let Some(loaded) = tx.pointer("/meta/loadedAddresses") {
        for section in ["writable", "readonly"] {
            if let Some(addrs) = loaded.get(section).and_then(|v| v.as_array()) {
                keys.extend(addrs.iter().filter_map(|a| a.as_str().map(|s| s.to_string())));
            }
        }
    }

    keys
}

/// Signing account keys, in message order.
///
/// `jsonParsed` marks each key with `signer`; raw `json` encoding only carries
/// `header.numRequiredSignatures`, and the signers are the leading keys.
pub fn signer_keys(tx: &Value) -> Vec<String> {
    let entries = message_keys(tx);

    let flagged: Vec<String> = entries
        .iter()
        .filter(|e| e.get("signer").and_then(|s| s.as_bool()) == Some(true))
        .filter_map(key_str)
        .collect();
    if !flagged.is_empty() {
        return flagged;
    }

    let required = tx
        .pointer("/transaction/message/header/numRequiredSignatures")
        .and_then(|v| v.as_u64())
        .unwrap_or(1) as usize;

    entries.iter().take(required).filter_map(key_str).collect()
}
