use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Timestamp reported when the block time is unknown.
pub const EPOCH_TIMESTAMP: &str = "1970-01-01T00:00:00.000Z";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
}

/// Normalized swap, serialized with the field names downstream consumers
/// expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapRecord {
    #[serde(rename = "Signers")]
    pub signers: Vec<String>,
    #[serde(rename = "Signatures")]
    pub signatures: Vec<String>,
    #[serde(rename = "AMMs")]
    pub amms: Vec<String>,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "Action", skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(rename = "TokenInMint")]
    pub token_in_mint: String,
    /// Base units, decimal string.
    #[serde(rename = "TokenInAmount")]
    pub token_in_amount: String,
    #[serde(rename = "TokenInDecimals")]
    pub token_in_decimals: u8,
    #[serde(rename = "TokenOutMint")]
    pub token_out_mint: String,
    #[serde(rename = "TokenOutAmount")]
    pub token_out_amount: String,
    #[serde(rename = "TokenOutDecimals")]
    pub token_out_decimals: u8,
    #[serde(rename = "Raw", skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

impl SwapRecord {
    pub fn token_in_ui_amount(&self) -> String {
        to_ui_amount(&self.token_in_amount, self.token_in_decimals)
    }

    pub fn token_out_ui_amount(&self) -> String {
        to_ui_amount(&self.token_out_amount, self.token_out_decimals)
    }
}

/// ISO-8601 UTC with millisecond precision.
pub fn format_timestamp(block_time: Option<i64>) -> String {
    block_time
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| EPOCH_TIMESTAMP.to_string())
}

/// Render a base-unit amount with `decimals` fractional digits, trailing
/// zeros trimmed. Exact: works on the digit string, never on floats.
pub fn to_ui_amount(raw: &str, decimals: u8) -> String {
    let digits = raw.trim_start_matches('0');
    if digits.is_empty() {
        return "0".to_string();
    }
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits.to_string();
    }

    let padded = format!("{:0>width$}", digits, width = decimals + 1);
    let (int_part, frac_part) = padded.split_at(padded.len() - decimals);
    let frac_part = frac_part.trim_end_matches('0');
    if frac_part.is_empty() {
        int_part.to_string()
    } else {
        format!("{}.{}", int_part, frac_part)
    }
}
