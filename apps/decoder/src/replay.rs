use anyhow::{Result, anyhow};
use async_trait::async_trait;
use log::{info, warn};
use serde_json::Value;
use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};
use txparse::{TransactionSource, TransportError};

/// Transactions recorded as `{"signature": ..., "tx": <getTransaction result>}`
/// jsonl lines.
pub struct RecordedTransactions {
    txs: HashMap<String, Value>,
    order: Vec<String>,
}

impl RecordedTransactions {
    pub fn load(path: &Path) -> Result<Self> {
        info!("replay from {}", path.display());

        let f = File::open(path)?;
        let r = BufReader::new(f);

        let mut txs = HashMap::new();
        let mut order = Vec::new();

        for (n, line) in r.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let v: Value = serde_json::from_str(&line)
                .map_err(|e| anyhow!("line {}: invalid json: {e}", n + 1))?;
            let sig = v
                .get("signature")
                .and_then(|x| x.as_str())
                .unwrap_or("")
                .to_string();
            let tx = v
                .get("tx")
                .cloned()
                .ok_or_else(|| anyhow!("line {}: missing tx field", n + 1))?;

            if sig.is_empty() {
                warn!("line {}: empty signature, skipped", n + 1);
                continue;
            }
            if txs.insert(sig.clone(), tx).is_none() {
                order.push(sig);
            }
        }

        info!("replay loaded {} transactions", order.len());
        Ok(Self { txs, order })
    }

    pub fn signatures(&self) -> &[String] {
        &self.order
    }
}

#[async_trait]
impl TransactionSource for RecordedTransactions {
    async fn fetch_transaction(&self, signature: &str) -> Result<Option<Value>, TransportError> {
        Ok(self.txs.get(signature).cloned())
    }
}
