//! Human-readable transfer summaries.
//!
//! A summary travels with a sign request so the approval UI of the
//! key-management service can show operators what they are approving.
//! It is display-only: nothing in it feeds the signing digest.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::transaction::TypedTransaction;

/// Discriminator for summary payloads; only transfers exist today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SummaryKind {
    #[serde(rename = "TRANSFER")]
    Transfer,
}

/// Transfer context rendered in the approval UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSummary {
    #[serde(rename = "type")]
    pub kind: SummaryKind,
    pub from: String,
    pub to: String,
    /// Decimal wei amount; decimal keeps the UI free of hex parsing.
    pub amount: String,
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
}

impl TransferSummary {
    pub const DEFAULT_TOKEN: &'static str = "ETH";

    /// Derives a summary from a transaction about to be signed. The
    /// `from` side is the signer address, stamped on the transaction
    /// before this is called; contract creations show an empty `to`.
    pub fn for_transaction(tx: &TypedTransaction, remark: Option<String>) -> Self {
        TransferSummary {
            kind: SummaryKind::Transfer,
            from: format!("0x{}", hex::encode(tx.from())),
            to: tx
                .to()
                .map(|to| format!("0x{}", hex::encode(to)))
                .unwrap_or_default(),
            amount: decimal_wei(tx.value()),
            token: Self::DEFAULT_TOKEN.to_string(),
            remark,
        }
    }
}

fn decimal_wei(value: U256) -> String {
    value.to_string()
}
