//! Per-image audit entry within a session

use serde::{Deserialize, Serialize};

use crate::models::{ExpenseRecord, RecognitionStatus};

/// One row of `expense_ocr_detail`; written once, never updated
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailEntry {
    pub id: i64,
    pub session_id: i64,
    pub file_name: String,
    pub expense_date: String,
    pub expense_category: String,
    pub expense_content: String,
    pub origin: String,
    pub destination: String,
    /// NULL in storage when the record has no amount
    pub amount: Option<String>,
    pub currency: String,
    pub payment_channel: String,
    pub recognition_status: RecognitionStatus,
    pub error_message: Option<String>,
    /// Serialized [`ExpenseRecord`] as it left the normalizer
    pub raw_json: String,
    pub created_at: String,
}

impl DetailEntry {
    /// Rebuild the record this entry was written from
    pub fn replay(&self) -> serde_json::Result<ExpenseRecord> {
        serde_json::from_str(&self.raw_json)
    }
}
