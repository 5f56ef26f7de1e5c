//! Canonical expense record
//!
//! Every recognition outcome, successful or not, is folded into this fixed
//! schema. All text fields are always present (empty string by default).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Expense date used when the receipt carries no payment time
pub const DEFAULT_EXPENSE_DATE: &str = "1900/01/01 00:00:00";

/// Export column order: (record field, spreadsheet header)
pub const CANONICAL_COLUMNS: [(&str, &str); 9] = [
    ("expense_date", "费用日期"),
    ("expense_category", "费用类别"),
    ("expense_content", "费用内容"),
    ("origin", "起点"),
    ("destination", "终点"),
    ("amount", "支出金额"),
    ("currency", "货币"),
    ("payment_channel", "支付渠道"),
    ("file_name", "文件名"),
];

/// Spreadsheet header of the recognition status column
pub const STATUS_HEADER: &str = "识别状态";

/// Internal error-message label; never exported as a column
pub const ERROR_HEADER: &str = "错误信息";

/// True for keys owned by the fixed export schema
pub fn is_reserved_header(key: &str) -> bool {
    key == STATUS_HEADER
        || key == ERROR_HEADER
        || CANONICAL_COLUMNS.iter().any(|(_, header)| *header == key)
}

/// Per-image recognition outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognitionStatus {
    Success,
    Failed,
}

impl RecognitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecognitionStatus::Success => "success",
            RecognitionStatus::Failed => "failed",
        }
    }

    /// Operator-facing label used in spreadsheet exports
    pub fn label(&self) -> &'static str {
        match self {
            RecognitionStatus::Success => "成功",
            RecognitionStatus::Failed => "失败",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(RecognitionStatus::Success),
            "failed" => Some(RecognitionStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for RecognitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed expense category set the model is asked to choose from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpenseCategory {
    OfficeSupplies,
    Travel,
    Software,
    Assets,
}

impl ExpenseCategory {
    pub const ALL: [ExpenseCategory; 4] = [
        ExpenseCategory::OfficeSupplies,
        ExpenseCategory::Travel,
        ExpenseCategory::Software,
        ExpenseCategory::Assets,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ExpenseCategory::OfficeSupplies => "办公用品",
            ExpenseCategory::Travel => "差旅费",
            ExpenseCategory::Software => "软件费",
            ExpenseCategory::Assets => "资产",
        }
    }

    /// Exact match against the category labels (surrounding whitespace ignored)
    pub fn from_label(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL.into_iter().find(|c| c.label() == value)
    }
}

/// Payment channel inferred from account text and currency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentChannel {
    CreditCard,
    WeChat,
    Alipay,
    Unknown,
}

impl PaymentChannel {
    pub fn label(&self) -> &'static str {
        match self {
            PaymentChannel::CreditCard => "信用卡",
            PaymentChannel::WeChat => "微信",
            PaymentChannel::Alipay => "支付宝",
            PaymentChannel::Unknown => "",
        }
    }
}

impl fmt::Display for PaymentChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Canonical expense record produced for every image in a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    /// `YYYY/MM/DD HH:MM:SS`, the sentinel date, or the raw unparsable text
    pub expense_date: String,
    pub expense_category: String,
    pub expense_content: String,
    pub origin: String,
    pub destination: String,
    /// Amount with `¥`/`$` stripped
    pub amount: String,
    pub currency: String,
    pub payment_channel: String,
    /// Display name of the source image within the batch
    pub file_name: String,
    pub recognition_status: RecognitionStatus,
    /// Present only for failed records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Raw model fields that have no canonical column (account text etc.)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub source_fields: BTreeMap<String, String>,
}

impl ExpenseRecord {
    /// Record with every field defaulted and the given status
    fn blank(file_name: &str, recognition_status: RecognitionStatus) -> Self {
        Self {
            expense_date: DEFAULT_EXPENSE_DATE.to_string(),
            expense_category: String::new(),
            expense_content: String::new(),
            origin: String::new(),
            destination: String::new(),
            amount: String::new(),
            currency: String::new(),
            payment_channel: String::new(),
            file_name: file_name.to_string(),
            recognition_status,
            error_message: None,
            source_fields: BTreeMap::new(),
        }
    }

    /// Successful record skeleton; the normalizer fills the fields in
    pub fn success(file_name: &str) -> Self {
        Self::blank(file_name, RecognitionStatus::Success)
    }

    /// Failure record: defaults everywhere, file name and message set
    pub fn failed(file_name: &str, error_message: impl Into<String>) -> Self {
        let mut record = Self::blank(file_name, RecognitionStatus::Failed);
        record.error_message = Some(error_message.into());
        record
    }

    pub fn is_success(&self) -> bool {
        self.recognition_status == RecognitionStatus::Success
    }

    /// Canonical values in export column order
    pub fn canonical_values(&self) -> [&str; 9] {
        [
            &self.expense_date,
            &self.expense_category,
            &self.expense_content,
            &self.origin,
            &self.destination,
            &self.amount,
            &self.currency,
            &self.payment_channel,
            &self.file_name,
        ]
    }
}
