//! Field normalizer
//!
//! Pure mapping from a validated recognition response into the canonical
//! [`ExpenseRecord`] schema. No I/O, no failure path: whatever the model
//! returned, the output has every canonical field.

use chrono::NaiveDateTime;

use crate::models::{
    ExpenseCategory, ExpenseRecord, PaymentChannel, RecognitionFailure, RecognitionResponse,
    SourceFields, DEFAULT_EXPENSE_DATE,
};

const SOURCE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const EXPENSE_DATE_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Map one recognition response onto the canonical record
pub fn normalize(response: RecognitionResponse, file_name: &str) -> ExpenseRecord {
    match response {
        RecognitionResponse::Failure { code } => {
            tracing::warn!(file_name = %file_name, code, "Recognition returned failure code");
            ExpenseRecord::failed(file_name, RecognitionFailure::Rejected { code }.to_string())
        }
        RecognitionResponse::Success(fields) => normalize_fields(&fields, file_name),
    }
}

fn normalize_fields(fields: &SourceFields, file_name: &str) -> ExpenseRecord {
    let currency = fields.currency.clone().unwrap_or_default();
    let account = fields.account.as_deref().unwrap_or_default();

    let mut record = ExpenseRecord::success(file_name);
    record.expense_date = normalize_expense_date(fields.paid_at.as_deref());
    record.expense_category = validate_category(fields.category.as_deref(), file_name);
    record.expense_content = fields.purpose.clone().unwrap_or_default();
    record.origin = fields.origin.clone().unwrap_or_default();
    record.destination = fields.destination.clone().unwrap_or_default();
    record.amount = strip_currency_symbols(fields.amount.as_deref().unwrap_or_default());
    record.payment_channel = infer_payment_channel(&currency, account).label().to_string();
    record.currency = currency;
    record.source_fields = fields.passthrough();
    record
}

/// Reformat `YYYY-MM-DD HH:MM:SS` as `YYYY/MM/DD HH:MM:SS`
///
/// Absent or empty input yields the sentinel date; anything unparsable is
/// passed through unchanged.
pub fn normalize_expense_date(raw: Option<&str>) -> String {
    match raw {
        None | Some("") => DEFAULT_EXPENSE_DATE.to_string(),
        Some(raw) => match NaiveDateTime::parse_from_str(raw, SOURCE_TIME_FORMAT) {
            Ok(parsed) => parsed.format(EXPENSE_DATE_FORMAT).to_string(),
            Err(_) => raw.to_string(),
        },
    }
}

/// Remove `¥` and `$` and surrounding whitespace
pub fn strip_currency_symbols(amount: &str) -> String {
    amount.replace(['¥', '$'], "").trim().to_string()
}

/// First matching rule wins: bank/credit card, WeChat, Alipay, USD fallback
pub fn infer_payment_channel(currency: &str, account: &str) -> PaymentChannel {
    if account.contains("信用卡") || account.contains("银行") {
        PaymentChannel::CreditCard
    } else if account.contains("零钱通") || account.contains("微信") {
        PaymentChannel::WeChat
    } else if account.contains("支付宝") || account.contains("蚂蚁") {
        PaymentChannel::Alipay
    } else if currency == "美元" {
        // foreign-currency payments are assumed to be card based
        PaymentChannel::CreditCard
    } else {
        PaymentChannel::Unknown
    }
}

/// Keep the category only when it belongs to the fixed set
fn validate_category(raw: Option<&str>, file_name: &str) -> String {
    match raw.map(str::trim) {
        None | Some("") => String::new(),
        Some(label) => match ExpenseCategory::from_label(label) {
            Some(category) => category.label().to_string(),
            None => {
                tracing::warn!(
                    file_name = %file_name,
                    category = %label,
                    "Model returned category outside the fixed set, dropping it"
                );
                String::new()
            }
        },
    }
}
