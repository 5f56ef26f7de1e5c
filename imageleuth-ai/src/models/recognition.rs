//! Recognition capability response model
//!
//! The vision model answers with free text that should be JSON shaped as
//! `{"code": 200, "data": {...}}` or `{"code": 400, "data": {}}`. The text is
//! validated once, at the invoker boundary, into [`RecognitionResponse`].

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::models::expense_record::is_reserved_header;

/// Status code the model uses to signal a usable result
pub const SUCCESS_CODE: i64 = 200;

/// Per-item failure kinds, absorbed into failed records by the invoker
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecognitionFailure {
    /// Image could not be decoded or re-encoded
    #[error("图片处理失败: {0}")]
    Decode(String),

    /// Recognition capability unreachable, timed out or rejected the call
    #[error("AI识别失败: {0}")]
    Invocation(String),

    /// Response text was not the expected JSON envelope
    #[error("结果解析失败: {0}")]
    Response(String),

    /// Well-formed response carrying a non-success code
    #[error("AI识别返回失败代码")]
    Rejected { code: i64 },
}

impl RecognitionFailure {
    /// Stable machine-readable code for logs
    pub fn error_code(&self) -> &'static str {
        match self {
            RecognitionFailure::Decode(_) => "DECODE_ERROR",
            RecognitionFailure::Invocation(_) => "INVOCATION_ERROR",
            RecognitionFailure::Response(_) => "RESPONSE_ERROR",
            RecognitionFailure::Rejected { .. } => "REJECTED",
        }
    }
}

/// Fields extracted by the model, keyed as the prompt requests them
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SourceFields {
    #[serde(rename = "金额", default, deserialize_with = "lenient_string")]
    pub amount: Option<String>,

    #[serde(rename = "币种", default, deserialize_with = "lenient_string")]
    pub currency: Option<String>,

    #[serde(rename = "付款时间", default, deserialize_with = "lenient_string")]
    pub paid_at: Option<String>,

    #[serde(rename = "付款账户", default, deserialize_with = "lenient_string")]
    pub account: Option<String>,

    #[serde(rename = "费用用途", default, deserialize_with = "lenient_string")]
    pub purpose: Option<String>,

    #[serde(rename = "起点", default, deserialize_with = "lenient_string")]
    pub origin: Option<String>,

    #[serde(rename = "终点", default, deserialize_with = "lenient_string")]
    pub destination: Option<String>,

    #[serde(rename = "费用类别", default, deserialize_with = "lenient_string")]
    pub category: Option<String>,

    /// File name echoed by the model; the batch-assigned name always wins
    #[serde(rename = "文件名", default, deserialize_with = "lenient_string")]
    pub file_name: Option<String>,

    /// Keys outside the prompt contract
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl SourceFields {
    /// Raw source fields without a canonical column, for audit and export
    pub fn passthrough(&self) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        let named = [
            ("金额", &self.amount),
            ("币种", &self.currency),
            ("付款时间", &self.paid_at),
            ("付款账户", &self.account),
            ("费用用途", &self.purpose),
        ];
        for (key, value) in named {
            if let Some(value) = value {
                fields.insert(key.to_string(), value.clone());
            }
        }
        for (key, value) in &self.extra {
            if is_reserved_header(key) {
                tracing::debug!(key = %key, "Dropping model field that shadows an export column");
                continue;
            }
            fields.insert(key.clone(), value_to_text(value));
        }
        fields
    }
}

/// Validated recognition response
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionResponse {
    Success(SourceFields),
    Failure { code: i64 },
}

#[derive(Deserialize)]
struct Envelope {
    code: Value,
    #[serde(default)]
    data: Option<Value>,
}

impl RecognitionResponse {
    /// Validate raw model output
    ///
    /// Non-JSON text, a missing or non-integer `code`, or a success code
    /// without a `data` object are all [`RecognitionFailure::Response`].
    pub fn parse(raw: &str) -> Result<Self, RecognitionFailure> {
        let envelope: Envelope = serde_json::from_str(raw.trim())
            .map_err(|e| RecognitionFailure::Response(e.to_string()))?;

        let code = envelope.code.as_i64().ok_or_else(|| {
            RecognitionFailure::Response(format!("code is not an integer: {}", envelope.code))
        })?;

        if code != SUCCESS_CODE {
            return Ok(RecognitionResponse::Failure { code });
        }

        match envelope.data {
            Some(data @ Value::Object(_)) => serde_json::from_value(data)
                .map(RecognitionResponse::Success)
                .map_err(|e| RecognitionFailure::Response(e.to_string())),
            Some(other) => Err(RecognitionFailure::Response(format!(
                "data is not an object: {}",
                other
            ))),
            None => Err(RecognitionFailure::Response("missing data".to_string())),
        }
    }
}

/// Accept strings verbatim, render numbers and booleans, map null to None
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(other) => Some(value_to_text(&other)),
    })
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success_envelope() {
        let raw = r#"{
            "code": 200,
            "data": {
                "文件名": "xxx.jpg",
                "金额": "$15.00",
                "币种": "美元",
                "付款时间": "2025-05-05 14:19:21",
                "付款账户": "招商银行信用卡(8888)",
                "费用用途": "iproyal",
                "起点": "",
                "终点": "",
                "费用类别": "软件费"
            }
        }"#;

        let RecognitionResponse::Success(fields) = RecognitionResponse::parse(raw).unwrap() else {
            panic!("expected success");
        };
        assert_eq!(fields.amount.as_deref(), Some("$15.00"));
        assert_eq!(fields.currency.as_deref(), Some("美元"));
        assert_eq!(fields.account.as_deref(), Some("招商银行信用卡(8888)"));
        assert_eq!(fields.category.as_deref(), Some("软件费"));
        assert!(fields.extra.is_empty());
    }

    #[test]
    fn test_parse_failure_code() {
        let parsed = RecognitionResponse::parse(r#"{"code": 400, "data": {}}"#).unwrap();
        assert_eq!(parsed, RecognitionResponse::Failure { code: 400 });
    }

    #[test]
    fn test_non_json_is_response_error() {
        let err = RecognitionResponse::parse("Sorry, I cannot read this image.").unwrap_err();
        assert!(matches!(err, RecognitionFailure::Response(_)));
        assert!(err.to_string().starts_with("结果解析失败"));
    }

    #[test]
    fn test_missing_code_is_response_error() {
        let err = RecognitionResponse::parse(r#"{"data": {}}"#).unwrap_err();
        assert!(matches!(err, RecognitionFailure::Response(_)));
    }

    #[test]
    fn test_string_code_is_response_error() {
        let err = RecognitionResponse::parse(r#"{"code": "200", "data": {}}"#).unwrap_err();
        assert!(matches!(err, RecognitionFailure::Response(_)));
    }

    #[test]
    fn test_success_without_data_object_is_response_error() {
        assert!(RecognitionResponse::parse(r#"{"code": 200}"#).is_err());
        assert!(RecognitionResponse::parse(r#"{"code": 200, "data": []}"#).is_err());
    }

    #[test]
    fn test_lenient_values_and_extra_keys() {
        let raw = r#"{"code": 200, "data": {"金额": 117.17, "币种": null, "商户": "滴滴出行", "张数": 2}}"#;
        let RecognitionResponse::Success(fields) = RecognitionResponse::parse(raw).unwrap() else {
            panic!("expected success");
        };
        assert_eq!(fields.amount.as_deref(), Some("117.17"));
        assert_eq!(fields.currency, None);

        let passthrough = fields.passthrough();
        assert_eq!(passthrough.get("金额").map(String::as_str), Some("117.17"));
        assert_eq!(passthrough.get("商户").map(String::as_str), Some("滴滴出行"));
        assert_eq!(passthrough.get("张数").map(String::as_str), Some("2"));
        assert!(!passthrough.contains_key("币种"));
    }

    #[test]
    fn test_passthrough_drops_keys_shadowing_export_columns() {
        let raw = r#"{"code": 200, "data": {"金额": "¥1", "费用日期": "2025/01/01", "识别状态": "成功", "错误信息": "x", "支付渠道": "微信", "订单号": "A1"}}"#;
        let RecognitionResponse::Success(fields) = RecognitionResponse::parse(raw).unwrap() else {
            panic!("expected success");
        };

        let keys: Vec<_> = fields.passthrough().into_keys().collect();
        assert_eq!(keys, vec!["订单号".to_string(), "金额".to_string()]);
    }

    #[test]
    fn test_failure_messages() {
        assert_eq!(
            RecognitionFailure::Rejected { code: 400 }.to_string(),
            "AI识别返回失败代码"
        );
        assert_eq!(
            RecognitionFailure::Invocation("timeout".into()).to_string(),
            "AI识别失败: timeout"
        );
        assert_eq!(RecognitionFailure::Decode("bad".into()).error_code(), "DECODE_ERROR");
    }
}
