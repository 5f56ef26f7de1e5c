//! Vision model client
//!
//! Sends one base64 JPEG plus the receipt-extraction prompt to an
//! OpenAI-compatible chat-completions endpoint and returns the model's text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use imageleuth_common::config::RecognizerConfig;

const USER_AGENT: &str = concat!("imageleuth/", env!("CARGO_PKG_VERSION"));

/// Extraction prompt; the JSON contract here is what [`crate::models::SourceFields`] parses
pub const RECEIPT_PROMPT: &str = "你是一个财务截图智能识别助手，请分析我提供的付款截图，提取以下字段（如无内容请返回空字符串）：\n\
\n\
1. 金额：必须包含金额数值及货币符号，例如：¥117.17 或 $15.00\n\
2. 币种：请明确返回币种名称，例如：人民币、美元、日元、越南盾等。即使图片中只有货币符号（¥、$），也要根据内容判断币种，不得遗漏！\n\
3. 付款时间：如 2025-05-05 14:19:21\n\
4. 付款账户：如 中国银行信用卡(0297)、支付宝账号、零钱通、微信等\n\
5. 费用用途：如 iproyal、滴滴、美团外卖等\n\
6. 起点：出行类截图中的出发地\n\
7. 终点：出行类截图中的目的地\n\
8. 费用类别：四选一（办公用品、差旅费、软件费、资产），请根据截图内容合理判断最合适分类\n\
\n\
【输出格式】\n\
{\n\
  \"code\": 200,\n\
  \"data\": {\n\
    \"文件名\": \"xxx.jpg\",\n\
    \"金额\": \"$15.00\",\n\
    \"币种\": \"美元\",\n\
    \"付款时间\": \"2025-05-05 14:19:21\",\n\
    \"付款账户\": \"招商银行信用卡(8888)\",\n\
    \"费用用途\": \"iproyal\",\n\
    \"起点\": \"杭州萧山机场T3\",\n\
    \"终点\": \"绍兴万达中心\",\n\
    \"费用类别\": \"软件费\"\n\
  }\n\
}\n\
\n\
若识别失败请返回：{\"code\": 400, \"data\": {}}\n\
请严格只返回 JSON，不要添加解释或 Markdown。";

/// Vision client errors
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Model returned no content")]
    EmptyResponse,
}

/// External recognition capability: base64 image in, raw model text out
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(&self, image_base64: &str) -> Result<String, VisionError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible vision client
pub struct VisionClient {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    max_tokens: u32,
    timeout: Duration,
}

impl VisionClient {
    pub fn new(api_key: String, config: &RecognizerConfig) -> Result<Self, VisionError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| VisionError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key,
            model: config.model.clone(),
            endpoint: config.endpoint.clone(),
            max_tokens: config.max_tokens,
            timeout,
        })
    }

    fn build_request<'a>(&'a self, image_base64: &str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: RECEIPT_PROMPT,
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: format!("data:image/jpeg;base64,{}", image_base64),
                        },
                    },
                ],
            }],
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait]
impl Recognizer for VisionClient {
    async fn recognize(&self, image_base64: &str) -> Result<String, VisionError> {
        tracing::debug!(
            model = %self.model,
            payload_bytes = image_base64.len(),
            "Querying vision model"
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.build_request(image_base64))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    VisionError::Timeout(self.timeout)
                } else {
                    VisionError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(VisionError::InvalidApiKey);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(VisionError::ApiError(status.as_u16(), error_text));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| VisionError::ParseError(e.to_string()))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(VisionError::EmptyResponse)?;

        tracing::info!(model = %self.model, chars = content.len(), "Vision model responded");
        Ok(content)
    }
}
