//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Scripted）实现 LlmClient：complete（非流式）、complete_stream（流式 Token）。
//! 失败一律以 `Err(LlmError)` 返回，引擎把它当作可恢复错误处理。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

use crate::memory::Message;

/// Completion Service 错误（网络、服务端、空回复）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("empty completion")]
    Empty,

    #[error("stream error: {0}")]
    Stream(String),
}

/// 单次请求的生成参数
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// 一次生成的结果；工具调用走文本 JSON 协议，不使用原生 function calling
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub content: Option<String>,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
        }
    }

    /// 文本内容（去首尾空白）；无文本时为空串
    pub fn content_str(&self) -> &str {
        self.content.as_deref().map(str::trim).unwrap_or("")
    }
}

/// 流式 Token 流
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// LLM 客户端 trait：非流式完成与流式完成（返回 Token 流）
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<Completion, LlmError>;

    /// 流式完成，返回 Token 流
    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<CompletionStream, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 只要文本的便捷调用：空文本视为 LlmError::Empty
pub async fn complete_text(
    llm: &dyn LlmClient,
    messages: &[Message],
    options: &CompletionOptions,
) -> Result<String, LlmError> {
    let completion = llm.complete(messages, options).await?;
    let text = completion.content_str();
    if text.is_empty() {
        return Err(LlmError::Empty);
    }
    Ok(text.to_string())
}
