//! Scripted LLM 客户端（用于测试，无需 API）
//!
//! 回复来源按优先级：
//! 1. 规则：任一消息内容包含指定片段时返回对应回复（可重复命中）
//! 2. 队列：按顺序弹出预置回复
//! 3. 兜底回复（未设置时返回 LlmError::Request）
//!
//! 所有请求都会记录下来，便于断言 Prompt 内容；token 用量按空白分词近似累计。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{
    Completion, CompletionOptions, CompletionStream, LlmClient, LlmError, TokenUsage,
};
use crate::memory::Message;

/// 队列中的一条脚本回复：文本或一次失败
#[derive(Debug, Clone)]
enum Scripted {
    Reply(String),
    Fail(String),
}

#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    rules: Vec<(String, String)>,
    queue: Mutex<VecDeque<Scripted>>,
    fallback: Option<String>,
    requests: Mutex<Vec<Vec<Message>>>,
    usage: TokenUsage,
}

fn word_count(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一串按顺序返回的回复
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::new();
        client.push_replies(replies);
        client
    }

    /// 任一消息包含 `needle` 时返回 `reply`（规则优先于队列）
    pub fn with_rule(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push((needle.into(), reply.into()));
        self
    }

    pub fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut q) = self.queue.lock() {
            q.push_back(Scripted::Reply(reply.into()));
        }
    }

    pub fn push_replies<I, S>(&self, replies: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for r in replies {
            self.push_reply(r);
        }
    }

    /// 下一次出队时返回请求失败
    pub fn push_failure(&self, message: impl Into<String>) {
        if let Ok(mut q) = self.queue.lock() {
            q.push_back(Scripted::Fail(message.into()));
        }
    }

    /// 已收到的请求（每次请求的完整消息列表）
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn remaining(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    fn next_reply(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Some((_, reply)) = self
            .rules
            .iter()
            .find(|(needle, _)| messages.iter().any(|m| m.content.contains(needle.as_str())))
        {
            return Ok(reply.clone());
        }
        let popped = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        match popped {
            Some(Scripted::Reply(text)) => Ok(text),
            Some(Scripted::Fail(message)) => Err(LlmError::Request(message)),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| LlmError::Request("script exhausted".to_string())),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(
        &self,
        messages: &[Message],
        _options: &CompletionOptions,
    ) -> Result<Completion, LlmError> {
        if let Ok(mut log) = self.requests.lock() {
            log.push(messages.to_vec());
        }
        let reply = self.next_reply(messages)?;
        let prompt: u64 = messages.iter().map(|m| word_count(&m.content)).sum();
        self.usage.add(prompt, word_count(&reply));
        Ok(Completion::text(reply))
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<CompletionStream, LlmError> {
        let content = self.complete(messages, options).await?.content.unwrap_or_default();
        Ok(Box::pin(stream::iter(vec![Ok(content)])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_queue_then_exhausted() {
        let llm = ScriptedLlmClient::with_replies(["a", "b"]);
        let opts = CompletionOptions::new();
        let msgs = vec![Message::user("hi")];
        assert_eq!(llm.complete(&msgs, &opts).await.unwrap().content_str(), "a");
        assert_eq!(llm.complete(&msgs, &opts).await.unwrap().content_str(), "b");
        assert!(llm.complete(&msgs, &opts).await.is_err());
        assert_eq!(llm.request_count(), 3);
        // 失败的请求不计用量
        assert_eq!(llm.token_usage(), (2, 2, 4));
    }

    #[tokio::test]
    async fn test_rule_takes_priority() {
        let llm = ScriptedLlmClient::with_replies(["queued"]).with_rule("reflect", "ruled");
        let opts = CompletionOptions::new();
        let r = llm.complete(&[Message::system("please reflect")], &opts).await.unwrap();
        assert_eq!(r.content_str(), "ruled");
        assert_eq!(llm.remaining(), 1);
    }

    #[tokio::test]
    async fn test_failure_and_fallback() {
        let llm = ScriptedLlmClient::new().with_fallback("fb");
        llm.push_failure("boom");
        let opts = CompletionOptions::new();
        let msgs = vec![Message::user("x")];
        assert_eq!(
            llm.complete(&msgs, &opts).await.unwrap_err(),
            LlmError::Request("boom".into())
        );
        let mut s = llm.complete_stream(&msgs, &opts).await.unwrap();
        assert_eq!(s.next().await.unwrap().unwrap(), "fb");
    }
}
