//! 知识专家：一次知识库检索 + 一次解释生成

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::Context;
use crate::experts::{Expert, ExpertKind, ExpertPayload, ExpertResult};
use crate::llm::{complete_text, CompletionOptions, LlmClient};
use crate::memory::Message;
use crate::tools::{extract_tool_payload, ToolInvoker, TracedTools};

const SEARCH_TOOL: &str = "search_diabetes_knowledge";
const TOP_K: u64 = 5;

const SYSTEM_PROMPT: &str = "You are KnowledgeExpert, a medical knowledge specialist for diabetes care. \
Explain the retrieved knowledge accurately, clarify the concepts involved, give professional advice \
and cite the sources you rely on. Do not invent facts that the retrieved content does not support.";

pub struct KnowledgeExpert {
    llm: Arc<dyn LlmClient>,
    tools: Arc<dyn ToolInvoker>,
}

impl KnowledgeExpert {
    pub fn new(llm: Arc<dyn LlmClient>, tools: Arc<dyn ToolInvoker>) -> Self {
        Self { llm, tools }
    }
}

/// 检索结果列表：`{search_results: [...]}` 或直接是数组
fn search_results(payload: Value) -> Vec<Value> {
    match payload {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("search_results") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

#[async_trait]
impl Expert for KnowledgeExpert {
    fn kind(&self) -> ExpertKind {
        ExpertKind::Knowledge
    }

    async fn process(&self, ctx: &mut Context) -> ExpertResult {
        let traced = TracedTools::new(self.tools.clone());
        let outcome = traced
            .call(SEARCH_TOOL, json!({ "query": ctx.goal, "top_k": TOP_K }))
            .await;
        let knowledge = if outcome.success {
            search_results(extract_tool_payload(&outcome))
        } else {
            tracing::warn!(error = ?outcome.error, "knowledge search failed");
            Vec::new()
        };
        tracing::info!(found = knowledge.len(), "knowledge retrieved");

        let knowledge_text = serde_json::to_string_pretty(&knowledge).unwrap_or_default();
        let prompt = format!(
            "User question: {}\n\nRetrieved knowledge:\n{knowledge_text}\n\n\
             Based on this knowledge:\n1. give accurate medical information\n\
             2. explain the related concepts\n3. give professional advice\n4. cite the sources",
            ctx.goal
        );
        let messages = vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)];
        let options = CompletionOptions::new().temperature(0.2);

        match complete_text(self.llm.as_ref(), &messages, &options).await {
            Ok(explanation) => {
                ctx.knowledge = Some(Value::Array(knowledge.clone()));
                ExpertResult::success(
                    self.kind(),
                    ExpertPayload::Knowledge {
                        knowledge,
                        explanation,
                    },
                )
                .with_tool_calls(traced.take_records())
            }
            Err(e) => {
                tracing::error!(error = %e, "knowledge explanation failed");
                ExpertResult::failure(self.kind(), e.to_string()).with_tool_calls(traced.take_records())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::tools::{local_registry, HealthRecordStore, ToolRegistry};

    fn registry() -> Arc<dyn ToolInvoker> {
        Arc::new(local_registry(Arc::new(HealthRecordStore::new())))
    }

    #[tokio::test]
    async fn test_search_then_explain() {
        let llm = Arc::new(ScriptedLlmClient::with_replies(["7.3 fasting is above normal."]));
        let expert = KnowledgeExpert::new(llm.clone(), registry());
        let mut ctx = Context::new("u1", "is fasting glucose 7.3 high?");

        let result = expert.process(&mut ctx).await;
        assert!(result.success);
        assert_eq!(result.primary_text(), Some("7.3 fasting is above normal."));
        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.tool_calls[0].tool, SEARCH_TOOL);
        assert!(ctx.knowledge.as_ref().unwrap().as_array().is_some_and(|k| !k.is_empty()));

        let prompt = &llm.requests()[0][1].content;
        assert!(prompt.contains("Fasting"));
    }

    #[tokio::test]
    async fn test_tool_failure_still_explains() {
        let llm = Arc::new(ScriptedLlmClient::with_replies(["general advice"]));
        let expert = KnowledgeExpert::new(llm, Arc::new(ToolRegistry::new()));
        let mut ctx = Context::new("u1", "what is HbA1c?");

        let result = expert.process(&mut ctx).await;
        assert!(result.success);
        assert!(!result.tool_calls[0].success);
        match result.payload {
            ExpertPayload::Knowledge { knowledge, .. } => assert!(knowledge.is_empty()),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_llm_failure_is_failed_result() {
        let llm = Arc::new(ScriptedLlmClient::new());
        llm.push_failure("timeout");
        let expert = KnowledgeExpert::new(llm, registry());
        let mut ctx = Context::new("u1", "what is HbA1c?");

        let result = expert.process(&mut ctx).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timeout"));
        assert!(ctx.knowledge.is_none());
    }
}
