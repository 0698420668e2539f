//! 医生推荐专家：查询在线医生列表，按诊断结果匹配推荐

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::Context;
use crate::experts::{Expert, ExpertKind, ExpertPayload, ExpertResult};
use crate::llm::{complete_text, CompletionOptions, LlmClient};
use crate::memory::Message;
use crate::tools::{extract_tool_payload, ToolInvoker, TracedTools};

const DOCTOR_TOOL: &str = "query_doctor_list";

const SYSTEM_PROMPT: &str = "You are DoctorExpert. Recommend the most suitable doctors for the user's \
condition, matching each doctor's specialty, online status and rating, and give practical advice for the visit.";

pub struct DoctorExpert {
    llm: Arc<dyn LlmClient>,
    tools: Arc<dyn ToolInvoker>,
}

impl DoctorExpert {
    pub fn new(llm: Arc<dyn LlmClient>, tools: Arc<dyn ToolInvoker>) -> Self {
        Self { llm, tools }
    }
}

/// `{total_count, doctors: [...]}` 或直接是数组
fn doctor_list(payload: Value) -> Vec<Value> {
    match payload {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("doctors") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        other => {
            tracing::warn!(payload = %other, "unrecognized doctor list format");
            Vec::new()
        }
    }
}

#[async_trait]
impl Expert for DoctorExpert {
    fn kind(&self) -> ExpertKind {
        ExpertKind::Doctor
    }

    async fn process(&self, ctx: &mut Context) -> ExpertResult {
        let traced = TracedTools::new(self.tools.clone());
        let outcome = traced.call(DOCTOR_TOOL, json!({ "status": "online" })).await;
        let doctors = if outcome.success {
            doctor_list(extract_tool_payload(&outcome))
        } else {
            tracing::warn!(error = ?outcome.error, "doctor list query failed");
            Vec::new()
        };
        tracing::info!(count = doctors.len(), "doctors available");

        let prompt = format!(
            "User question: {}\n\nDiagnosis:\n{}\n\nAvailable doctors:\n{}\n\n\
             Recommend:\n1. the most suitable doctors (by specialty match)\n2. why\n3. advice for the visit",
            ctx.goal,
            ctx.diagnosis.as_deref().unwrap_or("(no diagnosis available)"),
            serde_json::to_string_pretty(&doctors).unwrap_or_default(),
        );
        let messages = vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)];
        let options = CompletionOptions::new().temperature(0.3);

        match complete_text(self.llm.as_ref(), &messages, &options).await {
            Ok(recommendation) => {
                ctx.doctor_recommendation = Some(recommendation.clone());
                ExpertResult::success(
                    self.kind(),
                    ExpertPayload::Doctor {
                        doctors,
                        recommendation,
                    },
                )
                .with_tool_calls(traced.take_records())
            }
            Err(e) => {
                tracing::error!(error = %e, "doctor recommendation failed");
                ExpertResult::failure(self.kind(), e.to_string()).with_tool_calls(traced.take_records())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::tools::{local_registry, HealthRecordStore};

    #[tokio::test]
    async fn test_recommends_from_online_doctors() {
        let llm = Arc::new(ScriptedLlmClient::with_replies(["See the endocrinologist."]));
        let tools = Arc::new(local_registry(Arc::new(HealthRecordStore::new())));
        let expert = DoctorExpert::new(llm.clone(), tools);
        let mut ctx = Context::new("u1", "which doctor should I see?");
        ctx.diagnosis = Some("elevated fasting glucose".into());

        let result = expert.process(&mut ctx).await;
        assert!(result.success);
        match &result.payload {
            ExpertPayload::Doctor { doctors, .. } => assert_eq!(doctors.len(), 3),
            other => panic!("unexpected payload: {other:?}"),
        }
        assert_eq!(result.tool_calls[0].input, json!({"status": "online"}));
        assert_eq!(ctx.doctor_recommendation.as_deref(), Some("See the endocrinologist."));
        assert!(llm.requests()[0][1].content.contains("elevated fasting glucose"));
    }

    #[test]
    fn test_doctor_list_shapes() {
        assert_eq!(doctor_list(json!([{"name": "a"}])).len(), 1);
        assert_eq!(doctor_list(json!({"total_count": 1, "doctors": [{"name": "a"}]})).len(), 1);
        assert!(doctor_list(json!("nope")).is_empty());
    }
}
