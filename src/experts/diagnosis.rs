//! 诊断专家：结合问题、历史对话与健康数据做一次风险评估

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::Context;
use crate::experts::{history_text, Expert, ExpertKind, ExpertPayload, ExpertResult};
use crate::llm::{complete_text, CompletionOptions, LlmClient};
use crate::memory::Message;

const SYSTEM_PROMPT: &str = "You are DiagnosisExpert, a medical assessment specialist. \
Analyse the symptoms and signs the user describes, assess diabetes-related health risks and possible \
complications, and base every statement on the actual readings provided (quote the values and compare \
them with clinical reference ranges). State a risk level: mild, moderate or high. \
Do not give lifestyle advice and do not repeat the data analysis; keep it concise and professional.";

pub struct DiagnosisExpert {
    llm: Arc<dyn LlmClient>,
}

impl DiagnosisExpert {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Expert for DiagnosisExpert {
    fn kind(&self) -> ExpertKind {
        ExpertKind::Diagnosis
    }

    async fn process(&self, ctx: &mut Context) -> ExpertResult {
        let health_data = ctx
            .health_data
            .as_ref()
            .map(|d| serde_json::to_string_pretty(d).unwrap_or_default())
            .unwrap_or_else(|| "{}".to_string());
        let prompt = format!(
            "Analyse the following situation.\n\nCurrent question: {}\n\n\
             Previous conversation:\n{}\n\nHealth data:\n{health_data}\n\n\
             Take the symptoms mentioned earlier in the conversation into account. Provide:\n\
             1. symptom analysis\n2. possible health risks\n3. points to watch",
            ctx.goal,
            history_text(ctx, 10, 200),
        );
        let messages = vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)];
        let options = CompletionOptions::new().temperature(0.3);

        match complete_text(self.llm.as_ref(), &messages, &options).await {
            Ok(analysis) => {
                ctx.diagnosis = Some(analysis.clone());
                ExpertResult::success(self.kind(), ExpertPayload::Diagnosis { analysis })
            }
            Err(e) => {
                tracing::error!(error = %e, "diagnosis failed");
                ExpertResult::failure(self.kind(), e.to_string())
            }
        }
    }
}
