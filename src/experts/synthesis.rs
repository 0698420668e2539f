//! 综合专家（终端）：整合已完成专家的结果，生成最终回复
//!
//! 问诊专家判定信息不足时，改为向用户提出其建议的问题（最多 3 个）。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::Context;
use crate::experts::{history_text, Expert, ExpertKind, ExpertPayload, ExpertResult};
use crate::llm::{complete_text, CompletionOptions, LlmClient};
use crate::memory::Message;

const MAX_QUESTIONS: usize = 3;

const SYSTEM_PROMPT: &str = "You are SynthesisExpert. You integrate the results of the other experts into \
the final reply to the user. First check the consultation assessment: if information is insufficient, ask \
the suggested questions in a friendly way and explain why they matter; otherwise integrate the analyses \
into one complete recommendation. Avoid repeating disclaimers and content the experts already gave, focus \
on what the user cares about most, ask at most 3 questions at a time and format the reply in Markdown.";

pub struct SynthesisExpert {
    llm: Arc<dyn LlmClient>,
}

impl SynthesisExpert {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

/// 成功结果的摘要：问诊结果保留判定字段，其余保留主要文本
fn summarize(results: &[ExpertResult]) -> Vec<Value> {
    results
        .iter()
        .filter(|r| r.success)
        .map(|r| match &r.payload {
            ExpertPayload::Consultation {
                info_sufficient,
                questions,
                reason,
            } => json!({
                "expert": r.expert,
                "info_sufficient": info_sufficient,
                "questions": questions,
                "reason": reason,
            }),
            _ => json!({
                "expert": r.expert,
                "content": r.primary_text().unwrap_or(""),
            }),
        })
        .collect()
}

fn questions_prompt(ctx: &Context, questions: &[String], reason: &str) -> String {
    let questions: Vec<&String> = questions.iter().take(MAX_QUESTIONS).collect();
    format!(
        "Current question: {}\n\nPrevious conversation:\n{}\n\n\
         Consultation assessment: information is insufficient, more needs to be collected.\n\
         Questions to ask: {}\nReason: {reason}\n\n\
         Ask these questions in a friendly, professional way:\n\
         1. briefly describe the current situation (use the conversation)\n\
         2. ask the questions (no more than 3)\n3. explain why the information matters",
        ctx.goal,
        history_text(ctx, 10, 200),
        serde_json::to_string(&questions).unwrap_or_default(),
    )
}

fn integrate_prompt(ctx: &Context, summary: &[Value]) -> String {
    format!(
        "Current question: {}\n\nPrevious conversation:\n{}\n\nExpert results:\n{}\n\n\
         Use the conversation to understand words like \"just now\" or \"before\". \
         Integrate the expert opinions into one concise, useful reply:\n\
         1. understand the user's full intent\n2. do not repeat what the experts already said\n\
         3. focus on what matters most to the user\n4. give clear advice and next steps\n5. use Markdown",
        ctx.goal,
        history_text(ctx, 10, 200),
        serde_json::to_string_pretty(summary).unwrap_or_default(),
    )
}

#[async_trait]
impl Expert for SynthesisExpert {
    fn kind(&self) -> ExpertKind {
        ExpertKind::Synthesis
    }

    async fn process(&self, ctx: &mut Context) -> ExpertResult {
        let summary = summarize(&ctx.prior_results);
        let insufficient = ctx.prior_results.iter().find_map(|r| match &r.payload {
            ExpertPayload::Consultation {
                info_sufficient: false,
                questions,
                reason,
            } => Some((questions.clone(), reason.clone())),
            _ => None,
        });

        let prompt = match &insufficient {
            Some((questions, reason)) => {
                tracing::info!(questions = questions.len(), "information insufficient, asking follow-up questions");
                questions_prompt(ctx, questions, reason)
            }
            None => integrate_prompt(ctx, &summary),
        };
        let messages = vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)];
        let options = CompletionOptions::new().temperature(0.4).max_tokens(3000);

        match complete_text(self.llm.as_ref(), &messages, &options).await {
            Ok(final_response) => ExpertResult::success(
                self.kind(),
                ExpertPayload::Synthesis {
                    final_response,
                    expert_count: summary.len(),
                },
            ),
            Err(e) => {
                tracing::error!(error = %e, "synthesis failed");
                ExpertResult::failure(self.kind(), e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;

    fn consultation(sufficient: bool) -> ExpertResult {
        ExpertResult::success(
            ExpertKind::Consultation,
            ExpertPayload::Consultation {
                info_sufficient: sufficient,
                questions: vec![
                    "When did you measure?".into(),
                    "Fasting or after a meal?".into(),
                    "Any symptoms?".into(),
                    "Any medication?".into(),
                ],
                reason: "measurement context missing".into(),
            },
        )
    }

    #[tokio::test]
    async fn test_asks_questions_when_insufficient() {
        let llm = Arc::new(ScriptedLlmClient::with_replies(["Could you tell me when you measured?"]));
        let mut ctx = Context::new("u1", "my glucose is 7.3, is that bad?");
        ctx.prior_results = vec![consultation(false)];

        let result = SynthesisExpert::new(llm.clone()).process(&mut ctx).await;
        assert!(result.success);
        assert_eq!(result.primary_text(), Some("Could you tell me when you measured?"));

        let prompt = &llm.requests()[0][1].content;
        assert!(prompt.contains("information is insufficient"));
        assert!(prompt.contains("Any symptoms?"));
        assert!(!prompt.contains("Any medication?"));
    }

    #[tokio::test]
    async fn test_integrates_successful_results() {
        let llm = Arc::new(ScriptedLlmClient::with_replies(["Overall: keep monitoring."]));
        let mut ctx = Context::new("u1", "evaluate my glucose");
        ctx.prior_results = vec![
            consultation(true),
            ExpertResult::success(
                ExpertKind::Diagnosis,
                ExpertPayload::Diagnosis {
                    analysis: "mild risk".into(),
                },
            ),
            ExpertResult::failure(ExpertKind::Doctor, "tool down"),
        ];

        let result = SynthesisExpert::new(llm.clone()).process(&mut ctx).await;
        match &result.payload {
            ExpertPayload::Synthesis {
                final_response,
                expert_count,
            } => {
                assert_eq!(final_response, "Overall: keep monitoring.");
                assert_eq!(*expert_count, 2);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
        let prompt = &llm.requests()[0][1].content;
        assert!(prompt.contains("mild risk"));
        assert!(!prompt.contains("DoctorExpert"));
    }
}
