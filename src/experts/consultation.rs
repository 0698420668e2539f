//! 问诊专家（守门）：以 ReAct 方式判断信息是否足以进行评估
//!
//! 结论取自 finish 动作的参数：`{info_sufficient, questions, reason}`；
//! 未给出时视为信息充足。充足与否只由 finish 决定，因此判断充足性的停止短语对本专家无效。

use serde_json::{json, Value};

use crate::core::Context;
use crate::experts::analysis::analyze_completeness;
use crate::experts::react_expert::tool_action;
use crate::experts::{ExpertKind, ExpertPayload, ReactSpecialist};
use crate::react::{ActionSet, ReActOutcome};
use crate::tools::{ToolCallRecord, TracedTools};

const SYSTEM_PROMPT: &str = "You are ConsultationExpert, a clinical intake specialist working in ReAct mode.\n\n\
Your job: gather and assess information step by step, decide whether it is enough for a health assessment, \
and if not, decide what to ask the user.\n\n\
Pay attention to symptoms (thirst, frequent urination, hunger, weight change, fatigue, blurred vision), \
measurements (glucose, blood pressure, height, weight, BMI), history (family history, past illness, medication) \
and lifestyle (diet, exercise, sleep).\n\n\
Strategy: query the existing health data, assess its completeness and recency, look up diagnostic criteria, \
compare, then conclude. Two to four iterations are usually enough.\n\n\
Finish by calling finish with parameters \
{\"info_sufficient\": true|false, \"questions\": [up to 3 questions for the user], \"reason\": \"...\"}.";

/// 描述充足性本身的短语；出现在思考中不代表任务结束
const SUFFICIENCY_PHRASES: [&str; 3] = ["information is sufficient", "sufficient information", "信息充足"];

#[derive(Debug, Clone, Copy, Default)]
pub struct ConsultationSpecialist;

impl ReactSpecialist for ConsultationSpecialist {
    fn kind(&self) -> ExpertKind {
        ExpertKind::Consultation
    }

    fn system_prompt(&self) -> String {
        SYSTEM_PROMPT.to_string()
    }

    fn stop_phrases(&self, configured: &[String]) -> Vec<String> {
        configured
            .iter()
            .filter(|p| {
                let p = p.to_lowercase();
                !SUFFICIENCY_PHRASES.iter().any(|s| p.contains(s) || s.contains(p.as_str()))
            })
            .cloned()
            .collect()
    }

    fn actions(&self, ctx: &Context, tools: &TracedTools) -> ActionSet {
        let user_id = ctx.user_id.clone();
        let query_tools = tools.clone();
        let search_tools = tools.clone();
        ActionSet::new()
            .with_action(
                "query_health_data",
                "query the user's health records (days: default 30, record_type: glucose/pressure/weight, optional)",
                move |args: Value| {
                    let tools = query_tools.clone();
                    let mut params = json!({
                        "user_id": user_id,
                        "days": args.get("days").and_then(Value::as_i64).unwrap_or(30),
                    });
                    if let Some(t) = args.get("record_type").and_then(Value::as_str) {
                        params["record_type"] = json!(t);
                    }
                    async move { tool_action(&tools, "query_user_health_records", params).await }
                },
            )
            .with_action(
                "search_knowledge",
                "search medical knowledge (query: keywords, top_k: default 3)",
                move |args: Value| {
                    let tools = search_tools.clone();
                    let params = json!({
                        "query": args.get("query").and_then(Value::as_str).unwrap_or_default(),
                        "top_k": args.get("top_k").and_then(Value::as_u64).unwrap_or(3),
                    });
                    async move {
                        let data = tool_action(&tools, "search_diabetes_knowledge", params).await?;
                        Ok(match data.get("search_results") {
                            Some(results) => results.clone(),
                            None => data,
                        })
                    }
                },
            )
            .with_action(
                "analyze_completeness",
                "check which record types are present (health_data: result of query_health_data)",
                |args: Value| async move {
                    let health_data = args.get("health_data").cloned().unwrap_or(Value::Null);
                    Ok(analyze_completeness(&health_data))
                },
            )
    }

    fn conclude(
        &self,
        _ctx: &mut Context,
        outcome: &ReActOutcome,
        _calls: &[ToolCallRecord],
    ) -> ExpertPayload {
        let params = outcome.finish_parameters.clone().unwrap_or(Value::Null);
        let info_sufficient = params
            .get("info_sufficient")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let questions = params
            .get("questions")
            .and_then(Value::as_array)
            .map(|qs| {
                qs.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let reason = params
            .get("reason")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| outcome.report.clone());
        tracing::info!(info_sufficient, "consultation concluded");

        ExpertPayload::Consultation {
            info_sufficient,
            questions,
            reason,
        }
    }
}
