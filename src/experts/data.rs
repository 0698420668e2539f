//! 数据专家：以 ReAct 方式查询并分析健康记录，把最后一次成功查询的结果发布为 `health_data`

use serde_json::{json, Value};

use crate::core::Context;
use crate::experts::analysis::analyze_trend;
use crate::experts::react_expert::tool_action;
use crate::experts::{ExpertKind, ExpertPayload, ReactSpecialist};
use crate::react::actions::ActionFuture;
use crate::react::{ActionSet, ReActOutcome};
use crate::tools::{ToolCallRecord, TracedTools};

const QUERY_TOOL: &str = "query_user_health_records";

const SYSTEM_PROMPT: &str = "You are DataExpert, a health-data analyst working in ReAct mode.\n\n\
Your job: query the user's health records step by step, identify trends, outliers and key patterns, \
and draw objective conclusions from the actual data.\n\n\
Strategy: start with a basic query (the last 7 days), widen the range if needed, analyse trends, \
compute statistics and point out risk values. State facts only, no diagnosis.\n\n\
Call finish as soon as the data answers the task; three to five iterations are usually enough.";

#[derive(Debug, Clone, Copy, Default)]
pub struct DataSpecialist;

/// 查询类动作：days 缺省为 default_days，record_type 固定
fn query_action(
    tools: &TracedTools,
    user_id: &str,
    default_days: i64,
    record_type: Option<&'static str>,
) -> impl Fn(Value) -> ActionFuture + Send + Sync + 'static {
    let tools = tools.clone();
    let user_id = user_id.to_string();
    move |args: Value| {
        let tools = tools.clone();
        let mut params = json!({
            "user_id": user_id,
            "days": args.get("days").and_then(Value::as_i64).unwrap_or(default_days),
        });
        if let Some(t) = record_type {
            params["record_type"] = json!(t);
        }
        Box::pin(async move { tool_action(&tools, QUERY_TOOL, params).await })
    }
}

/// 记录中是否至少有一条读数
fn has_records(data: &Value) -> bool {
    data.get("health_records")
        .and_then(Value::as_object)
        .is_some_and(|groups| {
            groups
                .values()
                .any(|v| v.as_array().is_some_and(|a| !a.is_empty()))
        })
}

impl ReactSpecialist for DataSpecialist {
    fn kind(&self) -> ExpertKind {
        ExpertKind::Data
    }

    fn system_prompt(&self) -> String {
        SYSTEM_PROMPT.to_string()
    }

    fn actions(&self, ctx: &Context, tools: &TracedTools) -> ActionSet {
        let user_id = ctx.user_id.as_str();
        ActionSet::new()
            .with_action(
                "query_recent_data",
                "query all health records of the last N days (days: default 7)",
                query_action(tools, user_id, 7, None),
            )
            .with_action(
                "query_glucose_data",
                "query glucose records only (days: default 30)",
                query_action(tools, user_id, 30, Some("glucose")),
            )
            .with_action(
                "query_pressure_data",
                "query blood pressure records only (days: default 30)",
                query_action(tools, user_id, 30, Some("pressure")),
            )
            .with_action(
                "analyze_trend",
                "statistics and trend of a record list (data_list: records, data_type: glucose/pressure/weight)",
                |args: Value| async move {
                    let data_type = args
                        .get("data_type")
                        .and_then(Value::as_str)
                        .ok_or("missing argument: data_type")?;
                    let list = args
                        .get("data_list")
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default();
                    Ok(analyze_trend(&list, data_type))
                },
            )
    }

    fn conclude(
        &self,
        ctx: &mut Context,
        _outcome: &ReActOutcome,
        calls: &[ToolCallRecord],
    ) -> ExpertPayload {
        let latest = calls
            .iter()
            .rev()
            .find(|c| c.tool == QUERY_TOOL && c.success)
            .map(|c| c.output.clone());
        let has_data = latest.as_ref().is_some_and(has_records);
        if latest.is_some() {
            ctx.health_data = latest.clone();
        }
        tracing::info!(has_data, queries = calls.len(), "data analysis concluded");

        ExpertPayload::Data {
            has_data,
            health_data: latest,
        }
    }
}
