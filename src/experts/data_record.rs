//! 数据记录专家：从用户输入中抽取血糖 / 血压 / 体重读数并写入
//!
//! 流程：一次抽取请求 → 逐条处理：
//! - `needs_confirmation` 的记录不写入，列为待确认
//! - 相对变化（`is_relative`）查询 30 天历史，以该类型最近一条为基准计算新值；找不到基准则列为待确认
//! - 其余记录标准化测量时间后调用 `add_health_record`
//!
//! 只有全部写入都失败时整体才算失败。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::core::json::{decode_json_reply, preview_chars};
use crate::core::schema::reply_schema_json;
use crate::core::Context;
use crate::experts::{
    Expert, ExpertKind, ExpertPayload, ExpertResult, PendingConfirmation, RecordWrite,
};
use crate::llm::{complete_text, CompletionOptions, LlmClient};
use crate::memory::Message;
use crate::tools::{extract_tool_payload, normalize_measure_time, ToolInvoker, TracedTools};

const QUERY_TOOL: &str = "query_user_health_records";
const ADD_TOOL: &str = "add_health_record";
const BASELINE_DAYS: i64 = 30;

/// 抽取出的一条读数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ParsedRecord {
    /// glucose / pressure / weight
    #[serde(rename = "type")]
    pub record_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// 血糖测量类型：fasting / postprandial / random
    #[serde(rename = "measureType", default, skip_serializing_if = "Option::is_none")]
    pub measure_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measure_time: Option<String>,
    /// 相对上次的变化（此时 value 为空，由 change 计算）
    #[serde(default)]
    pub is_relative: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<f64>,
    /// 明显不合理的读数
    #[serde(default)]
    pub needs_confirmation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub systolic: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diastolic: Option<f64>,
}

/// 抽取回复：`{has_data, records}`
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ExtractionReply {
    #[serde(default)]
    pub has_data: bool,
    #[serde(default)]
    pub records: Vec<ParsedRecord>,
}

fn system_prompt() -> String {
    let now = Local::now().format("%Y-%m-%dT%H:%M:%S");
    format!(
        "You are DataRecordExpert. Extract health readings from the user's message.\n\n\
         Current date and time: {now}\n\n\
         Supported types (only these three):\n\
         - glucose (mmol/L): always set measureType to fasting, postprandial or random\n\
         - pressure (mmHg): set systolic and diastolic\n\
         - weight (kg)\n\n\
         Relative changes (\"dropped by 2\", \"up 0.5 since last time\"): set is_relative=true and change \
         (negative for decreases) and leave value empty; the system computes the value from history.\n\
         Plausibility: weight <30 or >200 kg, glucose <2 or >20 mmol/L, pressure <80/50 or >180/110 mmHg \
         are implausible; set needs_confirmation=true with a confirmation_reason.\n\
         Times: \"now\", \"today\" and \"just now\" mean the current time; \"this morning\" means today 08:00:00. \
         Write measure_time as YYYY-MM-DDTHH:MM:SS.\n\
         If the message contains no readings, reply with has_data=false."
    )
}

pub struct DataRecordExpert {
    llm: Arc<dyn LlmClient>,
    tools: Arc<dyn ToolInvoker>,
}

impl DataRecordExpert {
    pub fn new(llm: Arc<dyn LlmClient>, tools: Arc<dyn ToolInvoker>) -> Self {
        Self { llm, tools }
    }

    /// 该类型最近一条历史读数（血压不支持相对值）
    async fn baseline(&self, traced: &TracedTools, user_id: &str, record_type: &str) -> Option<f64> {
        let key = match record_type {
            "weight" => "weight",
            "glucose" => "value",
            _ => return None,
        };
        let outcome = traced
            .call(QUERY_TOOL, json!({ "user_id": user_id, "days": BASELINE_DAYS }))
            .await;
        if !outcome.success {
            return None;
        }
        let payload = extract_tool_payload(&outcome);
        let latest = payload
            .get("health_records")?
            .get(record_type)?
            .as_array()?
            .last()?
            .get(key)?;
        match latest {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// add_health_record 的 record_data
fn record_data(record: &ParsedRecord) -> Map<String, Value> {
    let mut data = Map::new();
    if let Some(v) = record.value {
        data.insert("value".into(), json!(v));
    }
    if let Some(unit) = &record.unit {
        data.insert("unit".into(), json!(unit));
    }
    if record.record_type == "glucose" {
        let measure_type = record.measure_type.as_deref().unwrap_or("random");
        data.insert("measureType".into(), json!(measure_type));
    }
    if record.record_type == "pressure" {
        if let Some(s) = record.systolic {
            data.insert("systolic".into(), json!(s));
        }
        if let Some(d) = record.diastolic {
            data.insert("diastolic".into(), json!(d));
        }
    }
    data
}

fn analysis_text(writes: &[RecordWrite], pending: &[PendingConfirmation]) -> String {
    let mut sections = Vec::new();
    if !pending.is_empty() {
        let lines: Vec<String> = pending
            .iter()
            .map(|p| {
                let what = match (&p.value, p.change) {
                    (Some(v), _) => v.to_string(),
                    (None, Some(c)) => format!("change of {c:+}"),
                    (None, None) => "-".to_string(),
                };
                format!("- {}: {what} (reason: {})", p.record_type, p.reason)
            })
            .collect();
        sections.push(format!("The following readings need your confirmation:\n{}", lines.join("\n")));
    }
    let ok: Vec<&RecordWrite> = writes.iter().filter(|w| w.success).collect();
    if !ok.is_empty() {
        let lines: Vec<String> = ok
            .iter()
            .map(|w| format!("- {}: {}", w.record_type, w.data))
            .collect();
        sections.push(format!(
            "Recorded the following readings:\n{}\n{} record(s) saved.",
            lines.join("\n"),
            ok.len()
        ));
    }
    let failed: Vec<&RecordWrite> = writes.iter().filter(|w| !w.success).collect();
    if !failed.is_empty() {
        let lines: Vec<String> = failed
            .iter()
            .map(|w| format!("- {}: {}", w.record_type, w.error.as_deref().unwrap_or("unknown error")))
            .collect();
        sections.push(format!("Failed to record:\n{}", lines.join("\n")));
    }
    if sections.is_empty() {
        "No health readings found in the message.".to_string()
    } else {
        sections.join("\n\n")
    }
}

#[async_trait]
impl Expert for DataRecordExpert {
    fn kind(&self) -> ExpertKind {
        ExpertKind::DataRecord
    }

    async fn process(&self, ctx: &mut Context) -> ExpertResult {
        let prompt = format!(
            "User message: {}\n\nExtract the health readings it contains.\n\n\
             Reply with one JSON object matching this schema and nothing else:\n{}",
            ctx.goal,
            reply_schema_json::<ExtractionReply>(),
        );
        let messages = vec![Message::system(system_prompt()), Message::user(prompt)];
        let options = CompletionOptions::new().temperature(0.2);
        let text = match complete_text(self.llm.as_ref(), &messages, &options).await {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(error = %e, "record extraction failed");
                return ExpertResult::failure(self.kind(), e.to_string());
            }
        };
        tracing::info!(reply = %preview_chars(&text, 200), "record extraction reply");

        let reply = decode_json_reply::<ExtractionReply>(&text).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "undecodable extraction reply, treating as no data");
            ExtractionReply::default()
        });

        let traced = TracedTools::new(self.tools.clone());
        let mut writes: Vec<RecordWrite> = Vec::new();
        let mut pending: Vec<PendingConfirmation> = Vec::new();

        if reply.has_data {
            tracing::info!(count = reply.records.len(), "processing extracted records");
            for parsed in &reply.records {
                let mut record = parsed.clone();
                if record.needs_confirmation {
                    tracing::warn!(record_type = %record.record_type, reason = ?record.confirmation_reason, "reading needs confirmation");
                    pending.push(PendingConfirmation {
                        record_type: record.record_type.clone(),
                        value: record.value.map(|v| json!(v)),
                        change: None,
                        reason: record
                            .confirmation_reason
                            .clone()
                            .unwrap_or_else(|| "implausible reading, please confirm".to_string()),
                    });
                    continue;
                }

                if record.is_relative {
                    let change = record.change.unwrap_or(0.0);
                    match self.baseline(&traced, &ctx.user_id, &record.record_type).await {
                        Some(base) => {
                            tracing::info!(record_type = %record.record_type, base, change, "relative reading resolved");
                            record.value = Some(base + change);
                        }
                        None => {
                            tracing::warn!(record_type = %record.record_type, "no baseline for relative reading");
                            pending.push(PendingConfirmation {
                                record_type: record.record_type.clone(),
                                value: None,
                                change: record.change,
                                reason: format!(
                                    "no previous {} reading found to apply the change to; please give the current value",
                                    record.record_type
                                ),
                            });
                            continue;
                        }
                    }
                }

                let data = record_data(&record);
                let measure_time = normalize_measure_time(record.measure_time.as_deref().unwrap_or(""));
                let params = json!({
                    "user_id": ctx.user_id,
                    "record_type": record.record_type,
                    "record_data": Value::Object(data.clone()).to_string(),
                    "measure_time": measure_time,
                });
                let outcome = traced.call(ADD_TOOL, params).await;
                if !outcome.success {
                    tracing::error!(record_type = %record.record_type, error = ?outcome.error, "add_health_record failed");
                }
                writes.push(RecordWrite {
                    record_type: record.record_type.clone(),
                    data: Value::Object(data),
                    success: outcome.success,
                    error: outcome.error.clone(),
                });
            }
        }

        let analysis = analysis_text(&writes, &pending);
        let all_failed = !writes.is_empty() && writes.iter().all(|w| !w.success);
        let payload = ExpertPayload::DataRecord {
            has_new_data: reply.has_data,
            records_added: writes,
            pending_confirmations: pending,
            parsed_records: reply
                .records
                .iter()
                .filter_map(|r| serde_json::to_value(r).ok())
                .collect(),
            analysis,
        };
        let mut result = ExpertResult::success(self.kind(), payload).with_tool_calls(traced.take_records());
        if all_failed {
            result.success = false;
            result.error = Some("all health record writes failed".to_string());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::tools::{local_registry, HealthRecordStore, ToolRegistry};

    fn setup(reply: &str) -> (DataRecordExpert, Arc<HealthRecordStore>) {
        let store = Arc::new(HealthRecordStore::new());
        let tools = Arc::new(local_registry(store.clone()));
        let llm = Arc::new(ScriptedLlmClient::with_replies([reply]));
        (DataRecordExpert::new(llm, tools), store)
    }

    fn payload(result: &ExpertResult) -> (&Vec<RecordWrite>, &Vec<PendingConfirmation>) {
        match &result.payload {
            ExpertPayload::DataRecord {
                records_added,
                pending_confirmations,
                ..
            } => (records_added, pending_confirmations),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_records_absolute_glucose() {
        let (expert, store) = setup(
            r#"{"has_data": true, "records": [{"type": "glucose", "value": 7.3, "unit": "mmol/L", "measureType": "fasting", "measure_time": "2025-10-03 08:00"}]}"#,
        );
        let mut ctx = Context::new("u1", "record blood glucose 7.3 this morning");

        let result = expert.process(&mut ctx).await;
        assert!(result.success);
        let (writes, pending) = payload(&result);
        assert_eq!(writes.len(), 1);
        assert!(writes[0].success);
        assert!(pending.is_empty());
        assert_eq!(result.tool_calls[0].input["measure_time"], "2025-10-03T08:00:00");

        let stored = store.query("u1", 100_000, Some("glucose"));
        assert_eq!(stored["health_records"]["glucose"][0]["value"], 7.3);
        assert_eq!(stored["health_records"]["glucose"][0]["measureType"], "fasting");
    }

    #[tokio::test]
    async fn test_relative_weight_uses_latest_baseline() {
        let (expert, store) = setup(
            r#"{"has_data": true, "records": [{"type": "weight", "is_relative": true, "change": -2.0}]}"#,
        );
        let mut data = Map::new();
        data.insert("weight".into(), json!(80.0));
        store.add("u1", "weight", &data, "").unwrap();

        let mut ctx = Context::new("u1", "my weight dropped by 2kg");
        let result = expert.process(&mut ctx).await;
        let (writes, _) = payload(&result);
        assert_eq!(writes[0].data["value"], 78.0);
        assert_eq!(result.tool_calls[0].tool, QUERY_TOOL);
        assert_eq!(result.tool_calls[1].tool, ADD_TOOL);
    }

    #[tokio::test]
    async fn test_relative_without_baseline_is_pending() {
        let (expert, store) = setup(
            r#"{"has_data": true, "records": [{"type": "weight", "is_relative": true, "change": -2.0}]}"#,
        );
        let mut ctx = Context::new("u1", "my weight dropped by 2kg");
        let result = expert.process(&mut ctx).await;
        assert!(result.success);
        let (writes, pending) = payload(&result);
        assert!(writes.is_empty());
        assert_eq!(pending[0].change, Some(-2.0));
        assert_eq!(store.query("u1", 30, None)["health_records"]["weight"], json!([]));
    }

    #[tokio::test]
    async fn test_implausible_reading_not_written() {
        let (expert, _) = setup(
            r#"{"has_data": true, "records": [{"type": "weight", "value": 500, "needs_confirmation": true, "confirmation_reason": "500kg is implausible"}]}"#,
        );
        let mut ctx = Context::new("u1", "I weigh 500kg");
        let result = expert.process(&mut ctx).await;
        let (writes, pending) = payload(&result);
        assert!(writes.is_empty());
        assert_eq!(pending[0].reason, "500kg is implausible");
        assert!(result.tool_calls.is_empty());
        assert!(result.primary_text().unwrap().contains("confirmation"));
    }

    #[tokio::test]
    async fn test_all_writes_failed_marks_failure() {
        let llm = Arc::new(ScriptedLlmClient::with_replies([
            r#"{"has_data": true, "records": [{"type": "glucose", "value": 6.1}]}"#,
        ]));
        let expert = DataRecordExpert::new(llm, Arc::new(ToolRegistry::new()));
        let mut ctx = Context::new("u1", "glucose 6.1");
        let result = expert.process(&mut ctx).await;
        assert!(!result.success);
        assert_eq!(payload(&result).0.len(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_reply_means_no_data() {
        let (expert, _) = setup("I could not find anything.");
        let mut ctx = Context::new("u1", "hello");
        let result = expert.process(&mut ctx).await;
        assert!(result.success);
        assert_eq!(result.primary_text(), Some("No health readings found in the message."));
    }
}
