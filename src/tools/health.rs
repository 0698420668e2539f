//! 健康记录工具（内存存储）
//!
//! - `add_health_record`：写入一条血糖 / 血压 / 体重记录
//! - `query_user_health_records`：按用户、天数、类型查询，返回 `{health_records: {glucose, pressure, weight}}`
//!
//! 时间统一存为 `YYYY-MM-DDTHH:MM:SS`（本地时间）。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime};
use serde_json::{json, Map, Value};

use crate::tools::Tool;

pub const RECORD_TYPES: [&str; 3] = ["glucose", "pressure", "weight"];

const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const DATETIME_FORMATS: [&str; 7] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y年%m月%d日 %H:%M:%S",
    "%Y年%m月%d日 %H:%M",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%Y年%m月%d日"];

fn now_local() -> NaiveDateTime {
    Local::now().naive_local()
}

/// 解析常见时间写法；无法识别时返回 None
pub fn parse_measure_time(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
    {
        return Some(dt);
    }
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(text, f).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// 标准化为 ISO 8601（`YYYY-MM-DDTHH:MM:SS`）；空或无法识别时取当前本地时间
pub fn normalize_measure_time(text: &str) -> String {
    match parse_measure_time(text) {
        Some(dt) => dt.format(ISO_FORMAT).to_string(),
        None => {
            if !text.trim().is_empty() {
                tracing::warn!(input = %text, "unrecognized measure time, using current time");
            }
            now_local().format(ISO_FORMAT).to_string()
        }
    }
}

#[derive(Debug, Clone)]
struct StoredRecord {
    id: u64,
    record_type: String,
    fields: Map<String, Value>,
    measure_time: NaiveDateTime,
}

impl StoredRecord {
    fn to_json(&self) -> Value {
        let mut obj = self.fields.clone();
        obj.insert("recordId".into(), json!(self.id));
        obj.insert(
            "measureTime".into(),
            json!(self.measure_time.format(ISO_FORMAT).to_string()),
        );
        Value::Object(obj)
    }
}

/// 内存中的健康记录库；多个运行可并发访问
#[derive(Debug, Default)]
pub struct HealthRecordStore {
    inner: Mutex<HealthRecordInner>,
}

#[derive(Debug, Default)]
struct HealthRecordInner {
    next_id: u64,
    by_user: HashMap<String, Vec<StoredRecord>>,
}

impl HealthRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入一条记录；record_data 中 `value` 对体重会转存为 `weight`
    pub fn add(
        &self,
        user_id: &str,
        record_type: &str,
        record_data: &Map<String, Value>,
        measure_time: &str,
    ) -> Result<Value, String> {
        if !RECORD_TYPES.contains(&record_type) {
            return Err(format!("unsupported record type: {record_type}"));
        }
        let fields = normalize_fields(record_type, record_data)?;
        let measure_time = parse_measure_time(measure_time).unwrap_or_else(now_local);

        let mut inner = self.inner.lock().map_err(|_| "record store poisoned".to_string())?;
        inner.next_id += 1;
        let record = StoredRecord {
            id: inner.next_id,
            record_type: record_type.to_string(),
            fields,
            measure_time,
        };
        let out = record.to_json();
        inner
            .by_user
            .entry(user_id.to_string())
            .or_default()
            .push(record);
        Ok(out)
    }

    /// 查询最近 days 天的记录，按测量时间升序
    pub fn query(&self, user_id: &str, days: i64, record_type: Option<&str>) -> Value {
        let since = now_local() - Duration::days(days.max(0));
        let mut grouped: Map<String, Value> = RECORD_TYPES
            .iter()
            .map(|t| (t.to_string(), Value::Array(Vec::new())))
            .collect();

        if let Ok(inner) = self.inner.lock() {
            let mut records: Vec<&StoredRecord> = inner
                .by_user
                .get(user_id)
                .map(|v| v.iter().collect())
                .unwrap_or_default();
            records.sort_by_key(|r| (r.measure_time, r.id));
            for r in records {
                if r.measure_time < since {
                    continue;
                }
                if record_type.is_some_and(|t| t != r.record_type) {
                    continue;
                }
                if let Some(Value::Array(list)) = grouped.get_mut(&r.record_type) {
                    list.push(r.to_json());
                }
            }
        }

        json!({
            "user_id": user_id,
            "days": days,
            "health_records": Value::Object(grouped),
        })
    }
}

fn normalize_fields(record_type: &str, data: &Map<String, Value>) -> Result<Map<String, Value>, String> {
    let mut fields = Map::new();
    match record_type {
        "glucose" => {
            let value = number_field(data, "value").ok_or("glucose record needs a numeric value")?;
            fields.insert("value".into(), json!(value));
            let measure_type = data
                .get("measureType")
                .and_then(Value::as_str)
                .unwrap_or("random");
            fields.insert("measureType".into(), json!(measure_type));
            fields.insert("unit".into(), json!("mmol/L"));
        }
        "pressure" => {
            let systolic = number_field(data, "systolic").ok_or("pressure record needs systolic")?;
            let diastolic = number_field(data, "diastolic").ok_or("pressure record needs diastolic")?;
            fields.insert("systolic".into(), json!(systolic));
            fields.insert("diastolic".into(), json!(diastolic));
            fields.insert("unit".into(), json!("mmHg"));
        }
        _ => {
            let weight = number_field(data, "weight")
                .or_else(|| number_field(data, "value"))
                .ok_or("weight record needs a numeric value")?;
            fields.insert("weight".into(), json!(weight));
            fields.insert("unit".into(), json!("kg"));
        }
    }
    Ok(fields)
}

/// 数字字段（也接受数字字符串）
pub(crate) fn number_field(data: &Map<String, Value>, key: &str) -> Option<f64> {
    match data.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn str_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("missing argument: {key}"))
}

/// `add_health_record(user_id, record_type, record_data, measure_time)`
pub struct AddHealthRecordTool {
    store: Arc<HealthRecordStore>,
}

impl AddHealthRecordTool {
    pub fn new(store: Arc<HealthRecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for AddHealthRecordTool {
    fn name(&self) -> &str {
        "add_health_record"
    }

    fn description(&self) -> &str {
        "Add a health record (glucose, pressure or weight) for a user"
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let user_id = str_arg(&args, "user_id")?;
        let record_type = str_arg(&args, "record_type")?;
        // record_data 可为 JSON 字符串或对象
        let data = match args.get("record_data") {
            Some(Value::String(s)) => serde_json::from_str::<Value>(s)
                .map_err(|e| format!("record_data is not valid JSON: {e}"))?,
            Some(v) => v.clone(),
            None => return Err("missing argument: record_data".into()),
        };
        let data = data
            .as_object()
            .ok_or_else(|| "record_data must be an object".to_string())?;
        let measure_time = args.get("measure_time").and_then(Value::as_str).unwrap_or("");
        self.store.add(user_id, record_type, data, measure_time)
    }
}

/// `query_user_health_records(user_id, days, record_type?)`
pub struct QueryHealthRecordsTool {
    store: Arc<HealthRecordStore>,
}

impl QueryHealthRecordsTool {
    pub fn new(store: Arc<HealthRecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for QueryHealthRecordsTool {
    fn name(&self) -> &str {
        "query_user_health_records"
    }

    fn description(&self) -> &str {
        "Query a user's health records from the last N days"
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let user_id = str_arg(&args, "user_id")?;
        let days = args.get("days").and_then(Value::as_i64).unwrap_or(30);
        let record_type = args.get("record_type").and_then(Value::as_str);
        Ok(self.store.query(user_id, days, record_type))
    }
}
