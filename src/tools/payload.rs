//! 工具返回数据的嵌套载荷提取
//!
//! 远端工具常把真实结果包成 `{"structuredContent": {"result": "<json>"}}` 或
//! `{"content": [{"text": "<json>"}]}`。按顺序尝试：
//! structuredContent.result → content[0].text → data 本身。

use serde_json::Value;

use crate::tools::ToolOutcome;

/// 从 ToolOutcome 中取出业务数据；无 data 时为 Null
pub fn extract_tool_payload(outcome: &ToolOutcome) -> Value {
    match &outcome.data {
        Some(data) => extract_nested(data),
        None => Value::Null,
    }
}

/// 对 data 字段做嵌套解包；解析失败时退回下一候选
pub fn extract_nested(data: &Value) -> Value {
    if let Some(result) = data
        .get("structuredContent")
        .and_then(|s| s.get("result"))
        .and_then(Value::as_str)
    {
        match serde_json::from_str::<Value>(result) {
            Ok(parsed) => return parsed,
            Err(e) => tracing::warn!(error = %e, "structuredContent.result is not JSON"),
        }
    }

    if let Some(text) = data
        .get("content")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(|first| first.get("text"))
        .and_then(Value::as_str)
    {
        match serde_json::from_str::<Value>(text) {
            Ok(parsed) => return parsed,
            Err(e) => tracing::warn!(error = %e, "content[0].text is not JSON"),
        }
    }

    data.clone()
}
