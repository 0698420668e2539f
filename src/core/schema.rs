//! 结构化回复的 JSON Schema（schemars 生成）
//!
//! 拼入 Prompt，告诉 LLM 合法回复的结构，减少格式错误。

use schemars::{schema_for, JsonSchema};

/// 返回类型 T 的 JSON Schema 字符串
pub fn reply_schema_json<T: JsonSchema>() -> String {
    let schema = schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}
