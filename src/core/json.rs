//! 结构化回复解码与 Observation 渲染
//!
//! LLM 回复须包含一个 JSON 对象（可被 ```json 代码块包裹）。解码为严格的
//! decode-or-fail：返回 `Result<T, DecodeError>`，由调用方显式选择回退值。

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::DecodeError;

/// 喂回 Think 的 Observation 最大字符数
pub const OBSERVATION_LIMIT: usize = 2000;

/// 截断标记
pub const TRUNCATION_MARKER: &str = "\n... (truncated)";

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n?(.*?)```").expect("static fence regex")
    })
}

/// 取出回复中的 JSON 文本：优先第一个代码块内容，否则整段文本
fn json_body(text: &str) -> &str {
    let trimmed = text.trim();
    match fence_regex().captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => trimmed,
    }
}

/// 将 LLM 文本回复解码为 T；不是 JSON 对象或字段不匹配时返回 DecodeError
pub fn decode_json_reply<T: DeserializeOwned>(text: &str) -> Result<T, DecodeError> {
    let body = json_body(text);
    if !body.starts_with('{') {
        return Err(DecodeError::NoJsonObject);
    }
    serde_json::from_str(body).map_err(|e| DecodeError::InvalidJson(e.to_string()))
}

/// Observation 转文本：字符串原样输出，其余 JSON 美化输出
pub fn render_observation(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// 按字符截断（不切断 UTF-8），超出时追加截断标记
pub fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

/// 按字符截取前 limit 个字符，不加标记（用于历史消息预览）
pub fn preview_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Reply {
        thought: String,
    }

    #[test]
    fn test_decode_plain_object() {
        let r: Reply = decode_json_reply(r#"  {"thought": "check data"} "#).unwrap();
        assert_eq!(r.thought, "check data");
    }

    #[test]
    fn test_decode_fenced_object_with_prose() {
        let text = "Here is my decision:\n```json\n{\"thought\": \"fenced\"}\n```\nthanks";
        let r: Reply = decode_json_reply(text).unwrap();
        assert_eq!(r.thought, "fenced");
    }

    #[test]
    fn test_decode_bare_fence() {
        let r: Reply = decode_json_reply("```\n{\"thought\": \"bare\"}\n```").unwrap();
        assert_eq!(r.thought, "bare");
    }

    #[test]
    fn test_decode_rejects_prose() {
        let err = decode_json_reply::<Reply>("I think we should query data").unwrap_err();
        assert_eq!(err, DecodeError::NoJsonObject);
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        let err = decode_json_reply::<Reply>(r#"{"plan": []}"#).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidJson(_)));
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        let text = "血糖".repeat(1500);
        let out = truncate_chars(&text, OBSERVATION_LIMIT);
        assert!(out.ends_with(TRUNCATION_MARKER));
        assert_eq!(out.chars().count(), OBSERVATION_LIMIT + TRUNCATION_MARKER.chars().count());
        assert_eq!(truncate_chars("short", OBSERVATION_LIMIT), "short");
    }

    #[test]
    fn test_render_observation() {
        assert_eq!(render_observation(&Value::String("ok".into())), "ok");
        let rendered = render_observation(&serde_json::json!({"count": 3}));
        assert!(rendered.contains("\"count\": 3"));
    }
}
