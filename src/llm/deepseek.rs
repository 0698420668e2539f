//! DeepSeek 预设（OpenAI 兼容端点）
//!
//! - Base URL: https://api.deepseek.com
//! - 模型: deepseek-chat（常规对话）, deepseek-reasoner（思考模式，规划较慢）

use crate::llm::OpenAiClient;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";
pub const DEEPSEEK_REASONER: &str = "deepseek-reasoner";

/// 显式模型名优先，其次 `DEEPSEEK_MODEL`，最后 deepseek-chat；空白视为未设置
pub fn resolve_model(model: Option<&str>) -> String {
    model
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(String::from)
        .or_else(|| {
            std::env::var("DEEPSEEK_MODEL")
                .ok()
                .filter(|m| !m.trim().is_empty())
        })
        .unwrap_or_else(|| DEEPSEEK_CHAT.to_string())
}

/// 以给定 Key 创建 DeepSeek 客户端
pub fn create_deepseek_client(model: Option<&str>, api_key: &str) -> OpenAiClient {
    let model = resolve_model(model);
    if model == DEEPSEEK_REASONER {
        tracing::debug!("deepseek-reasoner selected, planning calls will be slower");
    }
    OpenAiClient::new(Some(DEEPSEEK_BASE_URL), &model, Some(api_key))
}
