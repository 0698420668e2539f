//! HTTP 工具调用
//!
//! 将 `{"tool": name, "parameters": {...}}` POST 到配置的端点，响应体须为
//! `{"success": bool, "data"?: any, "error"?: string}`；网络错误与非 2xx 状态都转为失败结果。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::tools::{ToolInvoker, ToolOutcome};

pub struct HttpToolInvoker {
    client: Client,
    endpoint: String,
}

impl HttpToolInvoker {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ToolInvoker for HttpToolInvoker {
    async fn call_tool(&self, name: &str, parameters: Value) -> ToolOutcome {
        let body = serde_json::json!({ "tool": name, "parameters": parameters });
        let resp = match self.client.post(&self.endpoint).json(&body).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "tool endpoint unreachable");
                return ToolOutcome::failure(format!("request failed: {e}"));
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return ToolOutcome::failure(format!("HTTP {}: {}", status.as_u16(), text));
        }

        match resp.json::<ToolOutcome>().await {
            Ok(outcome) => outcome,
            Err(e) => ToolOutcome::failure(format!("invalid tool response: {e}")),
        }
    }
}
