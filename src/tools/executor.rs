//! 工具执行器
//!
//! 包装任意 ToolInvoker 并施加统一超时：call_tool 在超时内调用内部 invoker，
//! 超时转为失败结果；每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::timeout;

use crate::tools::{ToolInvoker, ToolOutcome};

/// 工具执行器：对每次调用施加超时，并输出审计日志
pub struct ToolExecutor {
    inner: Arc<dyn ToolInvoker>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(inner: Arc<dyn ToolInvoker>, timeout_secs: u64) -> Self {
        Self {
            inner,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ToolInvoker for ToolExecutor {
    async fn call_tool(&self, name: &str, parameters: Value) -> ToolOutcome {
        let start = Instant::now();
        let args_preview = args_preview(&parameters);
        let result = timeout(self.timeout, self.inner.call_tool(name, parameters)).await;

        let outcome = match &result {
            Ok(o) if o.success => "ok",
            Ok(_) => "error",
            Err(_) => "timeout",
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": name,
            "ok": outcome == "ok",
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(o) => o,
            Err(_) => ToolOutcome::failure(format!(
                "tool {} timed out after {}s",
                name,
                self.timeout.as_secs_f32()
            )),
        }
    }

    fn tool_names(&self) -> Vec<String> {
        self.inner.tool_names()
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Slow;

    #[async_trait]
    impl ToolInvoker for Slow {
        async fn call_tool(&self, name: &str, _parameters: Value) -> ToolOutcome {
            if name == "slow" {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            ToolOutcome::ok(json!({"tool": name}))
        }
    }

    #[tokio::test]
    async fn test_timeout_becomes_failure() {
        let exec = ToolExecutor::new(Arc::new(Slow), 30).with_timeout(Duration::from_millis(20));
        let out = exec.call_tool("slow", json!({})).await;
        assert!(!out.success);
        assert!(out.error.unwrap().contains("timed out"));

        let fast = exec.call_tool("fast", json!({})).await;
        assert_eq!(fast.data, Some(json!({"tool": "fast"})));
    }

    #[test]
    fn test_args_preview_truncates() {
        let long = json!({"text": "x".repeat(500)});
        assert!(args_preview(&long).ends_with("..."));
    }
}
