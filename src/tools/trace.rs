//! 工具调用轨迹
//!
//! TracedTools 包装共享的 ToolInvoker，把专家（直接调用或经 ReAct 动作）发起的每次调用
//! 记录为 ToolCallRecord，最终附在 ExpertResult.tool_calls 上。

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::{extract_tool_payload, ToolInvoker, ToolOutcome};

/// 一次工具调用记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub input: Value,
    pub output: Value,
    pub success: bool,
}

/// 单次专家运行内的调用记录器；Clone 共享同一份记录
#[derive(Clone)]
pub struct TracedTools {
    invoker: Arc<dyn ToolInvoker>,
    records: Arc<Mutex<Vec<ToolCallRecord>>>,
}

impl TracedTools {
    pub fn new(invoker: Arc<dyn ToolInvoker>) -> Self {
        Self {
            invoker,
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 调用工具并记录（output 为提取后的载荷，失败时为错误信息）
    pub async fn call(&self, name: &str, parameters: Value) -> ToolOutcome {
        let outcome = self.invoker.call_tool(name, parameters.clone()).await;
        let output = if outcome.success {
            extract_tool_payload(&outcome)
        } else {
            serde_json::json!({ "error": outcome.error.clone().unwrap_or_default() })
        };
        if let Ok(mut records) = self.records.lock() {
            records.push(ToolCallRecord {
                tool: name.to_string(),
                input: parameters,
                output,
                success: outcome.success,
            });
        }
        outcome
    }

    /// 取走目前为止的全部记录
    pub fn take_records(&self) -> Vec<ToolCallRecord> {
        self.records
            .lock()
            .map(|mut r| std::mem::take(&mut *r))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolRegistry;
    use serde_json::json;

    #[tokio::test]
    async fn test_records_each_call() {
        let traced = TracedTools::new(Arc::new(ToolRegistry::new()));
        let clone = traced.clone();
        let out = clone.call("missing", json!({"q": 1})).await;
        assert!(!out.success);

        let records = traced.take_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tool, "missing");
        assert_eq!(records[0].input, json!({"q": 1}));
        assert!(!records[0].success);
        assert!(traced.take_records().is_empty());
    }
}
