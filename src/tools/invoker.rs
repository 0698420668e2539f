//! Tool Invoker 边界
//!
//! 引擎只通过 `ToolInvoker::call_tool(name, parameters)` 调用工具，返回结构化的 ToolOutcome；
//! 工具失败不是错误，而是 `success: false` 的数据，由调用方（专家 / ReAct 动作）自行解读。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 一次工具调用的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// 整个结果作为 JSON（写入调用轨迹）
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// 工具调用方：本地注册表、HTTP 端点或带超时/审计的包装
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn call_tool(&self, name: &str, parameters: Value) -> ToolOutcome;

    /// 可用工具名（未知时为空）
    fn tool_names(&self) -> Vec<String> {
        Vec::new()
    }
}
