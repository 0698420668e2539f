//! ReAct 步骤与 Think 回复格式

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 保留动作名：结束循环
pub const FINISH_ACTION: &str = "finish";

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// Think 阶段选择的动作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ActionCall {
    /// 动作名（可用动作之一，或 finish）
    pub name: String,
    /// 动作参数（JSON 对象）
    #[serde(default = "empty_object")]
    pub parameters: Value,
}

impl ActionCall {
    pub fn new(name: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }

    pub fn is_finish(&self) -> bool {
        self.name == FINISH_ACTION
    }
}

/// Think 回复：`{thought, action?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ThoughtReply {
    /// 推理过程
    pub thought: String,
    /// 下一步动作；省略表示本轮只思考
    #[serde(default)]
    pub action: Option<ActionCall>,
}

/// 一轮迭代的记录；observation 保留未截断的原值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReActStep {
    pub step_num: usize,
    pub thought: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reflection: Option<String>,
}

impl ReActStep {
    pub fn new(step_num: usize, thought: impl Into<String>) -> Self {
        Self {
            step_num,
            thought: thought.into(),
            action: None,
            observation: None,
            reflection: None,
        }
    }
}
