//! 运行过程事件：计划、专家进度、ReAct 步骤、计划调整与最终回复，供前端或日志订阅

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use crate::core::plan::Task;

/// 单个过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// 计划已生成
    PlanCreated { tasks: Vec<Task>, reasoning: String },
    /// 开始执行某个任务（index 从 1 开始）
    ExpertStarted {
        expert: String,
        task: String,
        index: usize,
        total: usize,
    },
    /// 任务完成
    ExpertCompleted { expert: String, report: String },
    /// 任务失败（已记录为失败结果）
    ExpertFailed { expert: String, error: String },
    /// 计划中的专家不存在，已跳过
    ExpertSkipped { expert: String },
    /// ReAct 单步（思考 + 动作 + 观察预览）
    ReactStep {
        expert: String,
        step: usize,
        thought: String,
        action: Option<String>,
        observation_preview: Option<String>,
    },
    /// 工具调用
    ToolCall { tool: String, args: Value },
    /// 剩余计划被调整
    PlanAdjusted {
        after_expert: String,
        reason: String,
        remaining: Vec<Task>,
    },
    /// 守门专家判断信息不足，直接进入综合
    ShortCircuit { reason: String },
    /// 最终回复
    FinalResponse { text: String },
    /// 错误（运行仍会给出兜底回复）
    Error { text: String },
}

pub type EventSender = UnboundedSender<RunEvent>;

/// 有接收方则发送，接收方已关闭时忽略
pub fn send_event(tx: &Option<EventSender>, ev: RunEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}
