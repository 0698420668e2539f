//! 专家层：统一的 `process(&mut Context) -> ExpertResult` 契约
//!
//! 两类实现：
//! - 直接完成型：固定次数的 LLM 调用 + 有限次工具调用（DataRecord / Knowledge / Diagnosis / Doctor / Synthesis）
//! - ReAct 型：整个 process 交给 ReAct 循环（Consultation / Data）
//!
//! 任何失败都转成 `success: false` 的结果，不会传到执行器之外。

pub mod analysis;
pub mod consultation;
pub mod data;
pub mod data_record;
pub mod diagnosis;
pub mod doctor;
pub mod kind;
pub mod knowledge;
pub mod react_expert;
pub mod registry;
pub mod result;
pub mod synthesis;

use async_trait::async_trait;

use crate::core::Context;

pub use consultation::ConsultationSpecialist;
pub use data::DataSpecialist;
pub use data_record::DataRecordExpert;
pub use diagnosis::DiagnosisExpert;
pub use doctor::DoctorExpert;
pub use kind::ExpertKind;
pub use knowledge::KnowledgeExpert;
pub use react_expert::{ReactExpert, ReactSettings, ReactSpecialist};
pub use registry::ExpertRegistry;
pub use result::{ExpertPayload, ExpertResult, PendingConfirmation, ReactSummary, RecordWrite};
pub use synthesis::SynthesisExpert;

#[async_trait]
pub trait Expert: Send + Sync {
    fn kind(&self) -> ExpertKind;

    /// 执行一次委派任务；从 context 读取输入，并可写入供后续专家使用的字段
    async fn process(&self, ctx: &mut Context) -> ExpertResult;
}

/// 任务描述缺省时的目标
pub(crate) fn task_goal(ctx: &Context, kind: ExpertKind) -> String {
    ctx.assigned_task
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| format!("Carry out the responsibilities of {kind}"))
}

/// 历史对话的 JSON 文本；无历史时返回占位
pub(crate) fn history_text(ctx: &Context, n: usize, chars: usize) -> String {
    let recent = ctx.recent_history(n, chars);
    if recent.is_empty() {
        "(no previous conversation)".to_string()
    } else {
        serde_json::to_string_pretty(&recent).unwrap_or_default()
    }
}
