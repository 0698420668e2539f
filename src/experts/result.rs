//! 专家结果
//!
//! 每个被执行的任务恰好产生一个 ExpertResult；失败也以结果形式记录（success = false），不会向上抛错。

use serde::Serialize;
use serde_json::Value;

use crate::experts::ExpertKind;
use crate::react::{ReActOutcome, ReActStep};
use crate::tools::ToolCallRecord;

/// 数据记录专家写入的一条记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordWrite {
    pub record_type: String,
    pub data: Value,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 需要用户确认、未写入的记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingConfirmation {
    pub record_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<f64>,
    pub reason: String,
}

/// 各专家的领域字段
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExpertPayload {
    #[default]
    None,
    DataRecord {
        has_new_data: bool,
        records_added: Vec<RecordWrite>,
        pending_confirmations: Vec<PendingConfirmation>,
        parsed_records: Vec<Value>,
        analysis: String,
    },
    Consultation {
        info_sufficient: bool,
        questions: Vec<String>,
        reason: String,
    },
    Data {
        has_data: bool,
        health_data: Option<Value>,
    },
    Knowledge {
        knowledge: Vec<Value>,
        explanation: String,
    },
    Diagnosis {
        analysis: String,
    },
    Doctor {
        doctors: Vec<Value>,
        recommendation: String,
    },
    Synthesis {
        final_response: String,
        expert_count: usize,
    },
}

/// ReAct 专家的循环摘要
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReactSummary {
    pub iterations: usize,
    pub steps: Vec<ReActStep>,
    pub report: String,
    pub goal_achieved: bool,
}

impl ReactSummary {
    /// 各步反思（作为关键发现交给 Planner）
    pub fn key_findings(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter_map(|s| s.reflection.clone())
            .collect()
    }
}

impl From<&ReActOutcome> for ReactSummary {
    fn from(o: &ReActOutcome) -> Self {
        Self {
            iterations: o.iterations,
            steps: o.steps.clone(),
            report: o.report.clone(),
            goal_achieved: o.goal_achieved,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpertResult {
    pub expert: ExpertKind,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub assigned_task: String,
    pub task_index: usize,
    pub completion_report: Option<String>,
    pub payload: ExpertPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub react: Option<ReactSummary>,
    pub tool_calls: Vec<ToolCallRecord>,
}

impl ExpertResult {
    pub fn success(expert: ExpertKind, payload: ExpertPayload) -> Self {
        Self {
            expert,
            success: true,
            error: None,
            assigned_task: String::new(),
            task_index: 0,
            completion_report: None,
            payload,
            react: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn failure(expert: ExpertKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::success(expert, ExpertPayload::None)
        }
    }

    pub fn with_react(mut self, summary: ReactSummary) -> Self {
        self.react = Some(summary);
        self
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCallRecord>) -> Self {
        self.tool_calls = calls;
        self
    }

    pub fn with_report(mut self, report: impl Into<String>) -> Self {
        self.completion_report = Some(report.into());
        self
    }

    /// 守门结论：仅问诊专家结果有值
    pub fn info_sufficient(&self) -> Option<bool> {
        match &self.payload {
            ExpertPayload::Consultation { info_sufficient, .. } => Some(*info_sufficient),
            _ => None,
        }
    }

    /// 主要输出文本：综合专家为 final_response，其余为分析 / 解释 / 推荐，ReAct 专家为循环汇报
    pub fn primary_text(&self) -> Option<&str> {
        let text = match &self.payload {
            ExpertPayload::Synthesis { final_response, .. } => Some(final_response.as_str()),
            ExpertPayload::DataRecord { analysis, .. } => Some(analysis.as_str()),
            ExpertPayload::Diagnosis { analysis } => Some(analysis.as_str()),
            ExpertPayload::Knowledge { explanation, .. } => Some(explanation.as_str()),
            ExpertPayload::Doctor { recommendation, .. } => Some(recommendation.as_str()),
            ExpertPayload::Consultation { .. } | ExpertPayload::Data { .. } | ExpertPayload::None => None,
        };
        text.filter(|t| !t.trim().is_empty())
            .or_else(|| self.react.as_ref().map(|r| r.report.as_str()))
            .filter(|t| !t.trim().is_empty())
    }
}
