//! 引擎错误类型
//!
//! 各阶段只在内部传播这些错误：专家边界把它们转成失败的 ExpertResult，
//! Planner 把它们转成默认计划或「不调整」，不会有错误逃逸到一次运行之外。

use thiserror::Error;

use crate::llm::LlmError;

/// 结构化回复解码失败（Planner / ReAct Think / 数据记录专家共用）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("reply contains no JSON object")]
    NoJsonObject,

    #[error("invalid JSON reply: {0}")]
    InvalidJson(String),
}

/// 编排过程中可能出现的错误（LLM、解码、配置、专家查找、计划游标）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Unknown expert: {0}")]
    UnknownExpert(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("suffix replacement at {from} but cursor is {cursor}")]
    PlanCursor { from: usize, cursor: usize },
}
