//! 核心编排层：上下文、计划模型、规划器、执行器、结构化回复解码与错误类型

pub mod context;
pub mod error;
pub mod executor;
pub mod json;
pub mod plan;
pub mod planner;
pub mod schema;

pub use context::Context;
pub use error::{AgentError, DecodeError};
pub use executor::{ExecutionOutcome, Executor, FALLBACK_RESPONSE};
pub use plan::{AdjustmentRecord, Plan, PlanAdjustment, Task, TaskList};
pub use planner::Planner;
