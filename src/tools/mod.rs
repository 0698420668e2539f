//! 工具层：Tool Invoker 边界、本地注册表、超时审计、HTTP 调用、内置健康工具

pub mod clinic;
pub mod executor;
pub mod health;
pub mod http;
pub mod invoker;
pub mod payload;
pub mod registry;
pub mod trace;

use std::sync::Arc;

pub use clinic::{DoctorListTool, KnowledgeSearchTool};
pub use executor::ToolExecutor;
pub use health::{
    normalize_measure_time, AddHealthRecordTool, HealthRecordStore, QueryHealthRecordsTool,
};
pub use http::HttpToolInvoker;
pub use invoker::{ToolInvoker, ToolOutcome};
pub use payload::{extract_nested, extract_tool_payload};
pub use registry::{Tool, ToolRegistry};
pub use trace::{ToolCallRecord, TracedTools};

/// 本地注册表：健康记录（共享 store）+ 知识检索 + 医生列表
pub fn local_registry(store: Arc<HealthRecordStore>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(AddHealthRecordTool::new(store.clone()));
    registry.register(QueryHealthRecordsTool::new(store));
    registry.register(KnowledgeSearchTool::new());
    registry.register(DoctorListTool::new());
    registry
}
