//! hive - Rust 多专家编排引擎
//!
//! 模块划分：
//! - **agent**: 无头运行时 `Hive`（一次目标 → 计划 → 执行 → 最终回复）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 上下文、计划、Planner、Executor 与错误类型
//! - **experts**: 七个专家、ReAct 专家适配与专家注册表
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Scripted）
//! - **memory**: 对话消息
//! - **observability**: 日志初始化
//! - **react**: 通用 ReAct 循环、能力集与过程事件
//! - **tools**: Tool Invoker 边界与内置健康工具

pub mod agent;
pub mod config;
pub mod core;
pub mod experts;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use agent::{GoalRequest, Hive, RunReport, RunTokenUsage};
