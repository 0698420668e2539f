//! ReAct 型专家的通用外壳
//!
//! 具体专家只提供系统提示词、能力集和结论提取（ReactSpecialist），
//! ReactExpert 负责：确定目标、包装工具轨迹、运行 ReAct 循环、组装 ExpertResult。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::Context;
use crate::experts::{task_goal, Expert, ExpertKind, ExpertPayload, ExpertResult, ReactSummary};
use crate::llm::LlmClient;
use crate::react::{ActionSet, ReActConfig, ReActLoop, ReActOutcome, DEFAULT_STOP_PHRASES};
use crate::tools::{extract_tool_payload, ToolCallRecord, ToolInvoker, TracedTools};

/// ReAct 专家需要实现的部分
pub trait ReactSpecialist: Send + Sync {
    fn kind(&self) -> ExpertKind;

    fn system_prompt(&self) -> String;

    /// 本专家实际使用的停止短语；缺省即配置值
    fn stop_phrases(&self, configured: &[String]) -> Vec<String> {
        configured.to_vec()
    }

    /// 本次运行的能力集；工具调用须经 `tools` 以便记录轨迹
    fn actions(&self, ctx: &Context, tools: &TracedTools) -> ActionSet;

    /// 从循环结果与工具轨迹中提取领域字段，并写回 context
    fn conclude(
        &self,
        ctx: &mut Context,
        outcome: &ReActOutcome,
        calls: &[ToolCallRecord],
    ) -> ExpertPayload;
}

/// 经轨迹调用工具，作为动作结果：成功取嵌套载荷，失败为错误信息
pub(crate) async fn tool_action(tools: &TracedTools, name: &str, parameters: Value) -> Result<Value, String> {
    let outcome = tools.call(name, parameters).await;
    if outcome.success {
        Ok(extract_tool_payload(&outcome))
    } else {
        Err(outcome.error.unwrap_or_else(|| format!("{name} failed")))
    }
}

/// 循环参数（来自配置）
#[derive(Debug, Clone)]
pub struct ReactSettings {
    pub max_iterations: usize,
    pub stop_phrases: Vec<String>,
    pub observation_limit: usize,
}

impl ReactSettings {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            stop_phrases: DEFAULT_STOP_PHRASES.iter().map(|s| s.to_string()).collect(),
            observation_limit: crate::core::json::OBSERVATION_LIMIT,
        }
    }

    pub fn with_stop_phrases(mut self, phrases: Vec<String>) -> Self {
        self.stop_phrases = phrases;
        self
    }

    pub fn with_observation_limit(mut self, limit: usize) -> Self {
        self.observation_limit = limit;
        self
    }
}

pub struct ReactExpert<S> {
    specialist: S,
    llm: Arc<dyn LlmClient>,
    tools: Arc<dyn ToolInvoker>,
    settings: ReactSettings,
}

impl<S: ReactSpecialist> ReactExpert<S> {
    pub fn new(
        specialist: S,
        llm: Arc<dyn LlmClient>,
        tools: Arc<dyn ToolInvoker>,
        settings: ReactSettings,
    ) -> Self {
        Self {
            specialist,
            llm,
            tools,
            settings,
        }
    }
}

#[async_trait]
impl<S: ReactSpecialist> Expert for ReactExpert<S> {
    fn kind(&self) -> ExpertKind {
        self.specialist.kind()
    }

    async fn process(&self, ctx: &mut Context) -> ExpertResult {
        let kind = self.specialist.kind();
        let goal = task_goal(ctx, kind);
        tracing::info!(expert = %kind, goal = %goal, "ReAct expert started");

        let traced = TracedTools::new(self.tools.clone());
        let actions = self.specialist.actions(ctx, &traced);
        let config = ReActConfig::new(kind.as_str(), self.settings.max_iterations)
            .with_stop_phrases(self.specialist.stop_phrases(&self.settings.stop_phrases))
            .with_observation_limit(self.settings.observation_limit);
        let outcome = ReActLoop::new(self.llm.clone(), config)
            .with_event_tx(ctx.events.clone())
            .run(&goal, &self.specialist.system_prompt(), &ctx.snapshot(), &actions)
            .await;
        let calls = traced.take_records();

        // 第一次 Think 就失败：没有任何可用结论
        if outcome.steps.is_empty() {
            if let Some(reason) = &outcome.aborted {
                return ExpertResult::failure(kind, reason.clone())
                    .with_react(ReactSummary::from(&outcome))
                    .with_tool_calls(calls);
            }
        }

        let payload = self.specialist.conclude(ctx, &outcome, &calls);
        ExpertResult::success(kind, payload)
            .with_report(outcome.report.clone())
            .with_react(ReactSummary::from(&outcome))
            .with_tool_calls(calls)
    }
}
