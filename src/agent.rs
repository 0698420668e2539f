//! 无头运行时：一次用户目标 → 计划 → 执行 → 最终回复
//!
//! `Hive` 持有可在多次运行间共享的协作者（LLM、工具、专家注册表、Planner、Executor），
//! 本身不保存任何单次运行的状态，可被多个并发运行共享。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::AppConfig;
use crate::core::{AdjustmentRecord, AgentError, Context, Executor, Plan, Planner, FALLBACK_RESPONSE};
use crate::experts::{ExpertRegistry, ExpertResult};
use crate::llm::{create_deepseek_client, LlmClient, OpenAiClient};
use crate::memory::Message;
use crate::react::{send_event, EventSender, RunEvent};
use crate::tools::{local_registry, HealthRecordStore, HttpToolInvoker, ToolExecutor, ToolInvoker};

/// 按配置与环境变量选择 LLM 后端
///
/// 有 `DEEPSEEK_API_KEY`，或 provider 为 deepseek 且仅有 `OPENAI_API_KEY` 时走 DeepSeek；
/// 有 `OPENAI_API_KEY` 且 provider 不是 deepseek 时走 OpenAI 兼容端点；都没有则报配置错误。
pub fn create_llm_from_config(cfg: &AppConfig) -> Result<Arc<dyn LlmClient>, AgentError> {
    let provider = cfg.llm.provider.to_lowercase();
    let openai_key = std::env::var("OPENAI_API_KEY").ok();
    let deepseek_key = std::env::var("DEEPSEEK_API_KEY")
        .ok()
        .or_else(|| openai_key.clone().filter(|_| provider == "deepseek"));

    if let Some(key) = deepseek_key {
        let model = cfg
            .llm
            .deepseek
            .model
            .clone()
            .unwrap_or_else(|| cfg.llm.model.clone());
        tracing::info!(model = %model, "using DeepSeek LLM");
        return Ok(Arc::new(create_deepseek_client(Some(&model), &key)));
    }

    match openai_key {
        Some(key) => {
            let model = cfg
                .llm
                .openai
                .model
                .clone()
                .unwrap_or_else(|| "gpt-4o-mini".to_string());
            tracing::info!(model = %model, base_url = ?cfg.llm.base_url, "using OpenAI-compatible LLM");
            Ok(Arc::new(OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &model,
                Some(key.as_str()),
            )))
        }
        None => Err(AgentError::Config(format!(
            "no API key for provider '{}': set DEEPSEEK_API_KEY or OPENAI_API_KEY",
            cfg.llm.provider
        ))),
    }
}

/// 配置了 endpoint 时走 HTTP 工具服务，否则用本地内存工具；两者都套一层超时与审计
pub fn create_tools_from_config(cfg: &AppConfig) -> Arc<dyn ToolInvoker> {
    let inner: Arc<dyn ToolInvoker> = match cfg.tools.endpoint.as_deref() {
        Some(endpoint) if !endpoint.trim().is_empty() => {
            tracing::info!(endpoint = %endpoint, "using HTTP tool service");
            Arc::new(HttpToolInvoker::new(endpoint, cfg.tools.tool_timeout_secs))
        }
        _ => {
            let registry = local_registry(Arc::new(HealthRecordStore::new()));
            tracing::info!(tools = registry.tool_names().len(), "using local in-memory tools");
            for (name, description) in registry.tool_descriptions() {
                tracing::debug!(tool = %name, description = %description, "registered local tool");
            }
            Arc::new(registry)
        }
    };
    Arc::new(ToolExecutor::new(inner, cfg.tools.tool_timeout_secs))
}

/// 一次运行的输入
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoalRequest {
    pub user_id: String,
    pub goal: String,
    #[serde(default)]
    pub profile: Map<String, Value>,
    /// 由调用方保存的既往对话
    #[serde(default)]
    pub history: Vec<Message>,
}

impl GoalRequest {
    pub fn new(user_id: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            goal: goal.into(),
            ..Default::default()
        }
    }

    pub fn with_profile(mut self, profile: Map<String, Value>) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }
}

/// 一次运行消耗的 token（运行前后 `LlmClient::token_usage` 之差）
///
/// 同一 LLM 客户端上并发的其他运行也会计入差值。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunTokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl RunTokenUsage {
    fn between(before: (u64, u64, u64), after: (u64, u64, u64)) -> Self {
        Self {
            prompt_tokens: after.0.saturating_sub(before.0),
            completion_tokens: after.1.saturating_sub(before.1),
            total_tokens: after.2.saturating_sub(before.2),
        }
    }
}

/// 一次运行的完整产出
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub plan: Plan,
    pub results: Vec<ExpertResult>,
    pub final_response: String,
    pub adjustments: Vec<AdjustmentRecord>,
    pub plan_reasoning: String,
    pub token_usage: RunTokenUsage,
}

pub struct Hive {
    llm: Arc<dyn LlmClient>,
    planner: Arc<Planner>,
    executor: Executor,
}

impl Hive {
    /// 以给定 LLM 与工具构造全部专家；循环参数、决策点与守门专家取自配置
    pub fn new(llm: Arc<dyn LlmClient>, tools: Arc<dyn ToolInvoker>, cfg: &AppConfig) -> Self {
        let registry = ExpertRegistry::standard(
            llm.clone(),
            tools,
            cfg.react.settings(cfg.experts.consultation_max_iterations),
            cfg.react.settings(cfg.experts.data_max_iterations),
        );
        Self::with_registry(llm, registry, cfg)
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, AgentError> {
        let llm = create_llm_from_config(cfg)?;
        Ok(Self::new(llm, create_tools_from_config(cfg), cfg))
    }

    /// 自定义专家集合（测试或裁剪部署）
    pub fn with_registry(llm: Arc<dyn LlmClient>, registry: ExpertRegistry, cfg: &AppConfig) -> Self {
        let planner = Arc::new(
            Planner::new(llm.clone()).with_history_window(cfg.planner.history_window, cfg.planner.history_chars),
        );
        let executor = Executor::new(registry, planner.clone())
            .with_decision_points(cfg.executor.decision_kinds())
            .with_gatekeeper(cfg.executor.gatekeeper_kind());
        Self {
            llm,
            planner,
            executor,
        }
    }

    pub fn registry(&self) -> &ExpertRegistry {
        self.executor.registry()
    }

    /// 处理一个目标；不返回错误，任何失败都落到兜底回复
    pub async fn handle_goal(&self, request: GoalRequest, events: Option<EventSender>) -> RunReport {
        let run_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(run_id = %run_id, user_id = %request.user_id, goal = %request.goal, "handling goal");

        if request.goal.trim().is_empty() {
            tracing::warn!(run_id = %run_id, "empty goal, returning fallback response");
            send_event(&events, RunEvent::Error { text: "empty goal".to_string() });
            send_event(&events, RunEvent::FinalResponse { text: FALLBACK_RESPONSE.to_string() });
            return RunReport {
                run_id,
                plan: Plan::new(Vec::new(), String::new()),
                results: Vec::new(),
                final_response: FALLBACK_RESPONSE.to_string(),
                adjustments: Vec::new(),
                plan_reasoning: String::new(),
                token_usage: RunTokenUsage::default(),
            };
        }

        let usage_before = self.llm.token_usage();
        let plan = self
            .planner
            .create_plan(&request.goal, &request.profile, &request.history)
            .await;
        send_event(
            &events,
            RunEvent::PlanCreated {
                tasks: plan.tasks.clone(),
                reasoning: plan.reasoning.clone(),
            },
        );

        let mut ctx = Context::new(request.user_id, request.goal)
            .with_profile(request.profile)
            .with_history(request.history)
            .with_events(events.clone());
        let outcome = self.executor.execute_plan(&plan, &mut ctx).await;
        let token_usage = RunTokenUsage::between(usage_before, self.llm.token_usage());

        tracing::info!(
            run_id = %run_id,
            results = outcome.results.len(),
            adjustments = outcome.adjustments.len(),
            prompt_tokens = token_usage.prompt_tokens,
            completion_tokens = token_usage.completion_tokens,
            total_tokens = token_usage.total_tokens,
            "goal handled"
        );
        send_event(
            &events,
            RunEvent::FinalResponse {
                text: outcome.final_response.clone(),
            },
        );

        RunReport {
            run_id,
            plan,
            results: outcome.results,
            final_response: outcome.final_response,
            adjustments: outcome.adjustments,
            plan_reasoning: outcome.plan_reasoning,
            token_usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    use crate::experts::{ExpertKind, SynthesisExpert};
    use crate::llm::ScriptedLlmClient;
    use crate::tools::ToolRegistry;

    #[tokio::test]
    async fn test_fallback_plan_when_planner_fails() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .with_rule("You are SynthesisExpert", "Here is your summary.")
                .with_fallback("not json"),
        );
        let mut registry = ExpertRegistry::new();
        registry.register(SynthesisExpert::new(llm.clone()));
        let hive = Hive::with_registry(llm, registry, &AppConfig::default());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let report = hive.handle_goal(GoalRequest::new("u1", "how am I doing"), Some(tx)).await;

        assert_eq!(report.plan, Plan::fallback());
        assert_eq!(report.final_response, "Here is your summary.");
        assert_eq!(report.results.last().map(|r| r.expert), Some(ExpertKind::Synthesis));

        let mut saw_plan = false;
        let mut last = None;
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev, RunEvent::PlanCreated { .. }) {
                saw_plan = true;
            }
            last = Some(ev);
        }
        assert!(saw_plan);
        assert!(matches!(last, Some(RunEvent::FinalResponse { text }) if text == "Here is your summary."));
    }

    #[tokio::test]
    async fn test_empty_goal_returns_apology() {
        let llm = Arc::new(ScriptedLlmClient::new());
        let hive = Hive::new(llm.clone(), Arc::new(ToolRegistry::new()), &AppConfig::default());
        let report = hive.handle_goal(GoalRequest::new("u1", "  "), None).await;
        assert_eq!(report.final_response, FALLBACK_RESPONSE);
        assert!(report.results.is_empty());
        assert!(llm.requests().is_empty());
        assert_eq!(report.token_usage, RunTokenUsage::default());
    }

    #[tokio::test]
    async fn test_report_carries_run_token_usage() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .with_rule("You are SynthesisExpert", "Here is your summary.")
                .with_fallback("not json"),
        );
        let mut registry = ExpertRegistry::new();
        registry.register(SynthesisExpert::new(llm.clone()));
        let hive = Hive::with_registry(llm.clone(), registry, &AppConfig::default());

        let first = hive.handle_goal(GoalRequest::new("u1", "how am I doing"), None).await;
        assert!(first.token_usage.prompt_tokens > 0);
        // 回复 "Here is your summary." 记 4 个词
        assert!(first.token_usage.completion_tokens >= 4);
        assert_eq!(
            first.token_usage.total_tokens,
            first.token_usage.prompt_tokens + first.token_usage.completion_tokens
        );

        // 第二次运行只报告自身的增量
        let second = hive.handle_goal(GoalRequest::new("u1", "how am I doing"), None).await;
        assert_eq!(second.token_usage, first.token_usage);
        assert_eq!(llm.token_usage().2, first.token_usage.total_tokens * 2);
    }

    #[tokio::test]
    async fn test_total_failure_returns_apology() {
        let llm = Arc::new(ScriptedLlmClient::new());
        let hive = Hive::new(llm, Arc::new(ToolRegistry::new()), &AppConfig::default());
        let report = hive.handle_goal(GoalRequest::new("u1", "hello"), None).await;
        assert_eq!(report.final_response, FALLBACK_RESPONSE);
        assert!(report.results.iter().all(|r| !r.success));
    }

    #[test]
    fn test_tools_from_config_defaults_to_local() {
        let tools = create_tools_from_config(&AppConfig::default());
        assert!(tools.tool_names().contains(&"add_health_record".to_string()));
    }
}
