//! ReAct 主循环
//!
//! Think -> (Stop check) -> Act -> Observe -> Reflect -> 下一轮 Think。终止条件：
//! - 选择保留动作 `finish`
//! - 思考或反思中出现停止短语（不区分大小写的子串匹配）
//! - 迭代次数达到 max_iterations（安全上限）
//!
//! Think 失败（LLM 错误或回复无法解码）会立即结束循环，但仍生成结束汇报。
//! 传给后续 Think 的历史中，Observation 超过上限会被截断；步骤记录保留原值。

use std::sync::Arc;

use serde_json::Value;

use crate::core::json::{decode_json_reply, preview_chars, render_observation, truncate_chars, OBSERVATION_LIMIT};
use crate::core::schema::reply_schema_json;
use crate::core::AgentError;
use crate::llm::{complete_text, CompletionOptions, LlmClient};
use crate::memory::Message;
use crate::react::events::{send_event, EventSender, RunEvent};
use crate::react::{ActionCall, ActionSet, ReActStep, ThoughtReply};

/// 默认停止短语（中英文）
pub const DEFAULT_STOP_PHRASES: [&str; 5] = [
    "task complete",
    "no further action needed",
    "任务完成",
    "信息充足",
    "无需继续",
];

/// Think 中停止短语命中时写入的反思
pub const GOAL_ACHIEVED_REFLECTION: &str = "goal achieved";
/// 反思请求失败时的占位
pub const REFLECTION_UNAVAILABLE: &str = "reflection unavailable";

const OBSERVATION_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct ReActConfig {
    pub expert_name: String,
    pub max_iterations: usize,
    pub stop_phrases: Vec<String>,
    pub observation_limit: usize,
}

impl ReActConfig {
    pub fn new(expert_name: impl Into<String>, max_iterations: usize) -> Self {
        Self {
            expert_name: expert_name.into(),
            max_iterations,
            stop_phrases: DEFAULT_STOP_PHRASES.iter().map(|s| s.to_string()).collect(),
            observation_limit: OBSERVATION_LIMIT,
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

    pub fn is_stop(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.stop_phrases
            .iter()
            .filter(|p| !p.is_empty())
            .any(|p| text.contains(&p.to_lowercase()))
    }
}

/// 循环结束后的汇总
#[derive(Debug, Clone, PartialEq)]
pub struct ReActOutcome {
    /// 已开始的迭代数（含失败的 Think）
    pub iterations: usize,
    pub steps: Vec<ReActStep>,
    pub report: String,
    pub goal_achieved: bool,
    /// finish 动作携带的参数（守门专家读取）
    pub finish_parameters: Option<Value>,
    /// Think 失败导致提前结束时的原因
    pub aborted: Option<String>,
}

pub struct ReActLoop {
    llm: Arc<dyn LlmClient>,
    config: ReActConfig,
    event_tx: Option<EventSender>,
}

impl ReActLoop {
    pub fn new(llm: Arc<dyn LlmClient>, config: ReActConfig) -> Self {
        Self {
            llm,
            config,
            event_tx: None,
        }
    }

    pub fn with_event_tx(mut self, tx: Option<EventSender>) -> Self {
        self.event_tx = tx;
        self
    }

    pub fn config(&self) -> &ReActConfig {
        &self.config
    }

    /// 运行循环。context 为已序列化的上下文快照
    pub async fn run(
        &self,
        goal: &str,
        system_prompt: &str,
        context: &Value,
        actions: &ActionSet,
    ) -> ReActOutcome {
        let expert = self.config.expert_name.as_str();
        tracing::info!(expert = %expert, goal = %goal, "ReAct loop started");

        let mut steps: Vec<ReActStep> = Vec::new();
        let mut iterations = 0;
        let mut aborted = None;

        while iterations < self.config.max_iterations {
            iterations += 1;
            tracing::info!(
                expert = %expert,
                "ReAct iteration {}/{}",
                iterations,
                self.config.max_iterations
            );

            let reply = match self.think(goal, system_prompt, context, actions, &steps).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(expert = %expert, error = %e, "think failed, ending loop");
                    aborted = Some(e.to_string());
                    break;
                }
            };
            tracing::info!(expert = %expert, thought = %preview_chars(&reply.thought, 300), "thought");

            let mut step = ReActStep::new(iterations, reply.thought);
            step.action = reply.action;

            if self.config.is_stop(&step.thought) {
                tracing::info!(expert = %expert, "stop phrase in thought");
                step.reflection = Some(GOAL_ACHIEVED_REFLECTION.to_string());
                self.record(&mut steps, step);
                break;
            }

            let Some(action) = step.action.clone() else {
                tracing::info!(expert = %expert, "no action this round");
                self.record(&mut steps, step);
                continue;
            };

            if action.is_finish() {
                tracing::info!(expert = %expert, "finish action chosen");
                self.record(&mut steps, step);
                break;
            }

            tracing::info!(expert = %expert, action = %action.name, "action");
            let observation = self.act(&action, actions).await;
            tracing::debug!(
                expert = %expert,
                observation = %preview_chars(&render_observation(&observation), OBSERVATION_PREVIEW_CHARS),
                "observation"
            );

            let reflection = self.reflect(goal, &step.thought, &action, &observation).await;
            tracing::info!(expert = %expert, reflection = %reflection, "reflection");
            let stop = self.config.is_stop(&reflection);
            step.observation = Some(observation);
            step.reflection = Some(reflection);
            self.record(&mut steps, step);

            if stop {
                tracing::info!(expert = %expert, "stop phrase in reflection");
                break;
            }
        }

        let goal_achieved = self.goal_achieved(&steps);
        let report = self.report(goal, &steps, goal_achieved).await;
        let finish_parameters = steps
            .last()
            .and_then(|s| s.action.as_ref())
            .filter(|a| a.is_finish())
            .map(|a| a.parameters.clone());

        tracing::info!(
            expert = %expert,
            iterations,
            steps = steps.len(),
            goal_achieved,
            "ReAct loop finished"
        );

        ReActOutcome {
            iterations,
            steps,
            report,
            goal_achieved,
            finish_parameters,
            aborted,
        }
    }

    fn record(&self, steps: &mut Vec<ReActStep>, step: ReActStep) {
        send_event(
            &self.event_tx,
            RunEvent::ReactStep {
                expert: self.config.expert_name.clone(),
                step: step.step_num,
                thought: step.thought.clone(),
                action: step.action.as_ref().map(|a| a.name.clone()),
                observation_preview: step
                    .observation
                    .as_ref()
                    .map(|o| preview_chars(&render_observation(o), OBSERVATION_PREVIEW_CHARS)),
            },
        );
        steps.push(step);
    }

    async fn think(
        &self,
        goal: &str,
        system_prompt: &str,
        context: &Value,
        actions: &ActionSet,
        steps: &[ReActStep],
    ) -> Result<ThoughtReply, AgentError> {
        let history = format_history(steps, self.config.observation_limit);
        let context_text =
            serde_json::to_string_pretty(context).unwrap_or_else(|_| context.to_string());
        let prompt = format!(
            "You are {expert}, working in ReAct mode.\n\n\
             [Task goal]\n{goal}\n\n\
             [Context]\n{context_text}\n\n\
             [Available actions]\n{actions}\n\n\
             [Steps so far]\n{history}\n\n\
             Decide the next step. Base your reasoning on the observations above when present. \
             Call \"finish\" as soon as the goal is achieved.\n\n\
             Reply with one JSON object matching this schema and nothing else:\n{schema}",
            expert = self.config.expert_name,
            actions = actions.describe(),
            history = if history.is_empty() { "(no steps yet)".to_string() } else { history },
            schema = reply_schema_json::<ThoughtReply>(),
        );
        let messages = vec![Message::system(system_prompt), Message::user(prompt)];
        let text = complete_text(
            self.llm.as_ref(),
            &messages,
            &CompletionOptions::new().temperature(0.3),
        )
        .await?;
        Ok(decode_json_reply::<ThoughtReply>(&text)?)
    }

    async fn act(&self, action: &ActionCall, actions: &ActionSet) -> Value {
        send_event(
            &self.event_tx,
            RunEvent::ToolCall {
                tool: action.name.clone(),
                args: action.parameters.clone(),
            },
        );
        match actions.get(&action.name) {
            Some(a) => match a.invoke(action.parameters.clone()).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(action = %action.name, error = %e, "action failed");
                    serde_json::json!({ "error": e })
                }
            },
            None => {
                tracing::warn!(action = %action.name, "action not found");
                serde_json::json!({ "error": "action not found", "action": action.name })
            }
        }
    }

    async fn reflect(&self, goal: &str, thought: &str, action: &ActionCall, observation: &Value) -> String {
        let observation_text =
            truncate_chars(&render_observation(observation), self.config.observation_limit);
        let action_text = serde_json::to_string(action).unwrap_or_else(|_| action.name.clone());
        let prompt = format!(
            "[Task goal]\n{goal}\n\n[Your thought]\n{thought}\n\n[Action]\n{action_text}\n\n\
             [Observation]\n{observation_text}\n\n\
             Briefly evaluate: did the action succeed, did it move toward the goal, what is needed next? \
             Answer in 1-2 sentences."
        );
        let options = CompletionOptions::new().temperature(0.2).max_tokens(150);
        match complete_text(self.llm.as_ref(), &[Message::user(prompt)], &options).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "reflection failed");
                REFLECTION_UNAVAILABLE.to_string()
            }
        }
    }

    async fn report(&self, goal: &str, steps: &[ReActStep], goal_achieved: bool) -> String {
        let summary = steps
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {}", i + 1, s.thought))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "[Task goal]\n{goal}\n\n[Steps]\n{summary}\n\n[Final state]\n- {} steps executed\n- goal {}\n\n\
             Write a concise report (2-3 sentences): what was done, key findings, suggestions if any.",
            steps.len(),
            if goal_achieved { "achieved" } else { "partially completed" },
        );
        let options = CompletionOptions::new().temperature(0.3).max_tokens(200);
        match complete_text(self.llm.as_ref(), &[Message::user(prompt)], &options).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "report generation failed");
                format!("explored {} steps", steps.len())
            }
        }
    }

    fn goal_achieved(&self, steps: &[ReActStep]) -> bool {
        let Some(last) = steps.last() else {
            return false;
        };
        last.action.as_ref().is_some_and(ActionCall::is_finish)
            || self.config.is_stop(&last.thought)
            || last.reflection.as_deref().is_some_and(|r| self.config.is_stop(r))
    }
}

/// 历史步骤文本；Observation 截断到 limit 个字符
pub fn format_history(steps: &[ReActStep], limit: usize) -> String {
    let mut lines = Vec::new();
    for step in steps {
        lines.push(format!("Step {}:", step.step_num));
        lines.push(format!("  Thought: {}", step.thought));
        if let Some(action) = &step.action {
            lines.push(format!("  Action: {}", action.name));
        }
        if let Some(obs) = &step.observation {
            lines.push(format!(
                "  Observation:\n{}",
                truncate_chars(&render_observation(obs), limit)
            ));
        }
        if let Some(reflection) = &step.reflection {
            lines.push(format!("  Reflection: {reflection}"));
        }
        lines.push(String::new());
    }
    lines.join("\n")
}
