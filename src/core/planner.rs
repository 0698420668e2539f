//! 规划器：根据用户问题生成计划，并在决策点评估是否调整未执行的后缀
//!
//! 两个请求的失败都不会向上传播：create_plan 退回固定默认计划，adjust_plan 退回「不调整」。

use std::collections::HashSet;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::core::json::{decode_json_reply, preview_chars};
use crate::core::plan::ensure_terminal_synthesis;
use crate::core::schema::reply_schema_json;
use crate::core::{AgentError, Context, DecodeError, Plan, PlanAdjustment, Task};
use crate::experts::{ExpertKind, ExpertResult};
use crate::llm::{complete_text, CompletionOptions, LlmClient};
use crate::memory::Message;

/// 规划历史窗口：最近 6 条，每条 150 字符
pub const DEFAULT_HISTORY_WINDOW: usize = 6;
pub const DEFAULT_HISTORY_CHARS: usize = 150;

/// 规划回复未给出理由时使用的说明
pub const MISSING_REASONING: &str = "Plan created from your question; the planner gave no further reasoning.";

/// 规划回复：`{tasks, reasoning}`；也接受旧格式 `{experts: [名称], reasoning}`
#[derive(Debug, Deserialize, JsonSchema)]
pub struct PlanReply {
    #[serde(default)]
    pub tasks: Option<Vec<Task>>,
    /// 旧格式：只有专家名
    #[serde(default)]
    pub experts: Option<Vec<String>>,
    /// 面向用户的自然语言思路（不出现专家名）
    #[serde(default)]
    pub reasoning: String,
}

/// 调整回复：`{adjust, reason, tasks}`（也接受中文键）
#[derive(Debug, Deserialize, JsonSchema)]
pub struct AdjustReply {
    /// 是否需要调整剩余任务
    #[serde(default, alias = "需要调整")]
    pub adjust: bool,
    #[serde(default, alias = "调整理由")]
    pub reason: String,
    /// 调整后的剩余任务；不调整时应与剩余任务相同
    #[serde(default, alias = "调整后的任务")]
    pub tasks: Option<Vec<Task>>,
}

fn pretty<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

fn catalogue() -> String {
    ExpertKind::ALL
        .iter()
        .enumerate()
        .map(|(i, k)| format!("{}. {} - {}", i + 1, k.as_str(), k.catalogue_line()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn planning_system_prompt() -> String {
    format!(
        "You are the planner of a team of health experts. Analyse the user's question, decide which \
         experts to involve and give each one a concrete task.\n\n\
         Available experts:\n{catalogue}\n\n\
         Rules:\n\
         - Use DataRecordExpert only when the user states a concrete glucose, blood pressure or weight value \
         (\"glucose 7.3\", \"pressure 120/80\", \"weight 70kg\"); never for symptoms or general questions.\n\
         - When the user asks for an assessment or diagnosis, use ConsultationExpert to judge whether the \
         information is sufficient.\n\
         - Use DiagnosisExpert only when information is sufficient.\n\
         - SynthesisExpert is always last.\n\
         Order: [DataRecordExpert (only with values)] -> ConsultationExpert -> [other experts] -> SynthesisExpert\n\n\
         Task descriptions must be specific to the question. The reasoning field is shown to the user: \
         write it in plain language, without expert names or technical terms.",
        catalogue = catalogue()
    )
}

/// 已完成结果的汇报摘要（ReAct 结果附带迭代数、是否达成与各步反思）
fn result_report(result: &ExpertResult) -> Value {
    let mut report = json!({
        "expert": result.expert,
        "success": result.success,
        "report": result.completion_report.clone().unwrap_or_default(),
    });
    if let Some(react) = &result.react {
        report["goal_achieved"] = json!(react.goal_achieved);
        report["iterations"] = json!(react.iterations);
        report["key_findings"] = json!(react.key_findings());
    }
    report
}

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    history_window: usize,
    history_chars: usize,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            history_window: DEFAULT_HISTORY_WINDOW,
            history_chars: DEFAULT_HISTORY_CHARS,
        }
    }

    pub fn with_history_window(mut self, entries: usize, chars: usize) -> Self {
        self.history_window = entries;
        self.history_chars = chars;
        self
    }

    /// 生成计划；请求或解码失败、或回复中既无 tasks 也无 experts 时返回默认计划
    pub async fn create_plan(&self, goal: &str, profile: &Map<String, Value>, history: &[Message]) -> Plan {
        match self.request_plan(goal, profile, history).await {
            Ok(plan) => {
                tracing::info!(
                    experts = ?plan.expert_names(),
                    reasoning = %plan.reasoning,
                    "plan created"
                );
                plan
            }
            Err(e) => {
                tracing::error!(error = %e, "planning failed, using default plan");
                Plan::fallback()
            }
        }
    }

    async fn request_plan(
        &self,
        goal: &str,
        profile: &Map<String, Value>,
        history: &[Message],
    ) -> Result<Plan, AgentError> {
        let start = history.len().saturating_sub(self.history_window);
        let recent: Vec<Value> = history[start..]
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": preview_chars(&m.content, self.history_chars) }))
            .collect();
        tracing::info!(entries = recent.len(), "planner using conversation history");

        let history_text = if recent.is_empty() {
            "(no previous conversation)".to_string()
        } else {
            serde_json::to_string_pretty(&recent).unwrap_or_default()
        };
        let prompt = format!(
            "Current question: {goal}\n\nPrevious conversation:\n{history_text}\n\n\
             User profile: {profile}\n\n\
             If the question refers to \"just now\" or \"before\", use the conversation to understand it.\n\n\
             Reply with one JSON object matching this schema and nothing else:\n{schema}",
            profile = Value::Object(profile.clone()),
            schema = reply_schema_json::<PlanReply>(),
        );
        let messages = vec![Message::system(planning_system_prompt()), Message::user(prompt)];
        let options = CompletionOptions::new().temperature(0.3);

        let text = complete_text(self.llm.as_ref(), &messages, &options).await?;
        let reply: PlanReply = decode_json_reply(&text)?;

        let tasks = match (reply.tasks, reply.experts) {
            (Some(tasks), _) => tasks,
            (None, Some(names)) => names.into_iter().map(Task::standard).collect(),
            (None, None) => {
                return Err(DecodeError::InvalidJson("plan has neither tasks nor experts".to_string()).into())
            }
        };
        let reasoning = if reply.reasoning.trim().is_empty() {
            tracing::warn!("plan reply has no reasoning, using placeholder");
            MISSING_REASONING.to_string()
        } else {
            reply.reasoning
        };
        Ok(Plan::new(tasks, reasoning))
    }

    /// 评估是否调整 `tasks[cursor..]`；调整后的任务去掉已产出结果的专家，并保证综合专家收尾
    pub async fn adjust_plan(
        &self,
        tasks: &[Task],
        cursor: usize,
        results: &[ExpertResult],
        ctx: &Context,
    ) -> PlanAdjustment {
        let remaining: Vec<Task> = tasks.get(cursor..).map(<[Task]>::to_vec).unwrap_or_default();
        if remaining.is_empty() {
            tracing::info!("no remaining tasks, nothing to adjust");
            return PlanAdjustment::unchanged("all tasks completed", remaining);
        }

        match self.request_adjustment(tasks, &remaining, results, ctx).await {
            Ok(reply) if reply.adjust => {
                let done: HashSet<&str> = results.iter().map(|r| r.expert.as_str()).collect();
                let mut adjusted: Vec<Task> = reply
                    .tasks
                    .unwrap_or_else(|| remaining.clone())
                    .into_iter()
                    .filter(|t| !done.contains(t.expert.as_str()))
                    .collect();
                ensure_terminal_synthesis(&mut adjusted);
                tracing::info!(
                    reason = %reply.reason,
                    before = remaining.len(),
                    after = adjusted.len(),
                    "plan adjusted"
                );
                PlanAdjustment {
                    adjusted: true,
                    reason: reply.reason,
                    remaining_tasks: adjusted,
                }
            }
            Ok(reply) => {
                tracing::info!("plan unchanged, continuing");
                PlanAdjustment::unchanged(reply.reason, remaining)
            }
            Err(e) => {
                tracing::error!(error = %e, "plan adjustment failed, keeping original plan");
                PlanAdjustment::unchanged(format!("adjustment failed: {e}"), remaining)
            }
        }
    }

    async fn request_adjustment(
        &self,
        tasks: &[Task],
        remaining: &[Task],
        results: &[ExpertResult],
        ctx: &Context,
    ) -> Result<AdjustReply, AgentError> {
        let reports: Vec<Value> = results.iter().map(result_report).collect();
        let prompt = format!(
            "You are the planner. Based on the reports of the experts that have finished, decide whether \
             the rest of the plan should change.\n\n\
             [User question]\n{goal}\n\n[Original plan]\n{plan}\n\n[Completed expert reports]\n{reports}\n\n\
             [Remaining tasks]\n{remaining}\n\n\
             Consider: did the finished experts reach their goals? Did they uncover new problems or missing \
             information? Are the remaining tasks still needed, should any be skipped or reordered? \
             Never re-list an expert that has already finished.\n\n\
             Reply with one JSON object matching this schema and nothing else:\n{schema}",
            goal = ctx.goal,
            plan = pretty(tasks),
            reports = pretty(&reports),
            remaining = pretty(remaining),
            schema = reply_schema_json::<AdjustReply>(),
        );
        let options = CompletionOptions::new().temperature(0.3);
        let text = complete_text(self.llm.as_ref(), &[Message::user(prompt)], &options).await?;
        Ok(decode_json_reply(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experts::ExpertPayload;
    use crate::llm::ScriptedLlmClient;

    fn names(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.expert.as_str()).collect()
    }

    fn planner(replies: &[&str]) -> (Planner, Arc<ScriptedLlmClient>) {
        let llm = Arc::new(ScriptedLlmClient::with_replies(replies.iter().copied()));
        (Planner::new(llm.clone()), llm)
    }

    #[tokio::test]
    async fn test_create_plan_appends_synthesis() {
        let (planner, _) = planner(&[
            r#"```json
{"tasks": [{"expert": "DataRecordExpert", "task_description": "record glucose 7.3"},
           {"expert": "ConsultationExpert", "task_description": "check sufficiency"}],
 "reasoning": "record first, then check"}
```"#,
        ]);
        let plan = planner.create_plan("record blood glucose 7.3", &Map::new(), &[]).await;
        assert_eq!(
            names(&plan.tasks),
            vec!["DataRecordExpert", "ConsultationExpert", "SynthesisExpert"]
        );
        assert_eq!(plan.tasks[0].task_description, "record glucose 7.3");
        assert_eq!(plan.reasoning, "record first, then check");
    }

    #[tokio::test]
    async fn test_legacy_experts_format() {
        let (planner, _) = planner(&[r#"{"experts": ["KnowledgeExpert", "SynthesisExpert"], "reasoning": "r"}"#]);
        let plan = planner.create_plan("what is HbA1c?", &Map::new(), &[]).await;
        assert_eq!(names(&plan.tasks), vec!["KnowledgeExpert", "SynthesisExpert"]);
        assert!(plan.tasks[0].task_description.contains("KnowledgeExpert"));
    }

    #[tokio::test]
    async fn test_missing_reasoning_gets_placeholder() {
        for reply in [
            r#"{"tasks": [{"expert": "KnowledgeExpert", "task_description": "look it up"}]}"#,
            r#"{"experts": ["KnowledgeExpert"], "reasoning": "  "}"#,
        ] {
            let (planner, _) = planner(&[reply]);
            let plan = planner.create_plan("what is HbA1c?", &Map::new(), &[]).await;
            assert_eq!(names(&plan.tasks), vec!["KnowledgeExpert", "SynthesisExpert"]);
            assert_eq!(plan.reasoning, MISSING_REASONING);
        }
    }

    #[tokio::test]
    async fn test_fallback_plan_on_bad_replies() {
        for reply in ["not json at all", r#"{"reasoning": "no tasks"}"#] {
            let (planner, _) = planner(&[reply]);
            let plan = planner.create_plan("hi", &Map::new(), &[]).await;
            assert_eq!(plan, Plan::fallback());
        }
        let llm = Arc::new(ScriptedLlmClient::new());
        llm.push_failure("down");
        let plan = Planner::new(llm).create_plan("hi", &Map::new(), &[]).await;
        assert_eq!(
            names(&plan.tasks),
            vec!["DataExpert", "KnowledgeExpert", "DiagnosisExpert", "SynthesisExpert"]
        );
    }

    #[tokio::test]
    async fn test_history_window_in_prompt() {
        let (planner, llm) = planner(&[r#"{"tasks": [], "reasoning": "r"}"#]);
        let history: Vec<Message> = (0..8).map(|i| Message::user(format!("turn-{i}"))).collect();
        planner.create_plan("and now?", &Map::new(), &history).await;
        let prompt = &llm.requests()[0][1].content;
        assert!(prompt.contains("turn-2"));
        assert!(prompt.contains("turn-7"));
        assert!(!prompt.contains("turn-1"));
    }

    fn completed(kind: ExpertKind) -> ExpertResult {
        ExpertResult::success(kind, ExpertPayload::None).with_report("done")
    }

    fn plan_tasks() -> Vec<Task> {
        vec![
            Task::standard("ConsultationExpert"),
            Task::standard("DataExpert"),
            Task::standard("DiagnosisExpert"),
            Task::synthesis(),
        ]
    }

    #[tokio::test]
    async fn test_adjust_nothing_remaining_skips_request() {
        let (planner, llm) = planner(&[]);
        let tasks = plan_tasks();
        let ctx = Context::new("u1", "g");
        let adj = planner.adjust_plan(&tasks, tasks.len(), &[], &ctx).await;
        assert!(!adj.adjusted);
        assert!(adj.remaining_tasks.is_empty());
        assert_eq!(llm.request_count(), 0);
    }

    #[tokio::test]
    async fn test_adjust_drops_completed_experts() {
        let (planner, _) = planner(&[
            r#"{"需要调整": true, "调整理由": "need doctor",
                "调整后的任务": [{"expert": "ConsultationExpert", "task_description": "again"},
                                 {"expert": "SynthesisExpert", "task_description": "sum"},
                                 {"expert": "DoctorExpert", "task_description": "find doctor"}]}"#,
        ]);
        let tasks = plan_tasks();
        let ctx = Context::new("u1", "g");
        let results = vec![completed(ExpertKind::Consultation)];
        let adj = planner.adjust_plan(&tasks, 1, &results, &ctx).await;
        assert!(adj.adjusted);
        assert_eq!(adj.reason, "need doctor");
        assert_eq!(names(&adj.remaining_tasks), vec!["DoctorExpert", "SynthesisExpert"]);
    }

    #[tokio::test]
    async fn test_adjust_failure_keeps_suffix() {
        let (planner, _) = planner(&["no json here"]);
        let tasks = plan_tasks();
        let ctx = Context::new("u1", "g");
        let adj = planner
            .adjust_plan(&tasks, 2, &[completed(ExpertKind::Consultation), completed(ExpertKind::Data)], &ctx)
            .await;
        assert!(!adj.adjusted);
        assert_eq!(adj.remaining_tasks, tasks[2..].to_vec());
    }

    #[tokio::test]
    async fn test_adjust_prompt_carries_react_findings() {
        let (planner, llm) = planner(&[r#"{"adjust": false, "reason": "fine"}"#]);
        let tasks = plan_tasks();
        let ctx = Context::new("u1", "g");
        let mut result = completed(ExpertKind::Consultation);
        let mut step = crate::react::ReActStep::new(1, "t");
        step.reflection = Some("glucose history is empty".into());
        result.react = Some(crate::experts::ReactSummary {
            iterations: 1,
            steps: vec![step],
            report: "r".into(),
            goal_achieved: true,
        });
        let adj = planner.adjust_plan(&tasks, 1, &[result], &ctx).await;
        assert!(!adj.adjusted);
        assert_eq!(adj.reason, "fine");
        assert!(llm.requests()[0][0].content.contains("glucose history is empty"));
    }
}
