//! 单次运行的工作上下文
//!
//! 每个字段有明确含义，由执行器与各专家逐步填充；整个运行期间以 `&mut Context` 独占传递。

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::core::json::preview_chars;
use crate::experts::ExpertResult;
use crate::memory::Message;
use crate::react::EventSender;

#[derive(Debug, Clone, Serialize)]
pub struct Context {
    pub user_id: String,
    /// 用户本轮问题
    pub goal: String,
    pub profile: Map<String, Value>,
    pub history: Vec<Message>,

    pub assigned_task: Option<String>,
    /// 从 1 开始
    pub task_index: usize,
    pub total_tasks: usize,

    pub health_data: Option<Value>,
    pub knowledge: Option<Value>,
    pub diagnosis: Option<String>,
    pub doctor_recommendation: Option<String>,

    /// 截至当前任务已完成的结果（综合专家读取）
    #[serde(skip)]
    pub prior_results: Vec<ExpertResult>,

    pub started_at: DateTime<Utc>,

    /// 本次运行的事件订阅方
    #[serde(skip)]
    pub events: Option<EventSender>,
}

impl Context {
    pub fn new(user_id: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            goal: goal.into(),
            profile: Map::new(),
            history: Vec::new(),
            assigned_task: None,
            task_index: 0,
            total_tasks: 0,
            health_data: None,
            knowledge: None,
            diagnosis: None,
            doctor_recommendation: None,
            prior_results: Vec::new(),
            started_at: Utc::now(),
            events: None,
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

    pub fn with_events(mut self, events: Option<EventSender>) -> Self {
        self.events = events;
        self
    }

    /// 最近 n 条历史，每条截取前 chars 个字符
    pub fn recent_history(&self, n: usize, chars: usize) -> Vec<Value> {
        let start = self.history.len().saturating_sub(n);
        self.history[start..]
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": preview_chars(&m.content, chars) }))
            .collect()
    }

    /// 喂给 LLM 的上下文快照：时间转为 RFC 3339 文本，已完成结果只保留摘要
    pub fn snapshot(&self) -> Value {
        let prior: Vec<Value> = self
            .prior_results
            .iter()
            .map(|r| {
                json!({
                    "expert": r.expert,
                    "success": r.success,
                    "completion_report": r.completion_report,
                })
            })
            .collect();
        json!({
            "user_id": self.user_id,
            "goal": self.goal,
            "profile": self.profile,
            "history": self.recent_history(10, 200),
            "assigned_task": self.assigned_task,
            "task_index": self.task_index,
            "total_tasks": self.total_tasks,
            "health_data": self.health_data,
            "knowledge": self.knowledge,
            "diagnosis": self.diagnosis,
            "doctor_recommendation": self.doctor_recommendation,
            "prior_results": prior,
            "started_at": self.started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        })
    }
}
