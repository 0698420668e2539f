//! 计划数据模型
//!
//! - Task：`{expert, task_description}`，创建后不可变
//! - Plan：任务序列 + reasoning；最后一个任务必须是综合专家，且综合专家只出现一次
//! - TaskList：执行器的可变视图（任务 + 游标），唯一的修改方式是从游标处整体替换后缀

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::experts::ExpertKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Task {
    /// 专家名（如 DataExpert）
    pub expert: String,
    /// 该专家本次要完成的具体任务
    #[serde(default)]
    pub task_description: String,
}

impl Task {
    pub fn new(expert: impl Into<String>, task_description: impl Into<String>) -> Self {
        Self {
            expert: expert.into(),
            task_description: task_description.into(),
        }
    }

    /// 只有专家名时的标准任务描述
    pub fn standard(expert: impl Into<String>) -> Self {
        let expert = expert.into();
        let task_description = format!("Carry out the standard responsibilities of {expert}");
        Self {
            expert,
            task_description,
        }
    }

    pub fn synthesis() -> Self {
        Self::new(
            ExpertKind::Synthesis.as_str(),
            "Integrate all expert opinions into a final reply",
        )
    }

    pub fn is_synthesis(&self) -> bool {
        self.expert == ExpertKind::Synthesis.as_str()
    }
}

/// 保证综合专家恰好出现一次且位于末尾：删除非末尾的综合任务，缺失时追加
pub fn ensure_terminal_synthesis(tasks: &mut Vec<Task>) {
    let last_synthesis = tasks.iter().rposition(Task::is_synthesis);
    match last_synthesis {
        Some(idx) => {
            let terminal = tasks.remove(idx);
            tasks.retain(|t| !t.is_synthesis());
            tasks.push(terminal);
        }
        None => tasks.push(Task::synthesis()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub tasks: Vec<Task>,
    pub reasoning: String,
}

impl Plan {
    pub fn new(mut tasks: Vec<Task>, reasoning: impl Into<String>) -> Self {
        ensure_terminal_synthesis(&mut tasks);
        Self {
            tasks,
            reasoning: reasoning.into(),
        }
    }

    /// Planner 失败时使用的固定计划
    pub fn fallback() -> Self {
        Self::new(
            vec![
                Task::new(ExpertKind::Data.as_str(), "Query the user's health data"),
                Task::new(ExpertKind::Knowledge.as_str(), "Retrieve relevant medical knowledge"),
                Task::new(ExpertKind::Diagnosis.as_str(), "Analyse the user's health status"),
                Task::new(ExpertKind::Synthesis.as_str(), "Integrate all expert opinions"),
            ],
            "Using the default plan (planning failed)",
        )
    }

    pub fn expert_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.expert.as_str()).collect()
    }
}

/// 执行中的任务表：游标之前为已消费的位置（执行过或被跳过）
#[derive(Debug, Clone)]
pub struct TaskList {
    tasks: Vec<Task>,
    cursor: usize,
}

impl TaskList {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks, cursor: 0 }
    }

    pub fn from_plan(plan: &Plan) -> Self {
        Self::new(plan.tasks.clone())
    }

    pub fn current(&self) -> Option<&Task> {
        self.tasks.get(self.cursor)
    }

    pub fn advance(&mut self) {
        if self.cursor < self.tasks.len() {
            self.cursor += 1;
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// 尚未执行的后缀（不含当前游标位置之前的任务）
    pub fn remaining(&self) -> &[Task] {
        &self.tasks[self.cursor..]
    }

    /// 用 `tasks` 替换 `from` 起的后缀；要求 `from == cursor`，已消费部分保持不变
    ///
    /// 游标计的是已消费的位置（已产出结果的任务加上被跳过的未知专家），
    /// 因此按游标而不是按结果条数切分，跳过的位置不会被新任务覆盖。
    pub fn replace_remaining(&mut self, from: usize, tasks: Vec<Task>) -> Result<(), AgentError> {
        if from != self.cursor {
            return Err(AgentError::PlanCursor {
                from,
                cursor: self.cursor,
            });
        }
        self.tasks.truncate(from);
        self.tasks.extend(tasks);
        Ok(())
    }
}

/// Planner 对剩余任务的评估结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanAdjustment {
    pub adjusted: bool,
    pub reason: String,
    pub remaining_tasks: Vec<Task>,
}

impl PlanAdjustment {
    pub fn unchanged(reason: impl Into<String>, remaining_tasks: Vec<Task>) -> Self {
        Self {
            adjusted: false,
            reason: reason.into(),
            remaining_tasks,
        }
    }
}

/// 一次计划调整的审计记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentRecord {
    pub after_expert: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}
