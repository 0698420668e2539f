//! 执行器：按任务表顺序驱动专家，处理守门短路与决策点上的计划调整
//!
//! 每个任务：解析专家 → 写入任务字段 → process → 附加完成汇报 → 记录结果
//! → 守门短路检查 → 游标前进 → 决策点评估调整。

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::core::{AdjustmentRecord, Context, Plan, Planner, Task, TaskList};
use crate::experts::{Expert, ExpertKind, ExpertPayload, ExpertRegistry, ExpertResult};
use crate::react::{send_event, RunEvent};

/// 无法得到有效最终回复时的固定文本
pub const FALLBACK_RESPONSE: &str = "Sorry, I can't generate a reply right now. Please try again later.";

/// 一次计划执行的产出
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub results: Vec<ExpertResult>,
    pub final_response: String,
    pub adjustments: Vec<AdjustmentRecord>,
    pub plan_reasoning: String,
}

/// 按专家种类生成的默认完成汇报
pub fn templated_report(result: &ExpertResult) -> String {
    if !result.success {
        return format!(
            "task failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    match &result.payload {
        ExpertPayload::DataRecord {
            has_new_data,
            records_added,
            pending_confirmations,
            ..
        } => {
            if *has_new_data && !records_added.is_empty() {
                format!("recorded {} health records", records_added.len())
            } else if !pending_confirmations.is_empty() {
                "found data that needs user confirmation".to_string()
            } else {
                "no health data to record".to_string()
            }
        }
        ExpertPayload::Consultation {
            info_sufficient,
            questions,
            ..
        } => {
            if *info_sufficient {
                "information is sufficient for assessment".to_string()
            } else {
                format!("information insufficient, asked {} questions", questions.len())
            }
        }
        ExpertPayload::Data { has_data, .. } => {
            if *has_data {
                "queried and analysed health data".to_string()
            } else {
                "no relevant health data".to_string()
            }
        }
        ExpertPayload::Knowledge { knowledge, .. } => {
            if knowledge.is_empty() {
                "no relevant knowledge found".to_string()
            } else {
                format!("found {} knowledge items", knowledge.len())
            }
        }
        ExpertPayload::Diagnosis { .. } => "completed health assessment".to_string(),
        ExpertPayload::Doctor { doctors, .. } => {
            if doctors.is_empty() {
                "no suitable doctor found".to_string()
            } else {
                format!("recommended {} doctors", doctors.len())
            }
        }
        ExpertPayload::Synthesis { .. } => {
            "integrated all expert opinions into the final reply".to_string()
        }
        ExpertPayload::None => "task completed".to_string(),
    }
}

/// 最后一个结果成功且有非空主要文本时作为最终回复
pub fn final_response(results: &[ExpertResult]) -> String {
    results
        .last()
        .filter(|r| r.success)
        .and_then(ExpertResult::primary_text)
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_RESPONSE.to_string())
}

pub struct Executor {
    registry: ExpertRegistry,
    planner: Arc<Planner>,
    decision_points: Vec<ExpertKind>,
    gatekeeper: Option<ExpertKind>,
}

impl Executor {
    pub fn new(registry: ExpertRegistry, planner: Arc<Planner>) -> Self {
        Self {
            registry,
            planner,
            decision_points: vec![ExpertKind::Consultation, ExpertKind::Data],
            gatekeeper: Some(ExpertKind::Consultation),
        }
    }

    pub fn with_decision_points(mut self, points: Vec<ExpertKind>) -> Self {
        self.decision_points = points;
        self
    }

    /// None 关闭守门短路
    pub fn with_gatekeeper(mut self, gatekeeper: Option<ExpertKind>) -> Self {
        self.gatekeeper = gatekeeper;
        self
    }

    pub fn registry(&self) -> &ExpertRegistry {
        &self.registry
    }

    pub async fn execute_plan(&self, plan: &Plan, ctx: &mut Context) -> ExecutionOutcome {
        let mut list = TaskList::from_plan(plan);
        let mut results: Vec<ExpertResult> = Vec::new();
        let mut adjustments: Vec<AdjustmentRecord> = Vec::new();

        tracing::info!(tasks = list.len(), reasoning = %plan.reasoning, "executing plan");

        while let Some(task) = list.current().cloned() {
            let index = list.cursor() + 1;
            let total = list.len();

            let Some(expert) = self.registry.resolve(&task.expert) else {
                tracing::warn!(expert = %task.expert, "expert not found, skipping task");
                send_event(&ctx.events, RunEvent::ExpertSkipped { expert: task.expert.clone() });
                list.advance();
                continue;
            };

            let result = self.run_task(expert.as_ref(), &task, index, total, ctx, &results).await;
            let kind = result.expert;
            let insufficient = self.gatekeeper == Some(kind) && result.info_sufficient() == Some(false);
            results.push(result);

            if insufficient {
                let reason = match &results[results.len() - 1].payload {
                    ExpertPayload::Consultation { reason, .. } => reason.clone(),
                    _ => String::new(),
                };
                tracing::info!(expert = %kind, reason = %reason, "information insufficient, going straight to synthesis");
                send_event(&ctx.events, RunEvent::ShortCircuit { reason });
                match self.registry.get(ExpertKind::Synthesis) {
                    Some(synthesis) => {
                        let index = results.len() + 1;
                        let result = self
                            .run_task(synthesis.as_ref(), &Task::synthesis(), index, index, ctx, &results)
                            .await;
                        results.push(result);
                    }
                    None => tracing::warn!("synthesis expert not registered, ending run"),
                }
                break;
            }

            list.advance();

            if self.decision_points.contains(&kind) {
                tracing::info!(expert = %kind, "decision point reached");
                let adjustment = self
                    .planner
                    .adjust_plan(list.tasks(), list.cursor(), &results, ctx)
                    .await;
                if adjustment.adjusted {
                    match list.replace_remaining(list.cursor(), adjustment.remaining_tasks.clone()) {
                        Ok(()) => {
                            tracing::info!(
                                reason = %adjustment.reason,
                                remaining = adjustment.remaining_tasks.len(),
                                "remaining tasks replaced"
                            );
                            send_event(
                                &ctx.events,
                                RunEvent::PlanAdjusted {
                                    after_expert: kind.to_string(),
                                    reason: adjustment.reason.clone(),
                                    remaining: adjustment.remaining_tasks,
                                },
                            );
                            adjustments.push(AdjustmentRecord {
                                after_expert: kind.to_string(),
                                reason: adjustment.reason,
                                timestamp: Utc::now(),
                            });
                        }
                        Err(e) => tracing::error!(error = %e, "plan adjustment rejected"),
                    }
                } else {
                    tracing::info!("plan unchanged");
                }
            }
        }

        let final_response = final_response(&results);
        tracing::info!(
            results = results.len(),
            adjustments = adjustments.len(),
            "plan execution finished"
        );

        ExecutionOutcome {
            results,
            final_response,
            adjustments,
            plan_reasoning: plan.reasoning.clone(),
        }
    }

    async fn run_task(
        &self,
        expert: &dyn Expert,
        task: &Task,
        index: usize,
        total: usize,
        ctx: &mut Context,
        completed: &[ExpertResult],
    ) -> ExpertResult {
        let kind = expert.kind();
        tracing::info!(expert = %kind, task = %task.task_description, "[{}/{}] running expert", index, total);
        send_event(
            &ctx.events,
            RunEvent::ExpertStarted {
                expert: kind.to_string(),
                task: task.task_description.clone(),
                index,
                total,
            },
        );

        ctx.assigned_task = Some(task.task_description.clone());
        ctx.task_index = index;
        ctx.total_tasks = total;
        ctx.prior_results = completed.to_vec();

        let mut result = expert.process(ctx).await;
        result.assigned_task = task.task_description.clone();
        result.task_index = index;

        if result.success {
            let report = result
                .completion_report
                .clone()
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| templated_report(&result));
            tracing::info!(expert = %kind, report = %report, "[{}/{}] expert completed", index, total);
            if let Some(react) = &result.react {
                tracing::info!(
                    expert = %kind,
                    iterations = react.iterations,
                    goal_achieved = react.goal_achieved,
                    "ReAct summary"
                );
            }
            send_event(
                &ctx.events,
                RunEvent::ExpertCompleted {
                    expert: kind.to_string(),
                    report: report.clone(),
                },
            );
            result.completion_report = Some(report);
        } else {
            let report = templated_report(&result);
            tracing::error!(expert = %kind, error = ?result.error, "[{}/{}] expert failed", index, total);
            send_event(
                &ctx.events,
                RunEvent::ExpertFailed {
                    expert: kind.to_string(),
                    error: result.error.clone().unwrap_or_default(),
                },
            );
            result.completion_report = Some(report);
        }
        result
    }
}
