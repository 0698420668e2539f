//! hive - 多专家编排引擎
//!
//! 入口：初始化日志、加载配置、构建 Hive，处理一个目标并打印最终回复。
//!
//! 用法：`hive [--config <file>] [--user <id>] [目标...]`；未给出目标时从 stdin 读取。

use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use hive::agent::{GoalRequest, Hive};
use hive::config::load_config;
use hive::react::RunEvent;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// hive 命令行参数
#[derive(Parser, Debug)]
#[command(name = "hive")]
#[command(version, about = "Multi-expert health assistant: plan, run experts, reply")]
struct Cli {
    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// 用户 ID
    #[arg(long, default_value = "local")]
    user: String,

    /// 用户目标；省略时从 stdin 读取
    goal: Vec<String>,
}

/// 等待过程事件任务结束；任务 panic 或被取消时记 warn，返回 false
async fn join_progress(task: JoinHandle<()>) -> bool {
    match task.await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "progress task failed");
            false
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hive::observability::init();

    let args = Cli::parse();
    let cfg = load_config(args.config).context("Failed to load config")?;
    let hive = Hive::from_config(&cfg).context("Failed to create hive")?;

    let goal = if args.goal.is_empty() {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read goal from stdin")?;
        buf
    } else {
        args.goal.join(" ")
    };
    if goal.trim().is_empty() {
        bail!("no goal given");
    }

    // 过程事件写到日志，最终回复写到 stdout
    let (tx, mut rx) = mpsc::unbounded_channel();
    let progress = tokio::spawn(async move {
        while let Some(ev) = rx.recv().await {
            match ev {
                RunEvent::PlanCreated { reasoning, .. } => tracing::info!(reasoning = %reasoning, "plan"),
                RunEvent::PlanAdjusted { reason, .. } => tracing::info!(reason = %reason, "plan adjusted"),
                RunEvent::FinalResponse { .. } => break,
                other => tracing::debug!(event = ?other, "run event"),
            }
        }
    });

    let report = hive
        .handle_goal(GoalRequest::new(args.user, goal.trim()), Some(tx))
        .await;
    join_progress(progress).await;

    println!("{}", report.final_response);
    Ok(())
}
