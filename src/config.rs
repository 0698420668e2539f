//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__LLM__PROVIDER=openai`）。

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::experts::{ExpertKind, ReactSettings};
use crate::react::DEFAULT_STOP_PHRASES;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub react: ReactSection,
    pub experts: ExpertsSection,
    pub executor: ExecutorSection,
    pub planner: PlannerSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端选择
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：deepseek / openai；实际选择还取决于哪个 API Key 可用
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub deepseek: LlmProviderSection,
    #[serde(default)]
    pub openai: LlmProviderSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            deepseek: LlmProviderSection::default(),
            openai: LlmProviderSection::default(),
        }
    }
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

/// [llm.deepseek] / [llm.openai]：按后端覆盖模型名
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmProviderSection {
    pub model: Option<String>,
}

/// [tools] 段：外部工具服务与单次调用超时
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 设置后工具调用以 JSON POST 发往该地址；未设置时使用本地内存工具
    pub endpoint: Option<String>,
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// [react] 段：停止短语与观察截断长度（所有 ReAct 专家共用）
#[derive(Debug, Clone, Deserialize)]
pub struct ReactSection {
    #[serde(default = "default_stop_phrases")]
    pub stop_phrases: Vec<String>,
    #[serde(default = "default_observation_limit")]
    pub observation_limit: usize,
}

impl Default for ReactSection {
    fn default() -> Self {
        Self {
            stop_phrases: default_stop_phrases(),
            observation_limit: default_observation_limit(),
        }
    }
}

fn default_stop_phrases() -> Vec<String> {
    DEFAULT_STOP_PHRASES.iter().map(|s| s.to_string()).collect()
}

fn default_observation_limit() -> usize {
    crate::core::json::OBSERVATION_LIMIT
}

/// [experts] 段：ReAct 专家的迭代上限
#[derive(Debug, Clone, Deserialize)]
pub struct ExpertsSection {
    #[serde(default = "default_consultation_iterations")]
    pub consultation_max_iterations: usize,
    #[serde(default = "default_data_iterations")]
    pub data_max_iterations: usize,
}

impl Default for ExpertsSection {
    fn default() -> Self {
        Self {
            consultation_max_iterations: default_consultation_iterations(),
            data_max_iterations: default_data_iterations(),
        }
    }
}

fn default_consultation_iterations() -> usize {
    8
}

fn default_data_iterations() -> usize {
    10
}

/// [executor] 段：决策点与守门专家（专家名同计划中的写法）
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorSection {
    #[serde(default = "default_decision_points")]
    pub decision_points: Vec<String>,
    /// 为空字符串或未知名称时关闭短路
    #[serde(default = "default_gatekeeper")]
    pub gatekeeper: Option<String>,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            decision_points: default_decision_points(),
            gatekeeper: default_gatekeeper(),
        }
    }
}

fn default_decision_points() -> Vec<String> {
    vec![
        ExpertKind::Consultation.to_string(),
        ExpertKind::Data.to_string(),
    ]
}

fn default_gatekeeper() -> Option<String> {
    Some(ExpertKind::Consultation.to_string())
}

/// [planner] 段：规划提示中的历史窗口
#[derive(Debug, Clone, Deserialize)]
pub struct PlannerSection {
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_history_chars")]
    pub history_chars: usize,
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            history_chars: default_history_chars(),
        }
    }
}

fn default_history_window() -> usize {
    crate::core::planner::DEFAULT_HISTORY_WINDOW
}

fn default_history_chars() -> usize {
    crate::core::planner::DEFAULT_HISTORY_CHARS
}

impl ReactSection {
    /// 以本段的停止短语与截断长度构造专家循环参数
    pub fn settings(&self, max_iterations: usize) -> ReactSettings {
        ReactSettings::new(max_iterations)
            .with_stop_phrases(self.stop_phrases.clone())
            .with_observation_limit(self.observation_limit)
    }
}

impl ExecutorSection {
    /// 无法解析的名称记 warn 后忽略
    pub fn decision_kinds(&self) -> Vec<ExpertKind> {
        self.decision_points
            .iter()
            .filter_map(|name| match name.parse::<ExpertKind>() {
                Ok(kind) => Some(kind),
                Err(e) => {
                    tracing::warn!(name = %name, error = %e, "ignoring unknown decision point");
                    None
                }
            })
            .collect()
    }

    pub fn gatekeeper_kind(&self) -> Option<ExpertKind> {
        self.gatekeeper
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .and_then(|name| name.parse::<ExpertKind>().ok())
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.provider, "deepseek");
        assert_eq!(cfg.tools.tool_timeout_secs, 30);
        assert!(cfg.tools.endpoint.is_none());
        assert_eq!(cfg.react.observation_limit, 2000);
        assert_eq!(cfg.react.stop_phrases.len(), DEFAULT_STOP_PHRASES.len());
        assert_eq!(cfg.experts.consultation_max_iterations, 8);
        assert_eq!(cfg.experts.data_max_iterations, 10);
        assert_eq!(
            cfg.executor.decision_kinds(),
            vec![ExpertKind::Consultation, ExpertKind::Data]
        );
        assert_eq!(cfg.executor.gatekeeper_kind(), Some(ExpertKind::Consultation));
        assert_eq!(cfg.planner.history_window, 6);
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[llm]
provider = "openai"
model = "gpt-4o-mini"

[tools]
endpoint = "http://localhost:9000/tools"

[experts]
data_max_iterations = 4

[executor]
decision_points = ["DataExpert", "NoSuchExpert"]
gatekeeper = ""
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.llm.provider, "openai");
        assert_eq!(cfg.llm.model, "gpt-4o-mini");
        assert_eq!(cfg.tools.endpoint.as_deref(), Some("http://localhost:9000/tools"));
        assert_eq!(cfg.tools.tool_timeout_secs, 30);
        assert_eq!(cfg.experts.data_max_iterations, 4);
        assert_eq!(cfg.experts.consultation_max_iterations, 8);
        assert_eq!(cfg.executor.decision_kinds(), vec![ExpertKind::Data]);
        assert_eq!(cfg.executor.gatekeeper_kind(), None);
    }

    #[test]
    fn test_react_settings_from_section() {
        let section = ReactSection {
            stop_phrases: vec!["done".into()],
            observation_limit: 100,
        };
        let settings = section.settings(3);
        assert_eq!(settings.max_iterations, 3);
        assert_eq!(settings.stop_phrases, vec!["done".to_string()]);
        assert_eq!(settings.observation_limit, 100);
    }
}
