//! 专家种类（封闭枚举）
//!
//! 计划中的 `expert` 字段为字符串，执行时通过 `ExpertKind::from_str` 解析；解析失败即查找未命中。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::AgentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExpertKind {
    #[serde(rename = "DataRecordExpert")]
    DataRecord,
    #[serde(rename = "ConsultationExpert")]
    Consultation,
    #[serde(rename = "DataExpert")]
    Data,
    #[serde(rename = "KnowledgeExpert")]
    Knowledge,
    #[serde(rename = "DiagnosisExpert")]
    Diagnosis,
    #[serde(rename = "DoctorExpert")]
    Doctor,
    #[serde(rename = "SynthesisExpert")]
    Synthesis,
}

impl ExpertKind {
    pub const ALL: [ExpertKind; 7] = [
        ExpertKind::DataRecord,
        ExpertKind::Consultation,
        ExpertKind::Data,
        ExpertKind::Knowledge,
        ExpertKind::Diagnosis,
        ExpertKind::Doctor,
        ExpertKind::Synthesis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpertKind::DataRecord => "DataRecordExpert",
            ExpertKind::Consultation => "ConsultationExpert",
            ExpertKind::Data => "DataExpert",
            ExpertKind::Knowledge => "KnowledgeExpert",
            ExpertKind::Diagnosis => "DiagnosisExpert",
            ExpertKind::Doctor => "DoctorExpert",
            ExpertKind::Synthesis => "SynthesisExpert",
        }
    }

    /// 规划时展示给 LLM 的一句话说明
    pub fn catalogue_line(&self) -> &'static str {
        match self {
            ExpertKind::DataRecord => {
                "records glucose, blood pressure or weight values the user explicitly states (only these three)"
            }
            ExpertKind::Consultation => {
                "judges whether the available information is sufficient and which questions to ask"
            }
            ExpertKind::Data => "queries and analyses the user's stored health records",
            ExpertKind::Knowledge => "searches the medical knowledge base",
            ExpertKind::Diagnosis => {
                "analyses symptoms and health risks (only when information is sufficient)"
            }
            ExpertKind::Doctor => "recommends suitable doctors",
            ExpertKind::Synthesis => "integrates all expert opinions into the reply (always last)",
        }
    }
}

impl fmt::Display for ExpertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpertKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExpertKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s.trim())
            .ok_or_else(|| AgentError::UnknownExpert(s.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display_match() {
        for kind in ExpertKind::ALL {
            assert_eq!(kind.as_str().parse::<ExpertKind>().unwrap(), kind);
            assert_eq!(serde_json::to_value(kind).unwrap(), kind.as_str());
        }
        assert_eq!(" DataExpert ".parse::<ExpertKind>().unwrap(), ExpertKind::Data);
    }

    #[test]
    fn test_unknown_name_is_unknown_expert() {
        let err = "HoroscopeExpert".parse::<ExpertKind>().unwrap_err();
        assert!(matches!(err, AgentError::UnknownExpert(ref name) if name == "HoroscopeExpert"));
    }
}
