//! 专家注册表：ExpertKind → 专家实例
//!
//! 计划里的专家名在这里解析；名称无法解析或未注册都返回 None，由执行器跳过。

use std::collections::HashMap;
use std::sync::Arc;

use crate::experts::{
    ConsultationSpecialist, DataRecordExpert, DataSpecialist, DiagnosisExpert, DoctorExpert, Expert,
    ExpertKind, KnowledgeExpert, ReactExpert, ReactSettings, SynthesisExpert,
};
use crate::llm::LlmClient;
use crate::tools::ToolInvoker;

#[derive(Clone, Default)]
pub struct ExpertRegistry {
    experts: HashMap<ExpertKind, Arc<dyn Expert>>,
}

impl ExpertRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 全部七个专家；consultation / data 为两个 ReAct 专家的循环参数
    pub fn standard(
        llm: Arc<dyn LlmClient>,
        tools: Arc<dyn ToolInvoker>,
        consultation: ReactSettings,
        data: ReactSettings,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(DataRecordExpert::new(llm.clone(), tools.clone()));
        registry.register(ReactExpert::new(
            ConsultationSpecialist,
            llm.clone(),
            tools.clone(),
            consultation,
        ));
        registry.register(ReactExpert::new(DataSpecialist, llm.clone(), tools.clone(), data));
        registry.register(KnowledgeExpert::new(llm.clone(), tools.clone()));
        registry.register(DiagnosisExpert::new(llm.clone()));
        registry.register(DoctorExpert::new(llm.clone(), tools));
        registry.register(SynthesisExpert::new(llm));
        registry
    }

    /// 注册专家；同种类覆盖先前的注册
    pub fn register(&mut self, expert: impl Expert + 'static) {
        self.register_arc(Arc::new(expert));
    }

    pub fn register_arc(&mut self, expert: Arc<dyn Expert>) {
        self.experts.insert(expert.kind(), expert);
    }

    pub fn get(&self, kind: ExpertKind) -> Option<Arc<dyn Expert>> {
        self.experts.get(&kind).cloned()
    }

    /// 按计划中的名称查找
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Expert>> {
        name.parse::<ExpertKind>().ok().and_then(|k| self.get(k))
    }

    pub fn kinds(&self) -> Vec<ExpertKind> {
        let mut kinds: Vec<ExpertKind> = self.experts.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.experts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::tools::ToolRegistry;

    #[test]
    fn test_standard_registers_every_kind() {
        let registry = ExpertRegistry::standard(
            Arc::new(ScriptedLlmClient::new()),
            Arc::new(ToolRegistry::new()),
            ReactSettings::new(8),
            ReactSettings::new(10),
        );
        assert_eq!(registry.kinds(), ExpertKind::ALL.to_vec());
        assert!(registry.resolve("DiagnosisExpert").is_some());
        assert!(registry.resolve("HoroscopeExpert").is_none());
    }

    #[test]
    fn test_registered_kind_missing_from_partial_registry() {
        let mut registry = ExpertRegistry::new();
        registry.register(SynthesisExpert::new(Arc::new(ScriptedLlmClient::new())));
        assert_eq!(registry.len(), 1);
        assert!(registry.resolve("SynthesisExpert").is_some());
        assert!(registry.resolve("DataExpert").is_none());
    }
}
