//! 编排集成测试：Scripted LLM + 本地内存工具，跑完整的 Hive 运行

use std::sync::Arc;

use serde_json::{json, Map};

use hive::config::AppConfig;
use hive::experts::{ExpertKind, ExpertPayload, ExpertResult};
use hive::llm::ScriptedLlmClient;
use hive::react::RunEvent;
use hive::tools::{local_registry, HealthRecordStore};
use hive::{GoalRequest, Hive};

const GOAL: &str = "record blood glucose 7.3 and evaluate";

const RECORD_PLAN: &str = r#"{"tasks": [
    {"expert": "DataRecordExpert", "task_description": "record the glucose reading 7.3"},
    {"expert": "ConsultationExpert", "task_description": "decide whether the reading can be assessed"},
    {"expert": "DiagnosisExpert", "task_description": "assess the glucose level"},
    {"expert": "SynthesisExpert", "task_description": "reply to the user"}
], "reasoning": "Save the reading first, then check whether we know enough to assess it."}"#;

const EXTRACTION: &str = r#"{"has_data": true, "records": [{"type": "glucose", "value": 7.3, "unit": "mmol/L", "measure_time": "2025-10-03 08:00"}]}"#;

fn consultation_finish(sufficient: bool) -> String {
    json!({
        "thought": "a single reading without context",
        "action": {
            "name": "finish",
            "parameters": {
                "info_sufficient": sufficient,
                "questions": ["Was the reading taken fasting?"],
                "reason": "measurement context unknown"
            }
        }
    })
    .to_string()
}

fn record_scenario(sufficient: bool) -> ScriptedLlmClient {
    ScriptedLlmClient::new()
        .with_rule("You are the planner of a team", RECORD_PLAN)
        .with_rule(
            "You are the planner. Based on",
            r#"{"adjust": true, "reason": "check the knowledge base before replying", "tasks": [
                {"expert": "DataRecordExpert", "task_description": "record again"},
                {"expert": "KnowledgeExpert", "task_description": "look up glucose targets"},
                {"expert": "SynthesisExpert", "task_description": "reply"}
            ]}"#,
        )
        .with_rule("You are DataRecordExpert", EXTRACTION)
        .with_rule("You are ConsultationExpert", consultation_finish(sufficient))
        .with_rule("You are KnowledgeExpert", "Fasting glucose above 7.0 mmol/L needs follow-up.")
        .with_rule("Write a concise report", "Reviewed the reading and decided on next steps.")
        .with_rule("You are SynthesisExpert", "Your reading of 7.3 is saved. Was it taken fasting?")
}

fn hive_with(llm: ScriptedLlmClient, store: Arc<HealthRecordStore>) -> (Hive, Arc<ScriptedLlmClient>) {
    let llm = Arc::new(llm);
    let hive = Hive::new(llm.clone(), Arc::new(local_registry(store)), &AppConfig::default());
    (hive, llm)
}

fn kinds(results: &[ExpertResult]) -> Vec<ExpertKind> {
    results.iter().map(|r| r.expert).collect()
}

#[tokio::test]
async fn test_record_then_short_circuit_on_insufficient_information() {
    let store = Arc::new(HealthRecordStore::new());
    let (hive, llm) = hive_with(record_scenario(false), store.clone());

    let report = hive.handle_goal(GoalRequest::new("u1", GOAL), None).await;

    assert_eq!(
        kinds(&report.results),
        vec![ExpertKind::DataRecord, ExpertKind::Consultation, ExpertKind::Synthesis]
    );
    assert!(report.results.iter().all(|r| r.success));
    assert_eq!(report.results[1].info_sufficient(), Some(false));
    assert!(report.adjustments.is_empty());
    assert_eq!(report.final_response, "Your reading of 7.3 is saved. Was it taken fasting?");

    let stored = store.query("u1", 3650, Some("glucose"));
    assert_eq!(stored["health_records"]["glucose"][0]["value"], 7.3);
    assert_eq!(
        stored["health_records"]["glucose"][0]["measureTime"],
        "2025-10-03T08:00:00"
    );

    // 短路后不再请求计划调整
    assert!(llm
        .requests()
        .iter()
        .all(|msgs| msgs.iter().all(|m| !m.content.contains("You are the planner. Based on"))));
}

#[tokio::test]
async fn test_adjustment_never_repeats_finished_experts() {
    let (hive, _) = hive_with(record_scenario(true), Arc::new(HealthRecordStore::new()));

    let report = hive.handle_goal(GoalRequest::new("u1", GOAL), None).await;

    assert_eq!(
        kinds(&report.results),
        vec![
            ExpertKind::DataRecord,
            ExpertKind::Consultation,
            ExpertKind::Knowledge,
            ExpertKind::Synthesis
        ]
    );
    assert_eq!(report.adjustments.len(), 1);
    assert_eq!(report.adjustments[0].after_expert, "ConsultationExpert");
    let records = report
        .results
        .iter()
        .filter(|r| r.expert == ExpertKind::DataRecord)
        .count();
    assert_eq!(records, 1);
}

#[tokio::test]
async fn test_runs_are_deterministic() {
    for sufficient in [false, true] {
        let (first, _) = hive_with(record_scenario(sufficient), Arc::new(HealthRecordStore::new()));
        let (second, _) = hive_with(record_scenario(sufficient), Arc::new(HealthRecordStore::new()));

        let a = first.handle_goal(GoalRequest::new("u1", GOAL), None).await;
        let b = second.handle_goal(GoalRequest::new("u1", GOAL), None).await;

        assert_eq!(a.plan, b.plan);
        assert_eq!(a.results, b.results);
        assert_eq!(a.final_response, b.final_response);
        assert_eq!(a.plan_reasoning, b.plan_reasoning);
        // 调整记录带时间戳，只比较位置与原因
        let adjusted = |r: &hive::RunReport| -> Vec<(String, String)> {
            r.adjustments
                .iter()
                .map(|x| (x.after_expert.clone(), x.reason.clone()))
                .collect()
        };
        assert_eq!(adjusted(&a), adjusted(&b));
        assert_eq!(a.adjustments.len(), usize::from(sufficient));
    }
}

#[tokio::test]
async fn test_unknown_expert_is_skipped() {
    let llm = ScriptedLlmClient::new()
        .with_rule(
            "You are the planner of a team",
            r#"{"tasks": [
                {"expert": "HoroscopeExpert", "task_description": "read the stars"},
                {"expert": "SynthesisExpert", "task_description": "reply"}
            ], "reasoning": "just answer"}"#,
        )
        .with_rule("You are SynthesisExpert", "Hello!");
    let (hive, _) = hive_with(llm, Arc::new(HealthRecordStore::new()));

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let report = hive.handle_goal(GoalRequest::new("u1", "hi"), Some(tx)).await;

    assert_eq!(report.plan.tasks.len(), 2);
    assert_eq!(kinds(&report.results), vec![ExpertKind::Synthesis]);
    assert_eq!(report.results[0].task_index, 2);
    assert_eq!(report.final_response, "Hello!");

    let mut skipped = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        if let RunEvent::ExpertSkipped { expert } = ev {
            skipped.push(expert);
        }
    }
    assert_eq!(skipped, vec!["HoroscopeExpert".to_string()]);
}

#[tokio::test]
async fn test_data_expert_query_then_finish() {
    let store = Arc::new(HealthRecordStore::new());
    let mut reading = Map::new();
    reading.insert("value".into(), json!(6.1));
    store.add("u1", "glucose", &reading, "").unwrap();

    let llm = ScriptedLlmClient::with_replies([
        r#"{"thought": "look at the last week", "action": {"name": "query_recent_data", "parameters": {}}}"#,
        r#"{"thought": "one reading is enough to answer", "action": {"name": "finish", "parameters": {}}}"#,
    ])
    .with_rule(
        "You are the planner of a team",
        r#"{"experts": ["DataExpert", "SynthesisExpert"], "reasoning": "look at your records"}"#,
    )
    .with_rule("You are the planner. Based on", r#"{"adjust": false, "reason": "on track"}"#)
    .with_rule("Briefly evaluate", "The query returned one glucose reading.")
    .with_rule("Write a concise report", "Found one glucose reading of 6.1.")
    .with_rule("You are SynthesisExpert", "Your recent glucose reading is 6.1 mmol/L.");
    let (hive, llm) = hive_with(llm, store);

    let report = hive.handle_goal(GoalRequest::new("u1", "how is my glucose"), None).await;

    assert_eq!(kinds(&report.results), vec![ExpertKind::Data, ExpertKind::Synthesis]);
    let data = &report.results[0];
    let react = data.react.as_ref().unwrap();
    assert_eq!(react.steps.len(), 2);
    assert!(react.goal_achieved);
    assert_eq!(data.completion_report.as_deref(), Some("Found one glucose reading of 6.1."));
    match &data.payload {
        ExpertPayload::Data { has_data, health_data } => {
            assert!(*has_data);
            assert_eq!(health_data.as_ref().unwrap()["health_records"]["glucose"][0]["value"], 6.1);
        }
        other => panic!("unexpected payload: {other:?}"),
    }
    assert!(report.adjustments.is_empty());
    assert_eq!(llm.remaining(), 0);
    assert_eq!(report.final_response, "Your recent glucose reading is 6.1 mmol/L.");
}
