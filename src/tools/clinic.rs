//! 知识检索与医生列表工具（内置数据）
//!
//! - `search_diabetes_knowledge(query, top_k)` → `{search_results: [...], search_summary: {total_found}}`
//! - `query_doctor_list(status?)` → `{total_count, doctors: [...]}`

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::tools::Tool;

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeEntry {
    pub question: String,
    pub answer: String,
    pub source: String,
    #[serde(skip)]
    pub keywords: Vec<String>,
}

impl KnowledgeEntry {
    fn new(question: &str, answer: &str, source: &str, keywords: &[&str]) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            source: source.into(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }
}

fn builtin_knowledge() -> Vec<KnowledgeEntry> {
    vec![
        KnowledgeEntry::new(
            "What is a normal fasting blood glucose level?",
            "Fasting plasma glucose of 3.9-6.1 mmol/L is normal; 6.1-7.0 indicates impaired fasting glucose; 7.0 or higher on two occasions meets the diabetes criterion.",
            "WHO diagnostic criteria",
            &["glucose", "fasting", "blood sugar", "血糖", "空腹"],
        ),
        KnowledgeEntry::new(
            "What is a normal post-meal blood glucose level?",
            "Two hours after a meal glucose should be below 7.8 mmol/L; 11.1 or higher suggests diabetes.",
            "WHO diagnostic criteria",
            &["glucose", "after meal", "postprandial", "血糖", "餐后"],
        ),
        KnowledgeEntry::new(
            "What blood pressure target applies to people with diabetes?",
            "Most adults with diabetes should keep blood pressure below 130/80 mmHg.",
            "ADA Standards of Care",
            &["pressure", "blood pressure", "hypertension", "血压"],
        ),
        KnowledgeEntry::new(
            "How does weight affect type 2 diabetes?",
            "Losing 5-10% of body weight improves insulin sensitivity and glycaemic control in type 2 diabetes.",
            "ADA Standards of Care",
            &["weight", "bmi", "obesity", "体重"],
        ),
        KnowledgeEntry::new(
            "What are the typical symptoms of diabetes?",
            "Classic symptoms are excessive thirst, frequent urination, increased hunger, unexplained weight loss, fatigue and blurred vision.",
            "Clinical guideline",
            &["symptom", "thirst", "urination", "fatigue", "症状", "口渴", "多尿"],
        ),
    ]
}

/// 关键词命中比例作为相关度
fn score(entry: &KnowledgeEntry, query: &str) -> f64 {
    let query = query.to_lowercase();
    let hits = entry.keywords.iter().filter(|k| query.contains(k.as_str())).count();
    if entry.keywords.is_empty() {
        0.0
    } else {
        hits as f64 / entry.keywords.len() as f64
    }
}

pub struct KnowledgeSearchTool {
    entries: Vec<KnowledgeEntry>,
}

impl KnowledgeSearchTool {
    pub fn new() -> Self {
        Self {
            entries: builtin_knowledge(),
        }
    }

    pub fn with_entries(entries: Vec<KnowledgeEntry>) -> Self {
        Self { entries }
    }
}

impl Default for KnowledgeSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for KnowledgeSearchTool {
    fn name(&self) -> &str {
        "search_diabetes_knowledge"
    }

    fn description(&self) -> &str {
        "Search the diabetes knowledge base"
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .ok_or("missing argument: query")?;
        let top_k = args.get("top_k").and_then(Value::as_u64).unwrap_or(5) as usize;

        let mut scored: Vec<(f64, &KnowledgeEntry)> = self
            .entries
            .iter()
            .map(|e| (score(e, query), e))
            .filter(|(s, _)| *s > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let total_found = scored.len();
        let results: Vec<Value> = scored
            .into_iter()
            .take(top_k)
            .enumerate()
            .map(|(i, (s, e))| {
                json!({
                    "rank": i + 1,
                    "question": e.question,
                    "answer": e.answer,
                    "similarity_score": (s * 100.0).round() / 100.0,
                    "source_info": {"source": e.source},
                })
            })
            .collect();

        Ok(json!({
            "search_results": results,
            "search_summary": {"query": query, "total_found": total_found},
        }))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Doctor {
    pub name: String,
    pub department: String,
    pub specialty: String,
    pub status: String,
    pub rating: f32,
}

fn builtin_doctors() -> Vec<Doctor> {
    let d = |name: &str, department: &str, specialty: &str, status: &str, rating: f32| Doctor {
        name: name.into(),
        department: department.into(),
        specialty: specialty.into(),
        status: status.into(),
        rating,
    };
    vec![
        d("Dr. Li", "Endocrinology", "type 2 diabetes management", "online", 4.9),
        d("Dr. Wang", "Endocrinology", "insulin therapy", "offline", 4.7),
        d("Dr. Chen", "Cardiology", "hypertension with diabetes", "online", 4.8),
        d("Dr. Zhao", "Nutrition", "diet and weight control", "online", 4.6),
    ]
}

pub struct DoctorListTool {
    doctors: Vec<Doctor>,
}

impl DoctorListTool {
    pub fn new() -> Self {
        Self {
            doctors: builtin_doctors(),
        }
    }
}

impl Default for DoctorListTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for DoctorListTool {
    fn name(&self) -> &str {
        "query_doctor_list"
    }

    fn description(&self) -> &str {
        "List doctors, optionally filtered by status"
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let status = args.get("status").and_then(Value::as_str);
        let doctors: Vec<&Doctor> = self
            .doctors
            .iter()
            .filter(|d| status.map_or(true, |s| d.status == s))
            .collect();
        Ok(json!({ "total_count": doctors.len(), "doctors": doctors }))
    }
}
