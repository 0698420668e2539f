//! ReAct 能力集：动作名 → (异步操作, 一句话描述)
//!
//! 动作是 `Fn(Value) -> Future<Result<Value, String>>`，参数为 Think 给出的 parameters；
//! 按注册顺序列举，保证 Prompt 稳定。

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::react::FINISH_ACTION;

pub type ActionFuture = BoxFuture<'static, Result<Value, String>>;
pub type ActionFn = Arc<dyn Fn(Value) -> ActionFuture + Send + Sync>;

#[derive(Clone)]
pub struct Action {
    pub name: String,
    pub description: String,
    handler: ActionFn,
}

impl Action {
    pub async fn invoke(&self, parameters: Value) -> Result<Value, String> {
        (self.handler)(parameters).await
    }
}

#[derive(Clone, Default)]
pub struct ActionSet {
    actions: Vec<Action>,
}

impl ActionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册动作；同名动作覆盖先前的注册
    pub fn with_action<F, Fut>(mut self, name: &str, description: &str, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        let handler: ActionFn = Arc::new(move |args| Box::pin(f(args)));
        self.actions.retain(|a| a.name != name);
        self.actions.push(Action {
            name: name.to_string(),
            description: description.to_string(),
            handler,
        });
        self
    }

    pub fn get(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Prompt 中的动作列表（附带保留的 finish）
    pub fn describe(&self) -> String {
        let mut lines: Vec<String> = self
            .actions
            .iter()
            .filter(|a| a.name != FINISH_ACTION)
            .map(|a| format!("- {}: {}", a.name, a.description))
            .collect();
        lines.push(format!(
            "- {FINISH_ACTION}: end the loop once the task goal is achieved (parameters may carry the conclusion)"
        ));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_and_invoke() {
        let set = ActionSet::new()
            .with_action("double", "double n", |args: Value| async move {
                let n = args["n"].as_i64().ok_or("n required")?;
                Ok(json!(n * 2))
            })
            .with_action("fail", "always fails", |_| async { Err("boom".to_string()) });

        assert_eq!(set.names(), vec!["double", "fail"]);
        let double = set.get("double").unwrap();
        assert_eq!(double.invoke(json!({"n": 4})).await.unwrap(), json!(8));
        assert_eq!(set.get("fail").unwrap().invoke(json!({})).await.unwrap_err(), "boom");
        assert!(set.get("missing").is_none());
    }

    #[test]
    fn test_describe_lists_finish_last() {
        let set = ActionSet::new().with_action("query", "query records", |_| async { Ok(json!([])) });
        let text = set.describe();
        assert!(text.starts_with("- query: query records"));
        assert!(text.lines().last().unwrap().starts_with("- finish:"));
    }
}
