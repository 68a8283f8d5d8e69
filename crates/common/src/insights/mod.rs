//! Background insight generation
//!
//! Insights are produced by a spawned task keyed by a generated id; clients
//! poll the registry for the result.

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::llm::{ChatMessage, LlmGateway};
use crate::tools::text::truncate_chars;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Characters of context text sent to the model
pub const INSIGHT_INPUT_CHARS: usize = 3000;

const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);
const DEFAULT_MAX_TASKS: u64 = 1000;

/// A short summary plus key points
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insights {
    pub paragraph: String,
    pub bullets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed(Insights),
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct InsightTask {
    pub id: String,
    #[serde(skip)]
    pub session_id: String,
    #[serde(flatten)]
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn insights_prompt(text: &str) -> String {
    format!(
        "You are an AI research assistant. Please analyze the following document and return a JSON object with\n\
         \"paragraph\": \"<a concise summary>\",\n\
         \"bullets\": [\"<bullet1>\", \"<bullet2>\", \"<bullet3>\"]\n\n\
         Document Text:\n{}\n\n\
         Return ONLY valid JSON.",
        truncate_chars(text, INSIGHT_INPUT_CHARS)
    )
}

/// Parse the model reply, tolerating prose or code fences around the JSON
pub fn parse_insights(reply: &str) -> Result<Insights> {
    let invalid = || AppError::ToolFailure {
        tool: "insights".to_string(),
        message: "LLM did not return valid JSON for insights".to_string(),
    };

    let start = reply.find('{').ok_or_else(invalid)?;
    let end = reply.rfind('}').filter(|end| *end > start).ok_or_else(invalid)?;
    let value: serde_json::Value = serde_json::from_str(&reply[start..=end]).map_err(|_| invalid())?;

    let paragraph = value
        .get("paragraph")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .trim()
        .to_string();
    let bullets = value
        .get("bullets")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|b| b.as_str())
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Ok(Insights { paragraph, bullets })
}

/// Ask the model for insights over `text`
pub async fn generate_insights(gateway: &LlmGateway, text: &str) -> Result<Insights> {
    if text.trim().is_empty() {
        return Err(AppError::Validation {
            message: "No content available for generating insights".to_string(),
            field: None,
        });
    }

    let reply = gateway
        .complete_text(vec![ChatMessage::user(insights_prompt(text))])
        .await?;
    parse_insights(&reply)
}

/// In-memory registry of insight tasks.
///
/// Tasks expire `retention` after their last status change, whether or not
/// anyone polled them.
pub struct TaskRegistry {
    tasks: Cache<String, InsightTask>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION, DEFAULT_MAX_TASKS)
    }
}

impl TaskRegistry {
    pub fn new(retention: Duration, max_tasks: u64) -> Self {
        let tasks = Cache::builder()
            .max_capacity(max_tasks)
            .time_to_live(retention)
            .build();

        Self { tasks }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.insight_retention(), config.insights.max_tasks)
    }

    fn create(&self, session_id: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        self.tasks.insert(
            id.clone(),
            InsightTask {
                id: id.clone(),
                session_id: session_id.to_string(),
                status: TaskStatus::Pending,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    fn set_status(&self, id: &str, status: TaskStatus) {
        let Some(mut task) = self.tasks.get(id) else {
            warn!(task_id = %id, "Insight task expired before it finished");
            return;
        };
        task.status = status;
        task.updated_at = Utc::now();
        self.tasks.insert(id.to_string(), task);
    }

    /// Fetch a task owned by `session_id`
    pub fn get(&self, id: &str, session_id: &str) -> Result<InsightTask> {
        self.tasks
            .get(id)
            .filter(|t| t.session_id == session_id)
            .ok_or_else(|| AppError::TaskNotFound { id: id.to_string() })
    }

    /// Number of tracked tasks
    pub fn len(&self) -> u64 {
        self.tasks.run_pending_tasks();
        self.tasks.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a task and run it in the background; returns the task id
    #[instrument(skip(self, gateway, text), fields(text_len = text.len()))]
    pub fn spawn(self: &Arc<Self>, session_id: &str, gateway: LlmGateway, text: String) -> String {
        let id = self.create(session_id);
        let registry = Arc::clone(self);
        let task_id = id.clone();

        tokio::spawn(async move {
            registry.set_status(&task_id, TaskStatus::Running);
            let status = match generate_insights(&gateway, &text).await {
                Ok(insights) => {
                    info!(task_id = %task_id, bullets = insights.bullets.len(), "Insights generated");
                    TaskStatus::Completed(insights)
                }
                Err(e) => {
                    error!(task_id = %task_id, error = %e, "Insight generation failed");
                    TaskStatus::Failed { error: e.to_string() }
                }
            };
            registry.set_status(&task_id, status);
        });

        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionRequest, LlmBackend, LlmReply};
    use async_trait::async_trait;

    struct Reply(&'static str);

    #[async_trait]
    impl LlmBackend for Reply {
        fn name(&self) -> &str {
            "reply"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<LlmReply> {
            Ok(LlmReply::Text(self.0.to_string()))
        }
    }

    fn gateway(reply: &'static str) -> LlmGateway {
        LlmGateway::new(vec![Arc::new(Reply(reply))], Duration::from_secs(1), 20_000)
    }

    async fn wait_for_result(registry: &TaskRegistry, id: &str) -> TaskStatus {
        for _ in 0..100 {
            let task = registry.get(id, "s1").unwrap();
            if matches!(task.status, TaskStatus::Completed(_) | TaskStatus::Failed { .. }) {
                return task.status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task did not finish");
    }

    #[test]
    fn test_parse_insights_lenient() {
        let parsed = parse_insights("```json\n{\"paragraph\": \" Oceans warm. \", \"bullets\": [\"a\", 3, \"\"]}\n```").unwrap();
        assert_eq!(parsed.paragraph, "Oceans warm.");
        assert_eq!(parsed.bullets, vec!["a"]);

        let no_bullets = parse_insights(r#"{"paragraph": "p", "bullets": "nope"}"#).unwrap();
        assert!(no_bullets.bullets.is_empty());

        assert!(parse_insights("no json here").is_err());
    }

    #[test]
    fn test_prompt_truncates_input() {
        let prompt = insights_prompt(&"x".repeat(10_000));
        assert!(prompt.matches('x').count() <= INSIGHT_INPUT_CHARS + 10);
    }

    #[tokio::test]
    async fn test_background_task_completes() {
        let registry = Arc::new(TaskRegistry::default());
        let id = registry.spawn(
            "s1",
            gateway(r#"{"paragraph": "Summary", "bullets": ["one", "two"]}"#),
            "Some text".into(),
        );

        let status = wait_for_result(&registry, &id).await;
        assert_eq!(
            status,
            TaskStatus::Completed(Insights {
                paragraph: "Summary".into(),
                bullets: vec!["one".into(), "two".into()],
            })
        );
    }

    #[tokio::test]
    async fn test_background_task_failure_is_reported() {
        let registry = Arc::new(TaskRegistry::default());
        let id = registry.spawn("s1", gateway("not json"), "Some text".into());
        assert!(matches!(wait_for_result(&registry, &id).await, TaskStatus::Failed { .. }));
    }

    #[test]
    fn test_completed_status_serializes_flat() {
        let status = TaskStatus::Completed(Insights { paragraph: "p".into(), bullets: vec!["b".into()] });
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["paragraph"], "p");
        assert_eq!(json["bullets"][0], "b");
    }

    #[tokio::test]
    async fn test_tasks_are_scoped_to_session() {
        let registry = Arc::new(TaskRegistry::default());
        let id = registry.spawn("s1", gateway("{}"), "text".into());
        assert!(matches!(registry.get(&id, "other"), Err(AppError::TaskNotFound { .. })));
    }

    #[tokio::test]
    async fn test_finished_task_expires() {
        let registry = Arc::new(TaskRegistry::new(Duration::from_millis(100), 100));
        let id = registry.spawn("s1", gateway(r#"{"paragraph": "p", "bullets": []}"#), "text".into());

        assert!(matches!(wait_for_result(&registry, &id).await, TaskStatus::Completed(_)));
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert!(matches!(registry.get(&id, "s1"), Err(AppError::TaskNotFound { .. })));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_task_count_is_bounded() {
        let registry = Arc::new(TaskRegistry::new(Duration::from_secs(60), 3));
        for _ in 0..20 {
            registry.spawn("s1", gateway("{}"), "text".into());
        }
        assert!(registry.len() <= 3);
    }
}
