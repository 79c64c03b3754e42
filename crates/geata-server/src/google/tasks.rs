//! Google Tasks API v1 Client
//!
//! Task lists and tasks: list, get, create, update (fetch-merge-update),
//! complete, delete.

use serde_json::{json, Value};
use tracing::{debug, info};

use super::client::GoogleClient;
use super::common::extract_array;
use crate::common::Result;

const TASKS_API_BASE: &str = "https://tasks.googleapis.com/tasks/v1";

pub struct TasksApi {
    client: GoogleClient,
}

super::google_api_wrapper!(TasksApi);

/// Optional task fields shared by create and update.
#[derive(Debug, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub notes: Option<String>,
    pub due: Option<String>,
    pub status: Option<String>,
}

impl TasksApi {
    /// List the user's task lists.
    pub async fn list_task_lists(&self) -> Result<Vec<Value>> {
        info!("listing task lists");

        let url = format!("{TASKS_API_BASE}/users/@me/lists");
        let response = self
            .client
            .get(&url, &[("maxResults", "100".to_string())])
            .await?;

        let lists = extract_array(&response, "items");
        debug!(count = lists.len(), "task lists retrieved");
        Ok(lists)
    }

    /// Create a new task list.
    pub async fn create_task_list(&self, title: &str) -> Result<Value> {
        info!(title, "creating task list");

        let url = format!("{TASKS_API_BASE}/users/@me/lists");
        self.client.post(&url, &json!({ "title": title })).await
    }

    /// Delete a task list and everything in it.
    pub async fn delete_task_list(&self, task_list_id: &str) -> Result<()> {
        info!(task_list_id, "deleting task list");

        let url = format!("{TASKS_API_BASE}/users/@me/lists/{task_list_id}");
        self.client.delete(&url).await?;
        Ok(())
    }

    /// List tasks in one list.
    pub async fn list_tasks(&self, task_list_id: &str, show_completed: bool) -> Result<Vec<Value>> {
        info!(task_list_id, "listing tasks");

        let query_params = vec![
            ("maxResults", "100".to_string()),
            ("showCompleted", show_completed.to_string()),
        ];

        let url = format!("{TASKS_API_BASE}/lists/{task_list_id}/tasks");
        let response = self.client.get(&url, &query_params).await?;

        let tasks = extract_array(&response, "items");
        debug!(count = tasks.len(), "tasks retrieved");
        Ok(tasks)
    }

    /// Get a single task.
    pub async fn get_task(&self, task_list_id: &str, task_id: &str) -> Result<Value> {
        info!(task_list_id, task_id, "fetching task");

        let url = format!("{TASKS_API_BASE}/lists/{task_list_id}/tasks/{task_id}");
        self.client.get(&url, &[]).await
    }

    /// Create a task.
    pub async fn create_task(
        &self,
        task_list_id: &str,
        title: &str,
        notes: Option<&str>,
        due: Option<&str>,
    ) -> Result<Value> {
        info!(task_list_id, title, "creating task");

        let mut task = json!({ "title": title });
        if let Some(n) = notes {
            task["notes"] = json!(n);
        }
        if let Some(d) = due {
            task["due"] = json!(d);
        }

        let url = format!("{TASKS_API_BASE}/lists/{task_list_id}/tasks");
        self.client.post(&url, &task).await
    }

    /// Update a task: fetch the current record, overlay the provided fields,
    /// and put the merged result back.
    pub async fn update_task(
        &self,
        task_list_id: &str,
        task_id: &str,
        patch: &TaskPatch,
    ) -> Result<Value> {
        info!(task_list_id, task_id, "updating task");

        let mut task = self.get_task(task_list_id, task_id).await?;
        apply_patch(&mut task, patch);

        let url = format!("{TASKS_API_BASE}/lists/{task_list_id}/tasks/{task_id}");
        self.client.put(&url, &task).await
    }

    /// Mark a task completed.
    pub async fn complete_task(&self, task_list_id: &str, task_id: &str) -> Result<Value> {
        let patch = TaskPatch {
            status: Some("completed".to_string()),
            ..Default::default()
        };
        self.update_task(task_list_id, task_id, &patch).await
    }

    /// Delete a task.
    pub async fn delete_task(&self, task_list_id: &str, task_id: &str) -> Result<()> {
        info!(task_list_id, task_id, "deleting task");

        let url = format!("{TASKS_API_BASE}/lists/{task_list_id}/tasks/{task_id}");
        self.client.delete(&url).await?;
        Ok(())
    }
}

fn apply_patch(task: &mut Value, patch: &TaskPatch) {
    if let Some(t) = &patch.title {
        task["title"] = json!(t);
    }
    if let Some(n) = &patch.notes {
        task["notes"] = json!(n);
    }
    if let Some(d) = &patch.due {
        task["due"] = json!(d);
    }
    if let Some(s) = &patch.status {
        task["status"] = json!(s);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_patch_overlays_only_provided_fields() {
        let mut task = json!({
            "title": "old",
            "notes": "keep me",
            "status": "needsAction"
        });

        let patch = TaskPatch {
            title: Some("new".to_string()),
            status: Some("completed".to_string()),
            ..Default::default()
        };
        apply_patch(&mut task, &patch);

        assert_eq!(task["title"], "new");
        assert_eq!(task["notes"], "keep me");
        assert_eq!(task["status"], "completed");
    }
}
