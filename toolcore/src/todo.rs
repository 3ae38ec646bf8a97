//! Per-session todo list persisted as JSON under the system temp directory.

use std::fmt::Write as _;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use toolcore_commons::paths::is_safe_relative_path;
use toolcore_commons::slug::stable_slug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TodoStatus {
    Queued,
    InProgress,
    Completed,
}

impl TodoStatus {
    fn as_str(self) -> &'static str {
        match self {
            TodoStatus::Queued => "queued",
            TodoStatus::InProgress => "in-progress",
            TodoStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub task: String,
    pub status: TodoStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TodoList {
    pub tasks: Vec<TodoItem>,
}

#[derive(Debug, Error)]
pub enum TodoError {
    #[error("more than one task is in-progress")]
    MultipleInProgress,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("malformed todo list: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Resolve the on-disk path for `session_id`. An empty session id collapses
/// to a single process-wide fallback file, as does a session id that isn't a
/// safe path component (it is untrusted context, not something we generated).
pub fn todo_path(session_id: &str) -> PathBuf {
    let tmp = std::env::temp_dir();
    if session_id.is_empty() || !is_safe_relative_path(session_id) {
        tmp.join("sketch_todos.json")
    } else {
        tmp.join(session_id).join("todos.json")
    }
}

/// Read the list and render it as the XML-like listing the LLM expects. If
/// no file exists yet, returns the literal "no list" message rather than an
/// error.
pub async fn read(session_id: &str) -> Result<String, TodoError> {
    let path = todo_path(session_id);
    let raw = match tokio::fs::read_to_string(&path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok("No todo list found. Use todo_write to create one.".to_string());
        }
        Err(err) => return Err(err.into()),
    };
    let list: TodoList = serde_json::from_str(&raw)?;
    Ok(render(&list))
}

fn render(list: &TodoList) -> String {
    let mut out = format!("<todo_list count=\"{}\">\n", list.tasks.len());
    for task in &list.tasks {
        let _ = writeln!(
            out,
            "  <task id=\"{}\" status=\"{}\">{}</task>",
            task.id,
            task.status.as_str(),
            task.task
        );
    }
    out.push_str("</todo_list>");
    out
}

/// Replace the entire list. Rejects more than one `in-progress` item without
/// touching the file on disk.
pub async fn write(session_id: &str, mut list: TodoList) -> Result<String, TodoError> {
    let in_progress = list
        .tasks
        .iter()
        .filter(|t| t.status == TodoStatus::InProgress)
        .count();
    if in_progress > 1 {
        return Err(TodoError::MultipleInProgress);
    }
    for task in &mut list.tasks {
        task.id = stable_slug(&task.id);
    }

    let path = todo_path(session_id);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
        set_dir_mode(parent).await?;
    }
    let body = serde_json::to_string_pretty(&list)?;
    tokio::fs::write(&path, &body).await?;
    set_file_mode(&path).await?;

    Ok(format!("Updated todo list with {} items.", list.tasks.len()))
}

#[cfg(unix)]
async fn set_dir_mode(path: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700)).await
}

#[cfg(not(unix))]
async fn set_dir_mode(_path: &std::path::Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
async fn set_file_mode(path: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn set_file_mode(_path: &std::path::Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> String {
        format!("toolcore-todo-test-{}", std::process::id())
    }

    #[tokio::test]
    async fn missing_list_reports_the_literal_message() {
        let session = format!("{}-missing", session());
        let msg = read(&session).await.unwrap();
        assert_eq!(msg, "No todo list found. Use todo_write to create one.");
    }

    #[tokio::test]
    async fn round_trip_write_then_read() {
        let session = format!("{}-roundtrip", session());
        let list = TodoList {
            tasks: vec![
                TodoItem {
                    id: "1".into(),
                    task: "a".into(),
                    status: TodoStatus::Completed,
                },
                TodoItem {
                    id: "2".into(),
                    task: "b".into(),
                    status: TodoStatus::InProgress,
                },
                TodoItem {
                    id: "3".into(),
                    task: "c".into(),
                    status: TodoStatus::Queued,
                },
            ],
        };
        let summary = write(&session, list).await.unwrap();
        assert_eq!(summary, "Updated todo list with 3 items.");

        let rendered = read(&session).await.unwrap();
        assert!(rendered.starts_with("<todo_list count=\"3\">"));
        assert!(rendered.contains("<task id=\"2\" status=\"in-progress\">b</task>"));

        tokio::fs::remove_dir_all(todo_path(&session).parent().unwrap())
            .await
            .ok();
    }

    #[tokio::test]
    async fn rejects_multiple_in_progress_items() {
        let session = format!("{}-reject", session());
        let list = TodoList {
            tasks: vec![
                TodoItem {
                    id: "1".into(),
                    task: "a".into(),
                    status: TodoStatus::InProgress,
                },
                TodoItem {
                    id: "2".into(),
                    task: "b".into(),
                    status: TodoStatus::InProgress,
                },
            ],
        };
        let err = write(&session, list).await.unwrap_err();
        assert!(matches!(err, TodoError::MultipleInProgress));
        assert!(!todo_path(&session).exists());
    }

    #[test]
    fn empty_session_id_collapses_to_fallback_path() {
        let path = todo_path("");
        assert_eq!(path.file_name().unwrap(), "sketch_todos.json");
    }

    #[test]
    fn traversal_session_id_collapses_to_fallback_path() {
        let path = todo_path("../../etc/passwd");
        assert_eq!(path.file_name().unwrap(), "sketch_todos.json");
    }

    #[tokio::test]
    async fn write_normalizes_task_ids_to_stable_slugs() {
        let session = format!("{}-slug", session());
        let list = TodoList {
            tasks: vec![TodoItem {
                id: "Fix the Bug!".into(),
                task: "fix it".into(),
                status: TodoStatus::Queued,
            }],
        };
        write(&session, list).await.unwrap();
        let rendered = read(&session).await.unwrap();
        assert!(rendered.contains("<task id=\"fix-the-bug\""));

        tokio::fs::remove_dir_all(todo_path(&session).parent().unwrap())
            .await
            .ok();
    }
}
