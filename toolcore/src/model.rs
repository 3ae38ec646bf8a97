use serde::{Deserialize, Serialize};

/// A structured tool invocation emitted by the model. Immutable once
/// dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub input: serde_json::Value,
    pub call_id: String,
}

/// A single piece of tool-result content. The core only ever produces the
/// `Text` variant; the tag is kept so downstream consumers (out of scope
/// here) can extend it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text(String),
}

impl Content {
    pub fn text(s: impl Into<String>) -> Self {
        Content::Text(s.into())
    }
}

/// The result of running a tool: either a sequence of content values (with
/// an optional display payload, e.g. a unified diff) or an error. Exactly
/// one variant is ever populated.
#[derive(Debug, Clone)]
pub enum ToolOut {
    Ok {
        content: Vec<Content>,
        display: Option<String>,
    },
    Err(String),
}

impl ToolOut {
    pub fn text(s: impl Into<String>) -> Self {
        ToolOut::Ok {
            content: vec![Content::text(s)],
            display: None,
        }
    }

    pub fn text_with_display(text: impl Into<String>, display: impl Into<String>) -> Self {
        ToolOut::Ok {
            content: vec![Content::text(text)],
            display: Some(display.into()),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        ToolOut::Err(message.into())
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ToolOut::Ok { .. })
    }
}

/// External collaborator: a hidden or visible LLM dialogue the core spawns
/// for relevance filtering (keyword search) or advisory tool installation
/// (JIT installer). Implementation — the actual model transport — is out of
/// scope for this crate; callers provide one.
#[async_trait::async_trait]
pub trait SubConvo: Send + Sync {
    /// Replace the system prompt for this sub-conversation.
    fn set_system_prompt(&mut self, prompt: String);

    /// Whether this sub-conversation is hidden from the human-facing
    /// transcript.
    fn set_hidden(&mut self, hidden: bool);

    /// Enable or disable prompt caching for this sub-conversation.
    fn set_prompt_caching(&mut self, enabled: bool);

    /// Register the tools available to this sub-conversation.
    fn set_tools(&mut self, tools: Vec<String>);

    /// Append a plain user-text message and await the single resulting
    /// assistant message.
    async fn send_user_text_message(&mut self, text: &str) -> anyhow::Result<SubConvoReply>;

    /// Append a message with an explicit role.
    async fn send_message(&mut self, role: &str, content: &str) -> anyhow::Result<SubConvoReply>;

    /// Render a tool result back into the sub-conversation's content model.
    fn tool_result_contents(&self, response: &ToolOut) -> Vec<Content>;
}

/// One turn of a sub-conversation's reply.
#[derive(Debug, Clone)]
pub struct SubConvoReply {
    pub stop_reason: StopReason,
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    ToolUse,
    EndTurn,
    Error,
}
