//! Knowledge dispatcher: returns embedded or templated text bodies for a
//! closed set of topics the agent can be asked to explain itself.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    AboutSketch,
    WorkingBranch,
    Todos,
    AutoInstall,
}

impl Topic {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "about_sketch" => Some(Topic::AboutSketch),
            "working_branch" => Some(Topic::WorkingBranch),
            "todos" => Some(Topic::Todos),
            "auto_install" => Some(Topic::AutoInstall),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown topic: {0}")]
pub struct UnknownTopic(pub String);

/// Values the templated bodies are expanded against. Built by the caller
/// from the sub-conversation's context.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeContext {
    pub session_id: String,
    pub branch: String,
}

/// Look up `topic` and render its body. `topic` of `""` defaults to
/// `about_sketch`, matching the wire schema's optional field.
pub fn lookup(topic: &str, ctx: &KnowledgeContext) -> Result<String, UnknownTopic> {
    let topic = if topic.is_empty() { "about_sketch" } else { topic };
    let topic = Topic::parse(topic).ok_or_else(|| UnknownTopic(topic.to_string()))?;
    Ok(render(topic, ctx))
}

fn render(topic: Topic, ctx: &KnowledgeContext) -> String {
    match topic {
        Topic::AboutSketch => ABOUT_SKETCH.to_string(),
        Topic::WorkingBranch => WORKING_BRANCH_TEMPLATE
            .replace("{branch}", &ctx.branch)
            .replace("{session_id}", &ctx.session_id),
        Topic::Todos => TODOS.to_string(),
        Topic::AutoInstall => AUTO_INSTALL.to_string(),
    }
}

const ABOUT_SKETCH: &str = "\
This agent runs shell commands, edits files, and searches the repository \
on your behalf. Every subprocess it spawns carries SKETCH=1 in its \
environment so scripts can detect they are running inside it.";

const WORKING_BRANCH_TEMPLATE: &str = "\
Session {session_id} is currently working on branch '{branch}'. The agent \
treats 'sketch-wip' as its conventional scratch branch; switching away from \
it without committing is flagged once per process.";

const TODOS: &str = "\
Use todo_write to persist a task list for this session and todo_read to \
retrieve it. At most one task may be in-progress at a time.";

const AUTO_INSTALL: &str = "\
When a shell command references a tool that is missing from PATH, the \
agent may attempt to install it using the system package manager. Only \
mainstream tools from standard repositories are installed; piping a \
downloaded script into a shell is never attempted automatically.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn about_sketch_is_returned_for_the_default_topic() {
        let ctx = KnowledgeContext::default();
        assert_eq!(lookup("", &ctx).unwrap(), ABOUT_SKETCH);
        assert_eq!(lookup("about_sketch", &ctx).unwrap(), ABOUT_SKETCH);
    }

    #[test]
    fn working_branch_expands_the_template() {
        let ctx = KnowledgeContext {
            session_id: "sess-1".into(),
            branch: "sketch-wip".into(),
        };
        let body = lookup("working_branch", &ctx).unwrap();
        assert!(body.contains("sess-1"));
        assert!(body.contains("sketch-wip"));
    }

    #[test]
    fn unknown_topic_fails() {
        let ctx = KnowledgeContext::default();
        let err = lookup("nonexistent", &ctx).unwrap_err();
        assert_eq!(err.0, "nonexistent");
    }
}
