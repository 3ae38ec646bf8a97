//! Tool dispatcher: decodes a `ToolCall`'s raw JSON input against each
//! tool's schema, runs per-tool permission pre-checks, invokes the
//! executor, and wraps the result as a `ToolOut`.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use toolcore_bash::{BashRequest, Timeouts, run_background, run_foreground};
use toolcore_patch::{PatchInput, PatchOp};
use toolcore_safety::{extract_candidates, screen};

use crate::context::WorkingDir;
use crate::model::{SubConvo, ToolCall, ToolOut};
use crate::search::{SearchRequest, keyword_search};
use crate::todo::{self, TodoList};
use crate::{knowledge, think};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid input for {tool}: {source}")]
    InvalidInput {
        tool: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Options attached to a dispatch call that don't belong in the wire input
/// (e.g. whether bash may trigger the JIT installer, or a caller-supplied
/// override of the bash tiered timeouts).
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchOptions {
    pub enable_jit: bool,
    pub timeouts: Timeouts,
}

/// Dispatch `call` against its working-directory context. `convo`, when
/// present, backs the keyword-search relevance filter and the JIT
/// installer's sub-conversation; tools that don't need one may be run with
/// a no-op stub.
pub async fn dispatch(
    call: &ToolCall,
    wd: &WorkingDir,
    convo: &mut dyn SubConvo,
    opts: DispatchOptions,
) -> ToolOut {
    match call.name.as_str() {
        "bash" => dispatch_bash(call, wd, convo, opts).await,
        "patch" => dispatch_patch(call, wd).await,
        "keyword_search" => dispatch_keyword_search(call, wd, convo).await,
        "think" => dispatch_think(call),
        "todo_read" => dispatch_todo_read(wd).await,
        "todo_write" => dispatch_todo_write(call, wd).await,
        "knowledge_base" | "about_sketch" => dispatch_knowledge(call, wd),
        other => ToolOut::err(DispatchError::UnknownTool(other.to_string()).to_string()),
    }
}

fn decode<T: for<'de> Deserialize<'de>>(tool: &str, input: &Value) -> Result<T, DispatchError> {
    serde_json::from_value(input.clone()).map_err(|source| DispatchError::InvalidInput {
        tool: tool.to_string(),
        source,
    })
}

#[derive(Debug, Deserialize)]
struct BashInput {
    command: String,
    #[serde(default)]
    slow_ok: bool,
    #[serde(default)]
    background: bool,
}

async fn dispatch_bash(
    call: &ToolCall,
    wd: &WorkingDir,
    convo: &mut dyn SubConvo,
    opts: DispatchOptions,
) -> ToolOut {
    let input: BashInput = match decode("bash", &call.input) {
        Ok(input) => input,
        Err(err) => return ToolOut::err(err.to_string()),
    };

    if let Err(denied) = screen(&input.command) {
        return ToolOut::err(denied.to_string());
    }

    if opts.enable_jit {
        if let Ok(candidates) = extract_candidates(&input.command) {
            if !candidates.is_empty() {
                crate::jit::install(&candidates, convo).await;
            }
        }
    }

    let request = BashRequest {
        command: input.command,
        slow_ok: input.slow_ok,
        background: input.background,
    };
    let timeouts = opts.timeouts;

    if request.background {
        match run_background(&request, wd.cwd(), timeouts.for_request(&request)).await {
            Ok(handle) => {
                let body = serde_json::json!({
                    "pid": handle.pid,
                    "stdout_file": handle.stdout_path,
                    "stderr_file": handle.stderr_path,
                });
                ToolOut::text(body.to_string())
            }
            Err(err) => ToolOut::err(err.to_string()),
        }
    } else {
        match run_foreground(&request, wd.cwd(), &timeouts).await {
            Ok(output) => ToolOut::text(output),
            Err(err) => ToolOut::err(err.to_string()),
        }
    }
}

/// Wire shapes tolerated for `patch`: the canonical array, a single object
/// (not wrapped in an array), or a JSON-encoded string. All three normalize
/// to the same `Vec<WirePatchOp>`.
#[derive(Debug, Deserialize)]
struct WirePatchInput {
    path: String,
    patches: Value,
}

#[derive(Debug, Deserialize)]
struct WirePatchOp {
    operation: String,
    #[serde(rename = "oldText", default)]
    old_text: Option<String>,
    #[serde(rename = "newText", default)]
    new_text: String,
}

fn normalize_patch_ops(raw: &Value) -> Result<Vec<WirePatchOp>, DispatchError> {
    match raw {
        Value::Array(_) => decode("patch", raw),
        Value::Object(_) => Ok(vec![decode("patch", raw)?]),
        Value::String(s) => {
            let parsed: Value = serde_json::from_str(s).map_err(|source| DispatchError::InvalidInput {
                tool: "patch".to_string(),
                source,
            })?;
            normalize_patch_ops(&parsed)
        }
        _ => Err(DispatchError::InvalidInput {
            tool: "patch".to_string(),
            source: serde::de::Error::custom("patches must be an array, object, or JSON string"),
        }),
    }
}

fn to_patch_op(op: WirePatchOp) -> Result<PatchOp, ToolOut> {
    match op.operation.as_str() {
        "prepend_bof" => Ok(PatchOp::PrependBof { new: op.new_text }),
        "append_eof" => Ok(PatchOp::AppendEof { new: op.new_text }),
        "overwrite" => Ok(PatchOp::Overwrite { new: op.new_text }),
        "replace" => {
            let old = op.old_text.unwrap_or_default();
            if old.is_empty() {
                return Err(ToolOut::err("replace requires non-empty oldText"));
            }
            Ok(PatchOp::Replace { old, new: op.new_text })
        }
        other => Err(ToolOut::err(format!("unknown patch operation: {other}"))),
    }
}

async fn dispatch_patch(call: &ToolCall, wd: &WorkingDir) -> ToolOut {
    let wire: WirePatchInput = match decode("patch", &call.input) {
        Ok(wire) => wire,
        Err(err) => return ToolOut::err(err.to_string()),
    };
    let wire_ops = match normalize_patch_ops(&wire.patches) {
        Ok(ops) => ops,
        Err(err) => return ToolOut::err(err.to_string()),
    };

    let mut patches = Vec::with_capacity(wire_ops.len());
    for op in wire_ops {
        match to_patch_op(op) {
            Ok(op) => patches.push(op),
            Err(out) => return out,
        }
    }

    let input = PatchInput {
        path: wire.path,
        patches,
    };
    let cwd = wd.cwd_path().map(Path::to_path_buf);
    match toolcore_patch::apply(&input, cwd.as_deref()).await {
        Ok(outcome) => ToolOut::text_with_display(outcome.content, outcome.display),
        Err(err) => ToolOut::err(err.to_string()),
    }
}

async fn dispatch_keyword_search(call: &ToolCall, wd: &WorkingDir, convo: &mut dyn SubConvo) -> ToolOut {
    let input: SearchRequest = match decode("keyword_search", &call.input) {
        Ok(input) => input,
        Err(err) => return ToolOut::err(err.to_string()),
    };
    let cwd = wd.cwd_path().unwrap_or_else(|| Path::new("."));
    match keyword_search(&input, cwd, convo).await {
        Ok(text) => ToolOut::text(text),
        Err(err) => ToolOut::err(err.to_string()),
    }
}

fn dispatch_think(call: &ToolCall) -> ToolOut {
    let thoughts = call
        .input
        .get("thoughts")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    ToolOut::text(think::record(thoughts))
}

async fn dispatch_todo_read(wd: &WorkingDir) -> ToolOut {
    match todo::read(wd.session_id()).await {
        Ok(text) => ToolOut::text(text),
        Err(err) => ToolOut::err(err.to_string()),
    }
}

async fn dispatch_todo_write(call: &ToolCall, wd: &WorkingDir) -> ToolOut {
    #[derive(Deserialize)]
    struct Wire {
        tasks: Vec<crate::todo::TodoItem>,
    }
    let wire: Wire = match decode("todo_write", &call.input) {
        Ok(wire) => wire,
        Err(err) => return ToolOut::err(err.to_string()),
    };
    let list = TodoList { tasks: wire.tasks };
    match todo::write(wd.session_id(), list).await {
        Ok(summary) => ToolOut::text(summary),
        Err(err) => ToolOut::err(err.to_string()),
    }
}

fn dispatch_knowledge(call: &ToolCall, wd: &WorkingDir) -> ToolOut {
    let topic = call.input.get("topic").and_then(|v| v.as_str()).unwrap_or("");
    let ctx = knowledge::KnowledgeContext {
        session_id: wd.session_id().to_string(),
        branch: String::new(),
    };
    match knowledge::lookup(topic, &ctx) {
        Ok(body) => ToolOut::text(body),
        Err(err) => ToolOut::err(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, input: Value) -> ToolCall {
        ToolCall {
            name: name.to_string(),
            input,
            call_id: "call-1".to_string(),
        }
    }

    #[test]
    fn normalizes_array_shape() {
        let ops = normalize_patch_ops(&json!([{"operation": "overwrite", "newText": "x"}])).unwrap();
        assert_eq!(ops.len(), 1);
    }

    #[test]
    fn normalizes_singleton_object_shape() {
        let ops = normalize_patch_ops(&json!({"operation": "overwrite", "newText": "x"})).unwrap();
        assert_eq!(ops.len(), 1);
    }

    #[test]
    fn normalizes_stringified_json_shape() {
        let raw = json!("[{\"operation\": \"overwrite\", \"newText\": \"x\"}]");
        let ops = normalize_patch_ops(&raw).unwrap();
        assert_eq!(ops.len(), 1);
    }

    #[test]
    fn replace_with_empty_old_text_is_rejected() {
        let op = WirePatchOp {
            operation: "replace".to_string(),
            old_text: Some(String::new()),
            new_text: "x".to_string(),
        };
        let out = to_patch_op(op).unwrap_err();
        assert!(matches!(out, ToolOut::Err(_)));
    }

    #[tokio::test]
    async fn think_dispatch_is_a_constant_acknowledgement() {
        let out = dispatch_think(&call("think", json!({"thoughts": "hmm"})));
        match out {
            ToolOut::Ok { content, .. } => {
                let crate::model::Content::Text(text) = &content[0];
                assert_eq!(text, "recorded");
            }
            ToolOut::Err(_) => panic!("expected ok"),
        }
    }

    #[test]
    fn unknown_topic_surfaces_as_error() {
        let out = dispatch_knowledge(&call("knowledge_base", json!({"topic": "bogus"})), &WorkingDir::default());
        assert!(matches!(out, ToolOut::Err(_)));
    }
}
