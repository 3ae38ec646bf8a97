//! Just-in-time tool installer: a hidden sub-agent that attempts to install
//! missing commands before the bash tool runs them. Advisory only — every
//! failure is logged and swallowed, never surfaced to the host tool call.

use std::sync::Mutex;
use std::sync::OnceLock;

use rustc_hash::FxHashSet;
use toolcore_bash::{BashRequest, Timeouts, run_foreground};

use crate::model::{Content, StopReason, SubConvo, ToolCall, ToolOut};

fn do_not_attempt() -> &'static Mutex<FxHashSet<String>> {
    static DO_NOT_ATTEMPT: OnceLock<Mutex<FxHashSet<String>>> = OnceLock::new();
    DO_NOT_ATTEMPT.get_or_init(|| Mutex::new(FxHashSet::default()))
}

/// Test-only hook mirroring the screener's `reset_warnings`.
pub fn reset_do_not_attempt() {
    do_not_attempt().lock().unwrap().clear();
}

fn is_on_path(command: &str) -> bool {
    let Ok(path_var) = std::env::var("PATH") else {
        return false;
    };
    std::env::split_paths(&path_var).any(|dir| dir.join(command).is_file())
}

/// Filter `candidates` down to the ones worth attempting: not already
/// marked do-not-attempt, and not already present on PATH (those are added
/// to the set and skipped).
fn missing_candidates(candidates: &[String]) -> Vec<String> {
    let mut guard = do_not_attempt().lock().unwrap();
    let mut missing = Vec::new();
    for candidate in candidates {
        if guard.contains(candidate) {
            continue;
        }
        if is_on_path(candidate) {
            guard.insert(candidate.clone());
            continue;
        }
        missing.push(candidate.clone());
    }
    missing
}

fn mark_attempted(candidates: &[String]) {
    let mut guard = do_not_attempt().lock().unwrap();
    for candidate in candidates {
        guard.insert(candidate.clone());
    }
}

const MAX_TURNS: usize = 8;

/// Attempt to install `candidates` via a hidden sub-conversation. Never
/// returns an error to the caller; failures are logged at warn level.
pub async fn install(candidates: &[String], convo: &mut dyn SubConvo) {
    let missing = missing_candidates(candidates);
    if missing.is_empty() {
        return;
    }

    convo.set_hidden(true);
    convo.set_system_prompt(AUTO_INSTALL_PROMPT.to_string());
    convo.set_tools(vec!["bash".to_string(), "done".to_string()]);

    let commands_xml = missing
        .iter()
        .map(|c| format!("<command>{c}</command>"))
        .collect::<String>();
    let message = format!("<commands>{commands_xml}</commands>");

    let result = run_install_loop(convo, &message).await;
    if let Err(err) = result {
        tracing::warn!(error = %err, "jit installer failed, continuing without it");
    }

    mark_attempted(&missing);
}

async fn run_install_loop(convo: &mut dyn SubConvo, message: &str) -> anyhow::Result<()> {
    let mut reply = convo.send_user_text_message(message).await?;
    let mut turns = 0;

    loop {
        if reply.stop_reason != StopReason::ToolUse {
            return Ok(());
        }
        turns += 1;
        if turns > MAX_TURNS {
            anyhow::bail!("exceeded max installer turns");
        }

        let mut done = false;
        for call in &reply.tool_calls {
            if call.name == "done" {
                done = true;
                continue;
            }
            let out = execute_nested_bash(call).await;
            let contents = convo.tool_result_contents(&out);
            feed_tool_result(convo, call, &contents).await?;
        }
        if done {
            return Ok(());
        }
        reply = convo
            .send_message("user", "continue")
            .await?;
    }
}

async fn feed_tool_result(
    convo: &mut dyn SubConvo,
    _call: &ToolCall,
    contents: &[Content],
) -> anyhow::Result<()> {
    let text = contents
        .iter()
        .map(|c| match c {
            Content::Text(t) => t.as_str(),
        })
        .collect::<Vec<_>>()
        .join("\n");
    convo.send_message("tool", &text).await?;
    Ok(())
}

async fn execute_nested_bash(call: &ToolCall) -> ToolOut {
    if call.name != "bash" {
        return ToolOut::err(format!("unexpected tool in installer: {}", call.name));
    }
    let command = match call.input.get("command").and_then(|v| v.as_str()) {
        Some(c) => c.to_string(),
        None => return ToolOut::err("missing command"),
    };
    let request = BashRequest {
        command,
        slow_ok: false,
        background: false,
    };
    let timeouts = Timeouts::default();
    match run_foreground(&request, "", &timeouts).await {
        Ok(output) => ToolOut::text(output),
        Err(err) => ToolOut::err(err.to_string()),
    }
}

const AUTO_INSTALL_PROMPT: &str = "\
You are installing missing command-line tools so a shell command can run. \
Only install mainstream tools from standard package repositories (apt, \
brew, cargo, pip, npm). Never pipe a downloaded script into a shell \
(no `curl | sh`). Use the bash tool to run installer commands, then call \
the done tool once you have finished or determined installation is not \
possible.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_command_present_on_path_is_not_missing() {
        reset_do_not_attempt();
        let missing = missing_candidates(&["sh".to_string()]);
        assert!(missing.is_empty(), "expected 'sh' to resolve via PATH in test env");
    }

    #[test]
    fn an_unresolvable_command_is_reported_missing() {
        reset_do_not_attempt();
        let missing = missing_candidates(&["definitely-not-a-real-binary-xyz".to_string()]);
        assert_eq!(missing, vec!["definitely-not-a-real-binary-xyz".to_string()]);
    }

    #[test]
    fn once_attempted_a_command_is_skipped_on_retry() {
        reset_do_not_attempt();
        mark_attempted(&["widget".to_string()]);
        let missing = missing_candidates(&["widget".to_string()]);
        assert!(missing.is_empty());
    }
}
