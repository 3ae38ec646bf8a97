//! Bash safety screener (deny-list lint against model mistakes, not a
//! security boundary).

use std::sync::atomic::{AtomicBool, Ordering};

use crate::parse::{CallWords, parse_calls_strict};

/// Warning state for the "once per process" `sketch-wip` branch-change
/// warning. Process-wide, mutex-free (a single bool suffices).
static WARNED_BRANCH_CHANGE: AtomicBool = AtomicBool::new(false);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("{0}")]
pub struct PermissionDenied(pub String);

/// Reset the once-per-process warning flag. Test-only hook.
pub fn reset_warnings() {
    WARNED_BRANCH_CHANGE.store(false, Ordering::SeqCst);
}

/// Screen a shell script for denied patterns. If the script fails to parse,
/// the screener is not a security boundary, so it returns success —
/// execution will surface a better error later.
pub fn screen(script: &str) -> Result<(), PermissionDenied> {
    let calls = match parse_calls_strict(script) {
        Ok(calls) => calls,
        Err(_) => return Ok(()),
    };

    for call in &calls {
        check_git_config_identity(call)?;
        check_git_add_all(call)?;
        check_branch_change(call);
    }
    Ok(())
}

fn check_git_config_identity(call: &CallWords) -> Result<(), PermissionDenied> {
    if call.first().map(String::as_str) != Some("git") {
        return Ok(());
    }
    // Skip leading flags between `git` and the subcommand (e.g. `-C dir`).
    let mut idx = 1;
    while idx < call.len() && call[idx].starts_with('-') {
        idx += 1;
    }
    if call.get(idx).map(String::as_str) != Some("config") {
        return Ok(());
    }
    idx += 1;
    // Skip config flags (--global, --local, -f <file>, ...).
    while idx < call.len() && call[idx].starts_with('-') {
        idx += 1;
    }
    if let Some(key) = call.get(idx) {
        if key == "user.name" || key == "user.email" {
            return Err(PermissionDenied(format!(
                "git config {key} is denied; set the identity via environment variables instead"
            )));
        }
    }
    Ok(())
}

fn check_git_add_all(call: &CallWords) -> Result<(), PermissionDenied> {
    if call.first().map(String::as_str) != Some("git") || call.get(1).map(String::as_str) != Some("add") {
        return Ok(());
    }
    let denied = call[2..]
        .iter()
        .any(|arg| matches!(arg.as_str(), "-A" | "--all" | "." | "*"));
    if denied {
        return Err(PermissionDenied(
            "git add -A/--all/./* is denied; stage explicit paths instead".to_string(),
        ));
    }
    Ok(())
}

fn check_branch_change(call: &CallWords) {
    let is_branch_move = call.first().map(String::as_str) == Some("git")
        && call.get(1).map(String::as_str) == Some("branch")
        && call.get(2).map(|f| f == "-m" || f == "-M").unwrap_or(false)
        && call.get(3).map(|n| n.starts_with("sketch-wip")).unwrap_or(false);

    let is_checkout_or_switch = call.first().map(String::as_str) == Some("git")
        && matches!(call.get(1).map(String::as_str), Some("checkout") | Some("switch"))
        && call
            .get(2)
            .map(|target| !target.contains('/') && !target.contains('.'))
            .unwrap_or(false);

    if !(is_branch_move || is_checkout_or_switch) {
        return;
    }

    if WARNED_BRANCH_CHANGE
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        tracing::warn!(
            "leaving the sketch-wip branch without care can strand uncommitted work; proceeding anyway"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denies_git_config_user_name() {
        reset_warnings();
        let err = screen("git config user.name bob").unwrap_err();
        assert!(err.0.contains("user.name"));
    }

    #[test]
    fn allows_git_config_core_editor() {
        reset_warnings();
        assert!(screen("git config core.editor vim").is_ok());
    }

    #[test]
    fn denies_git_add_dash_a() {
        reset_warnings();
        assert!(screen("git add -A").is_err());
    }

    #[test]
    fn denies_git_add_dot() {
        reset_warnings();
        assert!(screen("git add .").is_err());
    }

    #[test]
    fn allows_git_add_explicit_path() {
        reset_warnings();
        assert!(screen("git add src/main.rs").is_ok());
    }

    #[test]
    fn branch_change_warns_once() {
        reset_warnings();
        assert!(screen("git checkout main").is_ok());
        assert!(screen("git checkout main").is_ok());
        assert!(WARNED_BRANCH_CHANGE.load(Ordering::SeqCst));
    }

    #[test]
    fn checkout_with_path_like_target_is_not_a_branch_change() {
        reset_warnings();
        assert!(screen("git checkout ./file.txt").is_ok());
    }

    #[test]
    fn syntactically_invalid_script_passes_the_screener() {
        reset_warnings();
        assert!(screen("if [ ; then echo").is_ok());
    }
}
