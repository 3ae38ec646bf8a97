//! Keyword search: a multi-term ripgrep driver with relevance filtering by
//! a hidden sub-conversation.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;
use toolcore_commons::sanitizer::redact_secrets;

use crate::model::SubConvo;

const STOPWORD_CAP_BYTES: usize = 64 * 1024;
const MERGED_CAP_BYTES: usize = 128 * 1024;
const TOO_MANY_RESULTS: &str = "each of those search terms yielded too many results";
const NO_MATCHES: &str = "no matches found";

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub search_terms: Vec<String>,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("rg exited with {0}")]
    RipgrepFailed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The repo root per `git rev-parse --show-toplevel`, falling back to `cwd`
/// when the lookup fails (not a git repo, or `git` missing).
pub async fn search_root(cwd: &Path) -> PathBuf {
    let output = Command::new("git")
        .arg("rev-parse")
        .arg("--show-toplevel")
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await;
    match output {
        Ok(out) if out.status.success() => {
            let root = String::from_utf8_lossy(&out.stdout).trim().to_string();
            if root.is_empty() {
                cwd.to_path_buf()
            } else {
                PathBuf::from(root)
            }
        }
        _ => cwd.to_path_buf(),
    }
}

async fn run_rg(root: &Path, terms: &[&str]) -> Result<RgOutcome, SearchError> {
    let mut cmd = Command::new("rg");
    cmd.arg("-C")
        .arg("10")
        .arg("-i")
        .arg("--line-number")
        .arg("--with-filename");
    for term in terms {
        cmd.arg("-e").arg(term);
    }
    cmd.current_dir(root);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let output = cmd.output().await?;
    match output.status.code() {
        Some(0) => Ok(RgOutcome::Matches(output.stdout)),
        Some(1) => Ok(RgOutcome::NoMatches),
        _ => Err(SearchError::RipgrepFailed(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        )),
    }
}

enum RgOutcome {
    Matches(Vec<u8>),
    NoMatches,
}

/// Run the ripgrep stages (stopword pruning, shrink-to-fit) and return the
/// merged output text, or a terminal literal message when no terms survive
/// or nothing matched.
pub async fn gather(root: &Path, terms: &[String]) -> Result<Result<String, String>, SearchError> {
    let mut survivors = Vec::new();
    for term in terms {
        match run_rg(root, &[term.as_str()]).await? {
            // Zero hits is within the byte cap too — only an oversized
            // result gets pruned here.
            RgOutcome::NoMatches => survivors.push(term.clone()),
            RgOutcome::Matches(bytes) if bytes.len() <= STOPWORD_CAP_BYTES => {
                survivors.push(term.clone());
            }
            RgOutcome::Matches(_) => continue,
        }
    }

    if survivors.is_empty() {
        return Ok(Err(TOO_MANY_RESULTS.to_string()));
    }

    loop {
        let refs: Vec<&str> = survivors.iter().map(String::as_str).collect();
        match run_rg(root, &refs).await? {
            RgOutcome::NoMatches => return Ok(Err(NO_MATCHES.to_string())),
            RgOutcome::Matches(bytes) if bytes.len() <= MERGED_CAP_BYTES || survivors.len() == 1 => {
                return Ok(Ok(String::from_utf8_lossy(&bytes).to_string()));
            }
            RgOutcome::Matches(_) => {
                survivors.pop();
            }
        }
    }
}

/// Run the full pipeline: gather ripgrep output, then hand it to a hidden,
/// non-cached sub-conversation for relevance filtering.
pub async fn keyword_search(
    request: &SearchRequest,
    cwd: &Path,
    convo: &mut dyn SubConvo,
) -> Result<String, SearchError> {
    let root = search_root(cwd).await;
    let ripgrep_results = match gather(&root, &request.search_terms).await? {
        Ok(text) => text,
        Err(message) => return Ok(message),
    };

    convo.set_hidden(true);
    convo.set_prompt_caching(false);
    convo.set_system_prompt(KEYWORD_FILTER_PROMPT.to_string());

    let message = format!(
        "<pwd>{}</pwd>\n<ripgrep_results>{}</ripgrep_results>\n<query>{}</query>",
        root.display(),
        redact_secrets(ripgrep_results),
        request.query
    );
    let reply = convo
        .send_user_text_message(&message)
        .await
        .map_err(|err| SearchError::RipgrepFailed(err.to_string()))?;
    Ok(reply.text)
}

const KEYWORD_FILTER_PROMPT: &str = "\
You are filtering ripgrep output for relevance to a query. Given <pwd>, \
<ripgrep_results>, and <query>, return only the excerpts that are actually \
relevant to answering the query, with enough surrounding context to be \
useful. Do not fabricate matches that are not present in the input.";
