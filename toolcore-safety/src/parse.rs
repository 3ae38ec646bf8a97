//! Shell-script parsing shared by the safety screener and the command
//! extractor. Uses tree-sitter's bash grammar to walk `CallExpr`-like nodes;
//! falls back to a permissive tokenizer when the grammar can't make sense
//! of the input (heredocs, exotic substitutions, syntax errors).

use std::sync::{Mutex, OnceLock};

use tree_sitter::{Node, Parser};

/// One parsed shell call: the words that make up a single command
/// invocation (e.g. `["git", "config", "user.name", "bob"]`).
pub type CallWords = Vec<String>;

static PARSER: OnceLock<Mutex<Parser>> = OnceLock::new();

fn parser() -> &'static Mutex<Parser> {
    PARSER.get_or_init(|| {
        let mut parser = Parser::new();
        let language: tree_sitter::Language = tree_sitter_bash::LANGUAGE.into();
        parser
            .set_language(&language)
            .expect("bash grammar failed to load");
        Mutex::new(parser)
    })
}

/// Parse a shell script into its call expressions. Tries the bash grammar
/// first; on grammar failure or an empty result, falls back to a basic
/// tokenizer so callers still see *something* for simple scripts.
pub fn parse_calls(script: &str) -> Result<Vec<CallWords>, String> {
    match parse_with_tree_sitter(script) {
        Ok(calls) if !calls.is_empty() => Ok(calls),
        Ok(_) => parse_basic(script),
        Err(err) => {
            tracing::debug!("bash grammar parse failed, falling back to tokenizer: {err}");
            parse_basic(script)
        }
    }
}

/// Parse using the bash grammar only — no tokenizer fallback. Returns an
/// error if the grammar cannot parse the script at all.
pub fn parse_calls_strict(script: &str) -> Result<Vec<CallWords>, String> {
    parse_with_tree_sitter(script)
}

fn parse_with_tree_sitter(script: &str) -> Result<Vec<CallWords>, String> {
    let guard = parser();
    let mut parser = guard.lock().map_err(|e| format!("parser lock poisoned: {e}"))?;
    let tree = parser
        .parse(script, None)
        .ok_or_else(|| "tree-sitter failed to parse script".to_string())?;

    if tree.root_node().has_error() {
        return Err("bash grammar found a syntax error".to_string());
    }

    let mut calls = Vec::new();
    let root = tree.root_node();
    let mut cursor = root.walk();
    collect_calls(root, script, &mut cursor, &mut calls);
    Ok(calls)
}

fn collect_calls<'a>(
    node: Node<'a>,
    source: &str,
    cursor: &mut tree_sitter::TreeCursor<'a>,
    out: &mut Vec<CallWords>,
) {
    if node.kind() == "command"
        && let Some(words) = words_of_command(node, source)
        && !words.is_empty()
    {
        out.push(words);
    }
    for child in node.children(cursor) {
        let mut child_cursor = child.walk();
        collect_calls(child, source, &mut child_cursor, out);
    }
}

fn words_of_command(node: Node<'_>, source: &str) -> Option<CallWords> {
    let mut words = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if matches!(
            child.kind(),
            "command_name" | "word" | "string" | "raw_string" | "concatenation"
        ) {
            if let Ok(text) = child.utf8_text(source.as_bytes()) {
                let trimmed = text.trim_matches(['"', '\'']).trim();
                if !trimmed.is_empty() {
                    words.push(trimmed.to_string());
                }
            }
        }
    }
    if words.is_empty() { None } else { Some(words) }
}

/// Permissive tokenizer used when the bash grammar can't handle the input.
/// Splits on `&&`, `||`, `;`, `|`, `&`, respecting quotes.
fn parse_basic(script: &str) -> Result<Vec<CallWords>, String> {
    let mut calls = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut quote_char = ' ';
    let mut escaped = false;

    let flush = |buf: &mut String, calls: &mut Vec<CallWords>| {
        let words: CallWords = buf
            .split_whitespace()
            .map(|w| w.trim_matches(['"', '\'']).to_string())
            .filter(|w| !w.is_empty())
            .collect();
        if !words.is_empty() {
            calls.push(words);
        }
        buf.clear();
    };

    for ch in script.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '\'' | '"' if !in_quotes => {
                in_quotes = true;
                quote_char = ch;
            }
            c if in_quotes && c == quote_char => in_quotes = false,
            '&' | '|' | ';' if !in_quotes => flush(&mut current, &mut calls),
            _ => current.push(ch),
        }
    }
    flush(&mut current, &mut calls);
    Ok(calls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_pipeline() {
        let calls = parse_calls("git status && cargo check").unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0][0], "git");
        assert_eq!(calls[1][0], "cargo");
    }

    #[test]
    fn falls_back_on_malformed_script() {
        let calls = parse_calls("echo 'unterminated").unwrap();
        assert!(!calls.is_empty());
    }
}
