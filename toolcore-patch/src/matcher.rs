//! Ordered fuzzy-match fallback cascade for `replace(old, new)`.
//!
//! Each strategy is a `(original, old) -> Outcome` function; the cascade
//! tries them in order and stops at the first success, per the ordering
//! mandated for the replace semantics.

/// Where a match for `old` was located in `original`, and what `new` text
/// should be substituted in its place (adjusted for the strategy's
/// normalization, e.g. dedent).
pub(crate) struct Match {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
}

pub(crate) enum Outcome {
    Found(Match),
    NotUnique,
    NotFound,
}

/// Run the ordered cascade: exact-unique, dedent, lexical (whitespace
/// insensitive), token-equivalence, first-line-trim. Only strategy 1's
/// ambiguity is terminal; strategies 2-4 treat their own multi-match case
/// as a miss so a later, more specific strategy can still resolve it.
pub(crate) fn locate_replacement(original: &str, old: &str, new: &str) -> Outcome {
    match exact_unique(original, old, new) {
        Outcome::NotFound => {}
        other => return other,
    }
    match dedent(original, old, new) {
        Outcome::NotFound => {}
        other => return other,
    }
    match lexical_whitespace_insensitive(original, old, new) {
        Outcome::NotFound => {}
        other => return other,
    }
    match token_equivalence(original, old, new) {
        Outcome::NotFound => {}
        other => return other,
    }
    first_line_trim(original, old, new)
}

fn occurrences(haystack: &str, needle: &str) -> Vec<usize> {
    if needle.is_empty() {
        return Vec::new();
    }
    let mut positions = Vec::new();
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        let absolute = start + pos;
        positions.push(absolute);
        start = absolute + 1;
    }
    positions
}

/// Strategy 1: exact, byte-for-byte substring match.
fn exact_unique(original: &str, old: &str, new: &str) -> Outcome {
    let hits = occurrences(original, old);
    match hits.len() {
        0 => Outcome::NotFound,
        1 => Outcome::Found(Match {
            start: hits[0],
            end: hits[0] + old.len(),
            replacement: new.to_string(),
        }),
        _ => Outcome::NotUnique,
    }
}

fn common_leading_whitespace(lines: &[&str]) -> usize {
    lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0)
}

/// Strategy 2: strip the common leading-whitespace prefix from every line
/// of `old`; if the dedented text matches uniquely, apply the same
/// dedent to `new` before substitution (both were copied at the same,
/// over-indented nesting level).
fn dedent(original: &str, old: &str, new: &str) -> Outcome {
    let old_lines: Vec<&str> = old.lines().collect();
    let prefix_len = common_leading_whitespace(&old_lines);
    if prefix_len == 0 {
        return Outcome::NotFound;
    }
    let dedented_old: String = old_lines
        .iter()
        .map(|l| l.get(prefix_len.min(l.len())..).unwrap_or(""))
        .collect::<Vec<_>>()
        .join("\n");

    let hits = occurrences(original, &dedented_old);
    if hits.len() != 1 {
        return Outcome::NotFound;
    }

    let new_lines: Vec<&str> = new.lines().collect();
    let dedented_new: String = new_lines
        .iter()
        .map(|l| l.get(prefix_len.min(l.len())..).unwrap_or(l))
        .collect::<Vec<_>>()
        .join("\n");

    Outcome::Found(Match {
        start: hits[0],
        end: hits[0] + dedented_old.len(),
        replacement: dedented_new,
    })
}

/// Strategy 3: compare ignoring per-line leading/trailing whitespace —
/// covers reformatted context (tabs vs. spaces, trailing blanks) without
/// requiring knowledge of the source language's grammar.
fn lexical_whitespace_insensitive(original: &str, old: &str, new: &str) -> Outcome {
    let old_norm: Vec<&str> = old.lines().map(str::trim).collect();
    if old_norm.is_empty() {
        return Outcome::NotFound;
    }
    let file_lines: Vec<&str> = original.lines().collect();
    let mut matches = Vec::new();

    if old_norm.len() > file_lines.len() {
        return Outcome::NotFound;
    }
    for start in 0..=(file_lines.len() - old_norm.len()) {
        let window = &file_lines[start..start + old_norm.len()];
        if window.iter().map(|l| l.trim()).eq(old_norm.iter().copied()) {
            matches.push(start);
        }
    }

    match matches.len() {
        1 => {
            let start_line = matches[0];
            let (byte_start, byte_end) = line_range_to_byte_range(original, start_line, old_norm.len());
            Outcome::Found(Match {
                start: byte_start,
                end: byte_end,
                replacement: new.to_string(),
            })
        }
        // Ambiguous at this strategy's resolution, not ambiguous overall —
        // let a later, more specific strategy have a shot at it.
        _ => Outcome::NotFound,
    }
}

fn line_range_to_byte_range(text: &str, start_line: usize, line_count: usize) -> (usize, usize) {
    let mut offset = 0usize;
    let mut start_byte = 0usize;
    let mut end_byte = text.len();

    for (idx, line) in text.split_inclusive('\n').enumerate() {
        if idx == start_line {
            start_byte = offset;
        }
        offset += line.len();
        if idx + 1 == start_line + line_count {
            end_byte = offset;
            break;
        }
    }
    (start_byte, end_byte)
}

fn tokenize(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = text[i..].chars().next().unwrap();
        if c.is_whitespace() {
            i += c.len_utf8();
            continue;
        }
        let start = i;
        if c.is_alphanumeric() || c == '_' {
            while i < bytes.len() {
                let c = text[i..].chars().next().unwrap();
                if c.is_alphanumeric() || c == '_' {
                    i += c.len_utf8();
                } else {
                    break;
                }
            }
        } else {
            i += c.len_utf8();
        }
        tokens.push(&text[start..i]);
    }
    tokens
}

/// Strategy 4: tokenize both the file and `old`, ignoring whitespace
/// entirely, and look for a unique contiguous token subsequence match.
fn token_equivalence(original: &str, old: &str, new: &str) -> Outcome {
    let old_tokens = tokenize(old);
    if old_tokens.is_empty() {
        return Outcome::NotFound;
    }
    let file_tokens = tokenize(original);
    if old_tokens.len() > file_tokens.len() {
        return Outcome::NotFound;
    }

    let mut matches = Vec::new();
    for start in 0..=(file_tokens.len() - old_tokens.len()) {
        if file_tokens[start..start + old_tokens.len()] == old_tokens[..] {
            matches.push(start);
        }
    }

    match matches.len() {
        1 => {
            // Re-locate the byte span of this token run in the original text
            // by scanning once more, tracking byte offsets per token.
            let mut token_starts = Vec::with_capacity(file_tokens.len());
            let mut i = 0;
            let bytes = original.as_bytes();
            while i < bytes.len() {
                let c = original[i..].chars().next().unwrap();
                if c.is_whitespace() {
                    i += c.len_utf8();
                    continue;
                }
                token_starts.push(i);
                let start = i;
                if c.is_alphanumeric() || c == '_' {
                    while i < bytes.len() {
                        let c = original[i..].chars().next().unwrap();
                        if c.is_alphanumeric() || c == '_' {
                            i += c.len_utf8();
                        } else {
                            break;
                        }
                    }
                } else {
                    i += c.len_utf8();
                }
                let _ = start;
            }
            let first = matches[0];
            let last = first + old_tokens.len() - 1;
            let start_byte = token_starts[first];
            let end_byte = token_starts.get(last + 1).copied().unwrap_or(original.len());
            Outcome::Found(Match {
                start: start_byte,
                end: end_byte,
                replacement: new.to_string(),
            })
        }
        // Ambiguous at this strategy's resolution, not ambiguous overall —
        // let a later, more specific strategy have a shot at it.
        _ => Outcome::NotFound,
    }
}

/// Strategy 5: drop the first line of `old` (only when it is pure context,
/// i.e. stripping it still leaves at least one line) and retry an exact
/// unique match on the remainder.
fn first_line_trim(original: &str, old: &str, new: &str) -> Outcome {
    let Some(newline_idx) = old.find('\n') else {
        return Outcome::NotFound;
    };
    let trimmed_old = &old[newline_idx + 1..];
    if trimmed_old.is_empty() {
        return Outcome::NotFound;
    }
    match exact_unique(original, trimmed_old, new) {
        Outcome::Found(m) => Outcome::Found(m),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_unique_finds_single_match() {
        match locate_replacement("Hello World\n", "World", "Patch") {
            Outcome::Found(m) => assert_eq!(&"Hello World\n"[m.start..m.end], "World"),
            _ => panic!("expected a match"),
        }
    }

    #[test]
    fn exact_match_reports_not_unique() {
        assert!(matches!(
            locate_replacement("duplicate\nduplicate\n", "duplicate", "unique"),
            Outcome::NotUnique
        ));
    }

    #[test]
    fn dedent_matches_over_indented_copy() {
        let file = "let x = 1;\nlet y = 2;\n";
        let old = "    let x = 1;\n    let y = 2;";
        let new = "    let z = 3;";
        match locate_replacement(file, old, new) {
            Outcome::Found(m) => {
                assert_eq!(&file[m.start..m.end], "let x = 1;\nlet y = 2;");
                assert_eq!(m.replacement, "let z = 3;");
            }
            _ => panic!("expected a dedent match"),
        }
    }

    #[test]
    fn token_equivalence_ignores_whitespace_differences() {
        let file = "let   x=1;\n";
        let old = "let x = 1;";
        match locate_replacement(file, old, "let x = 2;") {
            Outcome::Found(_) => {}
            _ => panic!("expected token-equivalence match"),
        }
    }

    #[test]
    fn not_found_when_nothing_matches() {
        assert!(matches!(
            locate_replacement("abc\n", "zzz", "new"),
            Outcome::NotFound
        ));
    }

    #[test]
    fn lexical_ambiguity_falls_through_to_first_line_trim() {
        // Two blocks are lexically equal once each line is trimmed, so
        // strategy 3 (and strategy 4) see two matches. Dropping `old`'s
        // first line leaves a remainder that's an exact, unique match for
        // the second block only — strategy 5 should be given the chance.
        let file = " foo\n bar \n foo\n  bar\n";
        let old = "   foo\n  bar";
        match locate_replacement(file, old, "REPLACED") {
            Outcome::Found(m) => {
                assert_eq!(&file[m.start..m.end], "  bar");
                assert_eq!(m.replacement, "REPLACED");
            }
            Outcome::NotUnique => panic!("strategy 3/4's own ambiguity should not abort the cascade"),
            Outcome::NotFound => panic!("expected strategy 5 to resolve the remaining ambiguity"),
        }
    }
}
