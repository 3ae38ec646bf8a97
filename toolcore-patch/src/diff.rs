use similar::{ChangeTag, TextDiff};

/// Render a unified diff between `before` and `after`, for the `ToolOut`
/// display payload.
pub fn unified_diff(path: &str, before: &str, after: &str) -> String {
    let diff = TextDiff::from_lines(before, after);
    let mut out = format!("--- a/{path}\n+++ b/{path}\n");
    for hunk in diff.unified_diff().context_radius(3).iter_hunks() {
        out.push_str(&hunk.header().to_string());
        out.push('\n');
        for change in hunk.iter_changes() {
            let sign = match change.tag() {
                ChangeTag::Delete => '-',
                ChangeTag::Insert => '+',
                ChangeTag::Equal => ' ',
            };
            out.push(sign);
            out.push_str(change.value());
            if !change.value().ends_with('\n') {
                out.push('\n');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_a_single_line_change() {
        let diff = unified_diff("test.txt", "Hello World\n", "Hello Patch\n");
        assert!(diff.contains("-Hello World"));
        assert!(diff.contains("+Hello Patch"));
    }
}
