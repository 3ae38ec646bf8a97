//! Deterministic slug derivation for identifiers that must survive a round
//! trip through storage (e.g. a todo item's id).

/// Derive a stable slug from arbitrary text: lowercase, ASCII-only,
/// words joined by `-`, truncated to a reasonable length. The same input
/// always produces the same output.
///
/// # Examples
///
/// ```
/// use toolcore_commons::slug::stable_slug;
///
/// assert_eq!(stable_slug("Fix the Bug!"), "fix-the-bug");
/// assert_eq!(stable_slug("Fix the Bug!"), stable_slug("Fix the Bug!"));
/// ```
pub fn stable_slug(text: &str) -> String {
    const MAX_LEN: usize = 48;
    let mut slug = String::with_capacity(text.len());
    let mut last_was_dash = true;
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.len() > MAX_LEN {
        slug.truncate(MAX_LEN);
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    if slug.is_empty() {
        slug.push_str("item");
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_slug_is_deterministic() {
        assert_eq!(stable_slug("Write the README"), stable_slug("Write the README"));
    }

    #[test]
    fn stable_slug_strips_punctuation_and_collapses_runs() {
        assert_eq!(stable_slug("Fix   the -- bug!!"), "fix-the-bug");
    }

    #[test]
    fn stable_slug_never_empty() {
        assert_eq!(stable_slug("!!!"), "item");
    }

    #[test]
    fn stable_slug_truncates_long_input() {
        let long = "word ".repeat(30);
        let slug = stable_slug(&long);
        assert!(slug.len() <= 48);
    }
}
