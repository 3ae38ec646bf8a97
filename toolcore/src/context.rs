//! Working-directory context: the value threaded through every tool dispatch.

/// Scoped per-invocation context. Readers never fail; an absent context is
/// represented by empty strings rather than `Option`, so callers don't need
/// to special-case "no context yet".
#[derive(Debug, Clone, Default)]
pub struct WorkingDir {
    cwd: String,
    session_id: String,
}

impl WorkingDir {
    pub fn new(cwd: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            cwd: cwd.into(),
            session_id: session_id.into(),
        }
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// `None` when `cwd` is empty, so patch/search can treat it the same way
    /// as "no working directory configured".
    pub fn cwd_path(&self) -> Option<&std::path::Path> {
        if self.cwd.is_empty() {
            None
        } else {
            Some(std::path::Path::new(&self.cwd))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_context_yields_empty_strings() {
        let wd = WorkingDir::default();
        assert_eq!(wd.cwd(), "");
        assert_eq!(wd.session_id(), "");
        assert!(wd.cwd_path().is_none());
    }

    #[test]
    fn populated_context_roundtrips() {
        let wd = WorkingDir::new("/repo", "sess-1");
        assert_eq!(wd.cwd(), "/repo");
        assert_eq!(wd.session_id(), "sess-1");
        assert_eq!(wd.cwd_path(), Some(std::path::Path::new("/repo")));
    }
}
