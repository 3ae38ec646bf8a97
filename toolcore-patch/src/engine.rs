use std::path::{Path, PathBuf};

use crate::diff::unified_diff;
use crate::error::{PatchError, join_errors};
use crate::io::{self, Backup};
use crate::matcher::{self, Outcome};
use crate::types::{EditBuffer, PatchInput, PatchOp};

/// The successful result of applying a patch.
#[derive(Debug, Clone)]
pub struct PatchOutcome {
    pub content: String,
    pub display: String,
}

/// Resolve `path` against `pwd` if it is not already absolute, lexically
/// collapsing any `.`/`..` components the LLM-supplied path may contain.
fn resolve_path(path: &str, pwd: Option<&Path>) -> Result<PathBuf, PatchError> {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        return Ok(toolcore_commons::paths::normalize_path(candidate));
    }
    let pwd = pwd.ok_or(PatchError::NoWorkingDirectory)?;
    Ok(toolcore_commons::paths::normalize_path(&pwd.join(candidate)))
}

/// Apply `input.patches` to the file at `input.path`, resolved against
/// `pwd`. All patches are composed into a single edit buffer over the
/// original bytes and applied atomically: either every patch succeeds and
/// the file is rewritten once, or none of them take effect.
pub async fn apply(input: &PatchInput, pwd: Option<&Path>) -> Result<PatchOutcome, PatchError> {
    if input.patches.is_empty() {
        return Err(PatchError::EmptyPatches);
    }
    for op in &input.patches {
        op.validate()?;
    }

    let path = resolve_path(&input.path, pwd)?;
    let existing = io::read_existing(&path).await?;

    let replace_on_missing = existing.is_none()
        && input
            .patches
            .iter()
            .any(|op| matches!(op, PatchOp::Replace { .. }));
    if replace_on_missing {
        return Err(PatchError::FileNotFound {
            path: input.path.clone(),
        });
    }

    let original = existing.clone().unwrap_or_default();
    let mut buffer = EditBuffer::new();
    let mut errors = Vec::new();

    for op in &input.patches {
        match op {
            PatchOp::PrependBof { new } => buffer.insert(0, new.clone()),
            PatchOp::AppendEof { new } => buffer.insert(original.len(), new.clone()),
            PatchOp::Overwrite { new } => buffer.replace(0, original.len(), new.clone()),
            PatchOp::Replace { old, new } => {
                match matcher::locate_replacement(&original, old, new) {
                    Outcome::Found(m) => buffer.replace(m.start, m.end - m.start, m.replacement),
                    Outcome::NotUnique => errors.push(PatchError::NotUnique {
                        path: input.path.clone(),
                        old: old.clone(),
                    }),
                    Outcome::NotFound => errors.push(PatchError::NotFound {
                        path: input.path.clone(),
                        old: old.clone(),
                    }),
                }
            }
        }
    }

    if !errors.is_empty() {
        return Err(join_errors(errors));
    }

    let patched = buffer.flatten(&original).map_err(|err| match err {
        PatchError::OverlappingEdits { .. } => PatchError::OverlappingEdits {
            path: input.path.clone(),
        },
        other => other,
    })?;

    let backup = Backup::capture(&path, existing.clone());
    if let Err(write_err) = io::write_atomically(&path, &patched).await {
        tracing::warn!(path = %input.path, error = %write_err, "patch write failed, rolling back");
        let _ = backup.restore().await;
        return Err(write_err);
    }

    let autogen_warning = if io::is_autogenerated(&original) {
        "\nwarning: this file looks autogenerated; patches were applied anyway"
    } else {
        ""
    };

    Ok(PatchOutcome {
        content: format!("Applied all patches{autogen_warning}"),
        display: unified_diff(&input.path, &original, &patched),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PatchOp;
    use tempfile::TempDir;

    async fn read(path: &Path) -> String {
        tokio::fs::read_to_string(path).await.unwrap()
    }

    #[tokio::test]
    async fn overwrite_then_replace() {
        let dir = TempDir::new().unwrap();
        let path = "test.txt".to_string();

        let overwrite = PatchInput {
            path: path.clone(),
            patches: vec![PatchOp::Overwrite {
                new: "Hello World\n".to_string(),
            }],
        };
        apply(&overwrite, Some(dir.path())).await.unwrap();

        let replace = PatchInput {
            path,
            patches: vec![PatchOp::Replace {
                old: "World".to_string(),
                new: "Patch".to_string(),
            }],
        };
        apply(&replace, Some(dir.path())).await.unwrap();

        assert_eq!(read(&dir.path().join("test.txt")).await, "Hello Patch\n");
    }

    #[tokio::test]
    async fn non_unique_replace_leaves_file_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = "dup.txt".to_string();

        let overwrite = PatchInput {
            path: path.clone(),
            patches: vec![PatchOp::Overwrite {
                new: "duplicate\nduplicate\n".to_string(),
            }],
        };
        apply(&overwrite, Some(dir.path())).await.unwrap();

        let replace = PatchInput {
            path,
            patches: vec![PatchOp::Replace {
                old: "duplicate".to_string(),
                new: "unique".to_string(),
            }],
        };
        let err = apply(&replace, Some(dir.path())).await.unwrap_err();
        assert!(err.to_string().contains("not unique"));
        assert_eq!(
            read(&dir.path().join("dup.txt")).await,
            "duplicate\nduplicate\n"
        );
    }

    #[tokio::test]
    async fn replace_on_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let input = PatchInput {
            path: "missing.txt".to_string(),
            patches: vec![PatchOp::Replace {
                old: "x".to_string(),
                new: "y".to_string(),
            }],
        };
        let err = apply(&input, Some(dir.path())).await.unwrap_err();
        assert!(matches!(err, PatchError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn empty_patches_rejected() {
        let dir = TempDir::new().unwrap();
        let input = PatchInput {
            path: "any.txt".to_string(),
            patches: vec![],
        };
        let err = apply(&input, Some(dir.path())).await.unwrap_err();
        assert!(matches!(err, PatchError::EmptyPatches));
    }

    #[tokio::test]
    async fn creates_missing_parent_directory() {
        let dir = TempDir::new().unwrap();
        let input = PatchInput {
            path: "nested/dir/file.txt".to_string(),
            patches: vec![PatchOp::Overwrite {
                new: "content\n".to_string(),
            }],
        };
        apply(&input, Some(dir.path())).await.unwrap();
        assert_eq!(
            read(&dir.path().join("nested/dir/file.txt")).await,
            "content\n"
        );
    }

    #[tokio::test]
    async fn path_without_working_directory_fails() {
        let input = PatchInput {
            path: "relative.txt".to_string(),
            patches: vec![PatchOp::Overwrite {
                new: "x".to_string(),
            }],
        };
        let err = apply(&input, None).await.unwrap_err();
        assert!(matches!(err, PatchError::NoWorkingDirectory));
    }
}
