use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::PatchError;

#[cfg(unix)]
const DIR_MODE: u32 = 0o700;
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Read a file's full contents as UTF-8 text, if it exists. Returns `None`
/// when the path does not exist so callers can distinguish "missing" from
/// "empty".
pub(crate) async fn read_existing(path: &Path) -> Result<Option<String>, PatchError> {
    match fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(PatchError::Io {
            action: "read",
            path: path.to_path_buf(),
            source: err,
        }),
    }
}

/// In-memory snapshot of a file's prior state, used to roll back a failed
/// write. `None` means the file did not exist before the operation.
pub(crate) struct Backup {
    path: PathBuf,
    previous: Option<String>,
}

impl Backup {
    pub fn capture(path: &Path, previous: Option<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            previous,
        }
    }

    pub async fn restore(self) -> Result<(), PatchError> {
        match self.previous {
            Some(contents) => fs::write(&self.path, contents).await.map_err(|err| PatchError::Io {
                action: "restoring",
                path: self.path.clone(),
                source: err,
            }),
            None => match fs::remove_file(&self.path).await {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(PatchError::Io {
                    action: "removing",
                    path: self.path.clone(),
                    source: err,
                }),
            },
        }
    }
}

/// Create the parent directory (mode 0700) if it does not exist, then
/// write `contents` atomically via a temp file + rename, with mode 0600.
pub(crate) async fn write_atomically(path: &Path, contents: &str) -> Result<(), PatchError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).await.map_err(|err| PatchError::Io {
            action: "creating directory for",
            path: parent.to_path_buf(),
            source: err,
        })?;
        set_dir_mode(parent).await?;
    }

    let tmp_path = tmp_path_for(path);
    fs::write(&tmp_path, contents).await.map_err(|err| PatchError::Io {
        action: "writing",
        path: tmp_path.clone(),
        source: err,
    })?;
    set_file_mode(&tmp_path).await?;

    fs::rename(&tmp_path, path).await.map_err(|err| PatchError::Io {
        action: "renaming into place",
        path: path.to_path_buf(),
        source: err,
    })
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| format!(".{}.patch-tmp", n.to_string_lossy()))
        .unwrap_or_else(|| ".patch-tmp".to_string());
    path.with_file_name(file_name)
}

#[cfg(unix)]
async fn set_dir_mode(path: &Path) -> Result<(), PatchError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(DIR_MODE))
        .await
        .map_err(|err| PatchError::Io {
            action: "setting directory mode for",
            path: path.to_path_buf(),
            source: err,
        })
}

#[cfg(not(unix))]
async fn set_dir_mode(_path: &Path) -> Result<(), PatchError> {
    Ok(())
}

#[cfg(unix)]
async fn set_file_mode(path: &Path) -> Result<(), PatchError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(FILE_MODE))
        .await
        .map_err(|err| PatchError::Io {
            action: "setting file mode for",
            path: path.to_path_buf(),
            source: err,
        })
}

#[cfg(not(unix))]
async fn set_file_mode(_path: &Path) -> Result<(), PatchError> {
    Ok(())
}

const AUTOGEN_SIGNATURES: &[&str] = &["@generated", "Code generated", "DO NOT EDIT"];
const AUTOGEN_TOP_MARKERS: &[&str] = &["generate", "do not edit", "export by"];
const AUTOGEN_HEADER_LINES: usize = 10;

/// Best-effort detection of autogenerated source, per two independent
/// checks: known signature substrings anywhere in the file, and
/// case-insensitive header comments near the top.
pub(crate) fn is_autogenerated(contents: &str) -> bool {
    if AUTOGEN_SIGNATURES.iter().any(|sig| contents.contains(sig)) {
        return true;
    }
    let lower_header: String = contents
        .lines()
        .take(AUTOGEN_HEADER_LINES)
        .collect::<Vec<_>>()
        .join("\n")
        .to_lowercase();
    AUTOGEN_TOP_MARKERS.iter().any(|marker| lower_header.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_generated_signature() {
        assert!(is_autogenerated("// @generated by tool\nfn main() {}"));
    }

    #[test]
    fn detects_do_not_edit_header() {
        assert!(is_autogenerated("// DO NOT EDIT this file by hand\nfn main() {}"));
    }

    #[test]
    fn ordinary_source_is_not_autogenerated() {
        assert!(!is_autogenerated("fn main() {}\n"));
    }
}
