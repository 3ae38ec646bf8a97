use crate::error::PatchError;

/// A single typed edit operation. `Replace` requires non-empty `old`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOp {
    PrependBof { new: String },
    AppendEof { new: String },
    Overwrite { new: String },
    Replace { old: String, new: String },
}

impl PatchOp {
    pub fn validate(&self) -> Result<(), PatchError> {
        if let PatchOp::Replace { old, .. } = self
            && old.is_empty()
        {
            return Err(PatchError::EmptyOldText);
        }
        Ok(())
    }
}

/// `{path, patches}` — the path may be relative, resolved against the
/// dispatcher's working directory.
#[derive(Debug, Clone)]
pub struct PatchInput {
    pub path: String,
    pub patches: Vec<PatchOp>,
}

/// A single resolved edit against the original byte buffer: replace
/// `len` bytes starting at `offset` with `text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EditSpec {
    pub offset: usize,
    pub len: usize,
    pub text: String,
}

/// Composes a set of non-overlapping edits against an immutable original
/// buffer into the final patched bytes. Edits reference offsets in the
/// *original* buffer; later patches never see earlier patches' output.
#[derive(Debug, Default)]
pub(crate) struct EditBuffer {
    edits: Vec<EditSpec>,
}

impl EditBuffer {
    pub fn new() -> Self {
        Self { edits: Vec::new() }
    }

    pub fn insert(&mut self, offset: usize, text: String) {
        self.edits.push(EditSpec {
            offset,
            len: 0,
            text,
        });
    }

    pub fn replace(&mut self, offset: usize, len: usize, text: String) {
        self.edits.push(EditSpec { offset, len, text });
    }

    /// Flatten the composed edits over `original`, failing if any two edits
    /// overlap. Pure inserts at the same offset (e.g. `prepend_bof` and a
    /// `replace` landing at offset 0) are not considered overlapping with
    /// each other, only with edits that consume bytes across their span.
    pub fn flatten(mut self, original: &str) -> Result<String, PatchError> {
        self.edits.sort_by_key(|edit| (edit.offset, edit.len));

        for pair in self.edits.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let a_end = a.offset + a.len;
            if b.len > 0 && b.offset < a_end {
                return Err(PatchError::OverlappingEdits {
                    path: String::new(),
                });
            }
        }

        let mut out = String::with_capacity(original.len());
        let mut cursor = 0usize;
        for edit in &self.edits {
            if edit.offset > cursor {
                out.push_str(&original[cursor..edit.offset]);
            }
            out.push_str(&edit.text);
            cursor = edit.offset + edit.len;
        }
        if cursor < original.len() {
            out.push_str(&original[cursor..]);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_prepend_and_append() {
        let mut buf = EditBuffer::new();
        buf.insert(0, "PRE\n".to_string());
        buf.insert(5, "POST\n".to_string());
        let result = buf.flatten("hello").unwrap();
        assert_eq!(result, "PRE\nhelloPOST\n");
    }

    #[test]
    fn detects_overlap() {
        let mut buf = EditBuffer::new();
        buf.replace(0, 5, "aaa".to_string());
        buf.replace(2, 3, "bbb".to_string());
        assert!(buf.flatten("hello").is_err());
    }

    #[test]
    fn replace_requires_non_empty_old() {
        let op = PatchOp::Replace {
            old: String::new(),
            new: "x".to_string(),
        };
        assert!(op.validate().is_err());
    }
}
