//! Note domain model shared by tags and memos.
//!
//! # Invariants
//! - Two notes with the same kind and text are interchangeable index keys.
//! - Blank notes are never attached to an event (enforced by the store).

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Which index a note belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    /// Short label used for grouping and search.
    Tag,
    /// Free-form remark attached to an event.
    Memo,
}

impl NoteKind {
    /// Stable lowercase name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tag => "tag",
            Self::Memo => "memo",
        }
    }
}

/// Text value attached to one or more events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Note {
    kind: NoteKind,
    value: String,
}

impl Note {
    pub fn new(kind: NoteKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn tag(value: impl Into<String>) -> Self {
        Self::new(NoteKind::Tag, value)
    }

    pub fn memo(value: impl Into<String>) -> Self {
        Self::new(NoteKind::Memo, value)
    }

    pub fn kind(&self) -> NoteKind {
        self.kind
    }

    pub fn value(&self) -> &str {
        self.value.as_str()
    }

    /// Returns whether the text is empty after trimming.
    pub fn is_blank(&self) -> bool {
        self.value.trim().is_empty()
    }
}

impl Display for Note {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::{Note, NoteKind};
    use std::collections::HashSet;

    #[test]
    fn equal_text_notes_collapse_in_hash_sets() {
        let mut set = HashSet::new();
        set.insert(Note::tag("urgent"));
        set.insert(Note::tag("urgent"));
        set.insert(Note::memo("urgent"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn blank_detection_ignores_whitespace() {
        assert!(Note::new(NoteKind::Memo, "   ").is_blank());
        assert!(!Note::tag(" x ").is_blank());
    }
}
