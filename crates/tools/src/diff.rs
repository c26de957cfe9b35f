//! Pending diffs produced by `write_file`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    #[default]
    Overwrite,
    Append,
}

impl WriteMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "overwrite" | "write" | "replace" => Some(Self::Overwrite),
            "append" => Some(Self::Append),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffStatus {
    #[default]
    Pending,
}

/// A proposed file mutation awaiting accept/reject.
///
/// Serializes as `{path, status: "pending", original, modified, isNewFile,
/// mode, finalize}`, which is what the approval collaborator renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingDiff {
    pub path: String,
    pub status: DiffStatus,
    pub original: String,
    pub modified: String,
    pub is_new_file: bool,
    pub mode: WriteMode,
    pub finalize: bool,
}
