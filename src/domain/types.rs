//! Shared domain enumerations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Origin of a post record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Personal,
    External,
    Publication,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [
        SourceKind::Personal,
        SourceKind::External,
        SourceKind::Publication,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Personal => "personal",
            SourceKind::External => "external",
            SourceKind::Publication => "publication",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SourceKind::Personal => "Personal",
            SourceKind::External => "External",
            SourceKind::Publication => "Publication",
        }
    }

    /// Path segment used by the listing page for this source.
    pub fn route_segment(self) -> &'static str {
        match self {
            SourceKind::Personal => "personal",
            SourceKind::External => "external",
            SourceKind::Publication => "publications",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
