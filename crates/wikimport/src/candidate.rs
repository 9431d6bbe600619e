//! Import candidates produced by validation and consumed by the importer.

use serde::{Deserialize, Serialize};

/// Message attached to folders that lack their defining page file.
pub const MISSING_PAGE_MESSAGE: &str =
    "the wiki page does not exist, so the subordinate pages are not processed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Valid,
    ValidExists,
    ValidDuplicated,
    Invalid,
    Success,
    Unmodified,
}

impl CandidateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateStatus::Valid => "valid",
            CandidateStatus::ValidExists => "valid_exists",
            CandidateStatus::ValidDuplicated => "valid_duplicated",
            CandidateStatus::Invalid => "invalid",
            CandidateStatus::Success => "success",
            CandidateStatus::Unmodified => "unmodified",
        }
    }

    /// True for every validation outcome the importer may act on.
    pub fn is_importable(&self) -> bool {
        matches!(
            self,
            CandidateStatus::Valid | CandidateStatus::ValidExists | CandidateStatus::ValidDuplicated
        )
    }

    /// True for outcomes that must be resolved before an import may start.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            CandidateStatus::ValidExists | CandidateStatus::ValidDuplicated
        )
    }
}

impl std::fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One page folder discovered in the source tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportCandidate {
    /// Storage id of the folder's `<name>.md` file.
    #[serde(rename = "_id")]
    pub source_file_id: String,
    /// Position in the source tree, always starting with `/`.
    pub path: String,
    /// Folder name as found in storage.
    pub original_name: String,
    /// Name the page will receive (renumbered on duplicates).
    pub wiki_name: String,
    pub parent_wiki_name: Option<String>,
    pub status: CandidateStatus,
    /// Diagnostic text; empty when nothing is wrong.
    #[serde(default)]
    pub message: String,
    /// Markdown body, only attached while an import runs.
    #[serde(skip)]
    pub content: Option<String>,
}

impl ImportCandidate {
    /// Nesting depth derived from the path: `/a` is 0, `/a/b` is 1.
    pub fn depth(&self) -> usize {
        self.path.matches('/').count().saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(path: &str) -> ImportCandidate {
        ImportCandidate {
            source_file_id: "f1".to_string(),
            path: path.to_string(),
            original_name: "x".to_string(),
            wiki_name: "x".to_string(),
            parent_wiki_name: None,
            status: CandidateStatus::Valid,
            message: String::new(),
            content: Some("body".to_string()),
        }
    }

    #[test]
    fn test_depth_from_path() {
        assert_eq!(candidate("/page1").depth(), 0);
        assert_eq!(candidate("/page2/page3").depth(), 1);
        assert_eq!(candidate("/a/b/c").depth(), 2);
    }

    #[test]
    fn test_wire_shape() {
        let value = serde_json::to_value(candidate("/page1")).unwrap();
        assert_eq!(value["_id"], "f1");
        assert_eq!(value["status"], "valid");
        assert!(value["parent_wiki_name"].is_null());
        // Content never leaves the process.
        assert!(value.get("content").is_none());
        assert!(value.get("source_file_id").is_none());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&CandidateStatus::ValidDuplicated).unwrap();
        assert_eq!(json, "\"valid_duplicated\"");
        let status: CandidateStatus = serde_json::from_str("\"valid_exists\"").unwrap();
        assert_eq!(status, CandidateStatus::ValidExists);
    }

    #[test]
    fn test_status_predicates() {
        assert!(CandidateStatus::Valid.is_importable());
        assert!(CandidateStatus::ValidExists.is_conflict());
        assert!(!CandidateStatus::Invalid.is_importable());
        assert!(!CandidateStatus::Valid.is_conflict());
    }
}
