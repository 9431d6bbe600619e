use serde::{Deserialize, Serialize};

use crate::candidate::{CandidateStatus, ImportCandidate};

/// Destination project of an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    /// Storage folder that receives the holding folders.
    pub storage_root_id: String,
}

/// An approved import: the candidates a caller reviewed after validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRequest {
    pub project: Project,
    pub source_root_id: String,
    pub candidates: Vec<ImportCandidate>,
    /// Recorded as the task creator.
    pub actor: String,
}

/// Outcome for a single imported page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageImportResult {
    pub status: CandidateStatus,
    pub path: String,
}

/// Result of an import run as returned to pollers.
///
/// Serialized as `{"ret": [...], "import_errors": [...]}` or
/// `{"aborted": true}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImportOutcome {
    Finished {
        ret: Vec<PageImportResult>,
        import_errors: Vec<String>,
    },
    Aborted {
        aborted: bool,
    },
}

impl ImportOutcome {
    pub fn aborted() -> Self {
        ImportOutcome::Aborted { aborted: true }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, ImportOutcome::Aborted { .. })
    }

    /// Paths that were expected to import but did not.
    pub fn import_errors(&self) -> &[String] {
        match self {
            ImportOutcome::Finished { import_errors, .. } => import_errors,
            ImportOutcome::Aborted { .. } => &[],
        }
    }
}
