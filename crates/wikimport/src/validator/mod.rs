//! Structural validation of a source tree before import.
//!
//! Every folder below the source root is a page candidate. A folder only
//! qualifies when it holds its own `<folder>.md`; anything below a folder
//! that does not is ignored. Naming conflicts are reported as candidate
//! statuses, never as errors.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::Instrument;
use unicode_normalization::UnicodeNormalization;

use crate::candidate::{CandidateStatus, ImportCandidate, MISSING_PAGE_MESSAGE};
use crate::import::ImportError;
use crate::storage::{Node, StorageClient};
use crate::wiki::WikiIndex;

/// Upper bound on `(N)` suffixes tried for one name.
const MAX_RENAME_ATTEMPTS: u32 = 10_000;

/// Result of validating a source tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// Candidates in source order (pre-order, sorted listings).
    pub candidates: Vec<ImportCandidate>,
    /// Folder names seen more than once, in order of first repetition.
    pub duplicate_folder_names: Vec<String>,
    /// False as soon as any candidate conflicts with an existing name.
    pub can_start_import: bool,
}

impl ValidationReport {
    pub fn importable(&self) -> impl Iterator<Item = &ImportCandidate> {
        self.candidates.iter().filter(|c| c.status.is_importable())
    }
}

/// A folder waiting to be visited.
struct Pending {
    node: Node,
    parent_path: String,
    parent_wiki_name: Option<String>,
}

pub struct Validator<'a> {
    storage: &'a dyn StorageClient,
    wiki: &'a dyn WikiIndex,
    reserved_names: &'a [String],
}

impl<'a> Validator<'a> {
    pub fn new(
        storage: &'a dyn StorageClient,
        wiki: &'a dyn WikiIndex,
        reserved_names: &'a [String],
    ) -> Self {
        Self {
            storage,
            wiki,
            reserved_names,
        }
    }

    /// Walks the tree below `source_root_id` and classifies every folder.
    ///
    /// Storage and wiki index faults abort the walk; no partial report is
    /// returned.
    pub async fn validate(
        &self,
        project_id: &str,
        source_root_id: &str,
    ) -> Result<ValidationReport, ImportError> {
        let span = tracing::info_span!("validate", project = %project_id, root = %source_root_id);
        self.walk(project_id, source_root_id).instrument(span).await
    }

    async fn walk(
        &self,
        project_id: &str,
        source_root_id: &str,
    ) -> Result<ValidationReport, ImportError> {
        let mut report = ValidationReport {
            can_start_import: true,
            ..Default::default()
        };
        let mut seen_folder_names: HashSet<String> = HashSet::new();
        let mut assigned: HashSet<String> = self
            .reserved_names
            .iter()
            .map(|n| name_key(n))
            .collect();

        let mut stack: Vec<Pending> = Vec::new();
        push_folders(
            &mut stack,
            self.storage.list_children(source_root_id).await?,
            "",
            None,
        );

        while let Some(Pending {
            node,
            parent_path,
            parent_wiki_name,
        }) = stack.pop()
        {
            if !seen_folder_names.insert(node.name.clone())
                && !report.duplicate_folder_names.contains(&node.name)
            {
                report.duplicate_folder_names.push(node.name.clone());
            }

            let children = self.storage.list_children(&node.id).await?;
            let page_file = format!("{}.md", node.name).nfc().collect::<String>();
            let page_node = children
                .iter()
                .find(|c| !c.is_folder && c.name.nfc().collect::<String>() == page_file);

            let Some(page_node) = page_node else {
                tracing::debug!(folder = %node.name, "Folder has no page file, skipping subtree");
                report.candidates.push(ImportCandidate {
                    source_file_id: String::new(),
                    path: format!("{}/{}", parent_path, node.name),
                    original_name: node.name.clone(),
                    wiki_name: node.name,
                    parent_wiki_name,
                    status: CandidateStatus::Invalid,
                    message: MISSING_PAGE_MESSAGE.to_string(),
                    content: None,
                });
                continue;
            };

            let path = format!("{}/{}", parent_path, node.name);
            let (status, wiki_name, path) =
                if self.wiki.find_by_path(project_id, &path).await?.is_some() {
                    (CandidateStatus::ValidExists, node.name.clone(), path)
                } else if self.is_taken(project_id, &node.name, &assigned).await? {
                    let renamed = self.free_name(project_id, &node.name, &assigned).await?;
                    let path = format!("{}/{}", parent_path, renamed);
                    (CandidateStatus::ValidDuplicated, renamed, path)
                } else {
                    (CandidateStatus::Valid, node.name.clone(), path)
                };

            if status.is_conflict() {
                report.can_start_import = false;
            }
            assigned.insert(name_key(&wiki_name));

            report.candidates.push(ImportCandidate {
                source_file_id: page_node.id.clone(),
                path: path.clone(),
                original_name: node.name.clone(),
                wiki_name: wiki_name.clone(),
                parent_wiki_name,
                status,
                message: String::new(),
                content: None,
            });

            push_folders(&mut stack, children, &path, Some(&wiki_name));
        }

        tracing::info!(
            candidates = report.candidates.len(),
            duplicates = report.duplicate_folder_names.len(),
            can_start_import = report.can_start_import,
            "Validation finished"
        );
        Ok(report)
    }

    async fn is_taken(
        &self,
        project_id: &str,
        name: &str,
        assigned: &HashSet<String>,
    ) -> Result<bool, ImportError> {
        if assigned.contains(&name_key(name)) {
            return Ok(true);
        }
        Ok(self.wiki.find_by_name(project_id, name).await?.is_some())
    }

    /// Smallest `name(N)` not taken, N starting at 1.
    async fn free_name(
        &self,
        project_id: &str,
        name: &str,
        assigned: &HashSet<String>,
    ) -> Result<String, ImportError> {
        for n in 1..=MAX_RENAME_ATTEMPTS {
            let candidate = format!("{}({})", name, n);
            if !self.is_taken(project_id, &candidate, assigned).await? {
                return Ok(candidate);
            }
        }
        Err(ImportError::NoFreeName(name.to_string()))
    }
}

/// Case-insensitive identity of a wiki name, independent of normalization form.
fn name_key(name: &str) -> String {
    name.nfc().collect::<String>().to_lowercase()
}

/// Pushes the folders of a listing so that they pop in listing order.
fn push_folders(
    stack: &mut Vec<Pending>,
    children: Vec<Node>,
    parent_path: &str,
    parent_wiki_name: Option<&str>,
) {
    for node in children.into_iter().rev().filter(|n| n.is_folder) {
        stack.push(Pending {
            node,
            parent_path: parent_path.to_string(),
            parent_wiki_name: parent_wiki_name.map(str::to_string),
        });
    }
}
