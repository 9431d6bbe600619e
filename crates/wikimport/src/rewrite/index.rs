//! Lookup tables consulted while rewriting references.

use std::collections::HashMap;

use unicode_normalization::UnicodeNormalization;

use crate::candidate::ImportCandidate;
use crate::error::StorageError;
use crate::storage::StorageClient;

/// Separator between folder and file name in qualified file keys.
const FOLDER_FILE_SEPARATOR: char = '^';

/// Canonical form used for every lookup: percent-decoded, then NFC.
///
/// Input that does not decode to valid UTF-8 is normalized as-is.
pub fn normalize_key(raw: &str) -> String {
    let decoded = urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    decoded.nfc().collect()
}

/// Maps names a document may link to onto the final wiki page name.
#[derive(Debug, Clone, Default)]
pub struct PageIndex {
    names: HashMap<String, String>,
}

impl PageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes every importable candidate under its folder name and under
    /// the name of its page file. The first candidate claiming a key wins.
    pub fn from_candidates(candidates: &[ImportCandidate]) -> Self {
        let mut index = Self::new();
        for candidate in candidates.iter().filter(|c| c.status.is_importable()) {
            index.insert(&candidate.original_name, &candidate.wiki_name);
            index.insert(&format!("{}.md", candidate.original_name), &candidate.wiki_name);
        }
        index
    }

    pub fn insert(&mut self, key: &str, wiki_name: &str) {
        self.names
            .entry(normalize_key(key))
            .or_insert_with(|| wiki_name.to_string());
    }

    /// Exact lookup on the normalized form of `target`.
    pub fn resolve(&self, target: &str) -> Option<&str> {
        self.names.get(&normalize_key(target)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Maps `folder^file` and bare `file` keys onto storage file ids.
#[derive(Debug, Clone, Default)]
pub struct FileIndex {
    files: HashMap<String, String>,
}

impl FileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a file. The qualified key is only added when the file sits
    /// inside a named folder; the bare key keeps its first owner.
    pub fn insert(&mut self, folder: Option<&str>, file_name: &str, file_id: &str) {
        let file_key = normalize_key(file_name);
        if let Some(folder) = folder {
            let qualified = format!(
                "{}{}{}",
                normalize_key(folder),
                FOLDER_FILE_SEPARATOR,
                file_key
            );
            self.files
                .entry(qualified)
                .or_insert_with(|| file_id.to_string());
        }
        self.files
            .entry(file_key)
            .or_insert_with(|| file_id.to_string());
    }

    /// Looks up `file_name` inside `folder`, falling back to the bare name.
    pub fn resolve(&self, folder: &str, file_name: &str) -> Option<&str> {
        let file_key = normalize_key(file_name);
        let qualified = format!(
            "{}{}{}",
            normalize_key(folder),
            FOLDER_FILE_SEPARATOR,
            file_key
        );
        self.files
            .get(&qualified)
            .or_else(|| self.files.get(&file_key))
            .map(String::as_str)
    }

    /// Walks the tree below `root_id` and indexes every file.
    ///
    /// Files directly under the root have no owning page folder and only
    /// receive a bare key.
    pub async fn collect(
        storage: &dyn StorageClient,
        root_id: &str,
    ) -> Result<Self, StorageError> {
        let mut index = Self::new();
        let mut pending: Vec<(String, Option<String>)> = vec![(root_id.to_string(), None)];

        while let Some((folder_id, folder_name)) = pending.pop() {
            for node in storage.list_children(&folder_id).await? {
                if node.is_folder {
                    pending.push((node.id, Some(node.name)));
                } else {
                    index.insert(folder_name.as_deref(), &node.name, &node.id);
                }
            }
        }

        tracing::debug!(files = index.len(), "Collected file index");
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
