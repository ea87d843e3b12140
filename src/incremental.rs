use std::collections::{HashMap, HashSet};

use tantivy::IndexWriter;

use crate::{
    doc_id::DocumentKey,
    error::Result,
    tantivy_index::SearchIndex,
    walker::DiscoveredFile,
};

/// Result of comparing discovered files against the indexed summaries.
#[derive(Debug, Default)]
pub struct DiffResult {
    /// Files with no complete document in the index.
    pub new_files: Vec<DiscoveredFile>,
    /// Files whose modification time differs from the indexed one.
    pub changed_files: Vec<DiscoveredFile>,
    /// Keys indexed under this name that no longer exist on disk.
    pub deleted_keys: Vec<String>,
}

impl DiffResult {
    /// Files that need (re)indexing.
    pub fn to_index(&self) -> Vec<DiscoveredFile> {
        self.new_files
            .iter()
            .chain(&self.changed_files)
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.new_files.is_empty()
            && self.changed_files.is_empty()
            && self.deleted_keys.is_empty()
    }
}

/// Compare discovered files against what the index holds for `index_name`.
///
/// A document only counts as indexed once its summary record exists, so a
/// document interrupted half-way shows up as new and is rewritten.
pub fn diff_index(
    index: &SearchIndex,
    index_name: &str,
    discovered: &[DiscoveredFile],
) -> Result<DiffResult> {
    let prefix = format!("{index_name}:");
    let known: HashMap<String, u64> = index
        .list_documents()?
        .into_iter()
        .filter(|doc| doc.key.starts_with(&prefix))
        .map(|doc| (doc.key, doc.file_date))
        .collect();

    let mut result = DiffResult::default();
    let mut seen = HashSet::new();

    for file in discovered {
        let key = DocumentKey::new(index_name, &file.relative_path);
        match known.get(key.as_str()) {
            None => result.new_files.push(file.clone()),
            Some(&stored) if stored != file.mtime => {
                result.changed_files.push(file.clone());
            }
            Some(_) => {}
        }
        seen.insert(String::from(key));
    }

    result.deleted_keys = known
        .into_keys()
        .filter(|key| !seen.contains(key))
        .collect();
    result.deleted_keys.sort();

    Ok(result)
}

/// Delete documents by key. Nothing is visible until the writer commits.
pub fn remove_documents(
    index: &SearchIndex,
    writer: &IndexWriter,
    keys: &[String],
) {
    for key in keys {
        tracing::debug!(%key, "removing document");
        index.delete_document(writer, key);
    }
}
