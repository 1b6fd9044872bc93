//! Flat-file storage for input and output documents

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;

use crate::model::CandidateDocument;

/// Name of the run summary written next to the output documents
pub const REPORT_FILE: &str = "validation_report.json";
/// Name of the per-document decision log
pub const DECISIONS_FILE: &str = "validation_decisions.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Input and output directories of one run
#[derive(Debug, Clone)]
pub struct DocumentStore {
    input_dir: PathBuf,
    output_dir: PathBuf,
}

impl DocumentStore {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Create the output directory if needed
    pub async fn prepare(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| StoreError::io(&self.output_dir, e))
    }

    /// File names of `*.json` inputs in lexicographic order
    ///
    /// Hidden files and subdirectories are skipped.
    pub async fn list_inputs(&self) -> Result<Vec<String>, StoreError> {
        list_json_files(&self.input_dir).await
    }

    pub async fn read_input(&self, filename: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.input_dir.join(filename);
        fs::read(&path).await.map_err(|e| StoreError::io(&path, e))
    }

    /// Write input bytes through unchanged
    pub async fn copy_to_output(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        let path = self.output_dir.join(filename);
        fs::write(&path, bytes)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        Ok(path)
    }

    pub async fn write_document(
        &self,
        filename: &str,
        document: &CandidateDocument,
    ) -> Result<PathBuf, StoreError> {
        let json = serde_json::to_string_pretty(document.as_map())?;
        self.copy_to_output(filename, json.as_bytes()).await
    }

    /// Serialize any value as pretty JSON into the output directory
    pub async fn write_json<T: Serialize>(&self, filename: &str, value: &T) -> Result<PathBuf, StoreError> {
        let json = serde_json::to_string_pretty(value)?;
        self.copy_to_output(filename, json.as_bytes()).await
    }
}

/// Names the workflow writes its own artifacts under
pub fn is_reserved_name(name: &str) -> bool {
    name == REPORT_FILE || name == DECISIONS_FILE
}

/// `*.json` file names directly under `dir`, sorted
pub async fn list_json_files(dir: &Path) -> Result<Vec<String>, StoreError> {
    let mut entries = fs::read_dir(dir).await.map_err(|e| StoreError::io(dir, e))?;
    let mut names = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(|e| StoreError::io(dir, e))? {
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| StoreError::io(&entry.path(), e))?;
        if !file_type.is_file() {
            continue;
        }

        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            tracing::warn!(path = %entry.path().display(), "Skipping file with non UTF-8 name");
            continue;
        };

        if name.starts_with('.') || !name.ends_with(".json") {
            continue;
        }
        if is_reserved_name(&name) {
            tracing::warn!(
                path = %entry.path().display(),
                "Skipping input named like a run report; rename it to have it processed"
            );
            continue;
        }
        names.push(name);
    }

    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_lists_json_inputs_in_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.json", "a.json", ".hidden.json", "notes.txt", REPORT_FILE] {
            std::fs::write(dir.path().join(name), "{}").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.json")).unwrap();

        let names = list_json_files(dir.path()).await.unwrap();
        assert_eq!(names, vec!["a.json", "b.json"]);
    }

    #[tokio::test]
    async fn test_reserved_names_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        for name in [REPORT_FILE, DECISIONS_FILE, "event.json"] {
            std::fs::write(dir.path().join(name), "{}").unwrap();
        }

        assert!(is_reserved_name(REPORT_FILE));
        assert!(is_reserved_name(DECISIONS_FILE));
        assert!(!is_reserved_name("validation_report.json.bak"));
        assert_eq!(list_json_files(dir.path()).await.unwrap(), vec!["event.json"]);
    }

    #[tokio::test]
    async fn test_missing_input_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path().join("missing"), dir.path().join("out"));
        assert!(matches!(store.list_inputs().await, Err(StoreError::Io { .. })));
    }

    #[tokio::test]
    async fn test_writes_documents_to_output() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path(), dir.path().join("out"));
        store.prepare().await.unwrap();

        store.copy_to_output("raw.json", b"{ \"a\" : 1 }").await.unwrap();
        assert_eq!(std::fs::read(dir.path().join("out/raw.json")).unwrap(), b"{ \"a\" : 1 }");

        let doc = CandidateDocument::try_from(json!({"a": 1})).unwrap();
        let path = store.write_document("doc.json", &doc).await.unwrap();
        let written: serde_json::Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(written, json!({"a": 1}));
    }
}
