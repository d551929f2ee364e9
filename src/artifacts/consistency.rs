// Artifact consistency validation
// Reports every problem with an artifact directory instead of stopping at the first

use std::path::Path;
use tracing::{debug, info, warn};

use super::store::{read_file, read_manifest, sha256_hex};
use super::{ArtifactManifest, INDEX_FILE, MODEL_FILE, QA_TABLE_FILE};
use crate::embeddings::EmbeddingModelRef;
use crate::index::codec;

/// Findings from checking an artifact directory
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConsistencyReport {
    /// Manifest contents, when it could be read
    pub manifest: Option<ArtifactManifest>,
    /// Rows in `index.bin`, when it could be decoded
    pub index_rows: Option<usize>,
    /// Vector dimension in `index.bin`
    pub index_dimension: Option<usize>,
    /// Records in `qa_table.jsonl`
    pub qa_rows: Option<usize>,
    /// Embedding model the index was built with
    pub model: Option<EmbeddingModelRef>,
    /// Files that are absent or unreadable
    pub missing_files: Vec<String>,
    /// Files whose digest differs from the manifest
    pub checksum_mismatches: Vec<String>,
    /// Everything else: parse failures, misalignment, dimension disagreements
    pub problems: Vec<String>,
    /// Overall consistency status
    pub is_consistent: bool,
}

impl ConsistencyReport {
    /// Get a human-readable summary of the consistency report
    #[inline]
    pub fn summary(&self) -> String {
        if self.is_consistent {
            format!(
                "Artifacts are consistent: {} records, {} dimensions",
                self.qa_rows.unwrap_or_default(),
                self.index_dimension.unwrap_or_default()
            )
        } else {
            format!(
                "Artifact problems found: {} missing files, {} checksum mismatches, {} other issues",
                self.missing_files.len(),
                self.checksum_mismatches.len(),
                self.problems.len()
            )
        }
    }

    /// Get the total number of consistency issues
    #[inline]
    pub fn total_issues(&self) -> usize {
        self.missing_files.len() + self.checksum_mismatches.len() + self.problems.len()
    }
}

/// Check the artifact directory at `dir` without loading it into an engine
#[inline]
pub fn verify(dir: &Path) -> ConsistencyReport {
    info!("Verifying artifacts in {}", dir.display());
    let mut report = ConsistencyReport::default();

    match read_manifest(dir) {
        Ok(manifest) => report.manifest = Some(manifest),
        Err(e) if e.is_missing() => report.missing_files.push(super::MANIFEST_FILE.to_string()),
        Err(e) => report.problems.push(e.to_string()),
    }

    let expected = report.manifest.as_ref().map(|m| m.checksums.clone());
    let mut load = |name: &'static str, digest: Option<&String>| -> Option<Vec<u8>> {
        match read_file(dir, name) {
            Ok(bytes) => {
                if let Some(digest) = digest {
                    if sha256_hex(&bytes) != *digest {
                        report.checksum_mismatches.push(name.to_string());
                    }
                }
                Some(bytes)
            }
            Err(e) => {
                debug!("Cannot read {}: {}", name, e);
                report.missing_files.push(name.to_string());
                None
            }
        }
    };

    let index_bytes = load(INDEX_FILE, expected.as_ref().map(|c| &c.index));
    let model_bytes = load(MODEL_FILE, expected.as_ref().map(|c| &c.model));
    let qa_bytes = load(QA_TABLE_FILE, expected.as_ref().map(|c| &c.qa_table));

    if let Some(bytes) = index_bytes {
        match codec::read_index(&mut bytes.as_slice()) {
            Ok(index) => {
                report.index_rows = Some(index.len());
                report.index_dimension = Some(index.dimension());
            }
            Err(e) => report.problems.push(format!("{INDEX_FILE}: {e}")),
        }
    }
    if let Some(bytes) = model_bytes {
        match super::store::decode_model(&bytes) {
            Ok(model) => report.model = Some(model),
            Err(e) => report.problems.push(e.to_string()),
        }
    }
    if let Some(bytes) = qa_bytes {
        match super::store::decode_qa_table(&bytes) {
            Ok(records) => report.qa_rows = Some(records.len()),
            Err(e) => report.problems.push(e.to_string()),
        }
    }

    if let (Some(index_rows), Some(qa_rows)) = (report.index_rows, report.qa_rows) {
        if index_rows != qa_rows {
            report.problems.push(format!(
                "index has {index_rows} rows but the QA table has {qa_rows}"
            ));
        }
    }
    if let (Some(dimension), Some(model)) = (report.index_dimension, &report.model) {
        if dimension != model.dimension {
            report.problems.push(format!(
                "index dimension {dimension} does not match model {model}"
            ));
        }
    }
    if let (Some(manifest), Some(rows)) = (&report.manifest, report.index_rows) {
        if manifest.records != rows {
            report.problems.push(format!(
                "manifest declares {} records but index holds {rows}",
                manifest.records
            ));
        }
    }

    report.is_consistent = report.total_issues() == 0;
    if report.is_consistent {
        info!("{}", report.summary());
    } else {
        warn!("{}", report.summary());
    }
    report
}
