// Reading and writing the artifact directory.
// Writes go to a complete staging sibling, which is then swapped in with two renames.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    ArtifactError, ArtifactManifest, ArtifactTriple, FileChecksums, INDEX_FILE, MANIFEST_FILE,
    MODEL_FILE, QA_TABLE_FILE,
};
use crate::corpus::QaRecord;
use crate::embeddings::EmbeddingModelRef;
use crate::index::codec::{self, FORMAT_VERSION};

#[inline]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub(crate) fn encode_model(model: &EmbeddingModelRef) -> Result<Vec<u8>, ArtifactError> {
    toml::to_string(model)
        .map(String::into_bytes)
        .map_err(|e| ArtifactError::format(MODEL_FILE, e))
}

pub(crate) fn encode_qa_table(records: &[QaRecord]) -> Result<Vec<u8>, ArtifactError> {
    let mut bytes = Vec::new();
    for record in records {
        let line =
            serde_json::to_string(record).map_err(|e| ArtifactError::format(QA_TABLE_FILE, e))?;
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
    }
    Ok(bytes)
}

pub(crate) fn decode_model(bytes: &[u8]) -> Result<EmbeddingModelRef, ArtifactError> {
    let text = std::str::from_utf8(bytes).map_err(|e| ArtifactError::format(MODEL_FILE, e))?;
    toml::from_str(text).map_err(|e| ArtifactError::format(MODEL_FILE, e))
}

pub(crate) fn decode_qa_table(bytes: &[u8]) -> Result<Vec<QaRecord>, ArtifactError> {
    let mut records = Vec::new();
    for (number, line) in bytes.lines().enumerate() {
        let line = line.map_err(|e| ArtifactError::format(QA_TABLE_FILE, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: QaRecord = serde_json::from_str(&line).map_err(|e| {
            ArtifactError::format(QA_TABLE_FILE, format!("line {}: {e}", number + 1))
        })?;
        records.push(record);
    }
    Ok(records)
}

pub(crate) fn read_file(dir: &Path, name: &str) -> Result<Vec<u8>, ArtifactError> {
    let path = dir.join(name);
    fs::read(&path).map_err(|e| ArtifactError::io(path, e))
}

pub(crate) fn read_manifest(dir: &Path) -> Result<ArtifactManifest, ArtifactError> {
    let bytes = read_file(dir, MANIFEST_FILE)?;
    serde_json::from_slice(&bytes).map_err(|e| ArtifactError::format(MANIFEST_FILE, e))
}

fn check_digest(file: &'static str, bytes: &[u8], expected: &str) -> Result<(), ArtifactError> {
    let actual = sha256_hex(bytes);
    if actual != expected {
        return Err(ArtifactError::ChecksumMismatch {
            file,
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), ArtifactError> {
    let path = dir.join(name);
    let mut file = fs::File::create(&path).map_err(|e| ArtifactError::io(&path, e))?;
    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .map_err(|e| ArtifactError::io(&path, e))
}

fn sibling(dir: &Path, tag: &str) -> PathBuf {
    let name = dir
        .file_name()
        .map_or_else(|| "artifacts".into(), |n| n.to_string_lossy().into_owned());
    dir.with_file_name(format!(".{name}.{tag}-{}", Uuid::new_v4().simple()))
}

/// Persist `triple` into `dir`, replacing any previous contents.
///
/// Either the new triple is fully in place or the previous directory is left
/// as it was. Replacement takes two renames (live directory aside, staging
/// into place). Between them `dir` does not exist, so a concurrent
/// [`load`] from another process can fail with `NotFound` and should be
/// retried; it never observes a partially written triple.
#[inline]
pub fn save(triple: &ArtifactTriple, dir: &Path) -> Result<ArtifactManifest, ArtifactError> {
    let index_bytes = codec::encode_index(triple.index())?;
    let model_bytes = encode_model(triple.model())?;
    let qa_bytes = encode_qa_table(triple.qa_table())?;

    let manifest = ArtifactManifest {
        build: triple.build(),
        format_version: FORMAT_VERSION,
        records: triple.len(),
        dimension: triple.dimension(),
        checksums: FileChecksums {
            index: sha256_hex(&index_bytes),
            model: sha256_hex(&model_bytes),
            qa_table: sha256_hex(&qa_bytes),
        },
    };
    let manifest_bytes = serde_json::to_vec_pretty(&manifest)
        .map_err(|e| ArtifactError::format(MANIFEST_FILE, e))?;

    if let Some(parent) = dir.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ArtifactError::io(parent, e))?;
    }

    let staging = sibling(dir, "staging");
    debug!("Staging artifacts in {}", staging.display());
    fs::create_dir(&staging).map_err(|e| ArtifactError::io(&staging, e))?;

    let staged = write_file(&staging, INDEX_FILE, &index_bytes)
        .and_then(|()| write_file(&staging, MODEL_FILE, &model_bytes))
        .and_then(|()| write_file(&staging, QA_TABLE_FILE, &qa_bytes))
        // manifest last: a directory without one is never loadable
        .and_then(|()| write_file(&staging, MANIFEST_FILE, &manifest_bytes));

    if let Err(e) = staged.and_then(|()| swap_into_place(&staging, dir)) {
        if let Err(cleanup) = fs::remove_dir_all(&staging) {
            if cleanup.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    "Failed to remove staging directory {}: {}",
                    staging.display(),
                    cleanup
                );
            }
        }
        return Err(e);
    }

    info!(
        "Saved {} records ({}d) to {} as build {}",
        manifest.records,
        manifest.dimension,
        dir.display(),
        manifest.build.build_id
    );
    Ok(manifest)
}

// `dir` is briefly absent between the two renames
fn swap_into_place(staging: &Path, dir: &Path) -> Result<(), ArtifactError> {
    if !dir.exists() {
        return fs::rename(staging, dir).map_err(|e| ArtifactError::io(dir, e));
    }

    let retired = sibling(dir, "old");
    fs::rename(dir, &retired).map_err(|e| ArtifactError::io(dir, e))?;

    if let Err(e) = fs::rename(staging, dir) {
        if let Err(restore) = fs::rename(&retired, dir) {
            warn!(
                "Failed to restore previous artifacts from {}: {}",
                retired.display(),
                restore
            );
        }
        return Err(ArtifactError::io(dir, e));
    }

    if let Err(e) = fs::remove_dir_all(&retired) {
        warn!(
            "Failed to remove retired artifacts {}: {}",
            retired.display(),
            e
        );
    }
    Ok(())
}

/// Read and fully verify the triple stored in `dir`
#[inline]
pub fn load(dir: &Path) -> Result<ArtifactTriple, ArtifactError> {
    debug!("Loading artifacts from {}", dir.display());

    let manifest = read_manifest(dir)?;
    if manifest.format_version != FORMAT_VERSION {
        return Err(ArtifactError::format(
            MANIFEST_FILE,
            format!("unsupported format version {}", manifest.format_version),
        ));
    }

    let index_bytes = read_file(dir, INDEX_FILE)?;
    check_digest(INDEX_FILE, &index_bytes, &manifest.checksums.index)?;
    let model_bytes = read_file(dir, MODEL_FILE)?;
    check_digest(MODEL_FILE, &model_bytes, &manifest.checksums.model)?;
    let qa_bytes = read_file(dir, QA_TABLE_FILE)?;
    check_digest(QA_TABLE_FILE, &qa_bytes, &manifest.checksums.qa_table)?;

    let index = codec::read_index(&mut index_bytes.as_slice())?;
    let model = decode_model(&model_bytes)?;
    let qa_table = decode_qa_table(&qa_bytes)?;

    if index.len() != manifest.records || index.dimension() != manifest.dimension {
        return Err(ArtifactError::format(
            MANIFEST_FILE,
            format!(
                "manifest declares {} x {}d but index holds {} x {}d",
                manifest.records,
                manifest.dimension,
                index.len(),
                index.dimension()
            ),
        ));
    }

    let triple = ArtifactTriple::with_build(index, model, qa_table, manifest.build)?;

    info!(
        "Loaded build {} ({} records, model {})",
        manifest.build.build_id,
        triple.len(),
        triple.model()
    );
    Ok(triple)
}
