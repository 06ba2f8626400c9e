use crate::error::Result;

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::{fs::File, path::Path};

pub fn create_file_with_parents(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    Ok(File::create(path)?)
}

/// Hex SHA-256 over the JSON encodings of `primary` followed by `secondary`.
pub fn content_hash<A: Serialize, B: Serialize>(primary: &A, secondary: &B) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(primary)?);
    hasher.update(serde_json::to_vec(secondary)?);
    Ok(hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect())
}
