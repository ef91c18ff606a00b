//! SARIF post-processing: provenance stamping and result counting.

use super::types::Sarif;
use crate::error::AnalysisError;
use crate::models::OwnerRepo;
use serde_json::json;
use std::path::Path;

/// Archive name of the SARIF document.
pub const SARIF_FILE_NAME: &str = "results.sarif";

/// `<server>/<owner>/<name>` without doubled slashes.
pub fn repository_uri(server_url: &str, repository: &OwnerRepo) -> String {
    format!("{}/{}", server_url.trim_end_matches('/'), repository)
}

/// Record which repository and revision every run was produced from.
pub fn inject_version_control_info(sarif: &mut Sarif, repository_uri: &str, revision: &str) {
    for run in &mut sarif.runs {
        run.version_control_provenance.push(json!({
            "repositoryUri": repository_uri,
            "revisionId": revision,
        }));
    }
}

/// Number of results across all runs.
pub fn result_count(sarif: &Sarif) -> usize {
    sarif.runs.iter().map(|run| run.results.len()).sum()
}

pub fn read_sarif(path: &Path) -> Result<Sarif, AnalysisError> {
    let data = std::fs::read(path)
        .map_err(|e| AnalysisError::Packaging(format!("read {}: {}", path.display(), e)))?;
    serde_json::from_slice(&data)
        .map_err(|e| AnalysisError::Metadata(format!("unparseable SARIF {}: {}", path.display(), e)))
}

pub fn write_sarif(sarif: &Sarif, path: &Path) -> Result<(), AnalysisError> {
    let data = serde_json::to_vec(sarif)
        .map_err(|e| AnalysisError::Packaging(format!("serialize SARIF: {}", e)))?;
    std::fs::write(path, data)
        .map_err(|e| AnalysisError::Packaging(format!("write {}: {}", path.display(), e)))
}

/// Stamp provenance into the SARIF file at `path` in place and return its
/// result count.
pub fn stamp_sarif_file(
    path: &Path,
    repository_uri: &str,
    revision: &str,
) -> Result<usize, AnalysisError> {
    let mut sarif = read_sarif(path)?;
    inject_version_control_info(&mut sarif, repository_uri, revision);
    write_sarif(&sarif, path)?;
    Ok(result_count(&sarif))
}
