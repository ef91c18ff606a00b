//! Per-query result bookkeeping and format reconciliation.
//!
//! Decides whether a pack's results can be turned into a SARIF document
//! (all queries or none), counts results from relational files when they
//! cannot, and lays out the relational files for the archive.

use super::types::{BqrsInfo, QueryMetadata};
use crate::error::AnalysisError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Result-set names checked, in order, when counting relational results.
pub const KNOWN_RESULT_SET_NAMES: [&str; 2] = ["#select", "problems"];

/// Archive name of the relational file of a single-query pack.
pub const SINGLE_BQRS_NAME: &str = "results.bqrs";

/// SARIF flavour a query's results can be interpreted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SarifOutputType {
    Problem,
    PathProblem,
}

/// Pair a query's declared kind with what its result sets can provide.
pub fn sarif_output_type(
    metadata: &QueryMetadata,
    compatible_query_kinds: &[String],
) -> Option<SarifOutputType> {
    let kind = metadata.kind.as_deref()?;
    let compatible = |k: &str| compatible_query_kinds.iter().any(|c| c == k);

    match kind {
        "path-problem" | "path-alert" if compatible("PathProblem") => {
            Some(SarifOutputType::PathProblem)
        }
        "problem" | "alert" if compatible("Problem") => Some(SarifOutputType::Problem),
        _ => None,
    }
}

/// Row count of the first known result set present in `info`.
pub fn bqrs_result_count(info: &BqrsInfo) -> Result<usize, AnalysisError> {
    for name in KNOWN_RESULT_SET_NAMES {
        if let Some(set) = info.result_sets.iter().find(|s| s.name == name) {
            return Ok(set.rows);
        }
    }

    let found: Vec<&str> = info.result_sets.iter().map(|s| s.name.as_str()).collect();
    Err(AnalysisError::Metadata(format!(
        "BQRS does not contain any result sets matching known names. Expected one of {:?} but found {:?}",
        KNOWN_RESULT_SET_NAMES, found
    )))
}

/// Everything known about one query after the pack has run.
#[derive(Debug, Clone)]
pub struct QueryRun {
    pub query_path: PathBuf,
    pub metadata: QueryMetadata,
    /// Relative to `QueryPackRunResults::results_base_path`.
    pub relative_bqrs_path: PathBuf,
    pub bqrs_info: BqrsInfo,
}

impl QueryRun {
    pub fn supports_sarif(&self) -> bool {
        sarif_output_type(&self.metadata, &self.bqrs_info.compatible_query_kinds).is_some()
    }
}

/// Results of running a whole pack against one database.
#[derive(Debug, Clone)]
pub struct QueryPackRunResults {
    pub queries: Vec<QueryRun>,
    pub results_base_path: PathBuf,
}

impl QueryPackRunResults {
    pub fn new(queries: Vec<QueryRun>, results_base_path: PathBuf) -> Self {
        Self {
            queries,
            results_base_path,
        }
    }

    /// True only if every query can be interpreted as SARIF.
    pub fn supports_sarif(&self) -> bool {
        self.queries.iter().all(|q| {
            let ok = q.supports_sarif();
            if !ok {
                debug!(
                    "Query {} ({:?}) blocks SARIF for the pack",
                    q.query_path.display(),
                    q.metadata.kind
                );
            }
            ok
        })
    }

    /// Sum of relational row counts across all queries.
    pub fn total_results_count(&self) -> Result<usize, AnalysisError> {
        self.queries
            .iter()
            .map(|q| bqrs_result_count(&q.bqrs_info))
            .sum()
    }
}

/// Relational files as they should appear in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BqrsFilePaths {
    pub base_path: PathBuf,
    pub relative_file_paths: Vec<PathBuf>,
}

impl BqrsFilePaths {
    /// Absolute path and archive name of each file.
    pub fn entries(&self) -> impl Iterator<Item = (PathBuf, &Path)> + '_ {
        self.relative_file_paths
            .iter()
            .map(|rel| (self.base_path.join(rel), rel.as_path()))
    }
}

/// Lay the relational files out for packaging.
///
/// A single query's file is moved to `results_dir/results.bqrs`; several
/// queries keep their paths relative to the shared results directory.
pub fn adjust_bqrs_files(
    results: &QueryPackRunResults,
    results_dir: &Path,
) -> Result<BqrsFilePaths, AnalysisError> {
    if let [only] = results.queries.as_slice() {
        let current = results.results_base_path.join(&only.relative_bqrs_path);
        let renamed = results_dir.join(SINGLE_BQRS_NAME);

        std::fs::create_dir_all(results_dir).map_err(|e| {
            AnalysisError::Packaging(format!("create {}: {}", results_dir.display(), e))
        })?;
        std::fs::rename(&current, &renamed).map_err(|e| {
            AnalysisError::Packaging(format!(
                "move {} to {}: {}",
                current.display(),
                renamed.display(),
                e
            ))
        })?;

        return Ok(BqrsFilePaths {
            base_path: results_dir.to_path_buf(),
            relative_file_paths: vec![PathBuf::from(SINGLE_BQRS_NAME)],
        });
    }

    Ok(BqrsFilePaths {
        base_path: results.results_base_path.clone(),
        relative_file_paths: results
            .queries
            .iter()
            .map(|q| q.relative_bqrs_path.clone())
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codeql::types::ResultSetInfo;
    use tempfile::TempDir;

    fn metadata(kind: &str) -> QueryMetadata {
        QueryMetadata {
            id: None,
            kind: Some(kind.to_string()),
            tags: None,
        }
    }

    fn info(sets: &[(&str, usize)], kinds: &[&str]) -> BqrsInfo {
        BqrsInfo {
            result_sets: sets
                .iter()
                .map(|(name, rows)| ResultSetInfo {
                    name: name.to_string(),
                    rows: *rows,
                })
                .collect(),
            compatible_query_kinds: kinds.iter().map(|k| k.to_string()).collect(),
        }
    }

    fn query(rel: &str, kind: &str, bqrs_info: BqrsInfo) -> QueryRun {
        QueryRun {
            query_path: PathBuf::from(rel.replace(".bqrs", ".ql")),
            metadata: metadata(kind),
            relative_bqrs_path: PathBuf::from(rel),
            bqrs_info,
        }
    }

    #[test]
    fn test_sarif_output_type_pairs_kind_with_capability() {
        let both = ["Problem".to_string(), "PathProblem".to_string()];
        let problem_only = ["Problem".to_string()];

        assert_eq!(
            sarif_output_type(&metadata("path-problem"), &both),
            Some(SarifOutputType::PathProblem)
        );
        assert_eq!(
            sarif_output_type(&metadata("path-alert"), &both),
            Some(SarifOutputType::PathProblem)
        );
        assert_eq!(
            sarif_output_type(&metadata("alert"), &problem_only),
            Some(SarifOutputType::Problem)
        );
        assert_eq!(sarif_output_type(&metadata("path-problem"), &problem_only), None);
        assert_eq!(sarif_output_type(&metadata("table"), &both), None);
        assert_eq!(sarif_output_type(&QueryMetadata::default(), &both), None);
    }

    #[test]
    fn test_result_count_prefers_select() {
        let counted = info(&[("problems", 9), ("#select", 4)], &[]);
        assert_eq!(bqrs_result_count(&counted).unwrap(), 4);

        let fallback = info(&[("edges", 100), ("problems", 9)], &[]);
        assert_eq!(bqrs_result_count(&fallback).unwrap(), 9);
    }

    #[test]
    fn test_result_count_unknown_names_fail() {
        let unknown = info(&[("edges", 1), ("nodes", 2)], &[]);
        let err = bqrs_result_count(&unknown).unwrap_err();
        assert!(matches!(err, AnalysisError::Metadata(_)));
        assert!(err.to_string().contains("edges"));
    }

    #[test]
    fn test_pack_sarif_decision_is_all_or_nothing() {
        let convertible = query("p/a.bqrs", "problem", info(&[("#select", 2)], &["Problem"]));
        let not_convertible = query("p/b.bqrs", "table", info(&[("#select", 5)], &[]));

        let all = QueryPackRunResults::new(vec![convertible.clone()], PathBuf::from("/r"));
        assert!(all.supports_sarif());

        let mixed =
            QueryPackRunResults::new(vec![convertible, not_convertible], PathBuf::from("/r"));
        assert!(!mixed.supports_sarif());
        assert_eq!(mixed.total_results_count().unwrap(), 7);
    }

    #[test]
    fn test_total_count_is_deterministic() {
        let results = QueryPackRunResults::new(
            vec![
                query("p/a.bqrs", "problem", info(&[("#select", 2)], &[])),
                query("p/b.bqrs", "problem", info(&[("problems", 3)], &[])),
            ],
            PathBuf::from("/r"),
        );
        let first = results.total_results_count().unwrap();
        assert_eq!(first, 5);
        assert_eq!(results.total_results_count().unwrap(), first);
    }

    #[test]
    fn test_total_count_fails_on_unknown_result_set() {
        let results = QueryPackRunResults::new(
            vec![
                query("p/a.bqrs", "problem", info(&[("#select", 2)], &[])),
                query("p/b.bqrs", "table", info(&[("other", 3)], &[])),
            ],
            PathBuf::from("/r"),
        );
        assert!(results.total_results_count().is_err());
    }

    #[test]
    fn test_single_query_layout_is_renamed() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("db/results");
        std::fs::create_dir_all(base.join("pack/queries")).unwrap();
        std::fs::write(base.join("pack/queries/a.bqrs"), b"rows").unwrap();

        let results = QueryPackRunResults::new(
            vec![query("pack/queries/a.bqrs", "problem", BqrsInfo::default())],
            base.clone(),
        );
        let out = dir.path().join("results");
        let layout = adjust_bqrs_files(&results, &out).unwrap();

        assert_eq!(layout.base_path, out);
        assert_eq!(layout.relative_file_paths, vec![PathBuf::from("results.bqrs")]);
        assert_eq!(std::fs::read(out.join("results.bqrs")).unwrap(), b"rows");
        assert!(!base.join("pack/queries/a.bqrs").exists());
    }

    #[test]
    fn test_multi_query_layout_keeps_relative_paths() {
        let results = QueryPackRunResults::new(
            vec![
                query("pack/a.bqrs", "problem", BqrsInfo::default()),
                query("pack/sub/b.bqrs", "problem", BqrsInfo::default()),
            ],
            PathBuf::from("/db/results"),
        );
        let layout = adjust_bqrs_files(&results, Path::new("/unused")).unwrap();

        assert_eq!(layout.base_path, PathBuf::from("/db/results"));
        let entries: Vec<(PathBuf, PathBuf)> = layout
            .entries()
            .map(|(abs, rel)| (abs, rel.to_path_buf()))
            .collect();
        assert_eq!(
            entries,
            vec![
                (PathBuf::from("/db/results/pack/a.bqrs"), PathBuf::from("pack/a.bqrs")),
                (
                    PathBuf::from("/db/results/pack/sub/b.bqrs"),
                    PathBuf::from("pack/sub/b.bqrs")
                ),
            ]
        );
    }

    #[test]
    fn test_single_query_missing_file_is_packaging_error() {
        let dir = TempDir::new().unwrap();
        let results = QueryPackRunResults::new(
            vec![query("pack/a.bqrs", "problem", BqrsInfo::default())],
            dir.path().join("missing"),
        );
        let err = adjust_bqrs_files(&results, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, AnalysisError::Packaging(_)));
    }
}
