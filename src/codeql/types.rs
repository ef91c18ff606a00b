//! Shapes of the documents the query tool reads and writes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// `codeql-database.yml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseMetadata {
    #[serde(default)]
    pub primary_language: Option<String>,
    #[serde(default)]
    pub creation_metadata: Option<CreationMetadata>,
}

/// Optional `creationMetadata` block of the database metadata.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationMetadata {
    /// Kept as a raw scalar: an all-digit sha would otherwise parse as a number.
    #[serde(default)]
    pub sha: Option<serde_yaml::Value>,
    #[serde(default)]
    pub cli_version: Option<String>,
}

impl DatabaseMetadata {
    /// Revision the database was built from, if recorded.
    pub fn revision(&self) -> Option<String> {
        let sha = self.creation_metadata.as_ref()?.sha.as_ref()?;
        match sha {
            serde_yaml::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_yaml::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// `qlpack.yml`, only the fields needed to locate results.
#[derive(Debug, Clone, Deserialize)]
pub struct QlPack {
    pub name: String,
}

/// Output of `bqrs info --format=json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BqrsInfo {
    #[serde(default)]
    pub result_sets: Vec<ResultSetInfo>,
    #[serde(default)]
    pub compatible_query_kinds: Vec<String>,
}

/// Summary of one relational result set.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResultSetInfo {
    pub name: String,
    pub rows: usize,
}

/// Output of `resolve metadata --format=json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct QueryMetadata {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    /// Space separated, as the tool reports them.
    #[serde(default)]
    pub tags: Option<String>,
}

impl QueryMetadata {
    pub fn tags(&self) -> Vec<&str> {
        self.tags
            .as_deref()
            .map(|t| t.split_whitespace().collect())
            .unwrap_or_default()
    }
}

/// Output of `resolve database`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedDatabase {
    pub source_location_prefix: String,
}

/// Output of `resolve queries --format=bylanguage`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedQueries {
    #[serde(default)]
    pub by_language: BTreeMap<String, BTreeMap<String, Value>>,
    #[serde(default)]
    pub no_declared_language: BTreeMap<String, Value>,
    #[serde(default)]
    pub multiple_declared_languages: BTreeMap<String, Value>,
}

impl ResolvedQueries {
    /// Every query path, sorted and deduplicated.
    pub fn query_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .by_language
            .values()
            .flat_map(|queries| queries.keys())
            .chain(self.no_declared_language.keys())
            .chain(self.multiple_declared_languages.keys())
            .cloned()
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }
}

/// SARIF log. Only `runs` is interpreted; everything else round-trips.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sarif {
    #[serde(default)]
    pub runs: Vec<SarifRun>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One SARIF run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SarifRun {
    #[serde(default)]
    pub results: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub version_control_provenance: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_metadata_with_sha() {
        let yaml = r#"
sourceLocationPrefix: /home/runner/work/flatbuffers
primaryLanguage: cpp
creationMetadata:
  sha: 1f3b2c4d5e
  cliVersion: 2.17.0
  creationTime: 2024-05-01T10:00:00Z
"#;
        let metadata: DatabaseMetadata = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(metadata.primary_language.as_deref(), Some("cpp"));
        assert_eq!(metadata.revision().as_deref(), Some("1f3b2c4d5e"));
    }

    #[test]
    fn test_database_metadata_numeric_sha() {
        let yaml = "creationMetadata:\n  sha: 1234567\n";
        let metadata: DatabaseMetadata = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(metadata.revision().as_deref(), Some("1234567"));
    }

    #[test]
    fn test_database_metadata_without_creation_block() {
        let yaml = "primaryLanguage: java\n";
        let metadata: DatabaseMetadata = serde_yaml::from_str(yaml).unwrap();
        assert!(metadata.revision().is_none());
    }

    #[test]
    fn test_bqrs_info_parse() {
        let json = r##"{
            "resultSets": [
                {"name": "#select", "rows": 3, "columns": [{"name": "e", "kind": "Entity"}]},
                {"name": "edges", "rows": 10, "columns": []}
            ],
            "compatibleQueryKinds": ["Problem", "PathProblem"]
        }"##;
        let info: BqrsInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.result_sets.len(), 2);
        assert_eq!(info.result_sets[0].name, "#select");
        assert_eq!(info.result_sets[0].rows, 3);
        assert!(info.compatible_query_kinds.contains(&"PathProblem".to_string()));
    }

    #[test]
    fn test_query_metadata_tags() {
        let json = r#"{"id": "cpp/overflow", "kind": "path-problem", "tags": "security external/cwe/cwe-120"}"#;
        let metadata: QueryMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.kind.as_deref(), Some("path-problem"));
        assert_eq!(metadata.tags(), vec!["security", "external/cwe/cwe-120"]);
    }

    #[test]
    fn test_resolved_queries_paths() {
        let json = r#"{
            "byLanguage": {"cpp": {"/qp/b.ql": {}, "/qp/a.ql": {}}},
            "noDeclaredLanguage": {"/qp/c.ql": {}},
            "multipleDeclaredLanguages": {}
        }"#;
        let resolved: ResolvedQueries = serde_json::from_str(json).unwrap();
        assert_eq!(resolved.query_paths(), vec!["/qp/a.ql", "/qp/b.ql", "/qp/c.ql"]);
    }

    #[test]
    fn test_sarif_preserves_unknown_fields() {
        let json = r#"{"version": "2.1.0", "$schema": "s", "runs": [{"tool": {"driver": {"name": "CodeQL"}}, "results": [{"ruleId": "x"}]}]}"#;
        let sarif: Sarif = serde_json::from_str(json).unwrap();
        let back = serde_json::to_value(&sarif).unwrap();
        assert_eq!(back["version"], "2.1.0");
        assert_eq!(back["$schema"], "s");
        assert_eq!(back["runs"][0]["tool"]["driver"]["name"], "CodeQL");
        assert_eq!(back["runs"][0]["results"][0]["ruleId"], "x");
        assert!(back["runs"][0].get("versionControlProvenance").is_none());
    }
}
