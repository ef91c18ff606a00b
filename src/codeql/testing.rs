//! Fixtures for engine tests: zip packages, query packs and a scripted
//! stand-in for the `codeql` executable.

use super::cli::CodeqlCli;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Write a zip with the given `(name, content)` entries.
pub fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    let mut writer = ZipWriter::new(File::create(path).unwrap());
    for (name, content) in entries {
        writer
            .start_file(name.to_string(), SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

/// Install a `codeql` shell script whose body is `body`.
#[cfg(unix)]
pub fn fake_cli(dir: &Path, body: &str) -> CodeqlCli {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("codeql");
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    CodeqlCli::new(path)
}

/// One query of a fake pack.
#[derive(Debug, Clone)]
pub struct FakeQuery {
    /// Path inside the pack, e.g. `queries/a.ql`.
    pub path: &'static str,
    pub kind: &'static str,
    /// `(result set name, rows)`.
    pub result_sets: Vec<(&'static str, usize)>,
    pub compatible_kinds: Vec<&'static str>,
}

impl FakeQuery {
    pub fn problem(path: &'static str, rows: usize) -> Self {
        Self {
            path,
            kind: "problem",
            result_sets: vec![("#select", rows)],
            compatible_kinds: vec!["Problem"],
        }
    }

    pub fn table(path: &'static str, result_set: &'static str, rows: usize) -> Self {
        Self {
            path,
            kind: "table",
            result_sets: vec![(result_set, rows)],
            compatible_kinds: vec![],
        }
    }

    fn bqrs_suffix(&self) -> String {
        self.path.trim_end_matches(".ql").to_string() + ".bqrs"
    }
}

/// A query pack on disk plus the engine script that "runs" it.
pub struct FakeEngine {
    pub pack_dir: PathBuf,
    pub cli: CodeqlCli,
}

/// Behaviour knobs for the fake engine.
#[derive(Debug, Clone, Default)]
pub struct FakeBehaviour {
    /// Make `database run-queries` exit non-zero.
    pub fail_run_queries: bool,
    /// Results per SARIF run written by `interpret-results`.
    pub sarif_results: usize,
    /// Skip writing this query's relational file.
    pub drop_bqrs_for: Option<&'static str>,
    /// Sleep this long inside `run-queries`, in seconds. The script drops
    /// a `running-queries` marker into the database first.
    pub run_queries_delay: Option<u32>,
}

#[cfg(unix)]
impl FakeEngine {
    pub fn install(dir: &Path, pack_name: &str, queries: &[FakeQuery], behaviour: FakeBehaviour) -> Self {
        let pack_dir = dir.join("pack");
        fs::create_dir_all(&pack_dir).unwrap();
        fs::write(
            pack_dir.join("qlpack.yml"),
            format!("name: {}\nversion: 0.0.1\n", pack_name),
        )
        .unwrap();
        for q in queries {
            let path = pack_dir.join(q.path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "select 1").unwrap();
        }

        let mut script = String::from("cmd=\"$1 $2\"\ncase \"$cmd\" in\n");

        // database run-queries --ram=N --additional-packs QP -- DB QP
        script.push_str("\"database run-queries\")\n");
        if let Some(delay) = behaviour.run_queries_delay {
            script.push_str(&format!("  touch \"$7/running-queries\"\n  sleep {}\n", delay));
        }
        if behaviour.fail_run_queries {
            script.push_str("  echo 'A fatal error occurred: out of memory' >&2\n  exit 2\n");
        }
        for q in queries {
            if behaviour.drop_bqrs_for == Some(q.path) {
                continue;
            }
            let bqrs = format!("$7/results/{}/{}", pack_name, q.bqrs_suffix());
            script.push_str(&format!("  mkdir -p \"$(dirname \"{0}\")\"\n  echo rows > \"{0}\"\n", bqrs));
        }
        script.push_str("  ;;\n");

        // resolve queries --format=bylanguage -- QP
        let entries: Vec<String> = queries
            .iter()
            .map(|q| format!("\"{}\": {{}}", pack_dir.join(q.path).display()))
            .collect();
        script.push_str(&format!(
            "\"resolve queries\")\n  echo '{{\"byLanguage\": {{\"cpp\": {{{}}}}}}}'\n  ;;\n",
            entries.join(", ")
        ));

        // bqrs info --format=json FILE
        script.push_str("\"bqrs info\")\n  case \"$4\" in\n");
        for q in queries {
            let sets: Vec<String> = q
                .result_sets
                .iter()
                .map(|(name, rows)| format!("{{\"name\": \"{}\", \"rows\": {}}}", name, rows))
                .collect();
            let kinds: Vec<String> = q.compatible_kinds.iter().map(|k| format!("\"{}\"", k)).collect();
            script.push_str(&format!(
                "  *{}) echo '{{\"resultSets\": [{}], \"compatibleQueryKinds\": [{}]}}' ;;\n",
                q.bqrs_suffix(),
                sets.join(", "),
                kinds.join(", ")
            ));
        }
        script.push_str("  *) exit 1 ;;\n  esac\n  ;;\n");

        // resolve metadata --format=json QUERY
        script.push_str("\"resolve metadata\")\n  case \"$4\" in\n");
        for q in queries {
            script.push_str(&format!(
                "  *{}) echo '{{\"kind\": \"{}\", \"tags\": \"security\"}}' ;;\n",
                q.path, q.kind
            ));
        }
        script.push_str("  *) exit 1 ;;\n  esac\n  ;;\n");

        // resolve database DB
        script.push_str("\"resolve database\")\n  echo '{\"sourceLocationPrefix\": \"/src\"}'\n  ;;\n");

        // database interpret-results --format=sarif-latest --output=FILE ...
        let results: Vec<String> = (0..behaviour.sarif_results)
            .map(|i| format!("{{\"ruleId\": \"r{}\"}}", i))
            .collect();
        script.push_str(&format!(
            "\"database interpret-results\")\n  out=\"${{4#--output=}}\"\n  echo '{{\"version\": \"2.1.0\", \"runs\": [{{\"tool\": {{\"driver\": {{\"name\": \"CodeQL\"}}}}, \"results\": [{}]}}]}}' > \"$out\"\n  ;;\n",
            results.join(", ")
        ));

        script.push_str("*)\n  echo \"unexpected: $*\" >&2\n  exit 64\n  ;;\nesac\n");

        let cli = fake_cli(dir, &script);
        Self { pack_dir, cli }
    }
}

/// Database package with an optional revision in its metadata.
pub fn write_database(path: &Path, sha: Option<&str>) {
    let metadata = match sha {
        Some(sha) => format!(
            "primaryLanguage: cpp\ncreationMetadata:\n  sha: {}\n  cliVersion: 2.17.0\n",
            sha
        ),
        None => "primaryLanguage: cpp\n".to_string(),
    };
    write_zip(
        path,
        &[
            ("cpp-db/codeql-database.yml", metadata.as_str()),
            ("cpp-db/src.zip", "source"),
        ],
    );
}

/// Database package padded with `padding` small files, slow to unpack.
pub fn write_large_database(path: &Path, padding: usize) {
    let mut writer = ZipWriter::new(File::create(path).unwrap());
    writer
        .start_file("cpp-db/codeql-database.yml", SimpleFileOptions::default())
        .unwrap();
    writer
        .write_all(b"primaryLanguage: cpp\ncreationMetadata:\n  sha: feed\n")
        .unwrap();
    for i in 0..padding {
        writer
            .start_file(format!("cpp-db/trap/{}.trap", i), SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"trap").unwrap();
    }
    writer.finish().unwrap();
}
