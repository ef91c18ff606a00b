//! Markdown and JSON rendering of a session report.

use super::{ReportMetadata, ReportSummary, SessionReport, Skipped};
use crate::models::{OwnerRepo, Status};
use anyhow::Result;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &SessionReport) -> String {
    let mut output = String::new();

    output.push_str("# qlfleet Session Report\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_summary_section(&report.summary));
    output.push_str(&generate_repositories_section(report));
    output.push_str(&generate_skipped_section(&report.skipped));
    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Session:** {}\n", metadata.session_id));
    section.push_str(&format!("- **Owner:** {}\n", metadata.owner));
    section.push_str(&format!(
        "- **Controller Repository:** {}\n",
        metadata.controller_repo
    ));
    section.push_str(&format!("- **Query Pack:** `{}`\n", metadata.query_pack));
    section.push_str(&format!("- **Language:** {}\n", metadata.language));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

fn generate_summary_section(summary: &ReportSummary) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str(&format!(
        "| Requested | Analyzed | {} Succeeded | {} Failed | **Results** |\n",
        Status::Success.emoji(),
        Status::Error.emoji(),
    ));
    section.push_str("|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | {} | **{}** |\n\n",
        summary.requested, summary.analyzed, summary.succeeded, summary.failed, summary.total_results
    ));

    section
}

fn generate_repositories_section(report: &SessionReport) -> String {
    let mut section = String::new();

    section.push_str("## Repositories\n\n");

    if report.repositories.is_empty() {
        section.push_str("No repository was eligible for analysis.\n\n");
        return section;
    }

    section.push_str("| Repository | Status | Results | Archive |\n");
    section.push_str("|:---|:---:|:---:|:---|\n");

    for repo in &report.repositories {
        let archive = repo
            .status
            .archive_location
            .as_deref()
            .map(|a| format!("`{}`", a))
            .unwrap_or_else(|| "-".to_string());
        section.push_str(&format!(
            "| {} | {} {} | {} | {} |\n",
            repo.repository,
            repo.status.status.emoji(),
            repo.status.status,
            repo.status.result_count,
            archive
        ));
    }
    section.push('\n');

    let failures: Vec<_> = report
        .repositories
        .iter()
        .filter_map(|r| r.status.error.as_deref().map(|e| (&r.repository, e)))
        .collect();
    if !failures.is_empty() {
        section.push_str("### Failures\n\n");
        for (repository, error) in failures {
            section.push_str(&format!("#### {}\n\n```\n{}\n```\n\n", repository, error));
        }
    }

    section
}

fn push_list(section: &mut String, title: &str, repos: &[OwnerRepo]) {
    if repos.is_empty() {
        return;
    }
    section.push_str(&format!("### {} ({})\n\n", title, repos.len()));
    for repo in repos {
        section.push_str(&format!("- {}\n", repo));
    }
    section.push('\n');
}

fn generate_skipped_section(skipped: &Skipped) -> String {
    let mut section = String::new();
    push_list(&mut section, "Access Mismatch", &skipped.access_mismatch);
    push_list(&mut section, "Not Found", &skipped.not_found);
    push_list(&mut section, "No Database", &skipped.no_database);
    push_list(&mut section, "Over Limit", &skipped.over_limit);

    if section.is_empty() {
        return section;
    }
    format!("## Skipped Repositories\n\n{}", section)
}

fn generate_footer() -> String {
    format!(
        "---\n\n*Report generated by qlfleet v{}*\n",
        env!("CARGO_PKG_VERSION")
    )
}

/// Generate a JSON report.
pub fn generate_json_report(report: &SessionReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
