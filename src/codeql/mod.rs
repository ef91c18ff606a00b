//! Query engine integration: subprocess adapter, result reconciliation and
//! archive packaging.

mod analyzer;
pub mod archive;
pub mod cli;
pub mod results;
pub mod runner;
pub mod sarif;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use analyzer::CodeqlAnalyzer;
pub use cli::CodeqlCli;
pub use runner::QueryRunner;
