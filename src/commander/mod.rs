//! Session side of the pipeline: eligibility, job submission and status.

pub mod eligibility;
pub mod manager;
pub mod session;
pub mod status;

pub use eligibility::LocalEligibility;
pub use manager::SessionManager;
pub use session::{Session, SessionManifest};
pub use status::{InMemoryStatusStore, RepoStatus};
