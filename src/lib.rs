//! Sift Microsoft 365 tenant log exports for signs of compromise.
//!
//! The crate ingests CSV exports (sign-in log, admin audit log, inbox rules,
//! mailbox delegations, app registrations, Conditional Access policies, and
//! an optional mail trace), scores each subject from the evidence found, and
//! renders an HTML report plus CSV exports. The binary in `main.rs` is a thin
//! clap wrapper over [`cmd`].

pub mod aggregate;
pub mod cmd;
pub mod config;
pub mod error;
pub mod etr;
pub mod extract;
pub mod geo;
pub mod input;
pub mod records;
pub mod report;
