//! Pure types and logic for the realmjoin enrollment daemon.
//!
//! This crate is intentionally IO-free:
//! - No filesystem operations
//! - No subprocess execution
//! - No logging
//!
//! The daemon crate layers providers, the staged workflow and the IPC
//! surface on top of these types.

pub mod classify;
pub mod descriptor;
pub mod diag;
pub mod error;
pub mod name;
pub mod settings;

pub use classify::{classify_join_output, JoinFailure};
pub use descriptor::{DiscoverOptions, RealmDescriptor};
pub use diag::{DiagnosticEvent, DiagnosticLevel};
pub use error::RealmError;
pub use name::{domain_has_suffix, normalize_domain_name};
pub use settings::{parse_section, parse_sections, render_sections, section_names, GLOBAL_SECTION};
