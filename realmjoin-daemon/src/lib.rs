//! Privileged daemon that discovers, joins and leaves network identity
//! realms on behalf of local clients.
//!
//! The binary entry point wires a Unix-socket IPC surface (`ipc`) to
//! provider-driven discovery (`provider`, `providers`) and per-realm
//! enroll/unenroll workflows (`realm`, `join`). Privileged work runs
//! external tools through `command` under a transient Kerberos
//! credential cache (`credentials`), serialized by a host-wide action
//! lock (`lock`).

pub mod authz;
pub mod caller;
pub mod command;
pub mod config;
pub mod credentials;
pub mod ipc;
pub mod join;
pub mod lock;
pub mod provider;
pub mod providers;
pub mod realm;
pub mod service;
pub mod store;
