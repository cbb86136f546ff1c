//! Concrete realm providers.

pub mod ad;
