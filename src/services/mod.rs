//! Domain services used by the HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own validation and persistence so route handlers stay
//! focused on request parsing and status mapping. Every mutating service
//! writes through the change log in `changes`.

pub mod changes;
pub mod entity;
pub mod hierarchy;
pub mod sequence;
pub mod version;
