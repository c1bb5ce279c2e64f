//! The Persistence Controller (§4.5): master-file lifecycle, per-object
//! file naming, directory scan on boot, corruption quarantine, and
//! delete-on-remove semantics. [`db`] provides the opaque encrypted
//! container primitive; [`codec`] frames bytes on top of it; [`controller`]
//! is everything file-lifecycle shaped.

pub mod codec;
pub mod controller;
pub mod db;

pub use controller::Salts;
