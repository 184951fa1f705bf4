//! Boardsync core library — domain types, canonical codec, baseline store,
//! configuration, errors.
//!
//! Public API surface:
//! - [`types`] — newtypes and store-facing metadata structs
//! - [`codec`] — canonical-form encode/decode and filename derivation
//! - [`baseline`] — load / save / migrate the "defs" baseline record
//! - [`config`] — YAML configuration file
//! - [`error`] — [`CoreError`]

pub mod baseline;
pub mod codec;
pub mod config;
pub mod error;
pub mod types;

pub use baseline::Baseline;
pub use codec::{Canonical, Decoded};
pub use config::Config;
pub use error::CoreError;
pub use types::{EntityKind, FolderRef, LibraryMeta, SearchMeta, Uid};
