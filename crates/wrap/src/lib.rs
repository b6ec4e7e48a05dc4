//! Shim lifecycle for ribbin
//!
//! [`ShimEngine::install`] swaps a binary for a symlink to the dispatcher and
//! keeps the original beside it as a sidecar; [`ShimEngine::uninstall`]
//! reverses that. [`ShimEngine::reconcile`] repairs locations left behind by
//! interrupted operations or by package managers reinstalling a tool over its
//! shim.
//!
//! ```rust,no_run
//! use ribbin_common::Registry;
//! use ribbin_wrap::ShimEngine;
//! use std::path::Path;
//!
//! let mut registry = Registry::default();
//! let engine = ShimEngine::default();
//! engine.install(
//!     Path::new("/usr/local/bin/npm"),
//!     Path::new("/usr/local/bin/ribbin"),
//!     &mut registry,
//!     None,
//! )?;
//! # Ok::<(), ribbin_wrap::ShimError>(())
//! ```

mod engine;
mod error;
pub mod metadata;
mod sidecars;

pub use engine::{InstallOptions, InstallReport, ShimEngine};
pub use error::{PermissionHint, ShimError};
pub use metadata::Metadata;
pub use sidecars::{
    binary_for_sidecar, check_hash_conflict, find_sidecars, HashCheck, ReconcileOutcome,
};
