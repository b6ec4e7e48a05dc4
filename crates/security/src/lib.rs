//! Safety layer for shim installation
//!
//! The shim mechanism itself works through symlinks, so symlink chains are the
//! main attack surface: circular references that hang resolution, deep chains,
//! targets swapped mid-resolution, and escapes into system or critical
//! binaries. This crate rejects unsafe paths before anything is renamed and
//! provides the guarded rename used for every relocation.
//!
//! All inspection of caller-supplied paths uses `lstat`; nothing here follows a
//! symlink implicitly.

mod error;
mod fsops;
mod symlink;
mod validate;

pub use error::ValidationError;
pub use fsops::{rename_exclusive, FileSnapshot};
pub use symlink::{resolve_symlink_chain, MAX_SYMLINK_DEPTH};
pub use validate::{
    classify_directory, is_critical_binary, protected_prefix, validate_binary_path,
    validate_install_target, DirectoryClass, CRITICAL_BINARIES, DANGEROUS_PREFIXES,
};
