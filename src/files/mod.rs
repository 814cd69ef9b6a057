//! Workspace file operations: sanitisation, direct apply, serving.

pub mod apply;
pub mod paths;
pub mod serve;

pub use apply::{
    ApplyErrorKind, ApplyReport, FileAction, FileEntry, apply_manifest, classify_apply_error,
};
pub use paths::sanitize_rel_path;
pub use serve::{FileMeta, cache_control_for, list_files, resolve_file};
