//! Deterministic sandbox naming.
//!
//! A `(user, project)` pair always maps to the same sandbox name, which is
//! what makes the warm pool work: the next request for the same project
//! finds the previous sandbox by name. The version suffix retires the
//! whole pool at once when the sandbox configuration changes.

use sha2::{Digest, Sha256};

/// Bump to force every project onto fresh sandboxes on its next request.
pub const POOL_SUFFIX: &str = "v2";

/// Derive the sandbox name for a `(user, project)` pair.
///
/// `dreamcore-<sha256(user ":" project)[..12]>-<suffix>`. Twelve hex
/// characters keep collisions negligible at the expected fleet size.
pub fn sandbox_name(user_id: &str, project_id: &str) -> String {
    let digest = Sha256::digest(format!("{user_id}:{project_id}").as_bytes());
    format!("dreamcore-{}-{}", &hex::encode(digest)[..12], POOL_SUFFIX)
}
