//! Request gate: shared-secret authentication and identifier validation.
//!
//! Every endpoint passes through this gate before doing anything else.
//! The two identifiers (`user_id`, `project_id`) end up concatenated into
//! filesystem paths, so validating them as UUIDs at the boundary removes
//! path traversal as a concern everywhere below.

use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

use crate::error::GateError;

/// Header carrying the gateway shared secret.
pub const INTERNAL_SECRET_HEADER: &str = "x-internal-secret";

/// Verify the shared-secret header against the configured secret.
///
/// Fails closed: an empty configured secret rejects every request, and an
/// absent or empty header never passes. Comparison is constant-time.
pub fn verify_secret(
    expected: &SecretString,
    presented: Option<&str>,
) -> Result<(), GateError> {
    let expected = expected.expose_secret();
    if expected.is_empty() {
        return Err(GateError::Unauthorized);
    }
    let presented = presented.unwrap_or("");
    if presented.is_empty() {
        return Err(GateError::Unauthorized);
    }
    let matches: bool = expected
        .as_bytes()
        .ct_eq(presented.as_bytes())
        .into();
    if matches {
        Ok(())
    } else {
        Err(GateError::Unauthorized)
    }
}

/// Validate that `value` is a canonical 8-4-4-4-12 hex UUID.
///
/// Case-insensitive. The error message names the offending field so the
/// client sees exactly which identifier was malformed.
pub fn validate_uuid(field: &str, value: &str) -> Result<(), GateError> {
    let parts: Vec<&str> = value.split('-').collect();
    let lengths = [8, 4, 4, 4, 12];
    let well_formed = parts.len() == 5
        && parts
            .iter()
            .zip(lengths)
            .all(|(part, len)| part.len() == len && part.chars().all(|c| c.is_ascii_hexdigit()));
    if well_formed {
        Ok(())
    } else {
        Err(GateError::InvalidUuid {
            field: field.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(s: &str) -> SecretString {
        s.to_string().into()
    }

    #[test]
    fn test_correct_secret_passes() {
        assert!(verify_secret(&secret("s3cret"), Some("s3cret")).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        assert!(verify_secret(&secret("s3cret"), Some("wrong")).is_err());
    }

    #[test]
    fn test_missing_header_rejected() {
        assert!(verify_secret(&secret("s3cret"), None).is_err());
    }

    #[test]
    fn test_empty_header_rejected() {
        assert!(verify_secret(&secret("s3cret"), Some("")).is_err());
    }

    #[test]
    fn test_unconfigured_secret_fails_closed() {
        assert!(verify_secret(&secret(""), Some("anything")).is_err());
    }

    #[test]
    fn test_valid_uuid_lowercase() {
        assert!(validate_uuid("user_id", "aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa").is_ok());
    }

    #[test]
    fn test_valid_uuid_uppercase() {
        assert!(validate_uuid("user_id", "AAAAAAAA-AAAA-AAAA-AAAA-AAAAAAAAAAAA").is_ok());
    }

    #[test]
    fn test_uuid_wrong_group_length_rejected() {
        // 31 hex chars in total: last group one short.
        let err = validate_uuid("project_id", "aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaa").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid project_id: must be UUID format"
        );
    }

    #[test]
    fn test_uuid_non_hex_rejected() {
        assert!(validate_uuid("user_id", "gggggggg-aaaa-aaaa-aaaa-aaaaaaaaaaaa").is_err());
    }

    #[test]
    fn test_uuid_traversal_rejected() {
        assert!(validate_uuid("user_id", "../../../etc/passwd").is_err());
        assert!(validate_uuid("user_id", "").is_err());
    }

    #[test]
    fn test_uuid_missing_dashes_rejected() {
        assert!(validate_uuid("user_id", "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").is_err());
    }
}
