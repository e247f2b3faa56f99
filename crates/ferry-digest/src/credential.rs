use crate::hasher::digest_bytes;

/// Derive the login password for an account identifier.
///
/// The service authenticates with the lowercase hex MD5 of the raw
/// identifier. This is a compatibility requirement of the wire protocol,
/// not a secret in any meaningful sense; do not reuse it as one.
pub fn derive_password(identifier: &str) -> String {
    digest_bytes(identifier.as_bytes())
}
