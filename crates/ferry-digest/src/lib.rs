//! Content digests for the ferry upload service.
//!
//! The wire protocol verifies transfers end to end with MD5: the client
//! digests the source file before sending and compares against the digest
//! the server reports after the final block. MD5 is what the protocol
//! mandates; it is an integrity check against transfer corruption, not a
//! security boundary.

pub mod credential;
pub mod hasher;

pub use credential::derive_password;
pub use hasher::{digest_bytes, digest_file, digest_reader, digests_match};
