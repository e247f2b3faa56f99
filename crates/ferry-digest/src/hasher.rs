use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use md5::{Digest, Md5};

/// Read size for streaming digests. The digest is invariant to how the
/// input is chunked; this only bounds memory.
const CHUNK_LEN: usize = 64 * 1024;

/// MD5 of everything `reader` yields, as lowercase hex.
pub fn digest_reader<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; CHUNK_LEN];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// MD5 of a file's contents, streamed so large files never sit in memory
/// whole.
pub fn digest_file(path: impl AsRef<Path>) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    digest_reader(&mut reader)
}

/// MD5 of an in-memory buffer, as lowercase hex.
pub fn digest_bytes(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Digest comparison ignoring hex casing; not every peer lowercases.
pub fn digests_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}
