/// What an upload session accomplished.
///
/// A report is returned whenever the full protocol ran to completion,
/// including when the digests disagree: `verified == false` is a
/// retryable outcome for the caller, not a session failure.
#[derive(Clone, Debug)]
pub struct UploadReport {
    /// Key the server stored the file under (renamed on conflict).
    pub storage_key: String,
    pub file_size: u64,
    /// Blocks acknowledged by the server, counted during transfer.
    pub blocks_sent: u32,
    /// Payload bytes acknowledged by the server, counted during transfer.
    pub bytes_sent: u64,
    /// Digest computed locally before transfer.
    pub local_digest: String,
    /// Digest the server reported after the final block.
    pub server_digest: String,
    pub verified: bool,
}
