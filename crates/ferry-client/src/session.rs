use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use ferry_digest::{derive_password, digest_file, digests_match};
use ferry_protocol::{read_packet, write_packet, ProtocolError, Request, ServerResponse};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::namer;
use crate::plan::TransferPlan;
use crate::report::UploadReport;

/// Phases of one upload, in the order they occur.
///
/// `ResolvingCollision` is entered at most once per session. `Closed` is
/// terminal for success and failure alike; the protocol has no abort
/// message, a session just closes its connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticating,
    NegotiatingSlot,
    ResolvingCollision,
    Transferring,
    Verifying,
    Closed,
}

impl SessionState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::NegotiatingSlot => "negotiating-slot",
            Self::ResolvingCollision => "resolving-collision",
            Self::Transferring => "transferring",
            Self::Verifying => "verifying",
            Self::Closed => "closed",
        }
    }
}

/// A local file staged for upload.
#[derive(Clone, Debug)]
pub struct UploadSource {
    pub path: PathBuf,
    /// Storage key requested from the server; defaults to the base name.
    pub key: String,
    pub size: u64,
}

impl UploadSource {
    /// Stat `path` and derive the storage key from its base name.
    pub fn from_path(path: impl Into<PathBuf>) -> ClientResult<Self> {
        let path = path.into();
        let meta = std::fs::metadata(&path).map_err(|e| source_error(&path, e))?;
        if !meta.is_file() {
            return Err(source_error(&path, "not a regular file"));
        }
        let key = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| source_error(&path, "no usable file name"))?;
        Ok(Self { path, key, size: meta.len() })
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }
}

/// One run of the upload protocol over one TCP connection.
///
/// Drives login, slot negotiation with a single rename retry on key
/// conflict, strictly sequential block transfer, and the final digest
/// comparison. Exactly one request is in flight at any time.
#[derive(Debug)]
pub struct UploadSession {
    config: ClientConfig,
    stream: TcpStream,
    state: SessionState,
    token: Option<String>,
    storage_key: Option<String>,
}

impl UploadSession {
    /// Open the TCP connection. A session that connected successfully
    /// starts in `Authenticating`.
    pub async fn connect(config: ClientConfig) -> ClientResult<Self> {
        let addr = config.addr();
        debug!(addr = %addr, state = SessionState::Connecting.name(), "connecting");
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| ClientError::Connect { addr: addr.clone(), source: e })?;
        info!(addr = %addr, "connected");
        Ok(Self {
            config,
            stream,
            state: SessionState::Authenticating,
            token: None,
            storage_key: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Session token issued at login, if any yet.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Key the server granted, if negotiation has completed.
    pub fn storage_key(&self) -> Option<&str> {
        self.storage_key.as_deref()
    }

    /// Run the whole upload. The connection is shut down before this
    /// returns, on success and on every error path.
    pub async fn run(mut self, source: &UploadSource) -> ClientResult<UploadReport> {
        let outcome = self.drive(source).await;
        self.state = SessionState::Closed;
        if let Err(e) = self.stream.shutdown().await {
            debug!(error = %e, "shutdown after session");
        }
        outcome
    }

    async fn drive(&mut self, source: &UploadSource) -> ClientResult<UploadReport> {
        let token = self.login().await?;
        let plan = self.negotiate_slot(&token, source).await?;
        info!(
            key = %plan.storage_key,
            blocks = plan.total_blocks,
            block_size = plan.block_size,
            "slot granted"
        );

        self.state = SessionState::Transferring;
        let digest_path = source.path.clone();
        let local_digest = tokio::task::spawn_blocking(move || digest_file(&digest_path))
            .await
            .map_err(|e| source_error(&source.path, e))?
            .map_err(|e| source_error(&source.path, e))?;
        debug!(digest = %local_digest, "local digest computed");

        let (server_digest, blocks_sent, bytes_sent) =
            self.send_blocks(&token, &plan, source).await?;

        self.state = SessionState::Verifying;
        let verified = digests_match(&local_digest, &server_digest);
        if verified {
            info!(key = %plan.storage_key, digest = %local_digest, "upload verified");
        } else {
            warn!(
                local = %local_digest,
                remote = %server_digest,
                "stored digest does not match source"
            );
        }

        Ok(UploadReport {
            storage_key: plan.storage_key,
            file_size: source.size,
            blocks_sent,
            bytes_sent,
            local_digest,
            server_digest,
            verified,
        })
    }

    /// LOGIN exchange. The password is derived from the identifier; the
    /// response must carry a token.
    async fn login(&mut self) -> ClientResult<String> {
        self.state = SessionState::Authenticating;
        let request = Request::Login {
            username: self.config.username.clone(),
            password: derive_password(&self.config.username),
        };
        let response = self.exchange(request, Vec::new()).await?;
        let token = response.require_token()?.to_string();
        self.token = Some(token.clone());
        debug!("authenticated");
        Ok(token)
    }

    /// SAVE handshake. On a key conflict the key is renamed once with a
    /// timestamp prefix; a conflict on the renamed key is fatal.
    async fn negotiate_slot(
        &mut self,
        token: &str,
        source: &UploadSource,
    ) -> ClientResult<TransferPlan> {
        self.state = SessionState::NegotiatingSlot;
        let response = self.request_slot(token, &source.key, source.size).await?;
        if !response.is_key_conflict() {
            return self.accept_plan(&response, source.size);
        }

        self.state = SessionState::ResolvingCollision;
        let renamed = namer::resolve_now(&source.key);
        warn!(key = %source.key, renamed = %renamed, "storage key taken, retrying under new name");
        let response = self.request_slot(token, &renamed, source.size).await?;
        if response.is_key_conflict() {
            return Err(ClientError::KeyConflictUnresolved { key: renamed });
        }
        self.accept_plan(&response, source.size)
    }

    fn accept_plan(&mut self, response: &ServerResponse, size: u64) -> ClientResult<TransferPlan> {
        let plan = TransferPlan::from_response(response, size)?;
        self.storage_key = Some(plan.storage_key.clone());
        Ok(plan)
    }

    async fn request_slot(
        &mut self,
        token: &str,
        key: &str,
        size: u64,
    ) -> ClientResult<ServerResponse> {
        let request = Request::Save {
            token: token.to_string(),
            key: key.to_string(),
            size,
        };
        self.exchange(request, Vec::new()).await
    }

    /// Send every block in order, then pull the stored digest out of the
    /// final acknowledgement. Returns the digest together with the block
    /// and byte counts the server acknowledged.
    async fn send_blocks(
        &mut self,
        token: &str,
        plan: &TransferPlan,
        source: &UploadSource,
    ) -> ClientResult<(String, u32, u64)> {
        let mut file = tokio::fs::File::open(&source.path)
            .await
            .map_err(|e| source_error(&source.path, e))?;
        let mut last_response = None;
        let mut blocks_sent = 0u32;
        let mut bytes_sent = 0u64;

        for index in 0..plan.total_blocks {
            let (offset, len) = plan.block_range(index);
            file.seek(SeekFrom::Start(offset))
                .await
                .map_err(|e| source_error(&source.path, e))?;
            let mut block = vec![0u8; len as usize];
            file.read_exact(&mut block)
                .await
                .map_err(|e| source_error(&source.path, e))?;

            debug!(block = index, bytes = block.len(), "sending block");
            let request = Request::Upload {
                token: token.to_string(),
                key: plan.storage_key.clone(),
                block_index: index,
            };
            last_response = Some(self.exchange(request, block).await?);
            blocks_sent += 1;
            bytes_sent += len;
        }

        // Only the final ack carries the stored digest. A plan with zero
        // blocks therefore has nothing to verify against.
        let response = last_response.ok_or(ProtocolError::MissingField { field: "md5" })?;
        Ok((response.require_md5()?.to_string(), blocks_sent, bytes_sent))
    }

    /// One request/response exchange, applying the configured response
    /// timeout if any.
    async fn exchange(&mut self, request: Request, binary: Vec<u8>) -> ClientResult<ServerResponse> {
        let operation = request.operation();
        let packet = request.into_packet(binary);
        write_packet(&mut self.stream, &packet).await?;
        debug!(operation, state = self.state.name(), "request sent");

        let reply = match self.config.response_timeout {
            Some(limit) => match tokio::time::timeout(limit, read_packet(&mut self.stream)).await {
                Ok(result) => result?,
                Err(_) => return Err(ClientError::ResponseTimeout { waited: limit }),
            },
            None => read_packet(&mut self.stream).await?,
        };
        Ok(ServerResponse::from_metadata(reply.metadata)?)
    }
}

fn source_error(path: &Path, reason: impl std::fmt::Display) -> ClientError {
    ClientError::SourceFile {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    use ferry_digest::digest_bytes;
    use ferry_protocol::{FrameHeader, Packet, STATUS_KEY_CONFLICT};

    #[derive(Clone, Copy)]
    enum FinalDigest {
        Honest,
        Omit,
        Wrong,
        Uppercase,
    }

    #[derive(Clone)]
    struct MockOptions {
        conflict_rejections: u32,
        block_size: u64,
        send_token: bool,
        final_digest: FinalDigest,
    }

    impl Default for MockOptions {
        fn default() -> Self {
            Self {
                conflict_rejections: 0,
                block_size: 4,
                send_token: true,
                final_digest: FinalDigest::Honest,
            }
        }
    }

    #[derive(Default)]
    struct MockOutcome {
        keys_requested: Vec<String>,
        upload_indices: Vec<u64>,
        received: Vec<u8>,
    }

    /// Minimal in-process server speaking the upload protocol.
    async fn mock_server(listener: TcpListener, opts: MockOptions) -> MockOutcome {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut outcome = MockOutcome::default();
        let mut rejections_left = opts.conflict_rejections;
        let mut expected_blocks = 0u64;
        let mut seen_blocks = 0u64;

        loop {
            let packet = match read_packet(&mut stream).await {
                Ok(packet) => packet,
                Err(_) => break,
            };
            let meta = packet.metadata;
            assert_eq!(meta["direction"], "REQUEST");
            let reply = match meta["operation"].as_str().unwrap() {
                "LOGIN" => {
                    assert_eq!(meta["type"], "AUTH");
                    let username = meta["username"].as_str().unwrap();
                    assert_eq!(
                        meta["password"].as_str().unwrap(),
                        derive_password(username)
                    );
                    if opts.send_token {
                        json!({"status": 200, "token": "tok-123"})
                    } else {
                        json!({"status": 200})
                    }
                }
                "SAVE" => {
                    assert_eq!(meta["token"], "tok-123");
                    let key = meta["key"].as_str().unwrap().to_string();
                    let size = meta["size"].as_u64().unwrap();
                    outcome.keys_requested.push(key.clone());
                    if rejections_left > 0 {
                        rejections_left -= 1;
                        json!({"status": STATUS_KEY_CONFLICT, "key": key})
                    } else {
                        expected_blocks = size.div_ceil(opts.block_size);
                        json!({
                            "status": 200,
                            "key": key,
                            "total_block": expected_blocks,
                            "block_size": opts.block_size,
                        })
                    }
                }
                "UPLOAD" => {
                    assert_eq!(meta["token"], "tok-123");
                    outcome.upload_indices.push(meta["block_index"].as_u64().unwrap());
                    outcome.received.extend_from_slice(&packet.binary);
                    seen_blocks += 1;
                    if seen_blocks == expected_blocks {
                        match opts.final_digest {
                            FinalDigest::Honest => {
                                json!({"status": 200, "md5": digest_bytes(&outcome.received)})
                            }
                            FinalDigest::Uppercase => json!({
                                "status": 200,
                                "md5": digest_bytes(&outcome.received).to_uppercase(),
                            }),
                            FinalDigest::Wrong => {
                                json!({"status": 200, "md5": digest_bytes(b"tampered")})
                            }
                            FinalDigest::Omit => json!({"status": 200}),
                        }
                    } else {
                        json!({"status": 200})
                    }
                }
                other => panic!("unexpected operation {}", other),
            };
            write_packet(&mut stream, &Packet::new(reply)).await.unwrap();
        }
        outcome
    }

    async fn start_mock(opts: MockOptions) -> (u16, JoinHandle<MockOutcome>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (port, tokio::spawn(mock_server(listener, opts)))
    }

    fn temp_source(name: &str, contents: &[u8]) -> (tempfile::TempDir, UploadSource) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        let source = UploadSource::from_path(&path).unwrap();
        (dir, source)
    }

    fn config(port: u16) -> ClientConfig {
        ClientConfig::new("127.0.0.1", "alice").with_port(port)
    }

    async fn run_upload(port: u16, source: &UploadSource) -> ClientResult<UploadReport> {
        let session = UploadSession::connect(config(port)).await?;
        session.run(source).await
    }

    #[tokio::test]
    async fn upload_round_trip_verifies() {
        let (port, server) = start_mock(MockOptions::default()).await;
        let (_dir, source) = temp_source("data.bin", b"0123456789");

        let report = run_upload(port, &source).await.unwrap();
        let outcome = server.await.unwrap();

        assert!(report.verified);
        assert_eq!(report.storage_key, "data.bin");
        assert_eq!(report.blocks_sent, 3);
        assert_eq!(report.bytes_sent, 10);
        assert_eq!(outcome.received, b"0123456789");
        assert_eq!(outcome.upload_indices, vec![0, 1, 2]);
        assert_eq!(outcome.keys_requested, vec!["data.bin".to_string()]);
    }

    #[tokio::test]
    async fn full_grid_with_remainder_block() {
        // 42 bytes in blocks of 4: ten full blocks plus a 2 byte tail.
        let contents: Vec<u8> = (0..42u8).collect();
        let (port, server) = start_mock(MockOptions::default()).await;
        let (_dir, source) = temp_source("grid.bin", &contents);

        let report = run_upload(port, &source).await.unwrap();
        let outcome = server.await.unwrap();

        assert!(report.verified);
        assert_eq!(report.blocks_sent, 11);
        // Counted from the blocks on the wire, so the short tail block
        // contributes 2 bytes, not a full 4.
        assert_eq!(report.bytes_sent, 42);
        assert_eq!(outcome.upload_indices, (0..11).collect::<Vec<u64>>());
        assert_eq!(outcome.received, contents);
    }

    #[tokio::test]
    async fn exact_division_sends_no_padding() {
        let contents = vec![0xEE; 40];
        let (port, server) = start_mock(MockOptions::default()).await;
        let (_dir, source) = temp_source("even.bin", &contents);

        let report = run_upload(port, &source).await.unwrap();
        let outcome = server.await.unwrap();

        assert!(report.verified);
        assert_eq!(report.blocks_sent, 10);
        assert_eq!(report.bytes_sent, 40);
        assert_eq!(outcome.upload_indices, (0..10).collect::<Vec<u64>>());
        assert_eq!(outcome.received.len(), 40);
    }

    #[tokio::test]
    async fn conflict_renames_once_with_timestamp_prefix() {
        let opts = MockOptions { conflict_rejections: 1, ..Default::default() };
        let (port, server) = start_mock(opts).await;
        let (_dir, source) = temp_source("taken.txt", b"abcdefgh");

        let report = run_upload(port, &source).await.unwrap();
        let outcome = server.await.unwrap();

        assert!(report.verified);
        assert_eq!(outcome.keys_requested.len(), 2);
        assert_eq!(outcome.keys_requested[0], "taken.txt");
        let renamed = &outcome.keys_requested[1];
        assert_eq!(renamed.len(), "taken.txt".len() + 14);
        assert!(renamed[..14].chars().all(|c| c.is_ascii_digit()));
        assert!(renamed.ends_with("taken.txt"));
        assert_eq!(&report.storage_key, renamed);
    }

    #[tokio::test]
    async fn second_conflict_is_fatal() {
        let opts = MockOptions { conflict_rejections: 2, ..Default::default() };
        let (port, server) = start_mock(opts).await;
        let (_dir, source) = temp_source("taken.txt", b"abcdefgh");

        let err = run_upload(port, &source).await.unwrap_err();
        let outcome = server.await.unwrap();

        assert!(matches!(err, ClientError::KeyConflictUnresolved { .. }));
        // No third SAVE attempt.
        assert_eq!(outcome.keys_requested.len(), 2);
        assert!(outcome.upload_indices.is_empty());
    }

    #[tokio::test]
    async fn missing_token_is_fatal() {
        let opts = MockOptions { send_token: false, ..Default::default() };
        let (port, _server) = start_mock(opts).await;
        let (_dir, source) = temp_source("data.bin", b"abc");

        let err = run_upload(port, &source).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::MissingField { field: "token" })
        ));
    }

    #[tokio::test]
    async fn missing_final_digest_is_fatal() {
        let opts = MockOptions { final_digest: FinalDigest::Omit, ..Default::default() };
        let (port, _server) = start_mock(opts).await;
        let (_dir, source) = temp_source("data.bin", b"abcdef");

        let err = run_upload(port, &source).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::MissingField { field: "md5" })
        ));
    }

    #[tokio::test]
    async fn empty_file_cannot_verify() {
        let (port, server) = start_mock(MockOptions::default()).await;
        let (_dir, source) = temp_source("empty.bin", b"");

        let err = run_upload(port, &source).await.unwrap_err();
        let outcome = server.await.unwrap();

        // Zero blocks means no final ack ever carries a digest.
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::MissingField { field: "md5" })
        ));
        assert!(outcome.upload_indices.is_empty());
    }

    #[tokio::test]
    async fn digest_mismatch_is_reported_not_fatal() {
        let opts = MockOptions { final_digest: FinalDigest::Wrong, ..Default::default() };
        let (port, _server) = start_mock(opts).await;
        let (_dir, source) = temp_source("data.bin", b"payload bytes");

        let report = run_upload(port, &source).await.unwrap();
        assert!(!report.verified);
        assert_ne!(report.local_digest, report.server_digest);
    }

    #[tokio::test]
    async fn digest_comparison_ignores_case() {
        let opts = MockOptions { final_digest: FinalDigest::Uppercase, ..Default::default() };
        let (port, _server) = start_mock(opts).await;
        let (_dir, source) = temp_source("data.bin", b"payload bytes");

        let report = run_upload(port, &source).await.unwrap();
        assert!(report.verified);
    }

    #[tokio::test]
    async fn garbage_response_is_decode_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_packet(&mut stream).await.unwrap();
            let garbage = b"{botched";
            let header = FrameHeader { metadata_len: garbage.len() as u32, binary_len: 0 };
            stream.write_all(&header.to_bytes()).await.unwrap();
            stream.write_all(garbage).await.unwrap();
            stream.flush().await.unwrap();
            // Hold the socket open so the client fails on parsing, not EOF.
            let mut sink = [0u8; 1];
            let _ = stream.read(&mut sink).await;
        });
        let (_dir, source) = temp_source("data.bin", b"abc");

        let err = run_upload(port, &source).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn server_closing_mid_handshake_is_stream_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_packet(&mut stream).await.unwrap();
            // Drop without replying.
        });
        let (_dir, source) = temp_source("data.bin", b"abc");

        let err = run_upload(port, &source).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::StreamClosed)
        ));
    }

    #[tokio::test]
    async fn source_vanishing_before_transfer_is_source_file_error() {
        let (port, server) = start_mock(MockOptions::default()).await;
        let (_dir, source) = temp_source("data.bin", b"0123456789");
        std::fs::remove_file(&source.path).unwrap();

        let err = run_upload(port, &source).await.unwrap_err();
        let outcome = server.await.unwrap();

        assert!(matches!(err, ClientError::SourceFile { .. }));
        assert!(outcome.upload_indices.is_empty());
    }

    #[tokio::test]
    async fn connection_refused_is_connect_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = UploadSession::connect(config(port)).await.unwrap_err();
        assert!(matches!(err, ClientError::Connect { .. }));
    }

    #[tokio::test]
    async fn response_timeout_fires() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_packet(&mut stream).await.unwrap();
            std::future::pending::<()>().await;
        });
        let (_dir, source) = temp_source("data.bin", b"abc");

        let session_config = config(port).with_response_timeout(Duration::from_millis(50));
        let session = UploadSession::connect(session_config).await.unwrap();
        let err = session.run(&source).await.unwrap_err();
        assert!(matches!(err, ClientError::ResponseTimeout { .. }));
    }

    #[tokio::test]
    async fn fresh_session_state() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let session = UploadSession::connect(config(port)).await.unwrap();
        assert_eq!(session.state(), SessionState::Authenticating);
        assert!(session.token().is_none());
        assert!(session.storage_key().is_none());
        accept.await.unwrap();
    }

    #[test]
    fn source_uses_base_name_and_size() {
        let (_dir, source) = temp_source("report.pdf", b"12345");
        assert_eq!(source.key, "report.pdf");
        assert_eq!(source.size, 5);
    }

    #[test]
    fn source_key_override() {
        let (_dir, source) = temp_source("report.pdf", b"12345");
        let source = source.with_key("custom-key");
        assert_eq!(source.key, "custom-key");
    }

    #[test]
    fn missing_source_is_source_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = UploadSource::from_path(dir.path().join("absent.bin")).unwrap_err();
        assert!(matches!(err, ClientError::SourceFile { .. }));
    }

    #[test]
    fn directory_source_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = UploadSource::from_path(dir.path()).unwrap_err();
        assert!(matches!(err, ClientError::SourceFile { .. }));
    }

    #[test]
    fn state_names() {
        assert_eq!(SessionState::NegotiatingSlot.name(), "negotiating-slot");
        assert_eq!(SessionState::Closed.name(), "closed");
    }
}
