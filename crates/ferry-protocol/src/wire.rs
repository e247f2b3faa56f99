use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{ProtocolError, ProtocolResult};
use crate::packet::{FrameHeader, Packet, HEADER_LEN};

/// Write one packet to the stream. Short writes are absorbed by
/// `write_all`; the frame is flushed before returning.
pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> ProtocolResult<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = packet.encode()?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    trace!(frame_len = bytes.len(), "wrote frame");
    Ok(())
}

/// Read exactly one packet from the stream.
///
/// Each section is read with an exact byte count, so a slow peer simply
/// makes the reads wait; the stream is left positioned at the next frame
/// header on success. A peer that closes the connection before a section
/// completes produces `StreamClosed`. Metadata that fails to parse
/// produces `Decode` rather than tearing down the caller.
pub async fn read_packet<R>(reader: &mut R) -> ProtocolResult<Packet>
where
    R: AsyncRead + Unpin,
{
    let mut header_buf = [0u8; HEADER_LEN];
    read_exact_or_closed(reader, &mut header_buf).await?;
    let header = FrameHeader::from_bytes(header_buf);
    header.validate()?;
    trace!(
        metadata_len = header.metadata_len,
        binary_len = header.binary_len,
        "frame header"
    );

    let mut metadata_buf = vec![0u8; header.metadata_len as usize];
    read_exact_or_closed(reader, &mut metadata_buf).await?;
    let metadata = serde_json::from_slice(&metadata_buf)
        .map_err(|e| ProtocolError::Decode(e.to_string()))?;

    let mut binary = vec![0u8; header.binary_len as usize];
    read_exact_or_closed(reader, &mut binary).await?;

    Ok(Packet { metadata, binary })
}

async fn read_exact_or_closed<R>(reader: &mut R, buf: &mut [u8]) -> ProtocolResult<()>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(ProtocolError::StreamClosed),
        Err(e) => Err(e.into()),
    }
}
