//! Frame I/O over a byte stream and the HELLO handshake.
//!
//! A router acknowledges every new connection with a HELLO frame before
//! anything else. The handshake only checks for that frame; there is no
//! negotiation.

use crate::ClientError;
use bw_wire::{Command, Frame, FrameDecoder};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

/// Read exactly one frame.
///
/// Frames already sitting in `buffer` are returned before the socket is
/// read again. End of stream, even between frames, is an
/// [`std::io::ErrorKind::UnexpectedEof`] error. Invalid frames surface as
/// frame-local [`ClientError::Wire`] errors with the stream still usable.
pub async fn recv_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    decoder: &mut FrameDecoder,
    buffer: &mut BytesMut,
) -> Result<Frame, ClientError> {
    loop {
        if let Some(frame) = decoder.decode(buffer)? {
            return Ok(frame);
        }

        let bytes_read = reader.read_buf(buffer).await?;
        if bytes_read == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "EOF while reading frame",
            )
            .into());
        }

        trace!(
            "Read {} bytes, buffer now has {} bytes",
            bytes_read,
            buffer.len()
        );
    }
}

/// Encode `frame`, write it and flush.
pub async fn send_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &Frame,
    max_frame_size: usize,
) -> Result<(), ClientError> {
    let bytes = frame.encode(max_frame_size)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    trace!(
        "Sent {} seq={} ({} bytes)",
        frame.command(),
        frame.seq_no(),
        bytes.len()
    );
    Ok(())
}

/// Wait for the router's HELLO.
///
/// Anything other than a well-formed HELLO as the very first frame fails
/// the handshake.
pub async fn expect_hello<R: AsyncRead + Unpin>(
    reader: &mut R,
    decoder: &mut FrameDecoder,
    buffer: &mut BytesMut,
) -> Result<(), ClientError> {
    let frame = match recv_frame(reader, decoder, buffer).await {
        Ok(frame) => frame,
        Err(ClientError::Wire(e)) => {
            return Err(ClientError::Handshake(format!("invalid acknowledgment: {}", e)))
        }
        Err(e) => return Err(e),
    };

    if frame.command() != Command::Hello {
        return Err(ClientError::Handshake(format!(
            "expected helo, received {}",
            frame.command()
        )));
    }

    debug!("Received HELLO (seq {})", frame.seq_no());
    Ok(())
}
