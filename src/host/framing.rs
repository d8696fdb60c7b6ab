//! Native messaging framing: every message is a 32 bit length in native byte order followed by
//! that many bytes of UTF-8 JSON.

use futures::{stream, Stream};
use tokio::{
    io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};
use tracing::{debug, error};

use super::messages::Outbound;

/// Browsers send at most 64 MiB to a host.
pub const MAX_INBOUND_FRAME: u32 = 64 * 1024 * 1024;
/// Browsers refuse messages from a host larger than 1 MiB.
pub const MAX_OUTBOUND_FRAME: usize = 1024 * 1024;

/// Reads one frame. `None` means the other side closed the stream between frames.
pub async fn read_frame(reader: &mut (impl AsyncRead + Unpin)) -> Result<Option<Vec<u8>>, io::Error> {
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => (),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_ne_bytes(header);
    if len > MAX_INBOUND_FRAME {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Frame of {len} bytes exceeds the limit"),
        ));
    }

    let mut buffer = vec![0; len as usize];
    reader.read_exact(&mut buffer).await?;
    Ok(Some(buffer))
}

pub async fn write_frame(
    writer: &mut (impl AsyncWrite + Unpin),
    payload: &[u8],
) -> Result<(), io::Error> {
    if payload.len() > MAX_OUTBOUND_FRAME {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Frame of {} bytes exceeds the limit", payload.len()),
        ));
    }
    writer
        .write_all(&(payload.len() as u32).to_ne_bytes())
        .await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

/// Frames of `reader` as a stream. A read error is yielded once and ends the stream.
pub fn read_frames(
    reader: impl AsyncRead + Unpin,
) -> impl Stream<Item = Result<Vec<u8>, io::Error>> {
    stream::unfold(Some(reader), |state| async move {
        let mut reader = state?;
        match read_frame(&mut reader).await {
            Ok(Some(frame)) => Some((Ok(frame), Some(reader))),
            Ok(None) => None,
            Err(e) => Some((Err(e), None)),
        }
    })
}

/// Serializes and writes every outbound message until all senders are gone.
pub async fn write_frames(
    mut writer: impl AsyncWrite + Unpin,
    mut receiver: mpsc::UnboundedReceiver<Outbound>,
) -> anyhow::Result<()> {
    while let Some(message) = receiver.recv().await {
        let payload = serde_json::to_vec(&message)?;
        match write_frame(&mut writer, &payload).await {
            Ok(()) => debug!("Sent {} bytes", payload.len()),
            // An oversized message is dropped, the channel itself is still fine.
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
                error!("Dropping outbound message {e}")
            }
            Err(e) => {
                error!("Failed to write to the browser {e:?}");
                return Err(e.into());
            }
        }
    }
    Ok(())
}
