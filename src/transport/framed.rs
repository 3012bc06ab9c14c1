//! Length-prefixed frame codec over any byte stream.
//!
//! # Frame Layout
//! ```text
//! ┌──────────────┬───────────────────────┬──────┬───────────────┬───────────────┐
//! │ header len   │ JSON header           │ flag │ payload len   │ payload bytes │
//! │ u32 BE       │ {"v":1,"msg":{...}}   │ u8   │ u32 BE (flag) │ (flag = 1)    │
//! └──────────────┴───────────────────────┴──────┴───────────────┴───────────────┘
//! ```
//!
//! # Design Decisions
//! - Binary payloads are never JSON-encoded
//! - An oversized inbound frame closes the connection
//! - An oversized outbound message never reaches the wire; the writer sends
//!   its [`WireMessage::oversized`] stand-in so only that call or stream fails

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc;

use crate::config::TransportConfig;
use crate::protocol::{ClientMessage, HostMessage, WireMessage, PROTOCOL_VERSION};
use crate::transport::{ClientEndpoint, Endpoint, HostEndpoint, TransportError};

const FLAG_NO_PAYLOAD: u8 = 0;
const FLAG_PAYLOAD: u8 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a, M> {
    v: u16,
    msg: &'a M,
}

#[derive(Deserialize)]
struct Envelope<M> {
    msg: M,
}

#[derive(Deserialize)]
struct VersionProbe {
    v: u16,
}

/// Size of the frame `encode_frame` would produce for `msg`.
pub fn frame_len<M: WireMessage>(msg: &M) -> Result<usize, TransportError> {
    let header = serde_json::to_vec(&EnvelopeRef {
        v: PROTOCOL_VERSION,
        msg,
    })?;
    Ok(4 + header.len() + 1 + msg.payload_len().map_or(0, |len| 4 + len))
}

/// Encode one message into a complete frame.
pub fn encode_frame<M: WireMessage>(mut msg: M, max_frame_bytes: usize) -> Result<Bytes, TransportError> {
    let payload = msg.take_payload();
    let header = serde_json::to_vec(&EnvelopeRef {
        v: PROTOCOL_VERSION,
        msg: &msg,
    })?;

    let size = 4 + header.len() + 1 + payload.as_ref().map_or(0, |p| 4 + p.len());
    if size > max_frame_bytes {
        return Err(TransportError::FrameTooLarge {
            size,
            max: max_frame_bytes,
        });
    }

    let mut buf = BytesMut::with_capacity(size);
    buf.put_u32(header.len() as u32);
    buf.put_slice(&header);
    match payload {
        Some(payload) => {
            buf.put_u8(FLAG_PAYLOAD);
            buf.put_u32(payload.len() as u32);
            buf.put_slice(&payload);
        }
        None => buf.put_u8(FLAG_NO_PAYLOAD),
    }
    Ok(buf.freeze())
}

/// Write one message as a frame and flush it.
pub async fn write_frame<W, M>(writer: &mut W, msg: M, max_frame_bytes: usize) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
    M: WireMessage,
{
    let frame = encode_frame(msg, max_frame_bytes)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. Returns `Ok(None)` on a clean end of stream.
pub async fn read_frame<R, M>(reader: &mut R, max_frame_bytes: usize) -> Result<Option<M>, TransportError>
where
    R: AsyncRead + Unpin,
    M: WireMessage,
{
    let header_len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if header_len > max_frame_bytes {
        return Err(TransportError::FrameTooLarge {
            size: header_len,
            max: max_frame_bytes,
        });
    }

    let mut header = vec![0u8; header_len];
    reader.read_exact(&mut header).await?;

    let probe: VersionProbe = serde_json::from_slice(&header)?;
    if probe.v != PROTOCOL_VERSION {
        return Err(TransportError::VersionMismatch {
            found: probe.v,
            expected: PROTOCOL_VERSION,
        });
    }
    let Envelope { mut msg } = serde_json::from_slice::<Envelope<M>>(&header)?;

    match reader.read_u8().await? {
        FLAG_NO_PAYLOAD => {}
        FLAG_PAYLOAD => {
            let len = reader.read_u32().await? as usize;
            if header_len + len > max_frame_bytes {
                return Err(TransportError::FrameTooLarge {
                    size: header_len + len,
                    max: max_frame_bytes,
                });
            }
            let mut payload = vec![0u8; len];
            reader.read_exact(&mut payload).await?;
            if !msg.attach_payload(Bytes::from(payload)) {
                let kind = serde_json::to_value(&msg)
                    .ok()
                    .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_string))
                    .unwrap_or_else(|| "unknown".to_string());
                return Err(TransportError::UnexpectedPayload(kind));
            }
        }
        other => return Err(TransportError::InvalidPayloadFlag(other)),
    }

    Ok(Some(msg))
}

/// Wrap a byte stream as the client side of the bridge.
pub fn client_endpoint<IO>(io: IO, config: &TransportConfig) -> ClientEndpoint
where
    IO: AsyncRead + AsyncWrite + Send + 'static,
{
    spawn_endpoint::<ClientMessage, HostMessage, IO>(io, config)
}

/// Wrap a byte stream as the host side of the bridge.
pub fn host_endpoint<IO>(io: IO, config: &TransportConfig) -> HostEndpoint
where
    IO: AsyncRead + AsyncWrite + Send + 'static,
{
    spawn_endpoint::<HostMessage, ClientMessage, IO>(io, config)
}

fn spawn_endpoint<Out, In, IO>(io: IO, config: &TransportConfig) -> Endpoint<Out, In>
where
    Out: WireMessage,
    In: WireMessage,
    IO: AsyncRead + AsyncWrite + Send + 'static,
{
    let capacity = config.channel_capacity.max(1);
    let max_frame_bytes = config.max_frame_bytes;
    let (read_half, write_half) = tokio::io::split(io);
    let (out_tx, out_rx) = mpsc::channel::<Out>(capacity);
    let (in_tx, in_rx) = mpsc::channel::<In>(capacity);

    tokio::spawn(read_loop(BufReader::new(read_half), in_tx, max_frame_bytes));
    tokio::spawn(write_loop(BufWriter::new(write_half), out_rx, max_frame_bytes));

    Endpoint {
        outbound: out_tx,
        inbound: in_rx,
        max_frame_bytes: Some(max_frame_bytes),
    }
}

async fn read_loop<R, M>(mut reader: R, inbound: mpsc::Sender<M>, max_frame_bytes: usize)
where
    R: AsyncRead + Unpin,
    M: WireMessage,
{
    loop {
        match read_frame::<_, M>(&mut reader, max_frame_bytes).await {
            Ok(Some(msg)) => {
                if inbound.send(msg).await.is_err() {
                    tracing::debug!("Inbound queue dropped, stopping frame reader");
                    break;
                }
            }
            Ok(None) => {
                tracing::debug!("Peer closed the stream");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Frame read failed, closing channel");
                break;
            }
        }
    }
}

async fn write_loop<W, M>(mut writer: W, mut outbound: mpsc::Receiver<M>, max_frame_bytes: usize)
where
    W: AsyncWrite + Unpin,
    M: WireMessage,
{
    while let Some(mut msg) = outbound.recv().await {
        match frame_len(&msg) {
            Ok(size) if size > max_frame_bytes => match msg.oversized(size, max_frame_bytes) {
                Some(stand_in) => {
                    tracing::warn!(size, max = max_frame_bytes, "Outbound message too large, sending error instead");
                    msg = stand_in;
                }
                None => {
                    tracing::warn!(size, max = max_frame_bytes, "Outbound message too large, dropped");
                    continue;
                }
            },
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "Frame header encoding failed, closing channel");
                break;
            }
        }
        if let Err(e) = write_frame(&mut writer, msg, max_frame_bytes).await {
            tracing::error!(error = %e, "Frame write failed, closing channel");
            break;
        }
    }
    let _ = writer.shutdown().await;
}
