//! Fans in a dynamic set of child pipes to a single, serialized write stream.
//!
//! Concurrency here is expressed as "multiple outstanding reads, one per
//! pipe" composed with `join_all` rather than separate OS threads: each
//! session is driven by one task, and the serialization guarantee on the
//! socket comes from an async mutex around the single writer, not from
//! actual single-threaded scheduling.
use crate::codec::{encode_frame, read_chunk};
use futures_util::future::join_all;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Guarantees that at most one write to the underlying stream is in flight
/// at a time, so concurrently produced chunks interleave at whole-frame
/// granularity and never mid-frame.
pub struct SerializedWriter<W> {
    inner: Mutex<W>,
}

impl<W: AsyncWrite + Unpin> SerializedWriter<W> {
    pub fn new(inner: W) -> Self {
        SerializedWriter {
            inner: Mutex::new(inner),
        }
    }

    pub async fn write_frame(&self, name: &str, payload: &[u8]) -> std::io::Result<()> {
        let frame = encode_frame(name, payload);
        let mut guard = self.inner.lock().await;
        guard.write_all(&frame).await
    }

    pub async fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

/// One open child pipe and the frame name its chunks should be emitted under.
pub struct Labeled {
    pub reader: Box<dyn AsyncRead + Unpin + Send>,
    pub label: &'static str,
}

/// Drains every pipe in `pipes` concurrently, forwarding each non-empty
/// chunk as a framed, quoted-printable-encoded write. Returns once every
/// pipe has hit EOF (or a read error). Write failures are not fatal to the
/// drain itself — per the client-I/O-error policy, the session keeps
/// draining children even once the socket can no longer be written to.
pub async fn drain_pipes<W: AsyncWrite + Unpin>(writer: &SerializedWriter<W>, pipes: Vec<Labeled>) {
    let tasks = pipes.into_iter().map(|mut p| async move {
        loop {
            let chunk = match read_chunk(&mut p.reader).await {
                Ok(c) => c,
                Err(_) => break,
            };
            if chunk.is_empty() {
                break;
            }
            let _ = writer.write_frame(p.label, &chunk).await;
        }
    });
    join_all(tasks).await;
}
