//! Response capture: a writer seam and a mirroring wrapper.
//!
//! [`CaptureWriter`] wraps any [`ResponseWriter`] and copies every byte
//! into an internal buffer before forwarding it unchanged, so the bytes
//! the client receives and the bytes the event records are the same
//! sequence by construction. Optional transport capabilities (connection
//! hijacking, server push, close notification) pass through to the
//! underlying writer so protocol upgrades and unrelated middleware keep
//! working as if the wrapper were absent.

use std::io;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;

/// Raw byte stream handed over by a hijacked connection.
pub trait RawStream: AsyncRead + AsyncWrite + Send {}

impl<T: AsyncRead + AsyncWrite + Send> RawStream for T {}

/// Optional capability: take over the underlying connection.
pub trait Hijack {
    /// Detach the raw connection from the HTTP machinery.
    fn hijack(&mut self) -> io::Result<Pin<Box<dyn RawStream>>>;
}

/// Optional capability: initiate a server push for a related resource.
pub trait Push {
    /// Push `path` with the given synthetic request headers.
    fn push(&mut self, path: &str, headers: &HeaderMap) -> io::Result<()>;
}

/// Optional capability: observe client disconnects.
pub trait CloseNotify {
    /// Receiver that flips to `true` when the client goes away.
    fn close_notify(&mut self) -> watch::Receiver<bool>;
}

/// Core response writer interface.
///
/// Models the capability set of a server response: status and body writes,
/// flushing, and written-state reporting, plus probes for the optional
/// capabilities a given transport may support. Probes default to `None`;
/// writers only override what they can actually do.
pub trait ResponseWriter {
    /// Record the status code to send. Ignored by implementations once
    /// headers are on the wire.
    fn write_status(&mut self, status: StatusCode);

    /// Write body bytes, returning how many were accepted.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Write a string through the same path as byte writes.
    fn write_str(&mut self, data: &str) -> io::Result<usize> {
        self.write(data.as_bytes())
    }

    /// Flush buffered output toward the client.
    fn flush(&mut self) -> io::Result<()>;

    /// The status that has been, or will be, sent.
    fn status(&self) -> StatusCode;

    /// Bytes written so far; `None` until the response has started.
    fn bytes_written(&self) -> Option<usize>;

    /// Whether the response (headers or body) has started.
    fn written(&self) -> bool {
        self.bytes_written().is_some()
    }

    /// Probe for connection hijacking support.
    fn as_hijack(&mut self) -> Option<&mut dyn Hijack> {
        None
    }

    /// Probe for server push support.
    fn as_push(&mut self) -> Option<&mut dyn Push> {
        None
    }

    /// Probe for close notification support.
    fn as_close_notify(&mut self) -> Option<&mut dyn CloseNotify> {
        None
    }
}

/// The frozen output of a completed capture: final status plus the exact
/// bytes mirrored from the body writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedResponse {
    /// Final status code.
    pub status: StatusCode,
    /// Accumulated body bytes.
    pub body: Bytes,
}

/// Wraps a [`ResponseWriter`], mirroring every write into a capture buffer
/// while forwarding the identical bytes to the underlying writer.
///
/// Status defaults to 200 and stays mutable until the first byte goes out;
/// a later rewrite attempt logs a warning and is a no-op, never a panic
/// or a corruption of the underlying writer's state.
pub struct CaptureWriter<W> {
    inner: W,
    body: BytesMut,
    status: StatusCode,
    size: Option<usize>,
}

impl<W: ResponseWriter> CaptureWriter<W> {
    /// Wrap a writer with an empty capture buffer and default 200 status.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            body: BytesMut::new(),
            status: StatusCode::OK,
            size: None,
        }
    }

    /// The bytes captured so far.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Borrow the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Freeze the capture and hand back the underlying writer.
    pub fn finish(self) -> (CapturedResponse, W) {
        (
            CapturedResponse {
                status: self.status,
                body: self.body.freeze(),
            },
            self.inner,
        )
    }

    /// Send the current status downstream if the response has not started.
    fn write_headers_now(&mut self) {
        if self.size.is_none() {
            self.size = Some(0);
            self.inner.write_status(self.status);
        }
    }
}

impl<W: ResponseWriter> ResponseWriter for CaptureWriter<W> {
    fn write_status(&mut self, status: StatusCode) {
        if self.status == status {
            return;
        }
        if self.written() {
            tracing::warn!(
                current = self.status.as_u16(),
                requested = status.as_u16(),
                "headers already written, ignoring status override"
            );
            return;
        }
        self.status = status;
        self.inner.write_status(status);
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.write_headers_now();
        self.body.extend_from_slice(data);
        let n = self.inner.write(data)?;
        if let Some(size) = self.size.as_mut() {
            *size += n;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.write_headers_now();
        self.inner.flush()?;
        if !self.body.is_empty() {
            tracing::debug!(
                buffered = self.body.len(),
                "flushed with captured response body buffered"
            );
        }
        Ok(())
    }

    fn status(&self) -> StatusCode {
        self.status
    }

    fn bytes_written(&self) -> Option<usize> {
        self.size
    }

    fn as_hijack(&mut self) -> Option<&mut dyn Hijack> {
        if self.inner.as_hijack().is_some() {
            Some(self)
        } else {
            None
        }
    }

    fn as_push(&mut self) -> Option<&mut dyn Push> {
        self.inner.as_push()
    }

    fn as_close_notify(&mut self) -> Option<&mut dyn CloseNotify> {
        self.inner.as_close_notify()
    }
}

impl<W: ResponseWriter> Hijack for CaptureWriter<W> {
    fn hijack(&mut self) -> io::Result<Pin<Box<dyn RawStream>>> {
        // Hijacking counts as starting the response.
        if self.size.is_none() {
            self.size = Some(0);
        }
        match self.inner.as_hijack() {
            Some(hijack) => hijack.hijack(),
            None => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "underlying writer does not support hijacking",
            )),
        }
    }
}

/// In-memory writer that records status and body for reassembly into an
/// outgoing response. This is the production writer the middleware drives
/// once the handler's response body has been collected.
#[derive(Debug, Default)]
pub struct BufferedWriter {
    status: Option<StatusCode>,
    buf: BytesMut,
}

impl BufferedWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the writer, yielding the forwarded body bytes.
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

impl ResponseWriter for BufferedWriter {
    fn write_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    fn bytes_written(&self) -> Option<usize> {
        self.status.map(|_| self.buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Writer that records forwarded calls and optionally supports
    /// hijacking and close notification.
    #[derive(Default)]
    struct FakeWriter {
        statuses: Vec<StatusCode>,
        data: Vec<u8>,
        flushes: usize,
        hijackable: bool,
        hijacked: bool,
        close_tx: Option<watch::Sender<bool>>,
    }

    impl ResponseWriter for FakeWriter {
        fn write_status(&mut self, status: StatusCode) {
            self.statuses.push(status);
        }

        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.data.extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushes += 1;
            Ok(())
        }

        fn status(&self) -> StatusCode {
            self.statuses.last().copied().unwrap_or(StatusCode::OK)
        }

        fn bytes_written(&self) -> Option<usize> {
            if self.statuses.is_empty() {
                None
            } else {
                Some(self.data.len())
            }
        }

        fn as_hijack(&mut self) -> Option<&mut dyn Hijack> {
            if self.hijackable {
                Some(self)
            } else {
                None
            }
        }

        fn as_close_notify(&mut self) -> Option<&mut dyn CloseNotify> {
            if self.close_tx.is_some() {
                Some(self)
            } else {
                None
            }
        }
    }

    impl Hijack for FakeWriter {
        fn hijack(&mut self) -> io::Result<Pin<Box<dyn RawStream>>> {
            self.hijacked = true;
            let (local, _remote) = tokio::io::duplex(64);
            Ok(Box::pin(local))
        }
    }

    impl CloseNotify for FakeWriter {
        fn close_notify(&mut self) -> watch::Receiver<bool> {
            match &self.close_tx {
                Some(tx) => tx.subscribe(),
                None => watch::channel(false).1,
            }
        }
    }

    #[test]
    fn test_writes_mirror_to_buffer_and_inner() {
        let mut writer = CaptureWriter::new(FakeWriter::default());
        writer.write(b"hello ").unwrap();
        writer.write_str("world").unwrap();

        let (captured, inner) = writer.finish();
        assert_eq!(&captured.body[..], b"hello world");
        assert_eq!(inner.data, b"hello world");
        assert_eq!(captured.status, StatusCode::OK);
    }

    #[test]
    fn test_first_write_sends_current_status() {
        let mut writer = CaptureWriter::new(FakeWriter::default());
        writer.write_status(StatusCode::CREATED);
        assert!(!writer.written());

        writer.write(b"x").unwrap();
        assert!(writer.written());
        assert_eq!(writer.bytes_written(), Some(1));

        let (captured, inner) = writer.finish();
        assert_eq!(captured.status, StatusCode::CREATED);
        // Status forwarded on the explicit set and again when headers went
        // out; the underlying writer's last word is what counts.
        assert_eq!(inner.status(), StatusCode::CREATED);
    }

    #[test]
    fn test_status_change_after_write_is_noop() {
        let mut writer = CaptureWriter::new(FakeWriter::default());
        writer.write_status(StatusCode::CREATED);
        writer.write(b"body").unwrap();

        writer.write_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(writer.status(), StatusCode::CREATED);

        let (captured, inner) = writer.finish();
        assert_eq!(captured.status, StatusCode::CREATED);
        assert_eq!(inner.status(), StatusCode::CREATED);
    }

    #[test]
    fn test_setting_same_status_is_noop() {
        let mut writer = CaptureWriter::new(FakeWriter::default());
        writer.write_status(StatusCode::OK);
        assert!(!writer.written());
        let (_, inner) = writer.finish();
        assert!(inner.statuses.is_empty());
    }

    #[test]
    fn test_flush_forces_headers_and_keeps_buffer() {
        let mut writer = CaptureWriter::new(FakeWriter::default());
        writer.write(b"partial").unwrap();
        writer.flush().unwrap();

        assert!(writer.written());
        assert_eq!(writer.body(), b"partial");

        let (captured, inner) = writer.finish();
        assert_eq!(inner.flushes, 1);
        assert_eq!(&captured.body[..], b"partial");
    }

    #[test]
    fn test_hijack_passes_through_and_marks_started() {
        let mut writer = CaptureWriter::new(FakeWriter {
            hijackable: true,
            ..FakeWriter::default()
        });
        let hijack = writer.as_hijack().expect("inner supports hijack");
        let _stream = hijack.hijack().unwrap();

        assert!(writer.written());
        assert_eq!(writer.bytes_written(), Some(0));
        let (_, inner) = writer.finish();
        assert!(inner.hijacked);
    }

    #[test]
    fn test_capabilities_absent_when_inner_lacks_them() {
        let mut writer = CaptureWriter::new(FakeWriter::default());
        assert!(writer.as_hijack().is_none());
        assert!(writer.as_push().is_none());
        assert!(writer.as_close_notify().is_none());
    }

    #[test]
    fn test_close_notify_delegates() {
        let (tx, _rx) = watch::channel(false);
        let mut writer = CaptureWriter::new(FakeWriter {
            close_tx: Some(tx),
            ..FakeWriter::default()
        });
        let mut rx = writer
            .as_close_notify()
            .expect("inner supports close notify")
            .close_notify();
        assert!(!*rx.borrow_and_update());
    }

    #[test]
    fn test_buffered_writer_round_trip() {
        let mut writer = CaptureWriter::new(BufferedWriter::new());
        writer.write_status(StatusCode::ACCEPTED);
        writer.write(b"abc").unwrap();
        writer.write(b"def").unwrap();

        let (captured, inner) = writer.finish();
        assert_eq!(captured.status, StatusCode::ACCEPTED);
        assert_eq!(&captured.body[..], b"abcdef");
        assert_eq!(&inner.into_bytes()[..], b"abcdef");
    }

    proptest! {
        // For any interleaving of writes, the bytes visible to the real
        // writer equal the captured bytes, byte for byte and in order.
        #[test]
        fn prop_capture_mirrors_forwarded_bytes(
            chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..16),
            flush_every in 1usize..4,
        ) {
            let mut writer = CaptureWriter::new(FakeWriter::default());
            let mut expected = Vec::new();
            for (i, chunk) in chunks.iter().enumerate() {
                writer.write(chunk).unwrap();
                expected.extend_from_slice(chunk);
                if i % flush_every == 0 {
                    writer.flush().unwrap();
                }
            }
            let (captured, inner) = writer.finish();
            prop_assert_eq!(&captured.body[..], &expected[..]);
            prop_assert_eq!(&inner.data[..], &expected[..]);
        }
    }
}
