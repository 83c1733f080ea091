//! The RTSP connection listener: a framed reader/writer over one TCP
//! connection, generalizing the teacher's `transport::tcp::Connection`
//! (which only ever read text lines via `BufReader::read_line` until a
//! blank line, because a publishing server never needs to distinguish
//! interleaved binary frames from its own signaling).
//!
//! A client connection carries three kinds of message on the same byte
//! stream (RFC 2326 §10.12):
//!
//! - Text responses to requests this client sent.
//! - Interleaved (`$`) binary RTP/RTCP frames, when transport is TCP-
//!   interleaved rather than UDP.
//!
//! This client never receives RTSP *requests* (it's never a server on this
//! connection), so [`RtspMessage::Request`] is never produced here.
//!
//! Responses are correlated to the request that triggered them by CSeq
//! (RFC 2326 §12.17): [`Listener::request`] assigns the CSeq, registers a
//! one-shot channel keyed by it, and blocks until the reader thread
//! delivers the matching response or the read side closes.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{ParseErrorKind, RtspError};
use crate::protocol::{DataFrame, RtspMessage, RtspRequest, RtspResponse};
use crate::Result;

const INTERLEAVED_MARKER: u8 = b'$';

/// A live RTSP connection. Cheap to clone (shares an `Arc` internally);
/// typically held as `Arc<Listener>` since both the client state machine
/// and the reader thread need a handle.
pub struct Listener {
    writer: Mutex<TcpStream>,
    next_cseq: AtomicU32,
    pending: Mutex<HashMap<u32, mpsc::Sender<RtspResponse>>>,
    data_tx: mpsc::Sender<DataFrame>,
    io_timeout: Duration,
}

impl Listener {
    /// Take ownership of a connected [`TcpStream`] and start its reader
    /// thread. Returns the listener handle plus a channel the caller reads
    /// interleaved data frames from.
    pub fn spawn(stream: TcpStream, io_timeout: Duration) -> Result<(Arc<Listener>, mpsc::Receiver<DataFrame>)> {
        let reader_stream = stream.try_clone()?;
        let (data_tx, data_rx) = mpsc::channel();

        let listener = Arc::new(Listener {
            writer: Mutex::new(stream),
            next_cseq: AtomicU32::new(1),
            pending: Mutex::new(HashMap::new()),
            data_tx,
            io_timeout,
        });

        let reader_listener = listener.clone();
        thread::spawn(move || reader_listener.read_loop(reader_stream));

        Ok((listener, data_rx))
    }

    /// Send a request, assigning its CSeq, and block for the matching
    /// response. `purpose` is only used by the caller's bookkeeping; the
    /// listener itself treats every request identically.
    pub fn request(&self, mut req: RtspRequest) -> Result<RtspResponse> {
        let cseq = self.next_cseq.fetch_add(1, Ordering::SeqCst);
        req.cseq = cseq;

        let (tx, rx) = mpsc::channel();
        self.pending.lock().insert(cseq, tx);

        let bytes = req.serialize();
        {
            let mut w = self.writer.lock();
            if let Err(e) = w.write_all(&bytes).and_then(|_| w.flush()) {
                self.pending.lock().remove(&cseq);
                return Err(RtspError::Io(e));
            }
        }

        tracing::debug!(cseq, method = %req.method, uri = req.request_uri_str(), "sent RTSP request");

        match rx.recv_timeout(self.io_timeout) {
            Ok(resp) => Ok(resp),
            Err(_) => {
                self.pending.lock().remove(&cseq);
                Err(RtspError::Timeout(format!("response to CSeq {cseq}")))
            }
        }
    }

    /// Write one interleaved data frame (RFC 2326 §10.12): `$ channel
    /// len(u16) payload`.
    pub fn send_data(&self, channel: u8, payload: &[u8]) -> Result<()> {
        if payload.len() > u16::MAX as usize {
            return Err(RtspError::ProtocolViolation(
                "interleaved frame payload exceeds 65535 bytes".into(),
            ));
        }
        let mut w = self.writer.lock();
        w.write_all(&[INTERLEAVED_MARKER, channel])?;
        w.write_all(&(payload.len() as u16).to_be_bytes())?;
        w.write_all(payload)?;
        w.flush()?;
        Ok(())
    }

    fn read_loop(self: Arc<Self>, stream: TcpStream) {
        let mut reader = BufReader::new(stream);
        loop {
            match read_message(&mut reader) {
                Ok(RtspMessage::Response(resp)) => self.dispatch_response(resp),
                Ok(RtspMessage::Data(frame)) => {
                    if self.data_tx.send(frame).is_err() {
                        break;
                    }
                }
                Ok(RtspMessage::Request(_)) => {
                    tracing::warn!("ignoring unexpected inbound RTSP request on client connection");
                }
                Err(e) => {
                    tracing::debug!(error = %e, "RTSP listener read loop exiting");
                    break;
                }
            }
        }
        self.fail_all_pending();
    }

    fn dispatch_response(&self, resp: RtspResponse) {
        match self.pending.lock().remove(&resp.cseq) {
            Some(tx) => {
                let _ = tx.send(resp);
            }
            None => tracing::warn!(cseq = resp.cseq, "response for unknown or already-resolved CSeq"),
        }
    }

    fn fail_all_pending(&self) {
        self.pending.lock().clear();
    }
}

/// Read one complete [`RtspMessage`] from the stream: either an
/// interleaved data frame or a text message (header block plus any
/// `Content-Length` body).
fn read_message(reader: &mut BufReader<TcpStream>) -> Result<RtspMessage> {
    use std::io::Read;

    let mut first = [0u8; 1];
    reader.read_exact(&mut first)?;

    if first[0] == INTERLEAVED_MARKER {
        let mut header = [0u8; 3];
        reader.read_exact(&mut header)?;
        let channel = header[0];
        let len = u16::from_be_bytes([header[1], header[2]]) as usize;
        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload)?;
        return Ok(RtspMessage::Data(DataFrame { channel, payload }));
    }

    let mut head_text = String::new();
    head_text.push(first[0] as char);
    reader.read_line(&mut head_text)?;
    if head_text.trim().is_empty() {
        return Err(RtspError::Parse {
            kind: ParseErrorKind::EmptyMessage,
        });
    }

    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            return Err(RtspError::Parse {
                kind: ParseErrorKind::EmptyMessage,
            });
        }
        head_text.push_str(&line);
        if line == "\r\n" || line == "\n" {
            break;
        }
    }

    let mut response = RtspResponse::parse_head(&head_text)?;

    if let Some(len_str) = response.headers.get("Content-Length") {
        let len: usize = len_str.trim().parse().map_err(|_| RtspError::Parse {
            kind: ParseErrorKind::InvalidContentLength,
        })?;
        let mut body = vec![0u8; len];
        reader.read_exact(&mut body)?;
        response.body = body;
    }

    Ok(RtspMessage::Response(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;
    use std::net::TcpListener;

    #[test]
    fn request_response_roundtrip_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let n = stream.read(&mut buf).unwrap();
            let request_text = String::from_utf8_lossy(&buf[..n]);
            assert!(request_text.starts_with("OPTIONS"));
            stream
                .write_all(b"RTSP/1.0 200 OK\r\nCSeq: 1\r\n\r\n")
                .unwrap();
        });

        let client_stream = TcpStream::connect(addr).unwrap();
        let (listener, _data_rx) = Listener::spawn(client_stream, Duration::from_secs(2)).unwrap();

        let req = RtspRequest::new(crate::protocol::Method::Options, None);
        let resp = listener.request(req).unwrap();
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.cseq, 1);

        server.join().unwrap();
    }

    #[test]
    fn interleaved_data_frame_delivered_on_channel() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut frame = vec![INTERLEAVED_MARKER, 0];
            frame.extend_from_slice(&3u16.to_be_bytes());
            frame.extend_from_slice(b"abc");
            stream.write_all(&frame).unwrap();
        });

        let client_stream = TcpStream::connect(addr).unwrap();
        let (_listener, data_rx) = Listener::spawn(client_stream, Duration::from_secs(2)).unwrap();

        let frame = data_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(frame.channel, 0);
        assert_eq!(frame.payload, b"abc");

        server.join().unwrap();
    }
}
