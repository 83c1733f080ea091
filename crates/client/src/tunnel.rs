//! HTTP-tunneled RTSP transport for `http://` URLs (spec.md §6).
//!
//! Some deployments only permit outbound HTTP, so the whole RTSP exchange
//! rides over two HTTP/1.0 connections to the same path instead of one raw
//! TCP socket: a `GET` whose response body streams base64-encoded
//! server-to-client bytes, and a `POST` whose request body streams
//! base64-encoded client-to-server bytes, tied together by a shared
//! `x-sessioncookie` header so the server can pair them up. This is
//! QuickTime's original `rtsp-over-http` technique; every camera that
//! advertises an `http://` RTSP URL speaks it the same way.
//!
//! [`establish`] hides all of this below [`crate::listener::Listener`]:
//! it hands back a plain loopback [`TcpStream`], with two relay threads
//! pumping bytes to and from the real GET/POST sockets, so the listener
//! (and everything above it) never has to know the wire format underneath
//! changed.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::RtspError;
use crate::Result;

/// QuickTime's tunneling spec has the POST side declare an enormous
/// `Content-Length` so proxies treat the request as bounded while it
/// actually stays open and streams for the life of the session.
const POST_CONTENT_LENGTH: &str = "2147483647";

/// Open the GET/POST pair against `host:port`, complete the HTTP
/// handshake on both, and return a loopback [`TcpStream`] that behaves
/// like an ordinary RTSP connection to everything above it.
pub fn establish(host: &str, port: u16, path: &str, io_timeout: Duration) -> Result<TcpStream> {
    let cookie = session_cookie();
    let request_path = if path.is_empty() { "/" } else { path };

    let get_stream = TcpStream::connect((host, port))
        .map_err(|e| RtspError::TransportUnreachable(format!("HTTP tunnel GET to {host}:{port}: {e}")))?;
    get_stream.set_read_timeout(Some(io_timeout)).ok();
    write_http_request(
        &get_stream,
        &format!(
            "GET {request_path} HTTP/1.0\r\n\
             x-sessioncookie: {cookie}\r\n\
             Accept: application/x-rtsp-tunnelled\r\n\
             Pragma: no-cache\r\n\
             Cache-Control: no-cache\r\n\r\n"
        ),
    )?;
    let mut get_reader = BufReader::new(get_stream);
    read_http_ok(&mut get_reader, "GET")?;

    let post_stream = TcpStream::connect((host, port))
        .map_err(|e| RtspError::TransportUnreachable(format!("HTTP tunnel POST to {host}:{port}: {e}")))?;
    write_http_request(
        &post_stream,
        &format!(
            "POST {request_path} HTTP/1.0\r\n\
             x-sessioncookie: {cookie}\r\n\
             Content-Type: application/x-rtsp-tunnelled\r\n\
             Pragma: no-cache\r\n\
             Cache-Control: no-cache\r\n\
             Content-Length: {POST_CONTENT_LENGTH}\r\n\r\n"
        ),
    )?;

    let pipe_listener = TcpListener::bind("127.0.0.1:0")?;
    let pipe_addr = pipe_listener.local_addr()?;
    let client_side = TcpStream::connect(pipe_addr)?;
    let (server_side, _) = pipe_listener.accept()?;
    client_side.set_nodelay(true).ok();
    server_side.set_nodelay(true).ok();

    let downstream_pipe = server_side.try_clone()?;
    thread::spawn(move || pump_get_to_pipe(get_reader, downstream_pipe));
    thread::spawn(move || pump_pipe_to_post(server_side, post_stream));

    Ok(client_side)
}

fn write_http_request(mut stream: &TcpStream, request: &str) -> Result<()> {
    stream.write_all(request.as_bytes())?;
    stream.flush()?;
    Ok(())
}

fn read_http_ok(reader: &mut BufReader<TcpStream>, label: &str) -> Result<()> {
    let mut status_line = String::new();
    reader.read_line(&mut status_line)?;
    if !status_line.contains(" 200 ") {
        return Err(RtspError::TransportUnreachable(format!(
            "HTTP tunnel {label} request rejected: {}",
            status_line.trim()
        )));
    }
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }
    Ok(())
}

/// Decode base64 arriving on the GET response body and forward the raw
/// bytes to the loopback pipe, carrying any partial (non-multiple-of-4)
/// tail across reads.
fn pump_get_to_pipe(mut get: BufReader<TcpStream>, mut pipe: TcpStream) {
    let mut leftover = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = match get.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        leftover.extend(buf[..n].iter().copied().filter(|&b| b != b'\r' && b != b'\n'));
        let whole = leftover.len() - (leftover.len() % 4);
        if whole == 0 {
            continue;
        }
        match BASE64.decode(&leftover[..whole]) {
            Ok(decoded) => {
                if pipe.write_all(&decoded).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
        leftover.drain(..whole);
    }
}

/// Base64-encode bytes arriving on the loopback pipe (RTSP requests and
/// outgoing interleaved frames the client writes) and forward them on the
/// POST request body, carrying any partial (non-multiple-of-3) tail.
fn pump_pipe_to_post(mut pipe: TcpStream, mut post: TcpStream) {
    let mut leftover = Vec::new();
    let mut buf = [0u8; 768];
    loop {
        let n = match pipe.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        leftover.extend_from_slice(&buf[..n]);
        let whole = leftover.len() - (leftover.len() % 3);
        if whole == 0 {
            continue;
        }
        let encoded = BASE64.encode(&leftover[..whole]);
        if post.write_all(encoded.as_bytes()).and_then(|_| post.flush()).is_err() {
            break;
        }
        leftover.drain(..whole);
    }
}

fn session_cookie() -> String {
    use rand::Rng;
    let bytes: [u8; 8] = rand::rng().random();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener as StdTcpListener;

    /// Drives a scripted HTTP server through the full GET+POST handshake
    /// and checks that bytes written to the returned stream arrive
    /// base64-decoded on the far end, and vice versa.
    #[test]
    fn tunnel_relays_bytes_through_base64() {
        let http_listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let addr = http_listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (get_stream, _) = http_listener.accept().unwrap();
            let mut get_reader = BufReader::new(get_stream.try_clone().unwrap());
            let mut line = String::new();
            get_reader.read_line(&mut line).unwrap();
            assert!(line.starts_with("GET "));
            loop {
                let mut header = String::new();
                get_reader.read_line(&mut header).unwrap();
                if header == "\r\n" {
                    break;
                }
            }
            let mut get_writer = get_stream;
            get_writer.write_all(b"HTTP/1.0 200 OK\r\n\r\n").unwrap();

            let (post_stream, _) = http_listener.accept().unwrap();
            let mut post_reader = BufReader::new(post_stream);
            let mut line = String::new();
            post_reader.read_line(&mut line).unwrap();
            assert!(line.starts_with("POST "));
            loop {
                let mut header = String::new();
                post_reader.read_line(&mut header).unwrap();
                if header == "\r\n" {
                    break;
                }
            }

            // Server -> client: base64("hi!") with a stray newline, as a
            // real server streaming incremental chunks might emit.
            get_writer.write_all(BASE64.encode("hi!").as_bytes()).unwrap();
            get_writer.write_all(b"\n").unwrap();

            // Client -> server: read back what the tunnel forwarded.
            let mut encoded = vec![0u8; 8];
            post_reader.read_exact(&mut encoded).unwrap();
            let decoded = BASE64.decode(&encoded).unwrap();
            assert_eq!(decoded, b"bye!");
        });

        let host = addr.ip().to_string();
        let mut stream = establish(&host, addr.port(), "/stream", Duration::from_secs(2)).unwrap();

        let mut received = [0u8; 3];
        stream.read_exact(&mut received).unwrap();
        assert_eq!(&received, b"hi!");

        stream.write_all(b"bye!").unwrap();

        server.join().unwrap();
    }
}
