//! A throwaway HTTP/1.1 fixture server for driving real `curl`/socket
//! traffic through [`crate::http_client`] and [`crate::transfer`] without
//! reaching out to the network. Serves one fixed body per instance, and
//! can be configured to misbehave the way a real origin sometimes does:
//! reject HEAD, ignore Range, or advertise ranges it doesn't honor.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RangeServerOptions {
    /// If false, HEAD returns 405 (simulates servers that block HEAD).
    pub head_allowed: bool,
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// If false, omit `Accept-Ranges: bytes` even when ranges otherwise work.
    pub advertise_ranges: bool,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            head_allowed: true,
            support_ranges: true,
            advertise_ranges: true,
        }
    }
}

/// Starts a fixture server on a background thread, returning its base URL
/// (e.g. `"http://127.0.0.1:12345/"`). Runs for the life of the process.
pub fn start(body: Vec<u8>) -> String {
    start_with_options(body, RangeServerOptions::default())
}

/// Like [`start`], with server misbehavior toggles.
pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind fixture listener");
    let port = listener.local_addr().unwrap().port();
    let fixture = Arc::new(Fixture { body, opts });

    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let fixture = Arc::clone(&fixture);
            thread::spawn(move || fixture.serve(stream));
        }
    });

    format!("http://127.0.0.1:{port}/")
}

struct Fixture {
    body: Vec<u8>,
    opts: RangeServerOptions,
}

impl Fixture {
    fn serve(&self, mut stream: TcpStream) {
        let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
        let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));

        let mut buf = [0u8; 8192];
        let n = match stream.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        let Ok(request) = std::str::from_utf8(&buf[..n]) else {
            return;
        };
        let (method, range) = parse_request_line(request);

        match method {
            m if m.eq_ignore_ascii_case("HEAD") => self.respond_head(&mut stream),
            m if m.eq_ignore_ascii_case("GET") => self.respond_get(&mut stream, range),
            _ => {
                let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\n\r\n");
            }
        }
    }

    fn accept_ranges_header(&self) -> &'static str {
        if self.opts.advertise_ranges && self.opts.support_ranges {
            "Accept-Ranges: bytes\r\n"
        } else {
            ""
        }
    }

    fn respond_head(&self, stream: &mut TcpStream) {
        if !self.opts.head_allowed {
            let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\n\r\n");
            return;
        }
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}\r\n",
            self.body.len(),
            self.accept_ranges_header()
        );
        let _ = stream.write_all(response.as_bytes());
    }

    fn respond_get(&self, stream: &mut TcpStream, range: Option<(u64, u64)>) {
        let total = self.body.len() as u64;
        let (status, content_range, slice) = match range.filter(|_| self.opts.support_ranges) {
            Some((start, end_incl)) => self.slice_for_range(start, end_incl, total),
            None => (
                "200 OK",
                format!("bytes 0-{}/{}", total.saturating_sub(1), total),
                self.body.as_slice(),
            ),
        };

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nContent-Range: {}\r\n{}\r\n",
            status,
            slice.len(),
            content_range,
            self.accept_ranges_header()
        );
        let _ = stream.write_all(response.as_bytes());
        let _ = stream.write_all(slice);
    }

    fn slice_for_range(&self, start: u64, end_incl: u64, total: u64) -> (&'static str, String, &[u8]) {
        let start = start.min(total);
        let end_incl = end_incl.min(total.saturating_sub(1));
        if start > end_incl {
            return ("416 Range Not Satisfiable", format!("bytes */{total}"), &self.body[0..0]);
        }
        let start = start as usize;
        let end_excl = ((end_incl + 1).min(total)) as usize;
        let slice = self.body.get(start..end_excl).unwrap_or(&self.body[0..0]);
        (
            "206 Partial Content",
            format!("bytes {}-{}/{}", start, end_excl.saturating_sub(1), total),
            slice,
        )
    }
}

/// Extracts the request method and an optional inclusive `Range: bytes=A-B`
/// pair from a raw HTTP/1.1 request's header block.
fn parse_request_line(request: &str) -> (&str, Option<(u64, u64)>) {
    let mut lines = request.lines();
    let method = lines
        .next()
        .and_then(|line| line.split_whitespace().next())
        .unwrap_or("");

    let range = lines
        .take_while(|line| !line.trim().is_empty())
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if !name.trim().eq_ignore_ascii_case("range") {
                return None;
            }
            let value = value.trim();
            if !value.get(..6)?.eq_ignore_ascii_case("bytes=") {
                return None;
            }
            let (a, b) = value[6..].trim().split_once('-')?;
            let start = a.trim().parse::<u64>().unwrap_or(0);
            let end_incl = b.trim().parse::<u64>().unwrap_or(u64::MAX);
            Some((start, end_incl))
        });

    (method, range)
}
