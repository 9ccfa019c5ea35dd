//! Minimal HTTP/1.1 mirror for integration tests.
//!
//! Serves a fixed set of files by path, honours `Range: bytes=N-` with 206
//! (or 416 past the end), and records every request. Options simulate broken
//! mirrors: a forced status, ignored ranges, or a first response that stalls
//! after some bytes until the client hangs up.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    /// Answer every request with this status and an empty body.
    pub force_status: Option<u16>,
    /// Ignore `Range` and always send 200 with the full body.
    pub ignore_ranges: bool,
    /// The first GET sends this many body bytes, then goes silent.
    pub stall_first_after: Option<usize>,
}

/// One received request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub path: String,
    pub range: Option<String>,
    pub user_agent: Option<String>,
}

pub struct MirrorServer {
    /// Base URL without trailing slash, e.g. `http://127.0.0.1:12345`.
    pub base: String,
    log: Arc<Mutex<Vec<Request>>>,
}

impl MirrorServer {
    pub fn requests(&self) -> Vec<Request> {
        self.log.lock().unwrap().clone()
    }

    pub fn requests_for(&self, path: &str) -> Vec<Request> {
        self.requests().into_iter().filter(|r| r.path == path).collect()
    }
}

/// Serve `files` (url path without leading slash → body) until the process exits.
pub fn start(files: Vec<(&str, Vec<u8>)>, opts: ServerOptions) -> MirrorServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let files: Arc<HashMap<String, Vec<u8>>> =
        Arc::new(files.into_iter().map(|(p, b)| (p.to_string(), b)).collect());
    let log = Arc::new(Mutex::new(Vec::new()));
    let stall_pending = Arc::new(AtomicBool::new(opts.stall_first_after.is_some()));
    let opts = Arc::new(opts);

    let server_log = Arc::clone(&log);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let files = Arc::clone(&files);
            let log = Arc::clone(&server_log);
            let opts = Arc::clone(&opts);
            let stall_pending = Arc::clone(&stall_pending);
            thread::spawn(move || handle(stream, &files, &log, &opts, &stall_pending));
        }
    });
    MirrorServer {
        base: format!("http://127.0.0.1:{}", port),
        log,
    }
}

fn handle(
    mut stream: TcpStream,
    files: &HashMap<String, Vec<u8>>,
    log: &Mutex<Vec<Request>>,
    opts: &ServerOptions,
    stall_pending: &AtomicBool,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(10)));
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    let Ok(text) = std::str::from_utf8(&buf) else {
        return;
    };
    let request = parse_request(text);
    log.lock().unwrap().push(request.clone());

    if let Some(code) = opts.force_status {
        let _ = write!(
            stream,
            "HTTP/1.1 {} Forced\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            code
        );
        return;
    }
    let Some(body) = files.get(&request.path) else {
        let _ = stream.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        return;
    };
    let total = body.len();
    let start = if opts.ignore_ranges {
        None
    } else {
        request.range.as_deref().and_then(range_start)
    };

    let (head, slice) = match start {
        Some(s) if s >= total => {
            let _ = write!(
                stream,
                "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                total
            );
            return;
        }
        Some(s) => (
            format!(
                "HTTP/1.1 206 Partial Content\r\nContent-Range: bytes {}-{}/{}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                s,
                total - 1,
                total,
                total - s
            ),
            &body[s..],
        ),
        None => (
            format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nAccept-Ranges: bytes\r\nConnection: close\r\n\r\n",
                total
            ),
            &body[..],
        ),
    };
    if stream.write_all(head.as_bytes()).is_err() {
        return;
    }

    let stall_at = match opts.stall_first_after {
        Some(n) if stall_pending.swap(false, Ordering::SeqCst) => Some(n.min(slice.len())),
        _ => None,
    };
    match stall_at {
        Some(n) => {
            let _ = stream.write_all(&slice[..n]);
            let _ = stream.flush();
            hold_until_closed(&mut stream, Duration::from_secs(20));
        }
        None => {
            let _ = stream.write_all(slice);
        }
    }
}

/// Keep the connection open without sending anything until the peer closes it.
fn hold_until_closed(stream: &mut TcpStream, limit: Duration) {
    let _ = stream.set_read_timeout(Some(Duration::from_millis(50)));
    let deadline = Instant::now() + limit;
    let mut sink = [0u8; 512];
    while Instant::now() < deadline {
        match stream.read(&mut sink) {
            Ok(0) => return,
            Ok(_) => {}
            Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {}
            Err(_) => return,
        }
    }
}

fn parse_request(text: &str) -> Request {
    let mut lines = text.lines();
    let path = lines
        .next()
        .and_then(|l| l.split_whitespace().nth(1))
        .unwrap_or("/")
        .trim_start_matches('/')
        .to_string();
    let mut range = None;
    let mut user_agent = None;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                range = Some(value.trim().to_string());
            } else if name.trim().eq_ignore_ascii_case("user-agent") {
                user_agent = Some(value.trim().to_string());
            }
        }
    }
    Request {
        path,
        range,
        user_agent,
    }
}

/// Start offset of `bytes=N-`.
fn range_start(value: &str) -> Option<usize> {
    let spec = value.trim().strip_prefix("bytes=")?;
    let (start, _) = spec.split_once('-')?;
    start.trim().parse().ok()
}
