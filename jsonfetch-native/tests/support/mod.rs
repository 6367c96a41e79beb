#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use jsonfetch_native::{FetchError, ParserRegistry, SerdeJsonParser, Value};

pub const WAIT: Duration = Duration::from_secs(10);

/// Request as seen by the stub server.
#[derive(Debug)]
pub struct Received {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Received {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

pub struct Canned {
    pub status: u16,
    pub reason: &'static str,
    pub body: Vec<u8>,
    pub delay: Duration,
}

impl Canned {
    pub fn json(status: u16, reason: &'static str, body: &str) -> Self {
        Canned {
            status,
            reason,
            body: body.as_bytes().to_vec(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// One-shot HTTP/1.1 server answering each connection with the next canned
/// response.
pub struct StubServer {
    pub addr: SocketAddr,
    pub received: mpsc::Receiver<Received>,
}

impl StubServer {
    pub fn start(responses: Vec<Canned>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            for canned in responses {
                let Ok((stream, _)) = listener.accept() else {
                    return;
                };
                if let Some(received) = serve(stream, &canned) {
                    let _ = tx.send(received);
                }
            }
        });

        StubServer { addr, received: rx }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

fn serve(mut stream: TcpStream, canned: &Canned) -> Option<Received> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    thread::sleep(canned.delay);
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        canned.status,
        canned.reason,
        canned.body.len()
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(&canned.body);
    let _ = stream.flush();

    Some(Received {
        request_line,
        headers,
        body,
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Address nothing listens on.
pub fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/items", addr)
}

pub fn json_registry() -> Arc<ParserRegistry> {
    Arc::new(ParserRegistry::with_default(Arc::new(SerdeJsonParser)))
}

#[derive(Debug)]
pub enum Event {
    Success(Arc<Value>),
    Failure(Arc<FetchError>),
}

pub fn callbacks() -> (
    impl FnOnce(Arc<Value>) + Send + 'static,
    impl FnOnce(Arc<FetchError>) + Send + 'static,
    mpsc::Receiver<Event>,
) {
    let _ = env_logger::builder().is_test(true).try_init();

    let (tx, rx) = mpsc::channel();
    let failure_tx = tx.clone();
    (
        move |value| {
            let _ = tx.send(Event::Success(value));
        },
        move |error| {
            let _ = failure_tx.send(Event::Failure(error));
        },
        rx,
    )
}
