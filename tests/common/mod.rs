//! Shared fixtures: a scripted transport, a recording registry, and local
//! HTTP stubs for exercising the real `reqwest` clients.

#![allow(dead_code)]

use async_trait::async_trait;
use dpiscope_core::{
    ProbeError, ProbeTarget, RegistryError, Revision, RevisionSource, SchemaRegistry,
    SchemaSnapshot, StaticRegistry,
};
use dpiscope_transport::{ProbeRequest, ProbeTransport, RequestKind};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// How a scripted host answers one kind of request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Status(u16),
    /// Never answers; the caller's timer always wins.
    Hang,
    Refused,
    Panic,
}

#[derive(Debug, Clone, Copy)]
pub struct HostScript {
    pub head: Reply,
    pub post: Reply,
    pub get: Reply,
}

impl HostScript {
    pub fn new(head: Reply, post: Reply, get: Reply) -> Self {
        Self { head, post, get }
    }

    fn reply(&self, kind: RequestKind) -> Reply {
        match kind {
            RequestKind::Head => self.head,
            RequestKind::Post => self.post,
            RequestKind::Get => self.get,
        }
    }
}

/// Transport that answers from a per-host script and counts every call.
/// Unscripted hosts answer 200 to everything.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: HashMap<String, HostScript>,
    calls: Mutex<HashMap<(String, RequestKind), usize>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: &str, head: Reply, post: Reply, get: Reply) -> Self {
        self.scripts.insert(host.to_string(), HostScript::new(head, post, get));
        self
    }

    pub fn calls(&self, host: &str, kind: RequestKind) -> usize {
        let calls = self.calls.lock().unwrap();
        calls.get(&(host.to_string(), kind)).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl ProbeTransport for ScriptedTransport {
    async fn send(&self, host: &str, request: ProbeRequest) -> Result<u16, ProbeError> {
        let kind = request.kind();
        {
            let mut calls = self.calls.lock().unwrap();
            *calls.entry((host.to_string(), kind)).or_default() += 1;
        }
        let reply = self
            .scripts
            .get(host)
            .map(|s| s.reply(kind))
            .unwrap_or(Reply::Status(200));

        match reply {
            Reply::Status(code) => Ok(code),
            Reply::Refused => Err(ProbeError::Network("connection refused".to_string())),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Ok(200)
            }
            Reply::Panic => panic!("scripted panic for {}", host),
        }
    }
}

pub fn target(id: &str, host: &str) -> ProbeTarget {
    ProbeTarget::new(id, "TestNet", host, "XX")
}

/// Registry that records every revision it was asked to resolve.
pub struct RecordingRegistry {
    inner: StaticRegistry,
    requests: Mutex<Vec<Revision>>,
}

impl RecordingRegistry {
    pub fn new(snapshots: Vec<SchemaSnapshot>) -> Self {
        let mut inner = StaticRegistry::new();
        for s in snapshots {
            inner.insert(s);
        }
        Self {
            inner,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<Revision> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SchemaRegistry for RecordingRegistry {
    async fn resolve(&self, revision: &Revision) -> Result<Arc<SchemaSnapshot>, RegistryError> {
        self.requests.lock().unwrap().push(*revision);
        self.inner.resolve(revision).await
    }
}

/// Revision source whose lookup always fails.
pub struct UnreachableRevisionSource;

#[async_trait]
impl RevisionSource for UnreachableRevisionSource {
    async fn latest(&self) -> Result<Revision, RegistryError> {
        Err(RegistryError::Fetch("api.github.com unreachable".to_string()))
    }
}

/// Local HTTP/1.1 stub. Answers every request with `status`, or never answers
/// when `status` is `None`. Counts the requests it has fully read.
pub struct HttpStub {
    pub addr: SocketAddr,
    pub requests: Arc<AtomicUsize>,
}

impl HttpStub {
    pub async fn start(status: Option<u16>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = requests.clone();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let counter = counter.clone();
                tokio::spawn(async move {
                    serve(stream, status, counter).await;
                });
            }
        });

        Self { addr, requests }
    }

    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

async fn serve(mut stream: TcpStream, status: Option<u16>, counter: Arc<AtomicUsize>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];

    let head_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
    let body_len = head
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < head_end + body_len {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    counter.fetch_add(1, Ordering::SeqCst);

    match status {
        Some(code) => {
            let reply = format!(
                "HTTP/1.1 {} Stub\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                code
            );
            let _ = stream.write_all(reply.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
        None => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
    }
}

/// Local HTTP/1.1 stub serving fixed bodies by request target (path and
/// query). Unrouted targets answer 404. Records every target it was asked for.
pub struct RouteStub {
    pub addr: SocketAddr,
    seen: Arc<Mutex<Vec<String>>>,
}

impl RouteStub {
    pub async fn start(routes: Vec<(String, u16, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes: Arc<HashMap<String, (u16, String)>> = Arc::new(
            routes
                .into_iter()
                .map(|(path, status, body)| (path, (status, body)))
                .collect(),
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let routes = routes.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 4096];
                    while find(&buf, b"\r\n\r\n").is_none() {
                        match stream.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&buf).to_string();
                    let path = head.split_whitespace().nth(1).unwrap_or("").to_string();
                    log.lock().unwrap().push(path.clone());

                    let (status, body) = routes
                        .get(&path)
                        .cloned()
                        .unwrap_or((404, r#"{"message":"Not Found"}"#.to_string()));
                    let reply = format!(
                        "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(reply.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self { addr, seen }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// An address on which nothing listens.
pub async fn refused_host() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}
