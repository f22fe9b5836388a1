//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use pop3_proxy::config::ProxyConfig;
use pop3_proxy::{Proxy, ProxyContext, RunningProxy};

const IO_TIMEOUT: Duration = Duration::from_secs(5);

pub const PASSWORD: &str = "secret";

/// A scripted POP3 server that records every line it receives.
pub struct MockPop3 {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicUsize>,
}

impl MockPop3 {
    /// Serve `messages` (number → stored text) to any user logging in with [`PASSWORD`].
    pub async fn start(messages: &[(u32, &str)]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let received = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let messages: Arc<HashMap<u32, String>> =
            Arc::new(messages.iter().map(|(n, text)| (*n, text.to_string())).collect());

        let (log, count) = (received.clone(), connections.clone());
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                count.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve_mock(socket, messages.clone(), log.clone()));
            }
        });

        Self {
            addr,
            received,
            connections,
        }
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

async fn serve_mock(socket: TcpStream, messages: Arc<HashMap<u32, String>>, log: Arc<Mutex<Vec<String>>>) {
    let (reader, mut writer) = socket.into_split();
    let mut lines = BufReader::new(reader).lines();
    if writer.write_all(b"+OK mock ready\r\n").await.is_err() {
        return;
    }

    while let Ok(Some(line)) = lines.next_line().await {
        log.lock().unwrap().push(line.clone());
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or_default().to_ascii_uppercase();
        let message = parts.next().and_then(|n| n.parse::<u32>().ok()).and_then(|n| messages.get(&n).map(|m| (n, m)));

        let reply = match (command.as_str(), message) {
            ("USER", _) => "+OK\r\n".to_string(),
            ("PASS", _) if line.ends_with(PASSWORD) => "+OK logged in\r\n".to_string(),
            ("PASS", _) => "-ERR invalid password\r\n".to_string(),
            ("RETR", Some((_, text))) => format!("+OK {} octets\r\n{}.\r\n", text.len(), text),
            ("DELE", Some((n, _))) => format!("+OK message {} deleted\r\n", n),
            ("RETR", None) | ("DELE", None) => "-ERR no such message\r\n".to_string(),
            ("LIST", _) if line.trim().len() == 4 => {
                let mut reply = format!("+OK {} messages\r\n", messages.len());
                let mut numbers: Vec<_> = messages.iter().collect();
                numbers.sort();
                for (n, text) in numbers {
                    reply.push_str(&format!("{} {}\r\n", n, text.len()));
                }
                reply.push_str(".\r\n");
                reply
            }
            ("QUIT", _) => "+OK bye\r\n".to_string(),
            _ => "+OK\r\n".to_string(),
        };

        if writer.write_all(reply.as_bytes()).await.is_err() || command == "QUIT" {
            break;
        }
    }
}

/// A proxy bound to ephemeral ports with a private capture directory.
pub struct TestProxy {
    pub running: RunningProxy,
    pub client_addr: SocketAddr,
    pub admin_addr: SocketAddr,
    pub context: Arc<ProxyContext>,
    _captures: tempfile::TempDir,
}

pub async fn start_proxy(upstream: SocketAddr) -> TestProxy {
    start_proxy_with(upstream, |_| {}).await
}

pub async fn start_proxy_with(upstream: SocketAddr, configure: impl FnOnce(&mut ProxyConfig)) -> TestProxy {
    let captures = tempfile::tempdir().unwrap();
    let mut config = ProxyConfig::default();
    config.listener.client_address = "127.0.0.1:0".to_string();
    config.listener.admin_address = "127.0.0.1:0".to_string();
    config.upstream.host = upstream.ip().to_string();
    config.upstream.port = upstream.port();
    config.upstream.connect_timeout_secs = 2;
    config.capture.directory = captures.path().to_string_lossy().into_owned();
    configure(&mut config);

    let running = Proxy::bind(&config).await.unwrap().run().unwrap();
    TestProxy {
        client_addr: running.client_addr,
        admin_addr: running.admin_addr,
        context: running.context().clone(),
        running,
        _captures: captures,
    }
}

/// An address nothing listens on.
pub async fn unreachable_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Line-oriented test client for both the proxy and the admin port.
pub struct LineClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl LineClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    /// Next line without its terminator, or `None` once the peer closed.
    pub async fn next(&mut self) -> Option<String> {
        tokio::time::timeout(IO_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for a line")
            .unwrap_or(None)
    }

    pub async fn line(&mut self) -> String {
        self.next().await.expect("connection closed")
    }

    pub async fn send(&mut self, line: &str) {
        self.writer.write_all(format!("{}\r\n", line).as_bytes()).await.unwrap();
    }

    /// Write bytes as-is, without a terminator.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    pub async fn command(&mut self, line: &str) -> String {
        self.send(line).await;
        self.line().await
    }

    /// Read lines up to and including `end`.
    pub async fn until(&mut self, end: &str) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let line = self.line().await;
            let done = line == end;
            lines.push(line);
            if done {
                return lines;
            }
        }
    }
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..50 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
