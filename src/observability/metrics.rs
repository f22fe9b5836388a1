//! Traffic statistics and metrics exposition.
//!
//! # Responsibilities
//! - Count requests, responses (by status), connections, auth outcomes, bytes
//! - Render the textual snapshot served by the admin `RETRSTATS` command
//! - Mirror every counter to the `metrics` facade for Prometheus scraping
//!
//! # Metrics
//! - `pop3_proxy_requests_total` (counter): client command lines
//! - `pop3_proxy_responses_total{code}` (counter): upstream status lines
//! - `pop3_proxy_connections_total` (counter): accepted client connections
//! - `pop3_proxy_auth_total{outcome}` (counter): password exchanges
//! - `pop3_proxy_bytes_total{direction}` (counter): bytes queued per direction

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics_exporter_prometheus::PrometheusBuilder;

/// Outcome class of a reply line or authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    Err,
}

impl StatusCode {
    fn label(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Err => "ERR",
        }
    }
}

#[derive(Debug, Default)]
struct Traffic {
    count: AtomicU64,
    bytes: AtomicU64,
}

#[derive(Debug, Default)]
struct Histogram {
    ok: AtomicU64,
    err: AtomicU64,
}

impl Histogram {
    fn add(&self, code: StatusCode) {
        match code {
            StatusCode::Ok => self.ok.fetch_add(1, Ordering::Relaxed),
            StatusCode::Err => self.err.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn render(&self, out: &mut String) {
        let ok = self.ok.load(Ordering::Relaxed);
        let err = self.err.load(Ordering::Relaxed);
        let total = ok + err;
        for (code, n) in [(StatusCode::Ok, ok), (StatusCode::Err, err)] {
            let ratio = if total == 0 { 0.0 } else { n as f64 / total as f64 };
            out.push_str(&format!("{} {:.2}\r\n", code.label(), ratio));
        }
    }
}

/// Process-wide proxy statistics.
#[derive(Debug, Default)]
pub struct Statistics {
    requests: Traffic,
    responses: Traffic,
    connections: AtomicU64,
    codes: Histogram,
    auth: Histogram,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client command line was received.
    pub fn record_request(&self) {
        self.requests.count.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("pop3_proxy_requests_total").increment(1);
    }

    /// Bytes queued towards an upstream server.
    pub fn record_request_bytes(&self, n: usize) {
        self.requests.bytes.fetch_add(n as u64, Ordering::Relaxed);
        metrics::counter!("pop3_proxy_bytes_total", "direction" => "upstream").increment(n as u64);
    }

    /// An upstream status line was received.
    pub fn record_response(&self, code: StatusCode) {
        self.responses.count.fetch_add(1, Ordering::Relaxed);
        self.codes.add(code);
        metrics::counter!("pop3_proxy_responses_total", "code" => code.label()).increment(1);
    }

    /// Bytes queued towards a client.
    pub fn record_response_bytes(&self, n: usize) {
        self.responses.bytes.fetch_add(n as u64, Ordering::Relaxed);
        metrics::counter!("pop3_proxy_bytes_total", "direction" => "client").increment(n as u64);
    }

    pub fn record_connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("pop3_proxy_connections_total").increment(1);
    }

    pub fn record_auth(&self, code: StatusCode) {
        self.auth.add(code);
        metrics::counter!("pop3_proxy_auth_total", "outcome" => code.label()).increment(1);
    }

    pub fn requests(&self) -> u64 {
        self.requests.count.load(Ordering::Relaxed)
    }

    pub fn responses(&self) -> u64 {
        self.responses.count.load(Ordering::Relaxed)
    }

    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn auth_outcomes(&self) -> (u64, u64) {
        (self.auth.ok.load(Ordering::Relaxed), self.auth.err.load(Ordering::Relaxed))
    }

    /// The `RETRSTATS` snapshot.
    pub fn snapshot(&self) -> String {
        let req_count = self.requests.count.load(Ordering::Relaxed);
        let req_bytes = self.requests.bytes.load(Ordering::Relaxed);
        let res_count = self.responses.count.load(Ordering::Relaxed);
        let res_bytes = self.responses.bytes.load(Ordering::Relaxed);

        let mut out = String::from("STATSSTART\r\n");
        out.push_str(&format!(
            "Totals: {} {} {}\r\n",
            req_count + res_count,
            req_bytes + res_bytes,
            self.connections()
        ));
        out.push_str(&format!("Requests: {} {}\r\n", req_count, req_bytes));
        out.push_str(&format!("Responses: {} {}\r\n", res_count, res_bytes));
        out.push_str("StatusCodes Histogram:\r\n");
        self.codes.render(&mut out);
        out.push_str("Un/Authenticated connections Histogram:\r\n");
        self.auth.render(&mut out);
        out.push_str("STATSEND\r\n");
        out
    }
}

/// Install the Prometheus exporter. Must run inside the tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot() {
        let stats = Statistics::new();
        let snapshot = stats.snapshot();
        assert!(snapshot.starts_with("STATSSTART\r\n"));
        assert!(snapshot.contains("Totals: 0 0 0\r\n"));
        assert!(snapshot.contains("OK 0.00\r\n"));
        assert!(snapshot.ends_with("STATSEND\r\n"));
    }

    #[test]
    fn snapshot_reflects_counters() {
        let stats = Statistics::new();
        stats.record_connection();
        stats.record_request();
        stats.record_request();
        stats.record_request_bytes(12);
        stats.record_response(StatusCode::Ok);
        stats.record_response(StatusCode::Ok);
        stats.record_response(StatusCode::Ok);
        stats.record_response(StatusCode::Err);
        stats.record_response_bytes(30);
        stats.record_auth(StatusCode::Err);

        let snapshot = stats.snapshot();
        assert!(snapshot.contains("Totals: 6 42 1\r\n"), "{}", snapshot);
        assert!(snapshot.contains("Requests: 2 12\r\n"));
        assert!(snapshot.contains("Responses: 4 30\r\n"));
        assert!(snapshot.contains("StatusCodes Histogram:\r\nOK 0.75\r\nERR 0.25\r\n"));
        assert!(snapshot.contains("Un/Authenticated connections Histogram:\r\nOK 0.00\r\nERR 1.00\r\n"));
        assert_eq!(stats.auth_outcomes(), (0, 1));
    }
}
