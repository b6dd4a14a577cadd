//! Health endpoint and usage counters.
//!
//! A minimal HTTP server on raw TCP (no framework) serving:
//! - `GET /health` → 200 with uptime, an RFC 3339 timestamp, named checks and counters
//! - `GET /ready`  → 200 when no check is down, 503 otherwise
//! - anything else → 404
//!
//! [`BotMetrics`] is updated by the query handler and logged periodically by
//! [`start_periodic_usage_flush`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::ErrorCategory;
use crate::validation::RejectReason;

// ============================================================================
// HealthStatus
// ============================================================================

/// The status of a single named health component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is operating normally.
    Ok,
    /// Component is partially degraded but still functional.
    Degraded,
    /// Component is fully unavailable.
    Down,
}

// ============================================================================
// HealthCheck
// ============================================================================

/// A named health check entry managed by [`HealthRegistry`].
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    /// Unique name for this check (`telegram`, `provider`).
    #[serde(skip)]
    pub name: String,
    /// Current status of this check.
    pub status: HealthStatus,
    /// Optional human-readable status message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthCheck {
    pub fn new(name: &str, status: HealthStatus) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: None,
        }
    }
}

// ============================================================================
// HealthRegistry
// ============================================================================

/// Registry of named component health checks.
///
/// Components register themselves at startup and update their status
/// throughout the process lifetime. The registry drives `/ready` responses.
///
/// ```
/// use psybot::health::{HealthCheck, HealthRegistry, HealthStatus};
///
/// let registry = HealthRegistry::new();
/// registry.register(HealthCheck::new("provider", HealthStatus::Ok));
/// assert!(registry.is_ready());
/// registry.update("provider", HealthStatus::Down, Some("no api key".into()));
/// assert!(!registry.is_ready());
/// ```
#[derive(Clone)]
pub struct HealthRegistry {
    checks: Arc<RwLock<BTreeMap<String, HealthCheck>>>,
    start_time: Instant,
}

impl HealthRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            checks: Arc::new(RwLock::new(BTreeMap::new())),
            start_time: Instant::now(),
        }
    }

    /// Register a new named check. Replaces any existing check with the same name.
    pub fn register(&self, check: HealthCheck) {
        self.checks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(check.name.clone(), check);
    }

    /// Update an existing check's status and message.
    ///
    /// No-op if no check with that name is registered.
    pub fn update(&self, name: &str, status: HealthStatus, message: Option<String>) {
        let mut checks = self.checks.write().unwrap_or_else(|e| e.into_inner());
        if let Some(check) = checks.get_mut(name) {
            check.status = status;
            check.message = message;
        }
    }

    /// Current status of `name`, if registered.
    pub fn status(&self, name: &str) -> Option<HealthStatus> {
        self.checks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .map(|c| c.status)
    }

    /// Returns `true` when no registered check is [`HealthStatus::Down`].
    ///
    /// An empty registry is considered ready.
    pub fn is_ready(&self) -> bool {
        self.checks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .all(|c| c.status != HealthStatus::Down)
    }

    /// Elapsed time since the registry was created (proxy for process uptime).
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    fn checks_json(&self) -> serde_json::Value {
        let checks = self.checks.read().unwrap_or_else(|e| e.into_inner());
        serde_json::to_value(&*checks).unwrap_or_else(|_| json!({}))
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// BotMetrics
// ============================================================================

/// Lock-free counters for query handling.
#[derive(Debug, Default)]
pub struct BotMetrics {
    /// Queries received (before validation).
    pub requests: AtomicU64,
    /// Queries refused by validation.
    pub rejected: AtomicU64,
    pub rejected_empty: AtomicU64,
    pub rejected_too_short: AtomicU64,
    pub rejected_too_long: AtomicU64,
    pub rejected_spam: AtomicU64,
    /// Queries refused by the rate limiter.
    pub rate_limited: AtomicU64,
    /// Completions delivered.
    pub replies: AtomicU64,
    /// Outbound chunks produced.
    pub chunks: AtomicU64,
    /// Provider failures answered with the API error message.
    pub api_errors: AtomicU64,
    /// Provider failures answered with the network error message.
    pub network_errors: AtomicU64,
    /// Other failures.
    pub unknown_errors: AtomicU64,
    /// Prompt tokens reported by providers.
    pub prompt_tokens: AtomicU64,
    /// Completion tokens reported by providers.
    pub completion_tokens: AtomicU64,
}

/// Point-in-time copy of [`BotMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub rejected: u64,
    pub rejected_empty: u64,
    pub rejected_too_short: u64,
    pub rejected_too_long: u64,
    pub rejected_spam: u64,
    pub rate_limited: u64,
    pub replies: u64,
    pub chunks: u64,
    pub api_errors: u64,
    pub network_errors: u64,
    pub unknown_errors: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl BotMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a validation refusal, both in total and per reason.
    pub fn record_rejection(&self, reason: RejectReason) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        let counter = match reason {
            RejectReason::Empty => &self.rejected_empty,
            RejectReason::TooShort => &self.rejected_too_short,
            RejectReason::TooLong => &self.rejected_too_long,
            RejectReason::SpamLike => &self.rejected_spam,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reply(&self, chunks: usize) {
        self.replies.fetch_add(1, Ordering::Relaxed);
        self.chunks.fetch_add(chunks as u64, Ordering::Relaxed);
    }

    pub fn record_error(&self, category: ErrorCategory) {
        let counter = match category {
            ErrorCategory::Api => &self.api_errors,
            ErrorCategory::Network => &self.network_errors,
            ErrorCategory::Unknown => &self.unknown_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record token usage from a completion.
    pub fn record_tokens(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            rejected_empty: self.rejected_empty.load(Ordering::Relaxed),
            rejected_too_short: self.rejected_too_short.load(Ordering::Relaxed),
            rejected_too_long: self.rejected_too_long.load(Ordering::Relaxed),
            rejected_spam: self.rejected_spam.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            replies: self.replies.load(Ordering::Relaxed),
            chunks: self.chunks.load(Ordering::Relaxed),
            api_errors: self.api_errors.load(Ordering::Relaxed),
            network_errors: self.network_errors.load(Ordering::Relaxed),
            unknown_errors: self.unknown_errors.load(Ordering::Relaxed),
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: self.completion_tokens.load(Ordering::Relaxed),
        }
    }

    /// Emit current counters as a structured log line.
    pub fn emit_usage(&self, reason: &str) {
        let s = self.snapshot();
        info!(
            event = "usage_summary",
            reason = reason,
            requests = s.requests,
            rejected = s.rejected,
            rejected_empty = s.rejected_empty,
            rejected_too_short = s.rejected_too_short,
            rejected_too_long = s.rejected_too_long,
            rejected_spam = s.rejected_spam,
            rate_limited = s.rate_limited,
            replies = s.replies,
            errors = s.api_errors + s.network_errors + s.unknown_errors,
            prompt_tokens = s.prompt_tokens,
            completion_tokens = s.completion_tokens,
            "Usage metrics"
        );
    }
}

// ============================================================================
// Health server (raw TCP)
// ============================================================================

fn route(method: &str, path: &str, registry: &HealthRegistry, metrics: &BotMetrics) -> (&'static str, String) {
    match (method, path) {
        ("GET", "/health") => {
            let body = json!({
                "status": "ok",
                "uptime_secs": registry.uptime().as_secs(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "checks": registry.checks_json(),
                "metrics": metrics.snapshot(),
            });
            ("200 OK", body.to_string())
        }
        ("GET", "/ready") => {
            if registry.is_ready() {
                ("200 OK", json!({"status": "ready"}).to_string())
            } else {
                (
                    "503 Service Unavailable",
                    json!({"status": "not_ready"}).to_string(),
                )
            }
        }
        _ => ("404 Not Found", json!({"error": "not_found"}).to_string()),
    }
}

/// Start the HTTP health server on `host:port`.
///
/// Returns a `JoinHandle` so callers can abort on shutdown.
pub async fn start_health_server(
    host: &str,
    port: u16,
    registry: HealthRegistry,
    metrics: Arc<BotMetrics>,
) -> std::io::Result<JoinHandle<()>> {
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Health server listening on http://{}", addr);

    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut stream, _addr)) => {
                    let registry = registry.clone();
                    let metrics = Arc::clone(&metrics);
                    tokio::spawn(async move {
                        let mut buf = [0u8; 512];
                        let n = match tokio::time::timeout(
                            Duration::from_secs(5),
                            stream.read(&mut buf),
                        )
                        .await
                        {
                            Ok(Ok(n)) => n,
                            _ => return,
                        };

                        let request = String::from_utf8_lossy(&buf[..n]);
                        let request_line = request.lines().next().unwrap_or_default();
                        let mut parts = request_line.split_whitespace();
                        let method = parts.next().unwrap_or_default();
                        let raw_path = parts.next().unwrap_or_default();
                        let path = raw_path.split('?').next().unwrap_or(raw_path);

                        let (status_line, body) = route(method, path, &registry, &metrics);

                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_line,
                            body.len(),
                            body
                        );

                        let _ = stream.write_all(response.as_bytes()).await;
                        let _ = stream.shutdown().await;
                    });
                }
                Err(e) => {
                    warn!(error = %e, "Health server accept error");
                }
            }
        }
    });

    Ok(handle)
}

// ============================================================================
// Periodic usage flush
// ============================================================================

/// Start a background task that logs usage counters every `interval_secs`.
///
/// Emits a final `shutdown` summary when `shutdown_rx` signals `true`.
/// Returns `None` when `interval_secs` is 0.
pub fn start_periodic_usage_flush(
    metrics: Arc<BotMetrics>,
    interval_secs: u64,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Option<JoinHandle<()>> {
    if interval_secs == 0 {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.tick().await; // first tick is immediate

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    metrics.emit_usage("periodic");
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        metrics.emit_usage("shutdown");
                        break;
                    }
                }
            }
        }
    }))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpStream;

    async fn get(port: u16, path: &str) -> String {
        let mut stream = TcpStream::connect(format!("127.0.0.1:{}", port))
            .await
            .unwrap();
        let request = format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", path);
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8_lossy(&response).to_string()
    }

    async fn start(registry: HealthRegistry, metrics: Arc<BotMetrics>) -> (u16, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let handle = start_health_server("127.0.0.1", port, registry, metrics)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        (port, handle)
    }

    fn body_of(response: &str) -> serde_json::Value {
        let start = response.find("\r\n\r\n").unwrap() + 4;
        serde_json::from_str(response.get(start..).unwrap()).unwrap()
    }

    #[test]
    fn test_registry_ready_when_empty() {
        assert!(HealthRegistry::new().is_ready());
    }

    #[test]
    fn test_registry_not_ready_when_check_down() {
        let reg = HealthRegistry::new();
        reg.register(HealthCheck::new("telegram", HealthStatus::Down));
        assert!(!reg.is_ready());
    }

    #[test]
    fn test_registry_ready_with_degraded() {
        let reg = HealthRegistry::new();
        reg.register(HealthCheck::new("provider", HealthStatus::Degraded));
        assert!(reg.is_ready());
    }

    #[test]
    fn test_update_check_status() {
        let reg = HealthRegistry::new();
        reg.register(HealthCheck::new("telegram", HealthStatus::Ok));
        reg.update("telegram", HealthStatus::Down, Some("get_me failed".into()));
        assert_eq!(reg.status("telegram"), Some(HealthStatus::Down));
        assert!(!reg.is_ready());
    }

    #[test]
    fn test_update_nonexistent_noop() {
        let reg = HealthRegistry::new();
        reg.update("ghost", HealthStatus::Down, None);
        assert!(reg.is_ready());
        assert_eq!(reg.status("ghost"), None);
    }

    #[test]
    fn test_checks_json_shape() {
        let reg = HealthRegistry::new();
        reg.register(HealthCheck::new("telegram", HealthStatus::Ok));
        reg.register(HealthCheck {
            name: "provider".into(),
            status: HealthStatus::Degraded,
            message: Some("no \"key\"".into()),
        });
        let json = reg.checks_json();
        assert_eq!(json["telegram"]["status"], "ok");
        assert!(json["telegram"].get("message").is_none());
        assert_eq!(json["provider"]["status"], "degraded");
        assert_eq!(json["provider"]["message"], "no \"key\"");
    }

    #[test]
    fn test_metrics_counters() {
        let metrics = BotMetrics::new();
        metrics.record_request();
        metrics.record_request();
        metrics.record_rejection(RejectReason::TooShort);
        metrics.record_rate_limited();
        metrics.record_reply(3);
        metrics.record_error(ErrorCategory::Network);
        metrics.record_tokens(100, 50);

        let s = metrics.snapshot();
        assert_eq!(s.requests, 2);
        assert_eq!(s.rejected, 1);
        assert_eq!(s.rate_limited, 1);
        assert_eq!(s.replies, 1);
        assert_eq!(s.chunks, 3);
        assert_eq!(s.network_errors, 1);
        assert_eq!(s.api_errors, 0);
        assert_eq!(s.prompt_tokens, 100);
        assert_eq!(s.completion_tokens, 50);
    }

    #[test]
    fn test_metrics_rejections_counted_per_reason() {
        let metrics = BotMetrics::new();
        metrics.record_rejection(RejectReason::Empty);
        metrics.record_rejection(RejectReason::TooShort);
        metrics.record_rejection(RejectReason::TooShort);
        metrics.record_rejection(RejectReason::SpamLike);

        let s = metrics.snapshot();
        assert_eq!(s.rejected, 4);
        assert_eq!(s.rejected_empty, 1);
        assert_eq!(s.rejected_too_short, 2);
        assert_eq!(s.rejected_too_long, 0);
        assert_eq!(s.rejected_spam, 1);
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let registry = HealthRegistry::new();
        registry.register(HealthCheck::new("provider", HealthStatus::Ok));
        let metrics = Arc::new(BotMetrics::new());
        metrics.record_request();

        let (port, handle) = start(registry, metrics).await;
        let response = get(port, "/health").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"), "response: {}", response);

        let body = body_of(&response);
        assert_eq!(body["status"], "ok");
        assert!(body["uptime_secs"].is_u64());
        let timestamp = body["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
        assert_eq!(body["checks"]["provider"]["status"], "ok");
        assert_eq!(body["metrics"]["requests"], 1);

        handle.abort();
    }

    #[tokio::test]
    async fn test_ready_endpoint() {
        let registry = HealthRegistry::new();
        registry.register(HealthCheck::new("telegram", HealthStatus::Ok));
        let (port, handle) = start(registry.clone(), Arc::new(BotMetrics::new())).await;

        assert!(get(port, "/ready").await.starts_with("HTTP/1.1 200 OK"));

        registry.update("telegram", HealthStatus::Down, None);
        let response = get(port, "/ready").await;
        assert!(response.starts_with("HTTP/1.1 503"), "response: {}", response);
        assert_eq!(body_of(&response)["status"], "not_ready");

        handle.abort();
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let (port, handle) = start(HealthRegistry::new(), Arc::new(BotMetrics::new())).await;
        assert!(get(port, "/metrics").await.starts_with("HTTP/1.1 404"));
        assert!(get(port, "/health?x=1").await.starts_with("HTTP/1.1 200"));
        handle.abort();
    }

    #[tokio::test]
    async fn test_usage_flush_disabled_with_zero_interval() {
        let (_tx, rx) = watch::channel(false);
        assert!(start_periodic_usage_flush(Arc::new(BotMetrics::new()), 0, rx).is_none());
    }

    #[tokio::test]
    async fn test_usage_flush_stops_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let handle = start_periodic_usage_flush(Arc::new(BotMetrics::new()), 3600, rx).unwrap();
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
