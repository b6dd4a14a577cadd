//! Integration tests for PsyBot
//!
//! These tests drive the public API the way the binary does: load a config
//! file, build providers and the limiter, and push questions through the
//! query pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::tempdir;

use psybot::bot::messages;
use psybot::health::BotMetrics;
use psybot::providers::Role;
use psybot::rate_limit::ManualClock;
use psybot::{
    ChatMessage, ChatOptions, Completion, CompletionProvider, Config, ErrorCategory,
    FixedWindowRateLimiter, Outcome, ProviderError, ProviderRegistry, QueryHandler,
    RateLimitConfig, RejectReason,
};

// ============================================================================
// Stub provider
// ============================================================================

/// Replies with a fixed text and records the user turn of every request.
struct StubProvider {
    name: &'static str,
    reply: std::result::Result<String, u16>,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl StubProvider {
    fn ok(name: &'static str, reply: &str) -> Self {
        Self {
            name,
            reply: Ok(reply.to_string()),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn failing(name: &'static str, status: u16) -> Self {
        Self {
            name,
            reply: Err(status),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionProvider for StubProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        _options: ChatOptions,
    ) -> std::result::Result<Completion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(user) = messages.iter().find(|m| m.role == Role::User) {
            self.seen.lock().unwrap().push(user.content.clone());
        }
        match &self.reply {
            Ok(text) => Ok(Completion {
                content: text.clone(),
                usage: None,
            }),
            Err(status) => Err(ProviderError::Api {
                status: *status,
                message: "stub failure".to_string(),
            }),
        }
    }

    fn model(&self) -> &str {
        "stub-model"
    }

    fn name(&self) -> &str {
        self.name
    }
}

struct Harness {
    handler: QueryHandler,
    clock: Arc<ManualClock>,
}

fn harness(config: &Config, providers: Vec<Arc<StubProvider>>) -> Harness {
    let mut registry = ProviderRegistry::new(&config.providers.active);
    for provider in providers {
        registry.insert(provider.name, provider);
    }
    let clock = Arc::new(ManualClock::new(10_000));
    let limiter = Arc::new(FixedWindowRateLimiter::with_clock(
        config.rate_limit.clone(),
        clock.clone(),
    ));
    let handler = QueryHandler::from_config(
        config,
        limiter,
        Arc::new(registry),
        Arc::new(BotMetrics::new()),
    );
    Harness { handler, clock }
}

// ============================================================================
// Pipeline
// ============================================================================

#[tokio::test]
async fn test_question_to_chunks() {
    let paragraph = "Вы откладываете дела, потому что боитесь оценки. ".repeat(20);
    let reply = format!("**Версия A**\n\n{}\n\n{}", paragraph, paragraph);
    let stub = Arc::new(StubProvider::ok("openrouter", &reply));

    let mut config = Config::default();
    config.split.max_chunk_length = 1200;
    let h = harness(&config, vec![stub.clone()]);

    let outcome = h
        .handler
        .handle_query("7", "  Почему я   откладываю важные дела? ")
        .await;

    let chunks = match outcome {
        Outcome::Reply(chunks) => chunks,
        other => panic!("unexpected outcome: {:?}", other),
    };
    assert!(chunks.len() >= 2);
    assert!(chunks[0].starts_with("Версия A"));
    assert!(chunks.iter().all(|c| !c.contains("**")));
    assert_eq!(
        stub.seen.lock().unwrap().as_slice(),
        ["Почему я откладываю важные дела?"]
    );
}

#[tokio::test]
async fn test_rate_limit_window_resets() {
    let stub = Arc::new(StubProvider::ok("openrouter", "Ответ"));
    let config = Config::default();
    let h = harness(&config, vec![stub.clone()]);
    let question = "Как справиться с тревогой?";

    for _ in 0..config.rate_limit.max_requests {
        assert!(matches!(
            h.handler.handle_query("7", question).await,
            Outcome::Reply(_)
        ));
    }
    let denied = h.handler.handle_query("7", question).await;
    assert!(matches!(denied, Outcome::RateLimited { .. }));
    assert_eq!(denied.messages(), vec![messages::RATE_LIMIT.to_string()]);

    // Another user has an independent window.
    assert!(matches!(
        h.handler.handle_query("8", question).await,
        Outcome::Reply(_)
    ));

    h.clock
        .advance(Duration::from_millis(config.rate_limit.window_ms + 1));
    assert!(matches!(
        h.handler.handle_query("7", question).await,
        Outcome::Reply(_)
    ));
    assert_eq!(
        stub.calls(),
        config.rate_limit.max_requests as usize + 2
    );
}

#[tokio::test]
async fn test_provider_failure_and_switch() {
    let broken = Arc::new(StubProvider::failing("openrouter", 503));
    let working = Arc::new(StubProvider::ok("qwen", "Ответ от qwen"));
    let config = Config::default();
    let h = harness(&config, vec![broken.clone(), working.clone()]);
    let question = "Почему я не могу найти партнера?";

    let failed = h.handler.handle_query("7", question).await;
    assert_eq!(
        failed,
        Outcome::Failed {
            category: ErrorCategory::Api
        }
    );
    assert_eq!(failed.messages(), vec![messages::API_ERROR.to_string()]);

    assert_eq!(
        h.handler.switch_provider("qwen"),
        "API provider switched to qwen"
    );
    assert_eq!(
        h.handler.handle_query("7", question).await,
        Outcome::Reply(vec!["Ответ от qwen".to_string()])
    );
    assert_eq!(broken.calls(), 1);
    assert_eq!(working.calls(), 1);

    let snapshot = h.handler.metrics().snapshot();
    assert_eq!(snapshot.api_errors, 1);
    assert_eq!(snapshot.replies, 1);
}

#[tokio::test]
async fn test_config_file_drives_pipeline() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{
            "validation": {"min_length": 10},
            "rate_limit": {"max_requests": 1, "window_ms": 1000}
        }"#,
    )
    .unwrap();

    let config = Config::read_file(&path).unwrap();
    assert_eq!(config.rate_limit.max_requests, 1);

    let stub = Arc::new(StubProvider::ok("openrouter", "Ответ"));
    let h = harness(&config, vec![stub.clone()]);

    assert_eq!(
        h.handler.handle_query("7", "Почему я?").await,
        Outcome::Rejected {
            reason: RejectReason::TooShort
        }
    );
    assert!(matches!(
        h.handler.handle_query("7", "Почему я боюсь успеха?").await,
        Outcome::Reply(_)
    ));
    assert!(matches!(
        h.handler.handle_query("7", "Почему я боюсь успеха?").await,
        Outcome::RateLimited { .. }
    ));
    assert_eq!(stub.calls(), 1);
}

#[test]
fn test_limiter_sweep_with_manual_clock() {
    let clock = Arc::new(ManualClock::new(0));
    let limiter = FixedWindowRateLimiter::with_clock(RateLimitConfig::default(), clock.clone());
    assert!(!limiter.check_and_consume("a"));
    assert!(!limiter.check_and_consume("b"));
    assert_eq!(limiter.tracked_users(), 2);

    clock.advance(Duration::from_secs(61));
    assert_eq!(limiter.sweep(), 2);
    assert_eq!(limiter.tracked_users(), 0);
}
