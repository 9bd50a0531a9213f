use async_trait::async_trait;
use decklake_fetch::{
    page_key, FetchErrorKind, FetchOptions, FetchRequest, Fetcher, RawResponse, SourcePolicy,
    Transport, TransportError, DEFAULT_THROTTLE_PATTERN,
};
use decklake_store::{BlobStore, MemoryStore, RetryPolicy};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Scripted = Result<RawResponse, TransportError>;

/// Replays scripted outcomes in order, then repeats the last one.
struct FakeTransport {
    script: Mutex<VecDeque<Scripted>>,
    last: Mutex<Option<Scripted>>,
    calls: AtomicUsize,
}

impl FakeTransport {
    fn new(script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, _request: &FetchRequest) -> Result<RawResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().expect("script lock").pop_front();
        let mut last = self.last.lock().expect("last lock");
        match next {
            Some(outcome) => {
                *last = Some(outcome.clone());
                outcome
            }
            None => last.clone().expect("script is not empty"),
        }
    }
}

fn page(status: u16, body: &str) -> Scripted {
    Ok(RawResponse {
        status,
        headers: vec![("content-type".to_string(), "text/html".to_string())],
        body: body.as_bytes().to_vec(),
    })
}

fn fast_policy(attempts: usize) -> SourcePolicy {
    SourcePolicy::new("mtgtop8")
        .with_rate_limit(None)
        .with_retry(RetryPolicy::immediate(attempts))
        .with_throttle_pause(Duration::ZERO)
        .with_throttle_pattern(DEFAULT_THROTTLE_PATTERN)
        .expect("pattern")
}

const URL: &str = "https://www.mtgtop8.com/event?e=100";

#[tokio::test]
async fn soft_throttle_is_retried_until_a_real_page_arrives() {
    let transport = FakeTransport::new(vec![
        page(200, "<h1>Too many requests</h1>"),
        page(200, "<h1>You are rate limited</h1>"),
        page(200, "<div class=deck>4 Lightning Bolt</div>"),
    ]);
    let fetcher = Fetcher::new(fast_policy(7), transport.clone()).expect("fetcher");
    let resp = fetcher
        .fetch(&FetchRequest::get(URL), FetchOptions::default())
        .await
        .expect("third attempt succeeds");
    assert_eq!(resp.status, 200);
    assert!(resp.text().contains("Lightning Bolt"));
    assert!(!resp.from_cache);
    assert_eq!(transport.calls(), 3);
    assert_eq!(fetcher.requests_sent(), 3);
}

#[tokio::test]
async fn persistent_throttle_exhausts_the_budget() {
    let transport = FakeTransport::new(vec![page(200, "Rate limit exceeded")]);
    let fetcher = Fetcher::new(fast_policy(4), transport.clone()).expect("fetcher");
    let err = fetcher
        .fetch(&FetchRequest::get(URL), FetchOptions::default())
        .await
        .expect_err("never succeeds");
    assert_eq!(err.kind, FetchErrorKind::Throttled);
    assert_eq!(err.attempts, 4);
    assert_eq!(transport.calls(), 4);
}

#[tokio::test]
async fn client_errors_are_terminal() {
    let transport = FakeTransport::new(vec![page(404, "not here")]);
    let fetcher = Fetcher::new(fast_policy(7), transport.clone()).expect("fetcher");
    let err = fetcher
        .fetch(&FetchRequest::get(URL), FetchOptions::default())
        .await
        .expect_err("404");
    assert_eq!(err.kind, FetchErrorKind::Status(404));
    assert_eq!(err.attempts, 1);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn transient_statuses_and_timeouts_are_retried() {
    let transport = FakeTransport::new(vec![
        page(503, "busy"),
        Err(TransportError::Timeout("slow".to_string())),
        page(429, "slow down"),
        Err(TransportError::Network("reset".to_string())),
        page(200, "ok"),
    ]);
    let fetcher = Fetcher::new(fast_policy(7), transport.clone()).expect("fetcher");
    let resp = fetcher
        .fetch(&FetchRequest::get(URL), FetchOptions::default())
        .await
        .expect("eventually ok");
    assert_eq!(resp.text(), "ok");
    assert_eq!(transport.calls(), 5);
}

#[tokio::test]
async fn invalid_requests_are_not_retried() {
    let transport = FakeTransport::new(vec![Err(TransportError::InvalidRequest(
        "bad url".to_string(),
    ))]);
    let fetcher = Fetcher::new(fast_policy(7), transport.clone()).expect("fetcher");
    let err = fetcher
        .fetch(&FetchRequest::get(URL), FetchOptions::default())
        .await
        .expect_err("invalid");
    assert_eq!(err.kind, FetchErrorKind::InvalidRequest);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn without_a_pattern_throttle_pages_are_ordinary_pages() {
    let transport = FakeTransport::new(vec![page(200, "Too many requests")]);
    let policy = SourcePolicy::new("scryfall")
        .with_rate_limit(None)
        .with_retry(RetryPolicy::immediate(3));
    let fetcher = Fetcher::new(policy, transport.clone()).expect("fetcher");
    fetcher
        .fetch(&FetchRequest::get(URL), FetchOptions::default())
        .await
        .expect("accepted as-is");
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn soft_throttle_waits_for_the_configured_pause() {
    let transport = FakeTransport::new(vec![page(200, "too many requests"), page(200, "deck")]);
    let policy = fast_policy(3).with_throttle_pause(Duration::from_secs(10));
    let fetcher = Fetcher::new(policy, transport).expect("fetcher");
    let started = tokio::time::Instant::now();
    fetcher
        .fetch(&FetchRequest::get(URL), FetchOptions::default())
        .await
        .expect("second attempt");
    assert!(started.elapsed() >= Duration::from_secs(10));
}

#[tokio::test]
async fn cached_pages_skip_the_network() {
    let store = Arc::new(MemoryStore::new());
    let transport = FakeTransport::new(vec![page(200, "first"), page(200, "second")]);
    let fetcher = Fetcher::new(fast_policy(3), transport.clone())
        .expect("fetcher")
        .with_cache(store.clone());
    let req = FetchRequest::get(URL);

    let first = fetcher.fetch(&req, FetchOptions::default()).await.expect("miss");
    assert_eq!(first.text(), "first");
    assert!(store.exists(&page_key(&req)).await.expect("exists"));

    let again = fetcher.fetch(&req, FetchOptions::default()).await.expect("hit");
    assert_eq!(again.text(), "first");
    assert!(again.from_cache);
    assert_eq!(transport.calls(), 1);

    let replaced = fetcher.fetch(&req, FetchOptions::replace()).await.expect("replace");
    assert_eq!(replaced.text(), "second");
    assert_eq!(transport.calls(), 2);

    let after = fetcher.fetch(&req, FetchOptions::default()).await.expect("hit");
    assert_eq!(after.text(), "second");
}

#[tokio::test]
async fn cached_client_errors_stay_errors() {
    let store = Arc::new(MemoryStore::new());
    let transport = FakeTransport::new(vec![page(410, "gone")]);
    let fetcher = Fetcher::new(fast_policy(3), transport.clone())
        .expect("fetcher")
        .with_cache(store);
    let req = FetchRequest::get(URL);
    for _ in 0..2 {
        let err = fetcher
            .fetch(&req, FetchOptions::default())
            .await
            .expect_err("gone");
        assert_eq!(err.kind, FetchErrorKind::Status(410));
    }
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn cache_only_never_touches_the_network() {
    let store = Arc::new(MemoryStore::new());
    let transport = FakeTransport::new(vec![page(200, "live")]);
    let fetcher = Fetcher::new(fast_policy(3), transport.clone())
        .expect("fetcher")
        .with_cache(store);
    let cache_only = FetchOptions {
        replace: false,
        cache_only: true,
    };
    let err = fetcher
        .fetch(&FetchRequest::get(URL), cache_only)
        .await
        .expect_err("not cached");
    assert_eq!(err.kind, FetchErrorKind::NotCached);
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn cache_write_failure_is_reported() {
    let store = Arc::new(MemoryStore::new().with_failing_writes("www.mtgtop8.com"));
    let transport = FakeTransport::new(vec![page(200, "live")]);
    let fetcher = Fetcher::new(fast_policy(3), transport)
        .expect("fetcher")
        .with_cache(store);
    let err = fetcher
        .fetch(&FetchRequest::get(URL), FetchOptions::default())
        .await
        .expect_err("cache write fails");
    assert_eq!(err.kind, FetchErrorKind::Cache);
}

#[tokio::test]
async fn shared_store_cache_is_scoped_under_pages() {
    let store = Arc::new(MemoryStore::new());
    let transport = FakeTransport::new(vec![page(200, "deck")]);
    let fetcher = Fetcher::new(fast_policy(3), transport)
        .expect("fetcher")
        .with_page_cache_in(store.clone())
        .expect("prefix");
    let req = FetchRequest::get(URL);
    fetcher.fetch(&req, FetchOptions::default()).await.expect("fetch");
    assert_eq!(store.keys().await, vec![format!("pages/{}", page_key(&req))]);
}
