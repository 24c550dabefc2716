//! Cached, retried, concurrency-limited HTTP client.
//!
//! Every request made through one [`HttpClient`] shares a single permit pool,
//! whatever its destination. Transport failures are retried with linear
//! backoff; HTTP error statuses are returned to the caller untouched.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method};
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use leadscout_shared::{HttpResult, LeadscoutError, Result, Settings, sha256_hex};
use leadscout_storage::CacheStore;

/// User-Agent string for outbound requests.
const USER_AGENT: &str = concat!("leadscout/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// RequestOptions
// ---------------------------------------------------------------------------

/// Per-request options. Caching is off unless [`RequestOptions::cached`] is used.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Query-string parameters.
    pub params: BTreeMap<String, String>,
    /// JSON request body.
    pub json: Option<serde_json::Value>,
    pub headers: BTreeMap<String, String>,
    /// Overrides the derived `method:url:hash(payload)` key.
    pub cache_key: Option<String>,
    /// Overrides the store's default TTL.
    pub cache_ttl: Option<Duration>,
    pub use_cache: bool,
    /// Overrides the client-wide request timeout.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.json = Some(body);
        self
    }

    /// Serve from and store into the cache.
    pub fn cached(mut self) -> Self {
        self.use_cache = true;
        self
    }

    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// `method:url:sha256(sorted payload)`.
pub fn default_cache_key(method: &Method, url: &str, opts: &RequestOptions) -> String {
    // BTreeMap and serde_json's default map both serialize with sorted keys.
    let payload = serde_json::json!({
        "params": opts.params,
        "json": opts.json,
    });
    format!("{method}:{url}:{}", sha256_hex(&payload.to_string()))
}

// ---------------------------------------------------------------------------
// HttpClient
// ---------------------------------------------------------------------------

/// Shared request layer used by every connector and enricher in a run.
pub struct HttpClient {
    client: Client,
    cache: CacheStore,
    permits: Arc<Semaphore>,
    max_concurrency: usize,
    attempts: u32,
    backoff_base: Duration,
}

impl HttpClient {
    /// Build a client from the `[http]` settings, backed by `cache`.
    pub fn new(settings: &Settings, cache: CacheStore) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| LeadscoutError::Network(format!("failed to build HTTP client: {e}")))?;

        let max_concurrency = settings.http.max_concurrency.max(1);

        Ok(Self {
            client,
            cache,
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            attempts: settings.http.attempts.max(1),
            backoff_base: Duration::from_millis(settings.http.backoff_base_ms),
        })
    }

    /// The cache backing this client.
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Size of the shared permit pool.
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub async fn get(&self, url: &str, opts: RequestOptions) -> Result<HttpResult> {
        self.request(Method::GET, url, opts).await
    }

    pub async fn post(&self, url: &str, opts: RequestOptions) -> Result<HttpResult> {
        self.request(Method::POST, url, opts).await
    }

    /// Issue a request, consulting the cache first when asked to.
    #[instrument(skip_all, fields(method = %method, url = %url))]
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        opts: RequestOptions,
    ) -> Result<HttpResult> {
        let cache_key = opts
            .cache_key
            .clone()
            .unwrap_or_else(|| default_cache_key(&method, url, &opts));

        if opts.use_cache {
            if let Some(hit) = self.cached(&cache_key).await {
                debug!("cache hit");
                return Ok(hit);
            }
        }

        let result = self.send_with_retry(&method, url, &opts).await?;

        if opts.use_cache && result.is_success() {
            match serde_json::to_string(&result) {
                Ok(payload) => {
                    if let Err(e) = self.cache.set(&cache_key, &payload, opts.cache_ttl).await {
                        warn!(error = %e, "failed to cache response");
                    }
                }
                Err(e) => warn!(error = %e, "failed to serialize response for cache"),
            }
        }

        Ok(result)
    }

    /// Read and decode a cached response; storage or decode failures count as misses.
    async fn cached(&self, key: &str) -> Option<HttpResult> {
        match self.cache.get(key).await {
            Ok(Some(payload)) => match serde_json::from_str(&payload) {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(error = %e, "discarding malformed cached response");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "cache read failed, going to network");
                None
            }
        }
    }

    async fn send_with_retry(
        &self,
        method: &Method,
        url: &str,
        opts: &RequestOptions,
    ) -> Result<HttpResult> {
        let mut last_error = String::new();

        for attempt in 1..=self.attempts {
            let outcome = {
                let _permit = self.permits.acquire().await.map_err(|e| {
                    LeadscoutError::Network(format!("request permits closed: {e}"))
                })?;
                self.send_once(method, url, opts).await
            };

            match outcome {
                Ok(result) => {
                    debug!(attempt, status = result.status_code, "response received");
                    return Ok(result);
                }
                Err(e) => {
                    warn!(attempt, attempts = self.attempts, error = %e, "request failed");
                    last_error = e.to_string();
                    if attempt < self.attempts {
                        tokio::time::sleep(self.backoff_base * attempt).await;
                    }
                }
            }
        }

        Err(LeadscoutError::Network(format!(
            "{method} {url} failed after {} attempts: {last_error}",
            self.attempts
        )))
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        opts: &RequestOptions,
    ) -> std::result::Result<HttpResult, reqwest::Error> {
        let mut builder = self.client.request(method.clone(), url);
        if !opts.params.is_empty() {
            builder = builder.query(&opts.params);
        }
        if let Some(body) = &opts.json {
            builder = builder.json(body);
        }
        for (name, value) in &opts.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = opts.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.text().await?;

        Ok(HttpResult::from_body(final_url, status, headers, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use uuid::Uuid;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_client(configure: impl FnOnce(&mut Settings)) -> HttpClient {
        let mut settings = Settings::default();
        settings.http.backoff_base_ms = 10;
        configure(&mut settings);
        let db = std::env::temp_dir().join(format!("ls_http_test_{}.db", Uuid::now_v7()));
        let cache = CacheStore::open(&db, Duration::from_secs(60))
            .await
            .expect("open cache");
        HttpClient::new(&settings, cache).expect("build client")
    }

    #[test]
    fn cache_key_is_order_independent() {
        let a = RequestOptions::new().param("b", "2").param("a", "1");
        let b = RequestOptions::new().param("a", "1").param("b", "2");
        assert_eq!(
            default_cache_key(&Method::GET, "https://x.test/s", &a),
            default_cache_key(&Method::GET, "https://x.test/s", &b)
        );

        let post = RequestOptions::new().json(serde_json::json!({"page": 1}));
        let key = default_cache_key(&Method::POST, "https://x.test/s", &post);
        assert!(key.starts_with("POST:https://x.test/s:"));
        assert_ne!(key, default_cache_key(&Method::GET, "https://x.test/s", &post));
    }

    #[tokio::test]
    async fn json_and_text_bodies_normalize() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"ok":true}"#))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>hi</p>"))
            .mount(&server)
            .await;

        let client = test_client(|_| {}).await;

        let json = client
            .get(&format!("{}/json", server.uri()), RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(json.json, Some(serde_json::json!({"ok": true})));
        assert!(json.text.is_none());

        let html = client
            .get(&format!("{}/html", server.uri()), RequestOptions::new())
            .await
            .unwrap();
        assert_eq!(html.text.as_deref(), Some("<p>hi</p>"));
        assert!(html.json.is_none());
    }

    #[tokio::test]
    async fn params_headers_and_json_body_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(query_param("q", "dentist"))
            .and(header("x-api-key", "secret"))
            .and(body_json(serde_json::json!({"page": 1})))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(|_| {}).await;
        let result = client
            .post(
                &format!("{}/search", server.uri()),
                RequestOptions::new()
                    .param("q", "dentist")
                    .header("X-Api-Key", "secret")
                    .json(serde_json::json!({"page": 1})),
            )
            .await
            .unwrap();
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn cache_hit_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("cached body"))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(|_| {}).await;
        let url = format!("{}/page", server.uri());

        let first = client.get(&url, RequestOptions::new().cached()).await.unwrap();
        let second = client.get(&url, RequestOptions::new().cached()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second.text.as_deref(), Some("cached body"));
    }

    #[tokio::test]
    async fn uncached_requests_always_hit_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("fresh"))
            .expect(2)
            .mount(&server)
            .await;

        let client = test_client(|_| {}).await;
        client.get(&server.uri(), RequestOptions::new()).await.unwrap();
        client.get(&server.uri(), RequestOptions::new()).await.unwrap();
    }

    #[tokio::test]
    async fn error_status_is_returned_not_retried_or_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .expect(2)
            .mount(&server)
            .await;

        let client = test_client(|_| {}).await;
        let result = client
            .get(&server.uri(), RequestOptions::new().cached())
            .await
            .expect("non-2xx is not an error");
        assert_eq!(result.status_code, 503);
        assert!(!result.is_success());

        // Not cached, so this reaches the server again (expect(2) above).
        client
            .get(&server.uri(), RequestOptions::new().cached())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn transport_failure_retries_then_fails() {
        // Bind then drop a listener to obtain a port nothing is serving.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = test_client(|s| s.http.attempts = 3).await;
        let start = Instant::now();
        let err = client
            .get(&format!("http://{addr}/"), RequestOptions::new())
            .await
            .expect_err("connection refused");

        assert!(matches!(err, LeadscoutError::Network(_)));
        assert!(err.to_string().contains("after 3 attempts"));
        // Backoff sleeps 10ms then 20ms between the three tries.
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn permits_bound_in_flight_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("slow")
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;

        let client = Arc::new(test_client(|s| s.http.max_concurrency = 2).await);
        assert_eq!(client.max_concurrency(), 2);

        let start = Instant::now();
        let mut handles = Vec::new();
        for i in 0..6 {
            let client = client.clone();
            let url = format!("{}/slow/{i}", server.uri());
            handles.push(tokio::spawn(async move {
                client.get(&url, RequestOptions::new()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Six 200ms requests through two permits need at least three rounds.
        assert!(start.elapsed() >= Duration::from_millis(550));
    }
}
