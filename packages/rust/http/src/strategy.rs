//! Ordered HTML fetch strategy: headless render → render proxy → plain GET.
//!
//! Stages run in priority order, each under its own hard timeout. The first
//! stage returning a usable (2xx, non-trivial, not bot-blocked) page wins.

use std::time::Duration;

use tracing::{debug, instrument, warn};

use leadscout_shared::Settings;

use crate::client::{HttpClient, RequestOptions};

/// Pages shorter than this are treated as empty shells.
const MIN_USABLE_BYTES: usize = 512;

/// Markers of anti-bot interstitials, matched case-insensitively.
const BOT_BLOCK_MARKERS: &[&str] = &[
    "are you a robot",
    "access denied",
    "unusual traffic",
    "cf-browser-verification",
    "checking your browser",
    "px-captcha",
    "captcha-delivery",
    "please verify you are a human",
    "request unsuccessful",
];

/// One way of obtaining a page's HTML.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    /// Headless-browser render service.
    Render,
    /// Remote scraping proxy with JS rendering.
    Proxy,
    /// Direct GET.
    Plain,
}

impl FetchStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Render => "render",
            Self::Proxy => "proxy",
            Self::Plain => "plain",
        }
    }
}

/// HTML obtained by a [`FetchChain`].
#[derive(Debug, Clone)]
pub struct FetchedHtml {
    pub url: String,
    pub html: String,
    pub stage: FetchStage,
}

#[derive(Debug, Clone)]
struct StagePlan {
    stage: FetchStage,
    timeout: Duration,
}

/// Sequential strategy chain with per-stage timeouts and first-success short-circuit.
#[derive(Debug, Clone)]
pub struct FetchChain {
    stages: Vec<StagePlan>,
    render_endpoint: Option<String>,
    proxy_endpoint: Option<String>,
    proxy_api_key: Option<String>,
    min_usable_bytes: usize,
}

impl FetchChain {
    /// Every stage the settings allow, in priority order. Plain is always present.
    pub fn from_settings(settings: &Settings) -> Self {
        let dir = &settings.directory;
        let mut stages = Vec::new();

        if dir.render_endpoint.is_some() {
            stages.push(StagePlan {
                stage: FetchStage::Render,
                timeout: Duration::from_secs(dir.render_timeout_secs),
            });
        }
        if dir.proxy_endpoint.is_some() && settings.proxy_api_key.is_some() {
            stages.push(StagePlan {
                stage: FetchStage::Proxy,
                timeout: Duration::from_secs(dir.proxy_timeout_secs),
            });
        }
        stages.push(StagePlan {
            stage: FetchStage::Plain,
            timeout: Duration::from_secs(dir.plain_timeout_secs),
        });

        Self {
            stages,
            render_endpoint: dir.render_endpoint.clone(),
            proxy_endpoint: dir.proxy_endpoint.clone(),
            proxy_api_key: settings.proxy_api_key.clone(),
            min_usable_bytes: MIN_USABLE_BYTES,
        }
    }

    /// A chain holding only the headless-render stage, if one is configured.
    pub fn render_only(settings: &Settings) -> Option<Self> {
        let mut chain = Self::from_settings(settings);
        chain.stages.retain(|s| s.stage == FetchStage::Render);
        if chain.stages.is_empty() {
            None
        } else {
            Some(chain)
        }
    }

    /// Override the minimum body size a stage must return.
    pub fn with_min_usable_bytes(mut self, bytes: usize) -> Self {
        self.min_usable_bytes = bytes;
        self
    }

    /// Stages in the order they will be attempted.
    pub fn stages(&self) -> Vec<FetchStage> {
        self.stages.iter().map(|s| s.stage).collect()
    }

    /// Walk the stages until one yields usable HTML.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn fetch(&self, http: &HttpClient, url: &str) -> Option<FetchedHtml> {
        for plan in &self.stages {
            let attempt = tokio::time::timeout(plan.timeout, self.run_stage(http, plan, url)).await;

            match attempt {
                Ok(Some(html)) if self.is_usable(&html) => {
                    debug!(stage = plan.stage.as_str(), bytes = html.len(), "stage succeeded");
                    return Some(FetchedHtml {
                        url: url.to_string(),
                        html,
                        stage: plan.stage,
                    });
                }
                Ok(Some(_)) => {
                    debug!(stage = plan.stage.as_str(), "stage returned unusable page");
                }
                Ok(None) => {
                    debug!(stage = plan.stage.as_str(), "stage returned nothing");
                }
                Err(_) => {
                    warn!(
                        stage = plan.stage.as_str(),
                        timeout_ms = plan.timeout.as_millis() as u64,
                        "stage timed out, abandoning"
                    );
                }
            }
        }
        None
    }

    async fn run_stage(&self, http: &HttpClient, plan: &StagePlan, url: &str) -> Option<String> {
        let result = match plan.stage {
            FetchStage::Render => {
                let endpoint = self.render_endpoint.as_deref()?;
                http.post(
                    endpoint,
                    RequestOptions::new()
                        .json(serde_json::json!({ "url": url }))
                        .timeout(plan.timeout)
                        .cached(),
                )
                .await
            }
            FetchStage::Proxy => {
                let endpoint = self.proxy_endpoint.as_deref()?;
                let api_key = self.proxy_api_key.as_deref()?;
                http.get(
                    endpoint,
                    RequestOptions::new()
                        .param("api_key", api_key)
                        .param("url", url)
                        .param("render", "true")
                        .timeout(plan.timeout)
                        .cached(),
                )
                .await
            }
            FetchStage::Plain => {
                http.get(
                    url,
                    RequestOptions::new()
                        .header("Accept", "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
                        .header("Accept-Language", "en-US,en;q=0.9")
                        .timeout(plan.timeout)
                        .cached(),
                )
                .await
            }
        };

        match result {
            Ok(response) if response.is_success() => Some(response.body_text()),
            Ok(response) => {
                debug!(
                    stage = plan.stage.as_str(),
                    status = response.status_code,
                    "non-success status"
                );
                None
            }
            Err(e) => {
                debug!(stage = plan.stage.as_str(), error = %e, "stage request failed");
                None
            }
        }
    }

    fn is_usable(&self, html: &str) -> bool {
        html.len() >= self.min_usable_bytes && !looks_bot_blocked(html)
    }
}

/// Whether a page looks like an anti-bot interstitial rather than content.
pub fn looks_bot_blocked(html: &str) -> bool {
    let lower = html.to_lowercase();
    BOT_BLOCK_MARKERS.iter().any(|m| lower.contains(m))
}
