//! Enrichment-service boundary: provider abstraction + file cache.
//!
//! A client takes the full prompt and returns the model's raw text. Parsing
//! and degradation happen in the tagger, so every provider is treated alike.

use std::fs;
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::tagger::TaggerConfig;
use crate::error::PipelineError;
use crate::ingest::retry::ResilientFetcher;
use crate::sentiment::parse_tag_response;

pub type EnrichmentFuture<'a> = Pin<Box<dyn Future<Output = Result<String, PipelineError>> + Send + 'a>>;

pub trait EnrichmentClient: Send + Sync {
    /// Send `prompt` and return the raw completion text.
    fn complete<'a>(&'a self, prompt: &'a str) -> EnrichmentFuture<'a>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type DynEnrichmentClient = Arc<dyn EnrichmentClient>;

/// Build the configured client, wrapped in the response cache when a cache dir is set.
pub fn build_enrichment_client(
    cfg: &TaggerConfig,
    fetcher: ResilientFetcher,
) -> Result<DynEnrichmentClient, PipelineError> {
    let client: DynEnrichmentClient = match cfg.provider.as_str() {
        "openai" => {
            let provider = OpenAiEnrichment::new(fetcher, cfg.api_key.clone(), cfg.model.clone())
                .with_url(cfg.endpoint.clone());
            match &cfg.cache_dir {
                Some(dir) => Arc::new(CachingEnrichment::new(provider, dir.clone(), &cfg.model)),
                None => Arc::new(provider),
            }
        }
        "mock" => Arc::new(MockEnrichment {
            fixed: r#"{"sentiment":"Neutral","tickers":[]}"#.to_string(),
        }),
        other => {
            return Err(PipelineError::Config(format!(
                "unsupported tagger provider '{other}'"
            )))
        }
    };
    tracing::info!(provider = client.provider_name(), model = %cfg.model, "enrichment client ready");
    Ok(client)
}

// ------------------------------------------------------------
// OpenAI chat completions
// ------------------------------------------------------------

pub const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiEnrichment {
    fetcher: ResilientFetcher,
    api_key: String,
    model: String,
    url: String,
}

impl OpenAiEnrichment {
    pub fn new(fetcher: ResilientFetcher, api_key: String, model: String) -> Self {
        Self {
            fetcher,
            api_key,
            model,
            url: OPENAI_CHAT_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: Option<String>) -> Self {
        if let Some(u) = url {
            self.url = u;
        }
        self
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

impl EnrichmentClient for OpenAiEnrichment {
    fn complete<'a>(&'a self, prompt: &'a str) -> EnrichmentFuture<'a> {
        Box::pin(async move {
            if self.api_key.is_empty() {
                return Err(PipelineError::Config("OPENAI_API_KEY is not set".into()));
            }
            let req = ChatRequest {
                model: &self.model,
                messages: vec![Msg {
                    role: "user",
                    content: prompt,
                }],
                temperature: 0.0,
            };
            let resp: ChatResponse = self
                .fetcher
                .post_json("openai", &self.url, Some(&self.api_key), &req)
                .await?;
            Ok(resp
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .unwrap_or_default()
                .trim()
                .to_string())
        })
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

/// Returns the same text for every prompt; used by `provider = "mock"` and tests.
#[derive(Clone)]
pub struct MockEnrichment {
    pub fixed: String,
}

impl EnrichmentClient for MockEnrichment {
    fn complete<'a>(&'a self, _prompt: &'a str) -> EnrichmentFuture<'a> {
        let out = self.fixed.clone();
        Box::pin(async move { Ok(out) })
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Caching wrapper (file cache keyed by model + prompt digest)
// ------------------------------------------------------------

/// Only responses that satisfy the tag contract are cached, so a bad answer
/// is retried on the next run instead of being replayed forever.
pub struct CachingEnrichment<C: EnrichmentClient> {
    inner: C,
    cache_dir: PathBuf,
    model: String,
}

impl<C: EnrichmentClient> CachingEnrichment<C> {
    /// Entries are scoped to `model`, so switching models never replays old answers.
    pub fn new(inner: C, cache_dir: PathBuf, model: &str) -> Self {
        if let Err(e) = fs::create_dir_all(&cache_dir) {
            tracing::warn!(error = %e, dir = %cache_dir.display(), "cannot create enrichment cache dir");
        }
        Self {
            inner,
            cache_dir,
            model: model.to_string(),
        }
    }

    async fn complete_impl(&self, prompt: &str) -> Result<String, PipelineError> {
        let key = cache_key(&self.model, prompt);
        if let Some(hit) = read_cache_file(&self.cache_dir, &key) {
            return Ok(hit);
        }
        let fresh = self.inner.complete(prompt).await?;
        if parse_tag_response(&fresh).is_ok() {
            if let Err(e) = write_cache_file(&self.cache_dir, &key, &fresh) {
                tracing::debug!(error = %e, "enrichment cache write failed");
            }
        }
        Ok(fresh)
    }
}

impl<C: EnrichmentClient> EnrichmentClient for CachingEnrichment<C> {
    fn complete<'a>(&'a self, prompt: &'a str) -> EnrichmentFuture<'a> {
        Box::pin(self.complete_impl(prompt))
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }
}

fn cache_key(model: &str, prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update([0u8]);
    hasher.update(prompt.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn read_cache_file(dir: &Path, key: &str) -> Option<String> {
    fs::read_to_string(cache_path(dir, key)).ok()
}

fn write_cache_file(dir: &Path, key: &str, value: &str) -> io::Result<()> {
    let path = cache_path(dir, key);
    let tmp = path.with_extension("json.tmp");
    let mut f = fs::File::create(&tmp)?;
    f.write_all(value.as_bytes())?;
    fs::rename(tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
        reply: String,
    }

    impl EnrichmentClient for Counting {
        fn complete<'a>(&'a self, _prompt: &'a str) -> EnrichmentFuture<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let out = self.reply.clone();
            Box::pin(async move { Ok(out) })
        }
        fn provider_name(&self) -> &'static str {
            "counting"
        }
    }

    #[test]
    fn cache_key_is_stable_hex_digest() {
        let k = cache_key("gpt-4o-mini", "hello");
        assert_eq!(k.len(), 64);
        assert_eq!(k, cache_key("gpt-4o-mini", "hello"));
        assert_ne!(k, cache_key("gpt-4o-mini", "hello!"));
        assert_ne!(k, cache_key("gpt-4o", "hello"));
    }

    #[tokio::test]
    async fn valid_responses_are_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let client = CachingEnrichment::new(
            Counting {
                calls: AtomicUsize::new(0),
                reply: r#"{"sentiment":"Positive","tickers":["NVDA"]}"#.into(),
            },
            dir.path().to_path_buf(),
            "gpt-4o-mini",
        );
        let a = client.complete("prompt").await.unwrap();
        let b = client.complete("prompt").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_responses_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let client = CachingEnrichment::new(
            Counting {
                calls: AtomicUsize::new(0),
                reply: "not json".into(),
            },
            dir.path().to_path_buf(),
            "gpt-4o-mini",
        );
        client.complete("prompt").await.unwrap();
        client.complete("prompt").await.unwrap();
        assert_eq!(client.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn model_change_misses_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let reply = r#"{"sentiment":"Negative","tickers":["TSLA"]}"#;
        let counting = || Counting {
            calls: AtomicUsize::new(0),
            reply: reply.into(),
        };
        let old = CachingEnrichment::new(counting(), dir.path().to_path_buf(), "gpt-4o-mini");
        old.complete("prompt").await.unwrap();
        assert_eq!(old.inner.calls.load(Ordering::SeqCst), 1);

        let new = CachingEnrichment::new(counting(), dir.path().to_path_buf(), "gpt-4o");
        new.complete("prompt").await.unwrap();
        assert_eq!(new.inner.calls.load(Ordering::SeqCst), 1);

        let again = CachingEnrichment::new(counting(), dir.path().to_path_buf(), "gpt-4o-mini");
        again.complete("prompt").await.unwrap();
        assert_eq!(again.inner.calls.load(Ordering::SeqCst), 0);
    }
}
