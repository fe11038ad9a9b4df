//! Request orchestration: cache → in-flight dedup → retrying transport.
//! `Enhancer` owns all shared state (cache, pending table, metrics); build
//! one per process and pass it by reference.

pub mod cache;
pub mod dedup;
pub mod fingerprint;
pub mod prompt;
pub mod transport;
pub mod yaml;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument};

use crate::config::EnhancerConfig;
use crate::error::EnhanceError;
use crate::language::translate::{TranslationInfo, Translator};
use crate::language::LanguageDetector;
use crate::metrics::{metric_names, new_request_id, Counter, MetricsRegistry};
use crate::request::RequestParams;

use cache::ResultCache;
use dedup::{Deduplicator, Role};
use fingerprint::{fingerprint, Fingerprint};
use transport::{ChatBackend, HttpBackend, RetryPolicy, RetryingTransport};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResultMetrics {
    pub duration_ms: f64,
    pub cache_hit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhanceResult {
    /// Normalized YAML document.
    pub payload: String,
    pub translation: Option<TranslationInfo>,
    pub metrics: ResultMetrics,
}

type Outcome = Result<EnhanceResult, EnhanceError>;

/// Everything one upstream round trip needs, shareable with a `'static` future.
struct Pipeline {
    transport: Arc<RetryingTransport>,
    translator: Translator,
    detector: LanguageDetector,
    cache: ResultCache<Fingerprint, EnhanceResult>,
    cache_ttl: Duration,
    model: String,
    metrics: Arc<MetricsRegistry>,
    shutdown: CancellationToken,
}

impl Pipeline {
    async fn run(&self, key: Fingerprint, params: RequestParams) -> Outcome {
        let started = Instant::now();

        let translation = self.translate_if_needed(params.text()).await;
        let text = translation
            .as_ref()
            .map_or(params.text(), |t| t.translated_text.as_str());

        let body = prompt::build_request_body(&self.model, &params, text);
        let content = self.transport.send(&body, &self.shutdown).await?;
        let payload = yaml::normalize_payload(&content)?;

        let result = EnhanceResult {
            payload,
            translation,
            metrics: ResultMetrics {
                duration_ms: started.elapsed().as_secs_f64() * 1000.0,
                cache_hit: false,
            },
        };
        self.cache.set(key, result.clone(), self.cache_ttl);
        Ok(result)
    }

    async fn translate_if_needed(&self, text: &str) -> Option<TranslationInfo> {
        let detection = self.detector.detect(text);
        debug!(
            lang = %detection.language_code,
            confidence = detection.confidence,
            needs_translation = detection.needs_translation,
            "language detected"
        );
        if !detection.needs_translation {
            return None;
        }
        let span = self.metrics.span(metric_names::TRANSLATION);
        let info = self.translator.translate(text, &detection).await;
        span.finish();
        if info.was_translated {
            self.metrics.incr(Counter::Translation);
        }
        Some(info)
    }
}

pub struct Enhancer {
    pipeline: Arc<Pipeline>,
    inflight: Deduplicator<Fingerprint, Outcome>,
}

impl Enhancer {
    /// Build against the configured HTTP endpoint. Fails fast when the API
    /// key is missing.
    pub fn from_config(config: &EnhancerConfig) -> Result<Self, EnhanceError> {
        let backend = HttpBackend::new(config)?;
        Ok(Self::with_backend(config, Arc::new(backend)))
    }

    /// Build against any backend (used by tests and alternative transports).
    pub fn with_backend(config: &EnhancerConfig, backend: Arc<dyn ChatBackend>) -> Self {
        let metrics = Arc::new(MetricsRegistry::new());
        let shutdown = CancellationToken::new();
        let transport = Arc::new(RetryingTransport::new(
            backend,
            RetryPolicy::from_config(config),
            Arc::clone(&metrics),
        ));
        let translator =
            Translator::standard(Arc::clone(&transport), &config.model, shutdown.clone());

        Self {
            pipeline: Arc::new(Pipeline {
                transport,
                translator,
                detector: LanguageDetector::default(),
                cache: ResultCache::new(config.cache_capacity),
                cache_ttl: config.cache_ttl,
                model: config.model.clone(),
                metrics,
                shutdown,
            }),
            inflight: Deduplicator::new(),
        }
    }

    /// Produce the enhanced prompt for `params`.
    ///
    /// A live cache entry is returned without any upstream call. Otherwise
    /// concurrent calls with the same fingerprint share one pipeline run;
    /// success is cached, failure is not. The run is detached from the
    /// caller: dropping this future does not stop it, and its result is
    /// still cached.
    pub async fn enhance(&self, params: &RequestParams) -> Outcome {
        params.validate()?;
        let key = fingerprint(params);
        let request_id = new_request_id();
        let span = tracing::info_span!("enhance", %request_id, fingerprint = key.short());

        async move {
            let started = Instant::now();
            let timing = self.pipeline.metrics.span(metric_names::ENHANCE_TOTAL);

            if let Some(mut cached) = self.pipeline.cache.get(&key) {
                self.pipeline.metrics.incr(Counter::CacheHit);
                cached.metrics = ResultMetrics {
                    duration_ms: elapsed_ms(started),
                    cache_hit: true,
                };
                timing.finish();
                info!(cache_hit = true, "enhance served from cache");
                return Ok(cached);
            }
            self.pipeline.metrics.incr(Counter::CacheMiss);

            let pipeline = Arc::clone(&self.pipeline);
            let run_key = key.clone();
            let run_params = params.clone();
            let (outcome, role) = self
                .inflight
                .run(key, move || {
                    async move { pipeline.run(run_key, run_params).await }.in_current_span()
                })
                .await;
            if role == Role::Follower {
                self.pipeline.metrics.incr(Counter::DedupJoin);
                debug!("joined in-flight request");
            }

            // A run that died without an outcome is reported like an aborted call.
            let outcome = outcome.unwrap_or(Err(EnhanceError::Cancelled));
            timing.finish();
            let mut result = outcome?;
            result.metrics = ResultMetrics {
                duration_ms: elapsed_ms(started),
                cache_hit: false,
            };
            info!(
                cache_hit = false,
                duration_ms = result.metrics.duration_ms,
                "enhance completed"
            );
            Ok(result)
        }
        .instrument(span)
        .await
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.pipeline.metrics
    }

    pub fn cache_size(&self) -> usize {
        self.pipeline.cache.size()
    }

    pub fn clear_cache(&self) {
        self.pipeline.cache.clear();
    }

    /// Whether a live result is cached for `params`.
    pub fn is_cached(&self, params: &RequestParams) -> bool {
        self.pipeline.cache.get(&fingerprint(params)).is_some()
    }

    /// Abort every in-flight upstream attempt; affected calls fail with `Cancelled`.
    pub fn shutdown(&self) {
        self.pipeline.shutdown.cancel();
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
