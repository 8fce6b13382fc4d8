use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::Request;
use axum::http::{Method, StatusCode, Uri};
use axum::response::Response;
use tower::{Layer, Service};

use super::dispatch::Dispatcher;
use super::observer::{Observe, ObservedBody, ResponseObserver};
use crate::config::StatsConfig;
use crate::error::{Result, StatsError};
use crate::metrics::{Registry, Tags};

/// What the request recorder gets to see about a request.
#[derive(Debug, Clone)]
pub struct RequestFacts {
    pub method: Method,
    pub uri: Uri,
}

impl RequestFacts {
    pub fn from_request(req: &Request) -> Self {
        Self {
            method: req.method().clone(),
            uri: req.uri().clone(),
        }
    }
}

/// Records request-side metrics. Replace it to change what is collected.
pub type RequestStatFn = Arc<dyn Fn(&Registry, &RequestFacts, &Tags) + Send + Sync>;

/// Records response-side metrics from a completed observer.
pub type ResponseStatFn = Arc<dyn Fn(&Registry, &ResponseObserver, &Tags) + Send + Sync>;

// ─── Default recorders ───────────────────────────────────────────

/// Counts requests by method: `http_request,<tags> <METHOD>`.
pub fn default_request_stat() -> RequestStatFn {
    Arc::new(|registry: &Registry, facts: &RequestFacts, tags: &Tags| {
        registry.counter("http_request", tags, facts.method.as_str()).add();
    })
}

/// Counts responses by status and in total, keeps the last response size
/// and records latency in milliseconds into a histogram per tag set.
///
/// Latency histograms cover `[min_ms, max_ms]` and are created in whichever
/// registry the recorder is handed, on first use.
pub fn default_response_stat(min_ms: i64, max_ms: i64) -> Result<ResponseStatFn> {
    if min_ms >= max_ms {
        return Err(StatsError::InvalidRange {
            min: min_ms,
            max: max_ms,
        });
    }

    Ok(Arc::new(move |registry: &Registry, rsc: &ResponseObserver, tags: &Tags| {
        registry
            .counter("http_response", tags, rsc.status().as_str())
            .add();
        registry.counter("http_response", tags, "total").add();

        registry
            .gauge("http_response", tags, "size")
            .set(i64::try_from(rsc.size()).unwrap_or(i64::MAX));

        let latency_ms = i64::try_from(rsc.latency().as_millis()).unwrap_or(i64::MAX);
        match registry.histogram("http_response", tags, "latency", min_ms, max_ms) {
            Ok(histogram) => histogram.record_value(latency_ms),
            Err(e) => tracing::warn!(error = %e, "latency histogram unavailable"),
        }
    }))
}

// ─── HttpStats ───────────────────────────────────────────────────

/// Request/response instrumentation shared by every [`StatsLayer`].
///
/// Holds the global tags, the two recorders and the recording queue.
#[derive(Clone)]
pub struct HttpStats {
    registry: Registry,
    global_tags: Arc<Tags>,
    uri_tag: Option<Arc<str>>,
    request_stat: RequestStatFn,
    response_stat: ResponseStatFn,
    dispatcher: Dispatcher,
}

impl HttpStats {
    /// Build with the default recorders. Must run inside a tokio runtime;
    /// the recording workers are spawned here.
    pub fn new(registry: Registry, global_tags: Tags, config: &StatsConfig) -> Result<Self> {
        config.validate()?;
        let response_stat = default_response_stat(config.latency_min_ms, config.latency_max_ms)?;

        tracing::debug!(
            queue_capacity = config.queue_capacity,
            workers = config.workers,
            "http stats recording started"
        );

        Ok(Self {
            registry,
            global_tags: Arc::new(global_tags),
            uri_tag: config.uri_tag.as_deref().map(Arc::from),
            request_stat: default_request_stat(),
            response_stat,
            dispatcher: Dispatcher::spawn(config.queue_capacity, config.workers),
        })
    }

    pub fn with_request_stat(mut self, f: RequestStatFn) -> Self {
        self.request_stat = f;
        self
    }

    pub fn with_response_stat(mut self, f: ResponseStatFn) -> Self {
        self.response_stat = f;
        self
    }

    pub fn layer(&self) -> StatsLayer {
        StatsLayer {
            stats: self.clone(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn global_tags(&self) -> &Tags {
        &self.global_tags
    }

    /// Recording jobs dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dispatcher.dropped()
    }

    /// Copy of the global tags plus the per-request ones.
    fn request_tags(&self, facts: &RequestFacts) -> Tags {
        let mut tags = Tags::clone(&self.global_tags);
        if let Some(key) = &self.uri_tag {
            tags.insert(key.to_string(), facts.uri.path().to_owned());
        }
        tags
    }

    /// Queue the request recording and, when there was a response, the
    /// response recording. Never blocks.
    fn record(&self, facts: RequestFacts, observer: Option<ResponseObserver>, tags: Tags) {
        let tags = Arc::new(tags);

        let registry = self.registry.clone();
        let request_stat = self.request_stat.clone();
        let request_tags = tags.clone();
        self.dispatcher.dispatch(Box::new(move || {
            request_stat(&registry, &facts, &request_tags);
        }));

        let Some(observer) = observer else { return };
        let registry = self.registry.clone();
        let response_stat = self.response_stat.clone();
        self.dispatcher.dispatch(Box::new(move || {
            response_stat(&registry, &observer, &tags);
        }));
    }
}

// ─── Completion guard ────────────────────────────────────────────

/// Owns the per-request record and fires the recordings when dropped:
/// after the body finishes streaming, or earlier if the handler failed or
/// the request was abandoned.
struct Completion {
    stats: HttpStats,
    facts: RequestFacts,
    tags: Tags,
    observer: ResponseObserver,
    // Inner service returned an error or panicked.
    failed: bool,
}

impl Observe for Completion {
    fn observer_mut(&mut self) -> &mut ResponseObserver {
        &mut self.observer
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        let observer = if self.observer.has_status() {
            Some(self.observer)
        } else if self.failed {
            self.observer.write_header(StatusCode::INTERNAL_SERVER_ERROR);
            Some(self.observer)
        } else {
            // Dropped before the inner service answered: the client went
            // away, so there is no response to account.
            tracing::debug!(uri = %self.facts.uri, "request cancelled before response");
            None
        };
        self.stats
            .record(self.facts.clone(), observer, std::mem::take(&mut self.tags));
    }
}

/// Flags the request as failed if the inner service panics while polled.
struct PanicWatch<'a>(&'a mut bool);

impl Drop for PanicWatch<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            *self.0 = true;
        }
    }
}

// ─── Tower plumbing ──────────────────────────────────────────────

/// Layer wrapping a service with [`StatsService`].
#[derive(Clone)]
pub struct StatsLayer {
    stats: HttpStats,
}

impl<S> Layer<S> for StatsLayer {
    type Service = StatsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        StatsService {
            inner,
            stats: self.stats.clone(),
        }
    }
}

/// Wraps every response body in an [`ObservedBody`] and records the
/// request once that body is done.
#[derive(Clone)]
pub struct StatsService<S> {
    inner: S,
    stats: HttpStats,
}

impl<S> Service<Request> for StatsService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = std::result::Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        // The clone may not be ready; keep the one we polled.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let facts = RequestFacts::from_request(&req);
        let mut completion = Completion {
            tags: self.stats.request_tags(&facts),
            stats: self.stats.clone(),
            facts,
            observer: ResponseObserver::new(),
            failed: false,
        };

        Box::pin(async move {
            let mut call = std::pin::pin!(inner.call(req));
            let failed = &mut completion.failed;
            let polled = std::future::poll_fn(|cx| {
                let _watch = PanicWatch(&mut *failed);
                call.as_mut().poll(cx)
            })
            .await;

            let response = match polled {
                Ok(response) => response,
                Err(e) => {
                    completion.failed = true;
                    return Err(e);
                }
            };

            completion.observer.write_header(response.status());
            let (parts, body) = response.into_parts();
            let body = Body::new(ObservedBody::new(body, completion));
            Ok(Response::from_parts(parts, body))
        })
    }
}
