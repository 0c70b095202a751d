//! Admission control.
//!
//! [`AdmissionController`] owns the session store and its sweeper and takes
//! the admit/reject decision. [`AdmissionLayer`] puts that decision in front
//! of any axum/tower service.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use tower::{Layer, Service};
use tracing::{debug, info};

use crate::bucket::Acquire;
use crate::config::LimiterConfig;
use crate::error::{ConfigError, RateLimited};
use crate::identity::IdentitySource;
use crate::metrics::{ADMISSION_LATENCY, ADMITTED_TOTAL, REJECTED_TOTAL, REQUEST_TOTAL};
use crate::session::SessionStore;
use crate::sweeper::SweeperHandle;

/// A request that got a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admitted {
    pub remaining: u32,
}

pub struct AdmissionController {
    config: LimiterConfig,
    store: Arc<SessionStore>,
    sweeper: SweeperHandle,
}

impl AdmissionController {
    /// Build a controller and spawn its sweeper. Must be called from within a
    /// tokio runtime.
    pub fn start(config: LimiterConfig) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;

        let store = Arc::new(SessionStore::new(&config));
        let sweeper = SweeperHandle::spawn(Arc::clone(&store), config.sweep_period);

        info!(
            capacity = config.capacity,
            refill_window = ?config.refill_window,
            sweep_period = ?config.sweep_period,
            grace = ?config.grace,
            "admission control started"
        );

        Ok(Arc::new(Self {
            config,
            store,
            sweeper,
        }))
    }

    /// Decide whether `identity` may proceed.
    ///
    /// The store lock is released before any waiting happens; the only wait
    /// is the bounded grace period for a token that is about to accrue.
    pub async fn check(&self, identity: &str) -> Result<Admitted, RateLimited> {
        REQUEST_TOTAL.inc();
        let timer = ADMISSION_LATENCY.start_timer();

        let bucket = self.store.get_or_create(identity);
        let outcome = bucket.acquire_within(self.config.grace).await;
        timer.observe_duration();

        match outcome {
            Acquire::Granted { remaining } => {
                ADMITTED_TOTAL.inc();
                Ok(Admitted { remaining })
            }
            Acquire::NotYet { wait } => {
                REJECTED_TOTAL.inc();
                debug!(identity, retry_after = ?wait, "too many requests");
                Err(RateLimited { retry_after: wait })
            }
        }
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Stop the background sweeper. Requests are still served afterwards,
    /// but idle sessions are no longer reclaimed.
    pub fn shutdown(&self) {
        self.sweeper.stop();
        info!("admission control sweeper stopped");
    }

    pub fn layer(self: &Arc<Self>, identity: IdentitySource) -> AdmissionLayer {
        AdmissionLayer::new(Arc::clone(self), identity)
    }
}

#[derive(Clone)]
pub struct AdmissionLayer {
    controller: Arc<AdmissionController>,
    identity: IdentitySource,
}

impl AdmissionLayer {
    pub fn new(controller: Arc<AdmissionController>, identity: IdentitySource) -> Self {
        Self {
            controller,
            identity,
        }
    }
}

impl<S> Layer<S> for AdmissionLayer {
    type Service = AdmissionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdmissionService {
            inner,
            controller: Arc::clone(&self.controller),
            identity: self.identity.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AdmissionService<S> {
    inner: S,
    controller: Arc<AdmissionController>,
    identity: IdentitySource,
}

impl<S> Service<Request<Body>> for AdmissionService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let controller = Arc::clone(&self.controller);
        let identity = self.identity.resolve(&req);

        // keep the instance that poll_ready was called on
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            match controller.check(&identity).await {
                Ok(_) => inner.call(req).await,
                Err(limited) => Ok(limited.into_response()),
            }
        })
    }
}
