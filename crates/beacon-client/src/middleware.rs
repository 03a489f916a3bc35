use std::task::Poll;

use beacon_contracts::InboundMessage;
use tower::{Layer, Service};

use crate::Analytics;

/// Per-message request passed down the bot pipeline.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub message: InboundMessage,
    /// Set by [`AnalyticsService`] before the inner handler runs.
    pub analytics: Option<Analytics>,
}

impl Context {
    pub fn new(message: InboundMessage) -> Self {
        Self {
            message,
            analytics: None,
        }
    }

    pub fn analytics(&self) -> Option<&Analytics> {
        self.analytics.as_ref()
    }
}

#[derive(Debug, Clone)]
pub struct AnalyticsLayer {
    analytics: Analytics,
}

impl AnalyticsLayer {
    pub fn new(analytics: Analytics) -> Self {
        Self { analytics }
    }
}

impl<S> Layer<S> for AnalyticsLayer {
    type Service = AnalyticsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AnalyticsService {
            inner,
            analytics: self.analytics.clone(),
        }
    }
}

/// Records identity and locale from each message, then always hands the
/// message to the inner service. Performs no I/O.
#[derive(Debug, Clone)]
pub struct AnalyticsService<S> {
    inner: S,
    analytics: Analytics,
}

impl<S> Service<Context> for AnalyticsService<S>
where
    S: Service<Context>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut ctx: Context) -> Self::Future {
        self.analytics.observe(&ctx.message);
        ctx.analytics = Some(self.analytics.clone());
        self.inner.call(ctx)
    }
}
