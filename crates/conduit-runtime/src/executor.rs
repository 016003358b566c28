//! Bounded execution of endpoint invocations.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use conduit_core::Message;
use tokio::sync::{Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, trace};

use crate::endpoint::BoxedEndpoint;
use crate::policy::ConsumerPolicy;

/// Decrements an active-invocation counter when dropped, including on panic.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Runs one subscription's endpoint invocations on the tokio runtime, at most
/// `max_concurrency` at a time.
pub(crate) struct EndpointExecutor<T> {
    endpoint_name: Arc<str>,
    endpoint: BoxedEndpoint<T>,
    permits: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    rejection_limit: u32,
    rejection_limit_wait: Duration,
}

impl<T: Send + 'static> EndpointExecutor<T> {
    pub(crate) fn new(
        endpoint_name: &str,
        endpoint: BoxedEndpoint<T>,
        active: Arc<AtomicUsize>,
        policy: &ConsumerPolicy,
    ) -> Self {
        Self {
            endpoint_name: Arc::from(endpoint_name),
            endpoint,
            permits: Arc::new(Semaphore::new(policy.max_concurrency.max(1))),
            active,
            rejection_limit: policy.rejection_limit.max(1),
            rejection_limit_wait: policy.rejection_limit_wait_duration(),
        }
    }

    /// Submits a message to the endpoint.
    ///
    /// While all permits are taken the submission is retried; every
    /// `rejection_limit` rejections it backs off for `rejection_limit_wait`.
    /// Hands the message back if `stop` fired before it could be submitted.
    pub(crate) async fn execute(
        &self,
        message: Message<T>,
        stop: &CancellationToken,
    ) -> Result<(), Message<T>> {
        let mut rejections = 0u32;

        let permit = loop {
            match Arc::clone(&self.permits).try_acquire_owned() {
                Ok(permit) => break permit,
                Err(TryAcquireError::Closed) => return Err(message),
                Err(TryAcquireError::NoPermits) => {
                    rejections += 1;
                    trace!(endpoint = %self.endpoint_name, rejections, "Executor saturated");

                    if rejections >= self.rejection_limit {
                        debug!(
                            endpoint = %self.endpoint_name,
                            wait_ms = self.rejection_limit_wait.as_millis() as u64,
                            "Rejection limit reached, backing off"
                        );
                        rejections = 0;
                        tokio::select! {
                            _ = stop.cancelled() => return Err(message),
                            _ = tokio::time::sleep(self.rejection_limit_wait) => {}
                        }
                    } else {
                        tokio::task::yield_now().await;
                    }

                    if stop.is_cancelled() {
                        return Err(message);
                    }
                }
            }
        };

        let endpoint = Arc::clone(&self.endpoint);
        let endpoint_name = Arc::clone(&self.endpoint_name);
        let guard = ActiveGuard::enter(&self.active);
        let message_id = message.id();
        let span = tracing::debug_span!("endpoint", endpoint = %endpoint_name, %message_id);

        tokio::spawn(
            async move {
                let _permit = permit;
                let _guard = guard;
                if let Err(e) = endpoint.handle(message).await {
                    error!(error = %e, "Endpoint failed to handle message");
                }
            }
            .instrument(span),
        );

        Ok(())
    }
}
