//! Message endpoints.
//!
//! An endpoint is the consumer at the end of a subscription: the bus takes
//! messages off a channel and hands each one to [`MessageEndpoint::handle`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::Message;
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::error::EndpointError;
use crate::policy::ConsumerPolicy;

/// Consumer of messages delivered by the bus.
#[async_trait]
pub trait MessageEndpoint<T>: Send + Sync {
    /// Processes one message.
    ///
    /// An error is logged by the bus; it does not stop the subscription.
    async fn handle(&self, message: Message<T>) -> Result<(), EndpointError>;

    /// Channel this endpoint subscribes to when it is registered.
    fn input_channel(&self) -> Option<&str> {
        None
    }

    /// Policy for the registration-time subscription. `None` uses the bus default.
    fn consumer_policy(&self) -> Option<ConsumerPolicy> {
        None
    }
}

/// Shared endpoint handle.
pub type BoxedEndpoint<T> = Arc<dyn MessageEndpoint<T>>;

type HandlerFn<T> =
    Arc<dyn Fn(Message<T>) -> BoxFuture<'static, Result<(), EndpointError>> + Send + Sync>;

/// An endpoint backed by an async closure. Created with [`handler_fn`].
pub struct FnEndpoint<T> {
    handler: HandlerFn<T>,
    input_channel: Option<String>,
    policy: Option<ConsumerPolicy>,
}

impl<T> FnEndpoint<T> {
    /// Subscribes the endpoint to `channel` on registration (builder pattern).
    pub fn input_channel(mut self, channel: impl Into<String>) -> Self {
        self.input_channel = Some(channel.into());
        self
    }

    /// Sets the policy for the registration-time subscription (builder pattern).
    pub fn policy(mut self, policy: ConsumerPolicy) -> Self {
        self.policy = Some(policy);
        self
    }
}

impl<T> fmt::Debug for FnEndpoint<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnEndpoint")
            .field("input_channel", &self.input_channel)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<T: Send + 'static> MessageEndpoint<T> for FnEndpoint<T> {
    async fn handle(&self, message: Message<T>) -> Result<(), EndpointError> {
        (self.handler)(message).await
    }

    fn input_channel(&self) -> Option<&str> {
        self.input_channel.as_deref()
    }

    fn consumer_policy(&self) -> Option<ConsumerPolicy> {
        self.policy.clone()
    }
}

/// Wraps an async closure as an endpoint.
///
/// # Example
///
/// ```rust,ignore
/// let endpoint = handler_fn(|msg: Message<String>| async move {
///     tracing::info!(payload = %msg.payload(), "Handled");
///     Ok(())
/// })
/// .input_channel("orders");
/// ```
pub fn handler_fn<T, F, Fut>(f: F) -> FnEndpoint<T>
where
    F: Fn(Message<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), EndpointError>> + Send + 'static,
{
    FnEndpoint {
        handler: Arc::new(move |message| f(message).boxed()),
        input_channel: None,
        policy: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_handler_fn_invokes_closure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let endpoint = {
            let calls = Arc::clone(&calls);
            handler_fn(move |msg: Message<u32>| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(*msg.payload() as usize, Ordering::SeqCst);
                    Ok(())
                }
            })
        };

        endpoint.handle(Message::new(3)).await.unwrap();
        endpoint.handle(Message::new(4)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 7);
        assert!(MessageEndpoint::input_channel(&endpoint).is_none());
    }

    #[tokio::test]
    async fn test_handler_fn_error_passes_through() {
        let endpoint = handler_fn(|_msg: Message<()>| async { Err(EndpointError::failed("nope")) })
            .input_channel("inbox")
            .policy(ConsumerPolicy::default().max_concurrency(1));

        let err = endpoint.handle(Message::new(())).await.unwrap_err();
        assert!(matches!(err, EndpointError::Failed(ref m) if m == "nope"));
        assert_eq!(MessageEndpoint::input_channel(&endpoint), Some("inbox"));
        assert_eq!(endpoint.consumer_policy().unwrap().max_concurrency, 1);
    }
}
