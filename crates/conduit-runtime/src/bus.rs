//! The message bus: channel and endpoint registry plus polling consumers.
//!
//! The bus owns named channels and endpoints. A [`Subscription`] connects one
//! channel to one endpoint; while the bus is running each subscription has a
//! dispatcher task that repeatedly receives from the channel and hands the
//! messages to the endpoint.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use conduit_runtime::prelude::*;
//!
//! let bus = MessageBus::<String>::new();
//! bus.register_endpoint(
//!     "printer",
//!     Arc::new(handler_fn(|msg: Message<String>| async move {
//!         println!("{}", msg.payload());
//!         Ok(())
//!     })
//!     .input_channel("lines")),
//! )
//! .await?;
//!
//! bus.start().await?;
//! bus.channel("lines").await.unwrap().send(Message::new("hello".into()))?;
//! ```
//!
//! Channel operations block, so dispatchers receive on tokio's blocking pool.
//! Stopping the bus cancels those receives through a [`Cancellation`] token.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use conduit_core::{
    BoxedChannel, Cancellation, ChannelResult, Message, MessageSource, MessageTarget,
    PointToPointChannel,
};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use crate::config::{BusConfig, ConduitConfig, ConfigLoader, validate_config, validate_policy};
use crate::endpoint::BoxedEndpoint;
use crate::error::{RuntimeError, RuntimeResult};
use crate::executor::EndpointExecutor;
use crate::logging;
use crate::policy::ConsumerPolicy;

// =============================================================================
// Subscription
// =============================================================================

/// Connects a channel to an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Name of the channel to poll.
    pub channel: String,
    /// Name of the endpoint receiving the messages.
    pub endpoint: String,
    /// Polling policy; `None` uses the bus default.
    pub policy: Option<ConsumerPolicy>,
}

impl Subscription {
    /// Creates a subscription with the bus default policy.
    pub fn new(channel: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            endpoint: endpoint.into(),
            policy: None,
        }
    }

    /// Sets the polling policy (builder pattern).
    pub fn with_policy(mut self, policy: ConsumerPolicy) -> Self {
        self.policy = Some(policy);
        self
    }
}

/// Statistics about the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusStats {
    /// Number of registered channels.
    pub channels: usize,
    /// Number of registered endpoints.
    pub endpoints: usize,
    /// Number of active subscriptions.
    pub subscriptions: usize,
    /// Whether dispatchers are running.
    pub running: bool,
}

impl fmt::Display for BusStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} channels, {} endpoints, {} subscriptions ({})",
            self.channels,
            self.endpoints,
            self.subscriptions,
            if self.running { "running" } else { "stopped" }
        )
    }
}

// =============================================================================
// Internal state
// =============================================================================

struct EndpointEntry<T> {
    endpoint: BoxedEndpoint<T>,
    active: Arc<AtomicUsize>,
}

/// A subscription with its channel and endpoint resolved.
struct Consumer<T> {
    channel_name: String,
    endpoint_name: String,
    channel: BoxedChannel<T>,
    endpoint: BoxedEndpoint<T>,
    active: Arc<AtomicUsize>,
    policy: ConsumerPolicy,
}

/// Stops dispatchers: the token ends async waits, the cancellation ends
/// blocking receives.
#[derive(Clone)]
struct StopSignal {
    token: CancellationToken,
    blocking: Cancellation,
}

impl StopSignal {
    fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            blocking: Cancellation::new(),
        }
    }

    fn stop(&self) {
        self.token.cancel();
        self.blocking.cancel();
    }
}

struct Dispatch {
    stop: StopSignal,
    tasks: Vec<JoinHandle<()>>,
}

// =============================================================================
// Dispatcher
// =============================================================================

struct Dispatcher<T> {
    channel_name: String,
    endpoint_name: String,
    channel: BoxedChannel<T>,
    executor: EndpointExecutor<T>,
    policy: ConsumerPolicy,
    stop: StopSignal,
}

impl<T: Send + 'static> Dispatcher<T> {
    fn new(consumer: &Consumer<T>, stop: StopSignal) -> Self {
        Self {
            channel_name: consumer.channel_name.clone(),
            endpoint_name: consumer.endpoint_name.clone(),
            channel: Arc::clone(&consumer.channel),
            executor: EndpointExecutor::new(
                &consumer.endpoint_name,
                Arc::clone(&consumer.endpoint),
                Arc::clone(&consumer.active),
                &consumer.policy,
            ),
            policy: consumer.policy.clone(),
            stop,
        }
    }

    async fn run(self) {
        let period = self.policy.period_duration();
        let initial_delay = self.policy.initial_delay_duration();

        if period.is_zero() && self.policy.receive_timeout_ms == 0 {
            warn!(
                channel = %self.channel_name,
                endpoint = %self.endpoint_name,
                "Zero period and zero receive timeout, dispatcher will poll continuously"
            );
        }

        if !initial_delay.is_zero() {
            tokio::select! {
                _ = self.stop.token.cancelled() => return,
                _ = tokio::time::sleep(initial_delay) => {}
            }
        }

        loop {
            let started = Instant::now();
            let span = tracing::debug_span!(
                "poll",
                channel = %self.channel_name,
                endpoint = %self.endpoint_name
            );
            if !self.poll().instrument(span).await {
                break;
            }

            if period.is_zero() {
                if self.stop.token.is_cancelled() {
                    break;
                }
                tokio::task::yield_now().await;
                continue;
            }

            let wait = if self.policy.fixed_rate {
                period.saturating_sub(started.elapsed())
            } else {
                period
            };
            tokio::select! {
                _ = self.stop.token.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        debug!(
            channel = %self.channel_name,
            endpoint = %self.endpoint_name,
            "Dispatcher stopped"
        );
    }

    /// One scheduled run. Returns `false` once the dispatcher should stop.
    async fn poll(&self) -> bool {
        for _ in 0..self.policy.max_messages_per_task {
            if self.stop.token.is_cancelled() {
                return false;
            }

            match self.receive().await {
                Ok(Some(message)) => {
                    if let Err(message) = self.executor.execute(message, &self.stop.token).await {
                        self.requeue(message).await;
                        return false;
                    }
                }
                Ok(None) => break,
                Err(e) if e.is_interrupted() => return false,
                Err(e) => {
                    error!(error = %e, "Receive failed");
                    break;
                }
            }
        }
        true
    }

    /// Puts back a message that was taken but never dispatched.
    async fn requeue(&self, message: Message<T>) {
        let channel = Arc::clone(&self.channel);
        let message_id = message.id();

        let requeued = tokio::task::spawn_blocking(move || {
            channel.send_timeout(message, Duration::ZERO)
        })
        .await;

        match requeued {
            Ok(Ok(true)) => debug!(%message_id, "Undispatched message returned to channel"),
            Ok(Ok(false)) => warn!(%message_id, "Channel full, undispatched message dropped"),
            Ok(Err(e)) => warn!(%message_id, error = %e, "Failed to return message to channel"),
            Err(e) => error!(%message_id, error = %e, "Requeue task failed"),
        }
    }

    async fn receive(&self) -> ChannelResult<Option<Message<T>>> {
        let channel = Arc::clone(&self.channel);
        let cancel = self.stop.blocking.clone();
        let timeout = self.policy.receive_timeout_duration();

        match tokio::task::spawn_blocking(move || channel.receive_with(Some(timeout), Some(&cancel)))
            .await
        {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Receive task failed");
                Ok(None)
            }
        }
    }
}

// =============================================================================
// MessageBus
// =============================================================================

/// Registry of channels and endpoints with polling consumers.
///
/// # Example
///
/// ```rust,ignore
/// let bus = MessageBus::<u64>::new();
/// bus.register_channel("ticks", Arc::new(PointToPointChannel::named("ticks"))).await?;
/// bus.register_endpoint("counter", Arc::new(handler_fn(count))).await?;
/// bus.activate_subscription(
///     Subscription::new("ticks", "counter")
///         .with_policy(ConsumerPolicy::default().max_concurrency(1)),
/// )
/// .await?;
///
/// bus.run_until(shutdown_signal()).await?;
/// ```
pub struct MessageBus<T> {
    config: BusConfig,
    channels: RwLock<HashMap<String, BoxedChannel<T>>>,
    endpoints: RwLock<HashMap<String, EndpointEntry<T>>>,
    consumers: RwLock<Vec<Consumer<T>>>,
    dispatch: Mutex<Option<Dispatch>>,
}

impl<T: Send + 'static> MessageBus<T> {
    /// Creates an empty bus with default settings.
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Creates an empty bus with the given settings.
    pub fn with_config(config: BusConfig) -> Self {
        Self::from_parts(config, HashMap::new())
    }

    /// Creates a bus from a full configuration.
    ///
    /// This validates the configuration, initializes logging from it and
    /// creates every declared channel.
    pub fn from_config(config: &ConduitConfig) -> RuntimeResult<Self> {
        validate_config(config)?;
        logging::init_from_config(&config.logging);

        let channels = config
            .channels
            .iter()
            .map(|declared| {
                let channel: BoxedChannel<T> = Arc::new(
                    PointToPointChannel::named(declared.name.clone()).handoff(declared.handoff),
                );
                (declared.name.clone(), channel)
            })
            .collect::<HashMap<_, _>>();

        info!(
            channels = channels.len(),
            auto_create_channels = config.bus.auto_create_channels,
            "Message bus initialized from configuration"
        );

        Ok(Self::from_parts(config.bus.clone(), channels))
    }

    /// Creates a builder that loads configuration from files and environment.
    pub fn builder() -> BusBuilder {
        BusBuilder::new()
    }

    fn from_parts(config: BusConfig, channels: HashMap<String, BoxedChannel<T>>) -> Self {
        Self {
            config,
            channels: RwLock::new(channels),
            endpoints: RwLock::new(HashMap::new()),
            consumers: RwLock::new(Vec::new()),
            dispatch: Mutex::new(None),
        }
    }

    /// Returns the bus settings.
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    // =========================================================================
    // Registry
    // =========================================================================

    /// Registers a channel under `name`.
    pub async fn register_channel(
        &self,
        name: impl Into<String>,
        channel: BoxedChannel<T>,
    ) -> RuntimeResult<()> {
        let name = name.into();
        let mut channels = self.channels.write().await;
        if channels.contains_key(&name) {
            return Err(RuntimeError::ChannelExists(name));
        }
        info!(channel = %name, "Registered channel");
        channels.insert(name, channel);
        Ok(())
    }

    /// Looks up a channel by name.
    pub async fn channel(&self, name: &str) -> Option<BoxedChannel<T>> {
        self.channels.read().await.get(name).cloned()
    }

    /// Returns all registered channel names.
    pub async fn channel_names(&self) -> Vec<String> {
        self.channels.read().await.keys().cloned().collect()
    }

    /// Registers an endpoint under `name`.
    ///
    /// If the endpoint declares an input channel it is subscribed to it right
    /// away; if that subscription cannot be activated the registration is
    /// rolled back.
    pub async fn register_endpoint(
        &self,
        name: impl Into<String>,
        endpoint: BoxedEndpoint<T>,
    ) -> RuntimeResult<()> {
        let name = name.into();
        let input = endpoint
            .input_channel()
            .map(|channel| (channel.to_string(), endpoint.consumer_policy()));

        {
            let mut endpoints = self.endpoints.write().await;
            if endpoints.contains_key(&name) {
                return Err(RuntimeError::EndpointExists(name));
            }
            endpoints.insert(
                name.clone(),
                EndpointEntry {
                    endpoint,
                    active: Arc::new(AtomicUsize::new(0)),
                },
            );
        }
        info!(endpoint = %name, "Registered endpoint");

        if let Some((channel, policy)) = input {
            let subscription = Subscription {
                channel,
                endpoint: name.clone(),
                policy,
            };
            if let Err(e) = self.activate_subscription(subscription).await {
                self.endpoints.write().await.remove(&name);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Looks up an endpoint by name.
    pub async fn endpoint(&self, name: &str) -> Option<BoxedEndpoint<T>> {
        self.endpoints
            .read()
            .await
            .get(name)
            .map(|entry| Arc::clone(&entry.endpoint))
    }

    /// Connects a channel to an endpoint.
    ///
    /// An unknown channel is created if `auto_create_channels` is set. If the
    /// bus is running the new dispatcher starts immediately.
    pub async fn activate_subscription(&self, subscription: Subscription) -> RuntimeResult<()> {
        let policy = subscription
            .policy
            .unwrap_or_else(|| self.config.default_policy.clone());
        validate_policy(&policy)?;

        let channel = self.resolve_channel(&subscription.channel).await?;
        let (endpoint, active) = {
            let endpoints = self.endpoints.read().await;
            let entry = endpoints
                .get(&subscription.endpoint)
                .ok_or_else(|| RuntimeError::EndpointNotFound(subscription.endpoint.clone()))?;
            (Arc::clone(&entry.endpoint), Arc::clone(&entry.active))
        };

        let consumer = Consumer {
            channel_name: subscription.channel,
            endpoint_name: subscription.endpoint,
            channel,
            endpoint,
            active,
            policy,
        };

        let mut dispatch = self.dispatch.lock().await;
        if let Some(dispatch) = dispatch.as_mut() {
            let dispatcher = Dispatcher::new(&consumer, dispatch.stop.clone());
            dispatch.tasks.push(tokio::spawn(dispatcher.run()));
        }
        info!(
            channel = %consumer.channel_name,
            endpoint = %consumer.endpoint_name,
            "Activated subscription"
        );
        self.consumers.write().await.push(consumer);
        Ok(())
    }

    async fn resolve_channel(&self, name: &str) -> RuntimeResult<BoxedChannel<T>> {
        if let Some(channel) = self.channel(name).await {
            return Ok(channel);
        }
        if !self.config.auto_create_channels {
            return Err(RuntimeError::ChannelNotFound(name.to_string()));
        }

        let mut channels = self.channels.write().await;
        let channel = channels
            .entry(name.to_string())
            .or_insert_with(|| {
                info!(channel = %name, "Auto-created channel");
                let created: BoxedChannel<T> = Arc::new(PointToPointChannel::named(name));
                created
            })
            .clone();
        Ok(channel)
    }

    /// Number of invocations currently running for an endpoint.
    pub async fn active_count(&self, endpoint: &str) -> usize {
        self.endpoints
            .read()
            .await
            .get(endpoint)
            .map_or(0, |entry| entry.active.load(Ordering::SeqCst))
    }

    /// Returns statistics about the bus.
    pub async fn stats(&self) -> BusStats {
        BusStats {
            channels: self.channels.read().await.len(),
            endpoints: self.endpoints.read().await.len(),
            subscriptions: self.consumers.read().await.len(),
            running: self.is_running().await,
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Returns whether dispatchers are running.
    pub async fn is_running(&self) -> bool {
        self.dispatch.lock().await.is_some()
    }

    /// Starts a dispatcher for every subscription.
    pub async fn start(&self) -> RuntimeResult<()> {
        let mut dispatch = self.dispatch.lock().await;
        if dispatch.is_some() {
            warn!("Message bus is already running");
            return Ok(());
        }

        let stop = StopSignal::new();
        let tasks: Vec<_> = self
            .consumers
            .read()
            .await
            .iter()
            .map(|consumer| tokio::spawn(Dispatcher::new(consumer, stop.clone()).run()))
            .collect();

        info!(dispatchers = tasks.len(), "Message bus started");
        *dispatch = Some(Dispatch { stop, tasks });
        Ok(())
    }

    /// Stops all dispatchers and waits for them to finish.
    ///
    /// Receives blocked on a channel are interrupted. Endpoint invocations
    /// already in flight are left to complete.
    pub async fn stop(&self) -> RuntimeResult<()> {
        let Some(Dispatch { stop, tasks }) = self.dispatch.lock().await.take() else {
            warn!("Message bus is not running");
            return Ok(());
        };

        info!("Stopping message bus");
        stop.stop();

        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Dispatcher task failed");
            }
        }

        info!("Message bus stopped");
        Ok(())
    }

    /// Starts the bus, waits for `shutdown`, then stops it.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        self.stop().await
    }
}

impl<T: Send + 'static> Default for MessageBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for MessageBus<T> {
    fn drop(&mut self) {
        if let Some(dispatch) = self.dispatch.get_mut().take() {
            dispatch.stop.stop();
        }
    }
}

// =============================================================================
// BusBuilder
// =============================================================================

/// Builder for creating a [`MessageBus`] from loaded configuration.
///
/// # Example
///
/// ```rust,ignore
/// let bus = MessageBus::<String>::builder()
///     .config_file("config/conduit.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct BusBuilder {
    config_loader: ConfigLoader,
}

impl BusBuilder {
    /// Creates a builder searching the current directory.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: ConduitConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Loads the configuration and builds the bus.
    pub fn build<T: Send + 'static>(self) -> RuntimeResult<MessageBus<T>> {
        let config = self.config_loader.load()?;
        MessageBus::from_config(&config)
    }
}

impl Default for BusBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::handler_fn;
    use crate::error::EndpointError;
    use tokio::sync::mpsc;

    fn fast_policy() -> ConsumerPolicy {
        ConsumerPolicy::default().receive_timeout(Duration::from_millis(20))
    }

    fn forwarding_endpoint(tx: mpsc::UnboundedSender<String>) -> BoxedEndpoint<String> {
        Arc::new(handler_fn(move |msg: Message<String>| {
            let tx = tx.clone();
            async move {
                tx.send(msg.into_payload())
                    .map_err(|e| EndpointError::failed(e.to_string()))
            }
        }))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_subscription_delivers_messages() {
        let bus = MessageBus::<String>::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.register_endpoint("sink", forwarding_endpoint(tx))
            .await
            .unwrap();
        bus.activate_subscription(Subscription::new("inbox", "sink").with_policy(fast_policy()))
            .await
            .unwrap();
        bus.start().await.unwrap();

        let channel = bus.channel("inbox").await.unwrap();
        for word in ["one", "two", "three"] {
            channel.send(Message::new(word.to_string())).unwrap();
        }

        let mut received = Vec::new();
        for _ in 0..3 {
            let payload = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            received.push(payload);
        }
        received.sort();
        assert_eq!(received, vec!["one", "three", "two"]);

        bus.stop().await.unwrap();
        assert!(!bus.is_running().await);
    }

    #[tokio::test]
    async fn test_unknown_channel_without_auto_create() {
        let bus = MessageBus::<String>::with_config(BusConfig {
            auto_create_channels: false,
            ..Default::default()
        });
        let (tx, _rx) = mpsc::unbounded_channel();
        bus.register_endpoint("sink", forwarding_endpoint(tx))
            .await
            .unwrap();

        let err = bus
            .activate_subscription(Subscription::new("missing", "sink"))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::ChannelNotFound(ref name) if name == "missing"));
        assert_eq!(bus.stats().await.subscriptions, 0);
    }

    #[tokio::test]
    async fn test_unknown_endpoint() {
        let bus = MessageBus::<String>::new();
        let err = bus
            .activate_subscription(Subscription::new("inbox", "ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::EndpointNotFound(_)));
    }

    #[tokio::test]
    async fn test_invalid_policy_is_rejected() {
        let bus = MessageBus::<String>::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        bus.register_endpoint("sink", forwarding_endpoint(tx))
            .await
            .unwrap();

        let policy = ConsumerPolicy::default().max_concurrency(0);
        let err = bus
            .activate_subscription(Subscription::new("inbox", "sink").with_policy(policy))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Config(_)));
    }

    #[tokio::test]
    async fn test_endpoint_with_input_channel_subscribes_on_registration() {
        let bus = MessageBus::<String>::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let endpoint = handler_fn(move |msg: Message<String>| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(msg.into_payload());
                Ok(())
            }
        })
        .input_channel("auto");

        bus.register_endpoint("listener", Arc::new(endpoint))
            .await
            .unwrap();

        let stats = bus.stats().await;
        assert_eq!(stats.channels, 1);
        assert_eq!(stats.endpoints, 1);
        assert_eq!(stats.subscriptions, 1);
        assert!(bus.channel("auto").await.is_some());
    }

    #[tokio::test]
    async fn test_failed_input_subscription_rolls_back_registration() {
        let bus = MessageBus::<String>::with_config(BusConfig {
            auto_create_channels: false,
            ..Default::default()
        });
        let endpoint = handler_fn(|_msg: Message<String>| async { Ok(()) }).input_channel("nope");

        assert!(
            bus.register_endpoint("listener", Arc::new(endpoint))
                .await
                .is_err()
        );
        assert!(bus.endpoint("listener").await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_registrations() {
        let bus = MessageBus::<String>::new();
        let channel: BoxedChannel<String> = Arc::new(PointToPointChannel::named("c"));
        bus.register_channel("c", Arc::clone(&channel)).await.unwrap();
        assert!(matches!(
            bus.register_channel("c", channel).await,
            Err(RuntimeError::ChannelExists(_))
        ));

        let (tx, _rx) = mpsc::unbounded_channel();
        let endpoint = forwarding_endpoint(tx);
        bus.register_endpoint("e", Arc::clone(&endpoint)).await.unwrap();
        assert!(matches!(
            bus.register_endpoint("e", endpoint).await,
            Err(RuntimeError::EndpointExists(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_lifecycle_is_idempotent() {
        let bus = MessageBus::<String>::new();
        assert!(!bus.is_running().await);

        bus.stop().await.unwrap();
        bus.start().await.unwrap();
        bus.start().await.unwrap();
        assert!(bus.is_running().await);

        bus.stop().await.unwrap();
        bus.stop().await.unwrap();
        assert!(!bus.is_running().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_interrupts_blocked_receive() {
        let bus = MessageBus::<String>::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        bus.register_endpoint("sink", forwarding_endpoint(tx))
            .await
            .unwrap();

        let policy = ConsumerPolicy::default().receive_timeout(Duration::from_secs(3600));
        bus.activate_subscription(Subscription::new("idle", "sink").with_policy(policy))
            .await
            .unwrap();
        bus.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(2), bus.stop())
            .await
            .expect("stop should not wait for the receive timeout")
            .unwrap();

        let channel = bus.channel("idle").await.unwrap();
        channel.send(Message::new("after".to_string())).unwrap();
        assert_eq!(channel.try_receive().unwrap().unwrap().payload(), "after");
    }

    #[test]
    fn test_stats_display() {
        let stats = BusStats {
            channels: 2,
            endpoints: 1,
            subscriptions: 1,
            running: false,
        };
        assert_eq!(
            stats.to_string(),
            "2 channels, 1 endpoints, 1 subscriptions (stopped)"
        );
    }
}
