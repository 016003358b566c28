//! End-to-end behaviour of the message bus.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use conduit_core::ChannelInterceptor;
use conduit_runtime::config::ChannelConfig;
use conduit_runtime::prelude::*;
use conduit_runtime::{BusConfig, ConduitConfig};
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};
use tokio_test::{assert_err, assert_ok};

fn counting_endpoint(count: Arc<AtomicUsize>) -> BoxedEndpoint<u32> {
    Arc::new(handler_fn(move |_msg: Message<u32>| {
        let count = Arc::clone(&count);
        async move {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }))
}

async fn wait_until(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrency_never_exceeds_policy() {
    let bus = MessageBus::<u32>::new();
    let release = Arc::new(Notify::new());
    let peak = Arc::new(AtomicUsize::new(0));
    let running = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicUsize::new(0));

    let endpoint = {
        let (release, peak, running, done) = (
            Arc::clone(&release),
            Arc::clone(&peak),
            Arc::clone(&running),
            Arc::clone(&done),
        );
        handler_fn(move |_msg: Message<u32>| {
            let (release, peak, running, done) = (
                Arc::clone(&release),
                Arc::clone(&peak),
                Arc::clone(&running),
                Arc::clone(&done),
            );
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                release.notified().await;
                running.fetch_sub(1, Ordering::SeqCst);
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    };

    assert_ok!(bus.register_endpoint("worker", Arc::new(endpoint)).await);
    let policy = ConsumerPolicy::default()
        .max_concurrency(2)
        .receive_timeout(Duration::from_millis(10))
        .rejection_limit(3, Duration::from_millis(10));
    assert_ok!(
        bus.activate_subscription(Subscription::new("jobs", "worker").with_policy(policy))
            .await
    );
    assert_ok!(bus.start().await);

    let channel = bus.channel("jobs").await.unwrap();
    let producer = tokio::task::spawn_blocking(move || {
        for n in 0..6 {
            channel.send(Message::new(n)).unwrap();
        }
    });

    assert!(
        wait_until(Duration::from_secs(2), || running.load(Ordering::SeqCst) == 2).await,
        "two invocations should be running"
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(bus.active_count("worker").await, 2);

    while done.load(Ordering::SeqCst) < 6 {
        release.notify_waiters();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    producer.await.unwrap();
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert!(wait_until(Duration::from_secs(1), || running.load(Ordering::SeqCst) == 0).await);
    assert_ok!(bus.stop().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn endpoint_failures_do_not_stop_the_dispatcher() {
    let bus = MessageBus::<u32>::new();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let endpoint = handler_fn(move |msg: Message<u32>| {
        let tx = tx.clone();
        async move {
            let n = msg.into_payload();
            if n % 2 == 0 {
                return Err(EndpointError::failed(format!("even payload {n}")));
            }
            tx.send(n).map_err(|e| EndpointError::failed(e.to_string()))
        }
    })
    .input_channel("numbers")
    .policy(ConsumerPolicy::default().receive_timeout(Duration::from_millis(10)));

    assert_ok!(bus.register_endpoint("odd-only", Arc::new(endpoint)).await);
    assert_ok!(bus.start().await);

    let channel = bus.channel("numbers").await.unwrap();
    tokio::task::spawn_blocking(move || {
        for n in 0..6 {
            channel.send(Message::new(n)).unwrap();
        }
    })
    .await
    .unwrap();

    let mut odd = Vec::new();
    for _ in 0..3 {
        odd.push(
            tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap(),
        );
    }
    odd.sort_unstable();
    assert_eq!(odd, vec![1, 3, 5]);

    assert_ok!(bus.stop().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn subscription_activated_while_running_starts_immediately() {
    let bus = MessageBus::<u32>::new();
    assert_ok!(bus.start().await);

    let count = Arc::new(AtomicUsize::new(0));
    assert_ok!(
        bus.register_endpoint("late", counting_endpoint(Arc::clone(&count)))
            .await
    );
    let policy = ConsumerPolicy::default().receive_timeout(Duration::from_millis(10));
    assert_ok!(
        bus.activate_subscription(Subscription::new("late-channel", "late").with_policy(policy))
            .await
    );

    let channel = bus.channel("late-channel").await.unwrap();
    tokio::task::spawn_blocking(move || channel.send(Message::new(1)).unwrap())
        .await
        .unwrap();

    assert!(wait_until(Duration::from_secs(2), || count.load(Ordering::SeqCst) == 1).await);
    assert_ok!(bus.stop().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn initial_delay_postpones_first_receive() {
    let bus = MessageBus::<u32>::new();
    let count = Arc::new(AtomicUsize::new(0));
    assert_ok!(
        bus.register_endpoint("delayed", counting_endpoint(Arc::clone(&count)))
            .await
    );
    let policy = ConsumerPolicy::default()
        .initial_delay(Duration::from_millis(200))
        .receive_timeout(Duration::from_millis(10));
    assert_ok!(
        bus.activate_subscription(Subscription::new("later", "delayed").with_policy(policy))
            .await
    );

    let channel = bus.channel("later").await.unwrap();
    assert!(channel.send(Message::new(7)).unwrap());
    assert_ok!(bus.start().await);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(count.load(Ordering::SeqCst), 0);

    assert!(wait_until(Duration::from_secs(2), || count.load(Ordering::SeqCst) == 1).await);
    assert_ok!(bus.stop().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fixed_delay_period_spaces_runs() {
    let bus = MessageBus::<u32>::new();
    let count = Arc::new(AtomicUsize::new(0));
    assert_ok!(
        bus.register_endpoint("periodic", counting_endpoint(Arc::clone(&count)))
            .await
    );
    let policy = ConsumerPolicy::default()
        .max_messages_per_task(1)
        .receive_timeout(Duration::ZERO)
        .period(Duration::from_millis(150));
    assert_ok!(
        bus.activate_subscription(Subscription::new("slow", "periodic").with_policy(policy))
            .await
    );
    assert_ok!(bus.start().await);

    let channel = bus.channel("slow").await.unwrap();
    let producer = tokio::task::spawn_blocking(move || {
        for n in 0..2 {
            channel.send(Message::new(n)).unwrap();
        }
    });

    assert!(wait_until(Duration::from_secs(2), || count.load(Ordering::SeqCst) == 1).await);
    // The second message waits for the next run.
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);

    assert!(wait_until(Duration::from_secs(2), || count.load(Ordering::SeqCst) == 2).await);
    producer.await.unwrap();
    assert_ok!(bus.stop().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_returns_undispatched_message_to_channel() {
    let bus = MessageBus::<u32>::new();
    let channel = Arc::new(PointToPointChannel::<u32>::named("backlog"));
    assert_ok!(
        bus.register_channel("backlog", Arc::clone(&channel) as BoxedChannel<u32>)
            .await
    );

    let handled = Arc::new(AtomicUsize::new(0));
    let endpoint = {
        let handled = Arc::clone(&handled);
        handler_fn(move |_msg: Message<u32>| {
            let handled = Arc::clone(&handled);
            async move {
                handled.fetch_add(1, Ordering::SeqCst);
                futures::future::pending::<()>().await;
                Ok(())
            }
        })
    };
    assert_ok!(bus.register_endpoint("stuck", Arc::new(endpoint)).await);
    let policy = ConsumerPolicy::default()
        .max_concurrency(1)
        .receive_timeout(Duration::from_millis(10))
        .rejection_limit(1, Duration::from_secs(60));
    assert_ok!(
        bus.activate_subscription(Subscription::new("backlog", "stuck").with_policy(policy))
            .await
    );
    assert_ok!(bus.start().await);

    let producer = {
        let channel = Arc::clone(&channel);
        tokio::task::spawn_blocking(move || {
            channel.send(Message::new(1)).unwrap();
            channel.send(Message::new(2)).unwrap();
        })
    };
    producer.await.unwrap();

    // The second message is taken off the channel while the executor is saturated.
    assert!(wait_until(Duration::from_secs(2), || channel.is_empty()).await);
    assert!(wait_until(Duration::from_secs(1), || handled.load(Ordering::SeqCst) == 1).await);

    assert_ok!(bus.stop().await);

    let returned = channel.try_receive().unwrap().map(Message::into_payload);
    assert_eq!(returned, Some(2));
    assert_eq!(handled.load(Ordering::SeqCst), 1);
}

#[derive(Default)]
struct ReceiveClock {
    starts: Mutex<Vec<Instant>>,
}

impl ChannelInterceptor<u32> for ReceiveClock {
    fn pre_receive(&self, _channel: &str) -> bool {
        self.starts.lock().push(Instant::now());
        true
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fixed_rate_period_counts_from_run_start() {
    let clock = Arc::new(ReceiveClock::default());
    let channel = PointToPointChannel::<u32>::named("ticks").with_interceptor(clock.clone());

    let bus = MessageBus::<u32>::new();
    assert_ok!(bus.register_channel("ticks", Arc::new(channel)).await);
    let count = Arc::new(AtomicUsize::new(0));
    assert_ok!(bus.register_endpoint("ticker", counting_endpoint(count)).await);

    // Each run spends 120ms in an empty receive, then waits out the rest of the period.
    let policy = ConsumerPolicy::default()
        .max_messages_per_task(1)
        .receive_timeout(Duration::from_millis(120))
        .period(Duration::from_millis(200))
        .fixed_rate(true);
    assert_ok!(
        bus.activate_subscription(Subscription::new("ticks", "ticker").with_policy(policy))
            .await
    );
    assert_ok!(bus.start().await);

    assert!(wait_until(Duration::from_secs(3), || clock.starts.lock().len() >= 3).await);
    assert_ok!(bus.stop().await);

    let starts = clock.starts.lock().clone();
    let span = starts[2].duration_since(starts[0]);
    // Fixed-delay scheduling would put the third run at 640ms.
    assert!(span >= Duration::from_millis(380), "runs too close: {span:?}");
    assert!(span < Duration::from_millis(560), "runs not on the rate: {span:?}");
}

#[tokio::test]
async fn from_config_creates_declared_channels() {
    let config = ConduitConfig {
        bus: BusConfig {
            auto_create_channels: false,
            ..Default::default()
        },
        channels: vec![
            ChannelConfig {
                name: "orders".to_string(),
                handoff: HandoffMode::Synchronous,
            },
            ChannelConfig {
                name: "audit".to_string(),
                handoff: HandoffMode::Buffered,
            },
        ],
        ..Default::default()
    };

    let bus = MessageBus::<u32>::from_config(&config).unwrap();
    let stats = bus.stats().await;
    assert_eq!(stats.channels, 2);
    assert!(!stats.running);

    // A synchronous channel does not accept a send nobody takes.
    let orders = bus.channel("orders").await.unwrap();
    assert!(
        !orders
            .send_timeout(Message::new(1), Duration::from_millis(10))
            .unwrap()
    );

    let count = Arc::new(AtomicUsize::new(0));
    assert_ok!(bus.register_endpoint("e", counting_endpoint(count)).await);
    assert_err!(
        bus.activate_subscription(Subscription::new("unknown", "e"))
            .await
    );
    assert_ok!(
        bus.activate_subscription(Subscription::new("audit", "e"))
            .await
    );
}

#[tokio::test]
async fn from_config_rejects_invalid_configuration() {
    let mut config = ConduitConfig::default();
    config.channels.push(ChannelConfig {
        name: "dup".to_string(),
        handoff: HandoffMode::Buffered,
    });
    config.channels.push(ChannelConfig {
        name: "dup".to_string(),
        handoff: HandoffMode::Buffered,
    });

    assert!(matches!(
        MessageBus::<u32>::from_config(&config),
        Err(RuntimeError::Config(_))
    ));
}
