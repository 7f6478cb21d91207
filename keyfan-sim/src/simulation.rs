//! Workload driver.
//!
//! Spawns watchers for the first `watched_orders` orders and a set of
//! producers that push status updates for random orders through the
//! [`StatusRelay`]. Once the producers are done (or shutdown is signaled),
//! watchers drain what is still queued for them and unsubscribe. The run
//! then checks that no per-key channel was left behind.
//!
//! ```text
//! producers ──► StatusRelay ──► KeyedDistributor ──► watcher(order 0) x N
//!                                      │           └─► watcher(order 1) x N
//!                                      └─ unwatched orders: ready immediately
//! ```

use crate::config::SimConfig;
use crate::events::{OrderStatus, OrderStatusChanged};
use crate::relay::StatusRelay;
use crate::state::{SimReport, SimState, SimStats};
use kanau::processor::Processor;
use keyfan_core::{Completion, KeyedReader};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::Ordering;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Run the configured workload until completion or shutdown.
pub async fn run(config: &SimConfig, shutdown_rx: watch::Receiver<bool>) -> SimReport {
    let state = SimState::new(config.orders);
    let started = Instant::now();

    // -- Watchers -----------------------------------------------------------
    // Subscribe before any producer starts so every update for a watched
    // order is routed.
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut watchers = JoinSet::new();
    for order_id in state.orders.iter().take(config.watched_orders).copied() {
        for _ in 0..config.watchers_per_order {
            let reader = state.distributor.subscribe(order_id);
            watchers.spawn(run_watcher(
                state.clone(),
                reader,
                order_id,
                config.resubscribe_after,
                stop_rx.clone(),
            ));
        }
    }
    info!(
        watchers = watchers.len(),
        active_keys = state.distributor.active_keys(),
        "Watchers subscribed"
    );

    // -- Producers ----------------------------------------------------------
    let mut producers = JoinSet::new();
    for index in 0..config.producers {
        producers.spawn(run_producer(
            index,
            state.clone(),
            config.clone(),
            shutdown_rx.clone(),
        ));
    }

    while let Some(result) = producers.join_next().await {
        if let Err(e) = result {
            error!("Producer task failed: {}", e);
        }
    }
    info!(
        submitted = state.stats.submitted.load(Ordering::Relaxed),
        "Producers finished, stopping watchers"
    );

    // -- Cleanup ------------------------------------------------------------
    let _ = stop_tx.send(true);
    while let Some(result) = watchers.join_next().await {
        if let Err(e) = result {
            error!("Watcher task failed: {}", e);
        }
    }

    state
        .stats
        .snapshot(state.distributor.active_keys(), started.elapsed())
}

/// Consume updates for a single order until told to stop.
async fn run_watcher(
    state: SimState,
    mut reader: KeyedReader<OrderStatusChanged, Uuid>,
    order_id: Uuid,
    resubscribe_after: Option<u64>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut consumed = 0u64;

    loop {
        if *stop_rx.borrow() {
            break;
        }

        let event = tokio::select! {
            biased;

            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
                continue;
            }

            event = reader.recv() => event,
        };

        record_delivery(&state.stats, order_id, &event);
        consumed += 1;

        if resubscribe_after.is_some_and(|limit| consumed >= limit) {
            reader.unsubscribe();
            reader = state.distributor.subscribe(order_id);
            state.stats.resubscribes.fetch_add(1, Ordering::Relaxed);
            consumed = 0;
        }
    }

    // Drain whatever was routed before the stop signal.
    while let Some(event) = reader.consume() {
        record_delivery(&state.stats, order_id, &event);
    }
    reader.unsubscribe();
    debug!(%order_id, "Watcher stopped");
}

fn record_delivery(stats: &SimStats, order_id: Uuid, event: &OrderStatusChanged) {
    stats.delivered.fetch_add(1, Ordering::Relaxed);
    if event.order_id != order_id {
        stats.key_violations.fetch_add(1, Ordering::Relaxed);
        warn!(
            expected = %order_id,
            got = %event.order_id,
            seq = event.seq,
            "Watcher received an update for another order"
        );
    }
}

fn record_submission(stats: &SimStats, completion: &Completion) {
    stats.submitted.fetch_add(1, Ordering::Relaxed);
    // A watcher may already have consumed the event, so readiness alone
    // does not identify the fast path.
    if completion.same_signal(&Completion::ready()) {
        stats.completed_immediately.fetch_add(1, Ordering::Relaxed);
    }
}

/// Push `updates_per_producer` updates for randomly chosen orders.
async fn run_producer(
    index: usize,
    state: SimState,
    config: SimConfig,
    shutdown_rx: watch::Receiver<bool>,
) {
    let relay = StatusRelay::new(state.distributor.clone());
    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(index as u64));

    for seq in 0..config.updates_per_producer {
        if *shutdown_rx.borrow() {
            info!(producer = index, seq, "Producer stopping early");
            break;
        }

        let order_id = state.orders[rng.random_range(0..state.orders.len())];
        let event = OrderStatusChanged {
            order_id,
            seq,
            status: OrderStatus::for_sequence(seq),
        };

        let Ok(completion) = relay.process(event).await;
        record_submission(&state.stats, &completion);

        if let Some(timeout) = config.completion_timeout {
            if tokio::time::timeout(timeout, completion.wait()).await.is_err() {
                state.stats.completion_timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(producer = index, %order_id, seq, "Timed out waiting for completion");
            }
        } else if seq % 256 == 0 {
            tokio::task::yield_now().await;
        }
    }

    debug!(producer = index, "Producer finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> SimConfig {
        SimConfig {
            orders: 16,
            watched_orders: 4,
            watchers_per_order: 2,
            producers: 3,
            updates_per_producer: 300,
            completion_timeout: None,
            seed: 7,
            resubscribe_after: None,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_run_is_clean() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let report = run(&config(), shutdown_rx).await;

        assert!(report.is_clean());
        assert_eq!(report.submitted, 900);
        assert!(report.completed_immediately > 0);
        assert_eq!(report.live_keys_after, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_awaited_completions_with_churn() {
        let mut config = config();
        config.completion_timeout = Some(Duration::from_secs(5));
        config.resubscribe_after = Some(5);

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let report = run(&config, shutdown_rx).await;

        assert!(report.is_clean());
        assert_eq!(report.completion_timeouts, 0);
        assert!(report.resubscribes > 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_producers() {
        let (shutdown_tx, shutdown_rx) = watch::channel(true);
        let report = run(&config(), shutdown_rx).await;
        drop(shutdown_tx);

        assert_eq!(report.submitted, 0);
        assert!(report.is_clean());
    }

    #[test]
    fn test_consumed_submission_is_not_fast_path() {
        let state = SimState::new(2);
        let (watched, unwatched) = (state.orders[0], state.orders[1]);
        let mut reader = state.distributor.subscribe(watched);

        let routed = state.distributor.submit(OrderStatusChanged {
            order_id: watched,
            seq: 0,
            status: OrderStatus::Pending,
        });
        assert!(reader.consume().is_some());
        assert!(routed.is_ready());
        record_submission(&state.stats, &routed);

        let dropped = state.distributor.submit(OrderStatusChanged {
            order_id: unwatched,
            seq: 1,
            status: OrderStatus::Paid,
        });
        record_submission(&state.stats, &dropped);

        assert_eq!(state.stats.submitted.load(Ordering::Relaxed), 2);
        assert_eq!(state.stats.completed_immediately.load(Ordering::Relaxed), 1);
        reader.unsubscribe();
    }

    #[tokio::test]
    async fn test_watcher_drains_on_stop() {
        let state = SimState::new(1);
        let order_id = state.orders[0];
        let reader = state.distributor.subscribe(order_id);

        for seq in 0..3 {
            state.distributor.submit(OrderStatusChanged {
                order_id,
                seq,
                status: OrderStatus::for_sequence(seq),
            });
        }

        let (stop_tx, stop_rx) = watch::channel(true);
        run_watcher(state.clone(), reader, order_id, None, stop_rx).await;
        drop(stop_tx);

        assert_eq!(
            state.stats.delivered.load(Ordering::Relaxed),
            3
        );
        assert_eq!(state.distributor.active_keys(), 0);
    }
}
