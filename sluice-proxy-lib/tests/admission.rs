use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sluice_proxy_lib::{AdmissionGate, DrainOutcome, GateConfig, GateError, GateState};
use tokio::time::{sleep, Instant};

type TestResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

fn gate(requests_per_second: u32) -> AdmissionGate {
    AdmissionGate::new(GateConfig::new(requests_per_second), None)
}

#[tokio::test(start_paused = true)]
async fn releases_in_submission_order_regardless_of_latency() -> TestResult<()> {
    let gate = gate(50);
    let started = Arc::new(Mutex::new(Vec::new()));

    let mut pending = Vec::new();
    for i in 0..10u64 {
        let started = Arc::clone(&started);
        pending.push(gate.submit(move || async move {
            if let Ok(mut s) = started.lock() {
                s.push(i);
            }
            // Later tasks finish before earlier ones.
            sleep(Duration::from_millis(200 - i * 15)).await;
            i
        }));
    }

    for (expected, admission) in pending.into_iter().enumerate() {
        assert_eq!(admission.await?, expected as u64);
    }

    let order = started.lock().map(|s| s.clone()).unwrap_or_default();
    assert_eq!(order, (0..10).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn consecutive_releases_are_spaced_by_min_interval() -> TestResult<()> {
    let gate = gate(20);
    let interval = gate.config().min_interval();
    assert_eq!(interval, Duration::from_millis(50));

    let mut pending = Vec::new();
    for _ in 0..8 {
        pending.push(gate.submit(|| async { Instant::now() }));
    }

    let mut releases = Vec::new();
    for admission in pending {
        releases.push(admission.await?);
    }

    for pair in releases.windows(2) {
        assert!(pair[1].duration_since(pair[0]) >= interval);
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn burst_is_paced_over_time() -> TestResult<()> {
    let gate = gate(10);
    let start = Instant::now();

    let mut pending = Vec::new();
    for i in 0..30 {
        pending.push(gate.submit(move || async move { i }));
    }

    let counts = gate.counts();
    assert_eq!(counts.queued, 30);
    assert!(counts.running <= 1);

    for admission in pending {
        admission.await?;
    }

    // First release is immediate, the other 29 wait 100ms each.
    assert!(start.elapsed() >= Duration::from_millis(2900));
    let counts = gate.counts();
    assert_eq!(counts.queued, 0);
    assert_eq!(counts.running, 0);
    assert_eq!(counts.completed, 30);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn idle_gate_releases_first_task_immediately() -> TestResult<()> {
    let gate = gate(1);
    sleep(Duration::from_secs(5)).await;

    let start = Instant::now();
    gate.submit(|| async {}).await?;
    assert!(start.elapsed() < Duration::from_millis(10));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn drain_waits_for_queued_and_running_work() -> TestResult<()> {
    let gate = gate(100);
    let finished = Arc::new(AtomicUsize::new(0));

    let mut pending = Vec::new();
    for _ in 0..5 {
        let finished = Arc::clone(&finished);
        pending.push(gate.submit(move || async move {
            sleep(Duration::from_millis(200)).await;
            finished.fetch_add(1, Ordering::SeqCst);
        }));
    }

    let start = Instant::now();
    let outcome = gate.drain(Duration::from_secs(10)).await;

    assert_eq!(outcome, DrainOutcome::Drained);
    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(finished.load(Ordering::SeqCst), 5);
    assert_eq!(gate.state(), GateState::Closed);
    for admission in pending {
        admission.await?;
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn drain_on_idle_gate_returns_at_once() -> TestResult<()> {
    let gate = gate(100);
    let start = Instant::now();
    assert!(gate.drain(Duration::from_secs(10)).await.is_drained());
    assert_eq!(start.elapsed(), Duration::ZERO);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn concurrent_drains_share_one_outcome() -> TestResult<()> {
    let gate = gate(10);
    let runs = Arc::new(AtomicUsize::new(0));

    let mut pending = Vec::new();
    for _ in 0..4 {
        let runs = Arc::clone(&runs);
        pending.push(gate.submit(move || async move {
            runs.fetch_add(1, Ordering::SeqCst);
        }));
    }

    let (first, second) = tokio::join!(
        gate.drain(Duration::from_secs(10)),
        gate.drain(Duration::from_secs(10))
    );
    assert!(first.is_drained());
    assert!(second.is_drained());
    assert_eq!(runs.load(Ordering::SeqCst), 4);
    assert_eq!(gate.counts().completed, 4);

    // Draining a closed gate is a no-op.
    assert!(gate.drain(Duration::from_secs(10)).await.is_drained());
    assert_eq!(runs.load(Ordering::SeqCst), 4);
    for admission in pending {
        admission.await?;
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn submissions_during_drain_are_rejected_without_queueing() -> TestResult<()> {
    let gate = gate(10);
    let slow = gate.submit(|| async { sleep(Duration::from_millis(300)).await });

    let drainer = {
        let gate = gate.clone();
        tokio::spawn(async move { gate.drain(Duration::from_secs(10)).await })
    };
    sleep(Duration::from_millis(10)).await;
    assert_eq!(gate.state(), GateState::Draining);
    assert!(!gate.is_accepting());

    let late = gate.submit(|| async { "never runs" });
    assert!(late.is_rejected());
    assert_eq!(late.await, Err(GateError::Draining));

    let counts = gate.counts();
    assert_eq!(counts.queued, 0);
    assert_eq!(counts.rejected, 1);

    assert!(drainer.await?.is_drained());
    slow.await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn check_accepting_refuses_once_draining() -> TestResult<()> {
    let gate = gate(10);
    assert_eq!(gate.check_accepting(), Ok(()));
    assert_eq!(gate.counts().rejected, 0);

    assert!(gate.drain(Duration::from_secs(1)).await.is_drained());
    assert_eq!(gate.check_accepting(), Err(GateError::Draining));
    assert_eq!(gate.counts().rejected, 1);
    assert_eq!(gate.counts().queued, 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn drain_deadline_abandons_unreleased_tasks() -> TestResult<()> {
    let gate = gate(1);
    let ran = Arc::new(AtomicUsize::new(0));

    let mut pending = Vec::new();
    for _ in 0..3 {
        let ran = Arc::clone(&ran);
        pending.push(gate.submit(move || async move {
            ran.fetch_add(1, Ordering::SeqCst);
        }));
    }

    let outcome = gate.drain(Duration::from_millis(500)).await;
    assert_eq!(outcome, DrainOutcome::TimedOut { queued: 2, running: 0 });

    let mut results = Vec::new();
    for admission in pending {
        results.push(admission.await);
    }
    assert_eq!(results, vec![Ok(()), Err(GateError::Abandoned), Err(GateError::Abandoned)]);

    // Nothing abandoned is released later.
    sleep(Duration::from_secs(5)).await;
    assert_eq!(ran.load(Ordering::SeqCst), 1);
    assert_eq!(gate.counts().rejected, 2);
    assert_eq!(gate.state(), GateState::Closed);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn drain_deadline_reports_tasks_still_running() -> TestResult<()> {
    let gate = gate(100);
    let long = gate.submit(|| async { sleep(Duration::from_secs(30)).await });

    let outcome = gate.drain(Duration::from_secs(1)).await;
    assert_eq!(outcome, DrainOutcome::TimedOut { queued: 0, running: 1 });

    // A running task is never cancelled by the gate.
    long.await?;
    assert_eq!(gate.counts().running, 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn max_concurrent_caps_running_tasks() -> TestResult<()> {
    let gate = AdmissionGate::new(
        GateConfig { requests_per_second: 1000, max_concurrent: Some(2) },
        None,
    );
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let mut pending = Vec::new();
    for _ in 0..6 {
        let current = Arc::clone(&current);
        let peak = Arc::clone(&peak);
        pending.push(gate.submit(move || async move {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            sleep(Duration::from_millis(100)).await;
            current.fetch_sub(1, Ordering::SeqCst);
        }));
    }
    for admission in pending {
        admission.await?;
    }

    assert_eq!(peak.load(Ordering::SeqCst), 2);
    assert!(start.elapsed() >= Duration::from_millis(300));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn dropping_the_admission_does_not_withdraw_the_task() -> TestResult<()> {
    let gate = gate(10);
    let ran = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let ran = Arc::clone(&ran);
        drop(gate.submit(move || async move {
            ran.fetch_add(1, Ordering::SeqCst);
        }));
    }

    assert!(gate.drain(Duration::from_secs(10)).await.is_drained());
    assert_eq!(ran.load(Ordering::SeqCst), 3);
    Ok(())
}
