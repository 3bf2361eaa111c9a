//! Startup race acceptance tests, run on paused tokio time so the 3000ms
//! deadline scenarios are exact and instant.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use caseboard_session::{BootstrapState, MemoryPressure, SessionBootstrapper};
use tokio::time::{sleep, Duration, Instant};

fn bootstrapper(deadline_ms: u64) -> SessionBootstrapper {
    SessionBootstrapper::new(Duration::from_millis(deadline_ms), MemoryPressure::new())
}

#[tokio::test(start_paused = true)]
async fn fast_init_reaches_ready_before_the_deadline() {
    let boot = bootstrapper(3000);
    let state = boot
        .start(async {
            sleep(Duration::from_millis(50)).await;
            Ok(())
        })
        .await;

    assert_eq!(state, BootstrapState::Ready);
}

#[tokio::test(start_paused = true)]
async fn slow_init_degrades_at_the_deadline_then_promotes_silently() {
    let boot = bootstrapper(3000);
    let mut status_rx = boot.subscribe();

    let started = Instant::now();
    let state = boot
        .start(async {
            sleep(Duration::from_millis(5000)).await;
            Ok(())
        })
        .await;

    // The caller got an answer at the deadline, not at init completion.
    assert_eq!(state, BootstrapState::Degraded);
    assert_eq!(started.elapsed(), Duration::from_millis(3000));

    // The background init finishes at 5000ms and promotes without any
    // caller-visible blocking in between.
    let promoted = status_rx
        .wait_for(|status| status.state == BootstrapState::Ready)
        .await
        .unwrap();
    assert_eq!(promoted.state, BootstrapState::Ready);
    assert!(started.elapsed() >= Duration::from_millis(5000));
}

#[tokio::test(start_paused = true)]
async fn outright_failure_degrades_immediately() {
    let boot = bootstrapper(3000);
    let started = Instant::now();

    let state = boot
        .start(async { Err("relay refused the subscription".to_string()) })
        .await;

    assert_eq!(state, BootstrapState::Degraded);
    // Failure is decided by the init, not the timer.
    assert!(started.elapsed() < Duration::from_millis(3000));
}

#[tokio::test(start_paused = true)]
async fn retry_reinitializes_and_can_reach_ready() {
    let boot = bootstrapper(3000);

    let state = boot.start(async { Err("cold start failed".to_string()) }).await;
    assert_eq!(state, BootstrapState::Degraded);

    let state = boot
        .retry(async {
            sleep(Duration::from_millis(20)).await;
            Ok(())
        })
        .await;
    assert_eq!(state, BootstrapState::Ready);
}

#[tokio::test(start_paused = true)]
async fn late_background_success_does_not_stomp_a_retry() {
    let boot = bootstrapper(1000);

    // First init is slow; session degrades at 1000ms with the init still
    // running toward 5000ms.
    let state = boot
        .start(async {
            sleep(Duration::from_millis(5000)).await;
            Ok(())
        })
        .await;
    assert_eq!(state, BootstrapState::Degraded);

    // An explicit retry wins quickly.
    let state = boot
        .retry(async {
            sleep(Duration::from_millis(100)).await;
            Ok(())
        })
        .await;
    assert_eq!(state, BootstrapState::Ready);
    let ready_since = boot.status().since;

    // When the original init finally completes it must not rewrite the
    // status the retry established.
    sleep(Duration::from_millis(6000)).await;
    let status = boot.status();
    assert_eq!(status.state, BootstrapState::Ready);
    assert_eq!(status.since, ready_since);
}

#[tokio::test(start_paused = true)]
async fn optional_subsystems_are_skipped_under_memory_pressure() {
    let pressure = MemoryPressure::new();
    let boot = SessionBootstrapper::new(Duration::from_millis(3000), pressure.clone());

    let started = Arc::new(AtomicBool::new(false));

    pressure.set_high(true);
    let flag = Arc::clone(&started);
    assert!(!boot.start_optional("behavior-analysis", async move {
        flag.store(true, Ordering::SeqCst);
    }));
    sleep(Duration::from_millis(10)).await;
    assert!(!started.load(Ordering::SeqCst), "skipped means never started");

    pressure.set_high(false);
    let flag = Arc::clone(&started);
    assert!(boot.start_optional("behavior-analysis", async move {
        flag.store(true, Ordering::SeqCst);
    }));
    sleep(Duration::from_millis(10)).await;
    assert!(started.load(Ordering::SeqCst));
}
