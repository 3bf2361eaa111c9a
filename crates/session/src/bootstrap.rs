// Session bootstrap state machine.
//
// Idle -> Initializing -> {Ready, Degraded}; either terminal state may go
// through Reinitializing on an explicit retry. Entering Initializing starts
// the real channel init and a fixed-duration timer and races them; the timer
// losing means full mode, the timer winning means degraded mode with the init
// left running in the background for a silent promotion.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use tokio::sync::watch;
use tokio::time::Duration;

use crate::memory::MemoryPressure;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BootstrapState {
    Idle,
    Initializing,
    Ready,
    Degraded,
    Reinitializing,
}

impl BootstrapState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BootstrapState::Idle => "idle",
            BootstrapState::Initializing => "initializing",
            BootstrapState::Ready => "ready",
            BootstrapState::Degraded => "degraded",
            BootstrapState::Reinitializing => "reinitializing",
        }
    }
}

/// What the UI sees on the status channel: current state and when it was
/// entered. Display-only; no data-layer semantics hang off this.
#[derive(Debug, Clone, Serialize)]
pub struct BootstrapStatus {
    pub state: BootstrapState,
    pub since: DateTime<Utc>,
}

pub struct SessionBootstrapper {
    deadline: Duration,
    pressure: MemoryPressure,
    status_tx: watch::Sender<BootstrapStatus>,
}

impl SessionBootstrapper {
    pub fn new(deadline: Duration, pressure: MemoryPressure) -> Self {
        let (status_tx, _) = watch::channel(BootstrapStatus {
            state: BootstrapState::Idle,
            since: Utc::now(),
        });
        Self {
            deadline,
            pressure,
            status_tx,
        }
    }

    pub fn status(&self) -> BootstrapStatus {
        self.status_tx.borrow().clone()
    }

    /// Subscribe to state transitions (the bootstrap status channel).
    pub fn subscribe(&self) -> watch::Receiver<BootstrapStatus> {
        self.status_tx.subscribe()
    }

    pub fn memory_pressure(&self) -> &MemoryPressure {
        &self.pressure
    }

    /// Run the startup race. Returns the state the session settled in for
    /// this phase; a Degraded return may still silently promote later.
    pub async fn start<F>(&self, init: F) -> BootstrapState
    where
        F: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.set_state(BootstrapState::Initializing);
        self.race(init).await
    }

    /// Explicit retry from Ready or Degraded.
    pub async fn retry<F>(&self, init: F) -> BootstrapState
    where
        F: Future<Output = Result<(), String>> + Send + 'static,
    {
        self.set_state(BootstrapState::Reinitializing);
        self.race(init).await
    }

    /// Start an optional subsystem (behavior analysis, threat detection, ...)
    /// unless the process is under memory pressure, in which case it is
    /// skipped entirely rather than started and torn down later.
    pub fn start_optional<F>(&self, name: &'static str, subsystem: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.pressure.is_high() {
            tracing::warn!(
                subsystem = name,
                "skipping optional subsystem under memory pressure"
            );
            return false;
        }
        tokio::spawn(subsystem);
        true
    }

    async fn race<F>(&self, init: F) -> BootstrapState
    where
        F: Future<Output = Result<(), String>> + Send + 'static,
    {
        let mut handle = tokio::spawn(init);
        let timer = tokio::time::sleep(self.deadline);
        tokio::pin!(timer);

        tokio::select! {
            // Ties favor success over timeout.
            biased;

            joined = &mut handle => match joined {
                Ok(Ok(())) => self.set_state(BootstrapState::Ready),
                Ok(Err(reason)) => {
                    // A channel that failed outright degrades immediately,
                    // independent of the timer. Never surfaced as an error.
                    tracing::warn!(%reason, "collaboration channel init failed; running degraded");
                    self.set_state(BootstrapState::Degraded);
                }
                Err(join_err) => {
                    tracing::warn!(error = %join_err, "collaboration channel init task died; running degraded");
                    self.set_state(BootstrapState::Degraded);
                }
            },

            _ = &mut timer => {
                tracing::warn!(
                    deadline_ms = self.deadline.as_millis() as u64,
                    "collaboration channel init exceeded deadline; running degraded"
                );
                self.set_state(BootstrapState::Degraded);

                // The real init keeps going. If it eventually succeeds the
                // session promotes to Ready without blocking or alerting
                // anyone; a later retry() supersedes the promotion.
                let status_tx = self.status_tx.clone();
                tokio::spawn(async move {
                    match handle.await {
                        Ok(Ok(())) => {
                            let promoted = status_tx.send_if_modified(|status| {
                                if status.state == BootstrapState::Degraded {
                                    *status = BootstrapStatus {
                                        state: BootstrapState::Ready,
                                        since: Utc::now(),
                                    };
                                    true
                                } else {
                                    false
                                }
                            });
                            if promoted {
                                tracing::info!("collaboration channel ready after degraded start");
                            }
                        }
                        Ok(Err(reason)) => {
                            tracing::warn!(%reason, "background channel init failed; staying degraded");
                        }
                        Err(join_err) => {
                            tracing::warn!(error = %join_err, "background channel init task died");
                        }
                    }
                });
            }
        }

        self.status().state
    }

    fn set_state(&self, state: BootstrapState) {
        self.status_tx.send_replace(BootstrapStatus {
            state,
            since: Utc::now(),
        });
        tracing::info!(state = state.as_str(), "bootstrap state changed");
    }
}
