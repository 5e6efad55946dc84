//! Target registry with health state and draining.
//!
//! Targets earn traffic through the health checker: a new target starts in
//! `Initial` and only reaches `Healthy` after the configured number of
//! consecutive passing probes. Synchronization never hard-removes a target
//! in one step; a target leaving the desired set stops receiving new
//! connections immediately and is forgotten once its drain window elapses.

use serde::Serialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Initial,
    Healthy,
    Unhealthy,
}

#[derive(Debug)]
struct ProbeRecord {
    state: HealthState,
    consecutive_passes: u32,
    consecutive_failures: u32,
    last_checked: Option<Instant>,
}

/// One routable backend address.
#[derive(Debug)]
pub struct Target {
    addr: SocketAddr,
    probes: Mutex<ProbeRecord>,
}

impl Target {
    fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            probes: Mutex::new(ProbeRecord {
                state: HealthState::Initial,
                consecutive_passes: 0,
                consecutive_failures: 0,
                last_checked: None,
            }),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn health(&self) -> HealthState {
        self.probes.lock().expect("probe lock poisoned").state
    }

    pub fn last_checked(&self) -> Option<Instant> {
        self.probes.lock().expect("probe lock poisoned").last_checked
    }

    /// Record one probe outcome. Returns the new state when this probe
    /// crossed a threshold; a single flaky probe never flips state.
    pub fn record_probe(
        &self,
        pass: bool,
        healthy_threshold: u32,
        unhealthy_threshold: u32,
    ) -> Option<HealthState> {
        let mut probes = self.probes.lock().expect("probe lock poisoned");
        probes.last_checked = Some(Instant::now());

        if pass {
            probes.consecutive_failures = 0;
            probes.consecutive_passes = probes.consecutive_passes.saturating_add(1);
            if probes.consecutive_passes >= healthy_threshold
                && probes.state != HealthState::Healthy
            {
                probes.state = HealthState::Healthy;
                return Some(HealthState::Healthy);
            }
        } else {
            probes.consecutive_passes = 0;
            probes.consecutive_failures = probes.consecutive_failures.saturating_add(1);
            if probes.consecutive_failures >= unhealthy_threshold
                && probes.state != HealthState::Unhealthy
            {
                probes.state = HealthState::Unhealthy;
                return Some(HealthState::Unhealthy);
            }
        }
        None
    }
}

#[derive(Debug)]
struct DrainingTarget {
    target: Arc<Target>,
    deadline: Instant,
}

/// What one synchronization pass changed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub added: Vec<SocketAddr>,
    pub drained: Vec<SocketAddr>,
}

impl SyncOutcome {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.drained.is_empty()
    }
}

/// The router's current view of its backends.
pub struct TargetGroup {
    targets: RwLock<Vec<Arc<Target>>>,
    draining: Mutex<Vec<DrainingTarget>>,
    next: AtomicUsize,
    drain_timeout: Duration,
}

impl TargetGroup {
    pub fn new(drain_timeout: Duration) -> Self {
        Self {
            targets: RwLock::new(Vec::new()),
            draining: Mutex::new(Vec::new()),
            next: AtomicUsize::new(0),
            drain_timeout,
        }
    }

    /// Snapshot of the active (non-draining) targets.
    pub fn targets(&self) -> Vec<Arc<Target>> {
        self.targets.read().expect("target lock poisoned").clone()
    }

    pub fn healthy_count(&self) -> usize {
        self.targets()
            .iter()
            .filter(|t| t.health() == HealthState::Healthy)
            .count()
    }

    pub fn draining_count(&self) -> usize {
        self.draining.lock().expect("drain lock poisoned").len()
    }

    /// Round-robin pick among healthy targets. `None` when nothing is
    /// eligible; callers refuse the connection rather than queue.
    pub fn pick_healthy(&self) -> Option<Arc<Target>> {
        let healthy: Vec<Arc<Target>> = self
            .targets
            .read()
            .expect("target lock poisoned")
            .iter()
            .filter(|t| t.health() == HealthState::Healthy)
            .cloned()
            .collect();

        if healthy.is_empty() {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % healthy.len();
        Some(healthy[index].clone())
    }

    /// Converge the active set toward `desired`. New addresses join in
    /// `Initial`; departed addresses move to the drain list with a deadline
    /// of `now` plus the drain timeout. Idempotent: replaying with the same
    /// addresses is a no-op.
    pub fn sync(&self, desired: &[SocketAddr], now: Instant) -> SyncOutcome {
        let desired_set: HashSet<SocketAddr> = desired.iter().copied().collect();
        let mut outcome = SyncOutcome::default();

        let mut targets = self.targets.write().expect("target lock poisoned");
        let current: HashSet<SocketAddr> = targets.iter().map(|t| t.addr()).collect();

        for addr in &desired_set {
            if !current.contains(addr) {
                targets.push(Arc::new(Target::new(*addr)));
                outcome.added.push(*addr);
            }
        }

        let mut draining = self.draining.lock().expect("drain lock poisoned");
        targets.retain(|target| {
            if desired_set.contains(&target.addr()) {
                true
            } else {
                outcome.drained.push(target.addr());
                draining.push(DrainingTarget {
                    target: target.clone(),
                    deadline: now + self.drain_timeout,
                });
                false
            }
        });

        outcome.added.sort();
        outcome.drained.sort();
        outcome
    }

    /// Drop draining targets whose window has elapsed. In-flight
    /// connections already forwarded to them run to completion regardless.
    pub fn reap_drained(&self, now: Instant) -> Vec<SocketAddr> {
        let mut draining = self.draining.lock().expect("drain lock poisoned");
        let mut removed = Vec::new();
        draining.retain(|entry| {
            if entry.deadline <= now {
                removed.push(entry.target.addr());
                false
            } else {
                true
            }
        });
        removed
    }
}
