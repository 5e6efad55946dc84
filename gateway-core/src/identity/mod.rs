//! Identity and quota gate.
//!
//! Resolves an API key to an identity, then checks the identity's usage plan:
//! a token-bucket throttle (sustained rate + burst) and an optional fixed
//! calendar-window quota. Throttle state lives in per-identity `governor`
//! limiters; quota counters use an atomic check-and-increment so concurrent
//! requests never under-admit a legitimate caller.

use anyhow::Context;
use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone, Utc};
use dashmap::DashMap;
use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type UnkeyedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// A caller identity. The key value is the secret callers present in
/// `x-api-key`; `id` is the loggable name.
pub struct Identity {
    pub id: String,
    pub key: Secret<String>,
    pub enabled: bool,
    pub plan: String,
    /// Billing/ownership tag, surfaced in logs but never used for matching.
    pub customer: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>, key: impl Into<String>, plan: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key: Secret::new(key.into()),
            enabled: true,
            plan: plan.into(),
            customer: None,
        }
    }

    pub fn with_customer(mut self, customer: impl Into<String>) -> Self {
        self.customer = Some(customer.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Throttle {
    pub rate_per_second: u32,
    pub burst: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaPeriod {
    Day,
    Week,
    Month,
}

impl QuotaPeriod {
    /// Start of the fixed window containing `now`. Windows are calendar
    /// aligned (midnight UTC, Monday, first of month), not sliding.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let date = now.date_naive();
        let start = match self {
            QuotaPeriod::Day => date,
            QuotaPeriod::Week => {
                date - chrono::Duration::days(date.weekday().num_days_from_monday() as i64)
            }
            QuotaPeriod::Month => {
                NaiveDate::from_ymd_opt(date.year(), date.month(), 1).expect("first of month")
            }
        };
        Utc.from_utc_datetime(&start.and_hms_opt(0, 0, 0).expect("midnight"))
    }

    pub fn next_reset(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let start = self.window_start(now).date_naive();
        let next = match self {
            QuotaPeriod::Day => start + Days::new(1),
            QuotaPeriod::Week => start + Days::new(7),
            QuotaPeriod::Month => {
                if start.month() == 12 {
                    NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(start.year(), start.month() + 1, 1)
                }
                .expect("first of month")
            }
        };
        Utc.from_utc_datetime(&next.and_hms_opt(0, 0, 0).expect("midnight"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimit {
    pub limit: u64,
    pub period: QuotaPeriod,
}

/// One route as the usage plan sees it, e.g. `GET /stock`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteKey {
    pub method: String,
    pub path: String,
}

impl RouteKey {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// A bundle of limits many identities can share. Method overrides replace the
/// plan-level throttle for that route only; the quota stays plan-wide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsagePlan {
    pub id: String,
    pub throttle: Throttle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<QuotaLimit>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub method_overrides: HashMap<RouteKey, Throttle>,
}

impl UsagePlan {
    pub fn new(id: impl Into<String>, throttle: Throttle) -> Self {
        Self {
            id: id.into(),
            throttle,
            quota: None,
            method_overrides: HashMap::new(),
        }
    }

    pub fn with_quota(mut self, quota: QuotaLimit) -> Self {
        self.quota = Some(quota);
        self
    }

    pub fn with_method_override(mut self, route: RouteKey, throttle: Throttle) -> Self {
        self.method_overrides.insert(route, throttle);
        self
    }

    fn throttle_for(&self, route: &RouteKey) -> (&Throttle, Option<&RouteKey>) {
        match self.method_overrides.get_key_value(route) {
            Some((key, throttle)) => (throttle, Some(key)),
            None => (&self.throttle, None),
        }
    }
}

/// Why a request was refused. Terminal for the request; callers own backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    InvalidKey,
    Throttled { retry_after: Duration },
    QuotaExceeded { resets_at: DateTime<Utc> },
}

impl Rejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::InvalidKey => "invalid-key",
            Rejection::Throttled { .. } => "throttled",
            Rejection::QuotaExceeded { .. } => "quota-exceeded",
        }
    }
}

/// Outcome of a successful authorization, for logging and metrics labels.
#[derive(Debug, Clone)]
pub struct Authorized {
    pub identity_id: String,
    pub plan_id: String,
}

struct QuotaWindow {
    window_start: Mutex<DateTime<Utc>>,
    used: AtomicU64,
}

impl QuotaWindow {
    fn new(window_start: DateTime<Utc>) -> Self {
        Self {
            window_start: Mutex::new(window_start),
            used: AtomicU64::new(0),
        }
    }

    /// Atomic check-and-increment against `limit` for the window starting at
    /// `window_start`. Rolls the counter over when the window has advanced.
    fn try_use(&self, window_start: DateTime<Utc>, limit: u64) -> bool {
        {
            let mut current = self.window_start.lock().expect("quota window lock poisoned");
            if *current != window_start {
                self.used.store(0, Ordering::Release);
                *current = window_start;
            }
        }

        loop {
            let used = self.used.load(Ordering::Acquire);
            if used >= limit {
                return false;
            }
            if self
                .used
                .compare_exchange_weak(used, used + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }
}

fn build_limiter(throttle: &Throttle) -> UnkeyedRateLimiter {
    let rate = NonZeroU32::new(throttle.rate_per_second.max(1)).expect("rate is non-zero");
    let burst = NonZeroU32::new(throttle.burst.max(1)).expect("burst is non-zero");
    Arc::new(RateLimiter::direct(Quota::per_second(rate).allow_burst(burst)))
}

/// The gate itself. Identities and plans are fixed at construction; only the
/// limiter and quota state mutate afterwards.
pub struct IdentityGate {
    identities: HashMap<String, Identity>,
    plans: HashMap<String, UsagePlan>,
    limiters: DashMap<(String, Option<RouteKey>), UnkeyedRateLimiter>,
    quotas: DashMap<String, Arc<QuotaWindow>>,
}

impl IdentityGate {
    pub fn new(plans: Vec<UsagePlan>, identities: Vec<Identity>) -> anyhow::Result<Self> {
        let plans: HashMap<String, UsagePlan> =
            plans.into_iter().map(|p| (p.id.clone(), p)).collect();

        for identity in &identities {
            plans
                .get(&identity.plan)
                .with_context(|| {
                    format!(
                        "identity '{}' references unknown usage plan '{}'",
                        identity.id, identity.plan
                    )
                })?;
        }

        let identities = identities
            .into_iter()
            .map(|i| (i.key.expose_secret().clone(), i))
            .collect();

        Ok(Self {
            identities,
            plans,
            limiters: DashMap::new(),
            quotas: DashMap::new(),
        })
    }

    /// Authorize one request presented with `api_key` against `route`.
    ///
    /// `now` drives quota windows; the token bucket runs on its own
    /// monotonic clock.
    pub fn authorize(
        &self,
        api_key: &str,
        route: &RouteKey,
        now: DateTime<Utc>,
    ) -> Result<Authorized, Rejection> {
        let identity = match self.identities.get(api_key) {
            Some(identity) if identity.enabled => identity,
            _ => return Err(Rejection::InvalidKey),
        };

        let plan = match self.plans.get(&identity.plan) {
            Some(plan) => plan,
            None => {
                tracing::warn!(identity = %identity.id, plan = %identity.plan, "plan vanished");
                return Err(Rejection::InvalidKey);
            }
        };

        let (throttle, override_route) = plan.throttle_for(route);
        let limiter_key = (identity.id.clone(), override_route.cloned());
        let limiter = self
            .limiters
            .entry(limiter_key)
            .or_insert_with(|| build_limiter(throttle))
            .clone();

        if let Err(negative) = limiter.check() {
            let retry_after = negative.wait_time_from(DefaultClock::default().now());
            return Err(Rejection::Throttled { retry_after });
        }

        if let Some(quota) = &plan.quota {
            let window_start = quota.period.window_start(now);
            let window = self
                .quotas
                .entry(identity.id.clone())
                .or_insert_with(|| Arc::new(QuotaWindow::new(window_start)))
                .clone();
            if !window.try_use(window_start, quota.limit) {
                return Err(Rejection::QuotaExceeded {
                    resets_at: quota.period.next_reset(now),
                });
            }
        }

        Ok(Authorized {
            identity_id: identity.id.clone(),
            plan_id: plan.id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn route() -> RouteKey {
        RouteKey::new("GET", "/stock")
    }

    fn gate_with(plan: UsagePlan) -> IdentityGate {
        let identities = vec![
            Identity::new("key-orders", "super-secret-api-key", plan.id.clone()),
            Identity::new("key-retired", "retired-key", plan.id.clone()).disabled(),
        ];
        IdentityGate::new(vec![plan], identities).expect("valid gate config")
    }

    #[test]
    fn unknown_key_is_invalid() {
        let gate = gate_with(UsagePlan::new(
            "standard",
            Throttle {
                rate_per_second: 10,
                burst: 2,
            },
        ));
        let rejection = gate
            .authorize("no-such-key", &route(), Utc::now())
            .unwrap_err();
        assert_eq!(rejection.reason(), "invalid-key");
    }

    #[test]
    fn disabled_key_is_invalid_regardless_of_limits() {
        let gate = gate_with(UsagePlan::new(
            "standard",
            Throttle {
                rate_per_second: 1000,
                burst: 1000,
            },
        ));
        let rejection = gate.authorize("retired-key", &route(), Utc::now()).unwrap_err();
        assert_eq!(rejection, Rejection::InvalidKey);
    }

    #[test]
    fn burst_capacity_admits_then_throttles() {
        let gate = gate_with(UsagePlan::new(
            "standard",
            Throttle {
                rate_per_second: 10,
                burst: 2,
            },
        ));
        let now = Utc::now();

        assert!(gate.authorize("super-secret-api-key", &route(), now).is_ok());
        assert!(gate.authorize("super-secret-api-key", &route(), now).is_ok());

        let rejection = gate
            .authorize("super-secret-api-key", &route(), now)
            .unwrap_err();
        assert_eq!(rejection.reason(), "throttled");
    }

    #[test]
    fn throttled_key_is_readmitted_after_refill() {
        let gate = gate_with(UsagePlan::new(
            "standard",
            Throttle {
                rate_per_second: 10,
                burst: 1,
            },
        ));

        assert!(gate
            .authorize("super-secret-api-key", &route(), Utc::now())
            .is_ok());
        let rejection = gate
            .authorize("super-secret-api-key", &route(), Utc::now())
            .unwrap_err();
        assert_eq!(rejection.reason(), "throttled");

        // At 10 req/s a token refills every 100ms.
        std::thread::sleep(std::time::Duration::from_millis(300));
        assert!(gate
            .authorize("super-secret-api-key", &route(), Utc::now())
            .is_ok());
    }

    #[test]
    fn quota_rejects_for_remainder_of_window_then_resets() {
        let plan = UsagePlan::new(
            "metered",
            Throttle {
                rate_per_second: 1000,
                burst: 1000,
            },
        )
        .with_quota(QuotaLimit {
            limit: 3,
            period: QuotaPeriod::Day,
        });
        let gate = gate_with(plan);
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 9, 30, 0).unwrap();

        for _ in 0..3 {
            assert!(gate.authorize("super-secret-api-key", &route(), now).is_ok());
        }

        match gate.authorize("super-secret-api-key", &route(), now) {
            Err(Rejection::QuotaExceeded { resets_at }) => {
                assert_eq!(resets_at, Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap());
            }
            other => panic!("expected quota rejection, got {other:?}"),
        }

        let next_day = Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 1).unwrap();
        assert!(gate
            .authorize("super-secret-api-key", &route(), next_day)
            .is_ok());
    }

    #[test]
    fn method_override_gets_its_own_bucket() {
        let plan = UsagePlan::new(
            "standard",
            Throttle {
                rate_per_second: 1000,
                burst: 1000,
            },
        )
        .with_method_override(
            route(),
            Throttle {
                rate_per_second: 10,
                burst: 1,
            },
        );
        let gate = gate_with(plan);
        let now = Utc::now();

        assert!(gate.authorize("super-secret-api-key", &route(), now).is_ok());
        let rejection = gate
            .authorize("super-secret-api-key", &route(), now)
            .unwrap_err();
        assert_eq!(rejection.reason(), "throttled");

        // Other routes still ride the plan-level bucket.
        let other = RouteKey::new("POST", "/stock/reserve");
        assert!(gate.authorize("super-secret-api-key", &other, now).is_ok());
    }

    #[test]
    fn week_and_month_windows_align_to_calendar() {
        let wednesday = Utc.with_ymd_and_hms(2024, 3, 13, 15, 0, 0).unwrap();
        assert_eq!(
            QuotaPeriod::Week.window_start(wednesday),
            Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap()
        );
        assert_eq!(
            QuotaPeriod::Month.window_start(wednesday),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            QuotaPeriod::Month.next_reset(Utc.with_ymd_and_hms(2024, 12, 10, 0, 0, 0).unwrap()),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn identity_with_unknown_plan_is_a_construction_error() {
        let result = IdentityGate::new(
            Vec::new(),
            vec![Identity::new("key-orders", "k", "missing-plan")],
        );
        assert!(result.is_err());
    }
}
