//! Client-local registration rate limiting.
//!
//! Two independently configured policies cooperate: a per-day cap and a
//! fingerprint-scoped rolling-window cap. They are composed by the caller
//! and never share constants or state. State lives in a small JSON file
//! per policy; it is advisory, device-local, and has no cross-process
//! coordination (two concurrent callers can both observe "under limit").

use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A named quota: at most `max_registrations` check-ins per rolling
/// window of `window_days` days.
#[derive(Debug, Clone, Copy)]
pub struct LimiterPolicy {
    pub name: &'static str,
    pub max_registrations: u32,
    pub window_days: i64,
}

/// Persisted per-device quota state. The window starts at the first
/// registration and expires `window_days` later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitState {
    pub fingerprint: String,
    pub count: u32,
    pub first_registration_date: NaiveDate,
    pub last_registration_date: NaiveDate,
}

/// Outcome of a limit check, shaped for direct display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimiterStatus {
    pub can_register: bool,
    pub remaining: u32,
    pub message: String,
}

fn window_expired(policy: &LimiterPolicy, state: &RateLimitState, today: NaiveDate) -> bool {
    (today - state.first_registration_date).num_days() > policy.window_days
}

/// Evaluate the quota without mutating anything. Repeated calls always
/// return the same answer until `record_registration` runs.
pub fn check_limit(
    policy: &LimiterPolicy,
    state: Option<&RateLimitState>,
    fingerprint: &str,
    today: NaiveDate,
) -> LimiterStatus {
    let fresh = LimiterStatus {
        can_register: true,
        remaining: policy.max_registrations,
        message: format!(
            "{} of {} registrations available",
            policy.max_registrations, policy.max_registrations
        ),
    };

    let state = match state {
        Some(state) if state.fingerprint == fingerprint => state,
        // No prior state, or state from a different device profile.
        _ => return fresh,
    };

    if window_expired(policy, state, today) {
        return fresh;
    }

    if state.count < policy.max_registrations {
        let remaining = policy.max_registrations - state.count;
        LimiterStatus {
            can_register: true,
            remaining,
            message: format!(
                "{remaining} of {} registrations available",
                policy.max_registrations
            ),
        }
    } else {
        LimiterStatus {
            can_register: false,
            remaining: 0,
            message: format!(
                "limit of {} registrations per {} day(s) reached, resets {} day(s) after {}",
                policy.max_registrations,
                policy.window_days,
                policy.window_days,
                state.first_registration_date
            ),
        }
    }
}

/// Account for a completed registration. Starts a fresh window when none
/// exists, the stored fingerprint differs, or the window has expired;
/// otherwise increments the counter in place.
pub fn record_registration(
    policy: &LimiterPolicy,
    state: Option<RateLimitState>,
    fingerprint: &str,
    today: NaiveDate,
) -> RateLimitState {
    match state {
        Some(mut state)
            if state.fingerprint == fingerprint && !window_expired(policy, &state, today) =>
        {
            state.count += 1;
            state.last_registration_date = today;
            state
        }
        _ => RateLimitState {
            fingerprint: fingerprint.to_string(),
            count: 1,
            first_registration_date: today,
            last_registration_date: today,
        },
    }
}

/// File-backed store for limiter state, one JSON blob per policy name.
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, policy: &LimiterPolicy) -> PathBuf {
        self.dir.join(format!("{}.json", policy.name))
    }

    /// Load state for a policy. Missing, unreadable, or corrupt state is
    /// treated as no prior state: the limiter fails open rather than
    /// locking a device out or crashing.
    pub fn load(&self, policy: &LimiterPolicy) -> Option<RateLimitState> {
        let path = self.path_for(policy);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!("unreadable limiter state at {}: {err}", path.display());
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(state) => Some(state),
            Err(err) => {
                warn!("corrupt limiter state at {}: {err}", path.display());
                None
            }
        }
    }

    pub fn save(&self, policy: &LimiterPolicy, state: &RateLimitState) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let raw = serde_json::to_string_pretty(state).expect("limiter state serializes");
        std::fs::write(self.path_for(policy), raw)
    }
}
