use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use tracing::warn;

use crate::ratelimit::LimiterPolicy;

/// Runtime settings outside the database URL: where limiter state lives
/// and the two registration quota policies. Everything has a default so
/// the tool runs with no environment beyond `DATABASE_URL`.
pub struct Config {
    pub state_dir: PathBuf,
    pub daily_cap: LimiterPolicy,
    pub rolling_window_cap: LimiterPolicy,
}

impl Config {
    pub fn load() -> Self {
        Self {
            state_dir: PathBuf::from(load_or(
                "ATTENDANCE_STATE_DIR",
                ".attendance-state".to_string(),
            )),
            // Two deliberately separate policies: a short per-day cap and a
            // fingerprint-scoped rolling cap. Their constants are independent
            // and must not be unified.
            daily_cap: LimiterPolicy {
                name: "daily-cap",
                max_registrations: load_or("ATTENDANCE_DAILY_MAX", 5),
                window_days: 1,
            },
            rolling_window_cap: LimiterPolicy {
                name: "rolling-window-cap",
                max_registrations: load_or("ATTENDANCE_WINDOW_MAX", 3),
                window_days: load_or("ATTENDANCE_WINDOW_DAYS", 30),
            },
        }
    }
}

fn load_or<T: FromStr + Display>(key: &str, default: T) -> T
where
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|err| {
            warn!("invalid {key} value '{raw}' ({err}), using default {default}");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_environment() {
        let config = Config::load();
        assert_eq!(config.daily_cap.window_days, 1);
        assert_eq!(config.rolling_window_cap.name, "rolling-window-cap");
        assert_ne!(
            config.daily_cap.max_registrations,
            0,
            "a zero cap would deny everything"
        );
    }
}
