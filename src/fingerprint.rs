//! Device fingerprinting for registration abuse deterrence.
//!
//! The fingerprint is a deterrent, not an identity proof: the same
//! environment yields the same value, different environments usually
//! differ, and collisions are acceptable. Nothing here touches the
//! network or raises for a missing signal.

use sha2::{Digest, Sha256};

/// Placeholder substituted for any signal the environment cannot provide.
const UNAVAILABLE: &str = "unavailable";

/// Ambient environment signals feeding the fingerprint. Field order is
/// significant: the digest covers the signals joined in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintSignals {
    pub agent: String,
    pub locale: String,
    pub platform: String,
    pub screen: String,
    pub color_depth: String,
    pub timezone: String,
    pub render_sample: String,
}

impl FingerprintSignals {
    /// Collect signals from the current environment. Every lookup that can
    /// fail falls back to a fixed placeholder so collection never errors.
    pub fn collect() -> Self {
        Self {
            agent: env_or(&["TERM_PROGRAM", "TERM"]),
            locale: env_or(&["LC_ALL", "LANG"]),
            platform: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
            screen: env_or(&["COLUMNS"]),
            color_depth: env_or(&["COLORTERM"]),
            timezone: env_or(&["TZ"]),
            render_sample: render_sample(),
        }
    }

    fn joined(&self) -> String {
        [
            self.agent.as_str(),
            self.locale.as_str(),
            self.platform.as_str(),
            self.screen.as_str(),
            self.color_depth.as_str(),
            self.timezone.as_str(),
            self.render_sample.as_str(),
        ]
        .join("|")
    }
}

/// Derive the opaque fingerprint string from a set of signals.
pub fn generate(signals: &FingerprintSignals) -> String {
    let digest = sha256_hex(signals.joined().as_bytes());
    digest[..16].to_string()
}

/// Fingerprint of the current environment.
pub fn from_env() -> String {
    generate(&FingerprintSignals::collect())
}

fn env_or(keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| std::env::var(key).ok())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| UNAVAILABLE.to_string())
}

/// Floating-point rendering can vary subtly per platform; the formatted
/// digits fold that variation into the fingerprint.
fn render_sample() -> String {
    let sample = (1234.5678_f64).sin() * 1e8;
    format!("{sample:.6}")
}

fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_signals() -> FingerprintSignals {
        FingerprintSignals {
            agent: "xterm-256color".to_string(),
            locale: "en_US.UTF-8".to_string(),
            platform: "linux/x86_64".to_string(),
            screen: "120".to_string(),
            color_depth: "truecolor".to_string(),
            timezone: "America/Mexico_City".to_string(),
            render_sample: "-32404302.839898".to_string(),
        }
    }

    #[test]
    fn same_signals_same_fingerprint() {
        assert_eq!(generate(&sample_signals()), generate(&sample_signals()));
    }

    #[test]
    fn fingerprint_is_short_hex() {
        let fp = generate(&sample_signals());
        assert_eq!(fp.len(), 16);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn any_signal_change_changes_fingerprint() {
        let base = sample_signals();
        let mut changed = base.clone();
        changed.locale = "es_MX.UTF-8".to_string();
        assert_ne!(generate(&base), generate(&changed));
    }

    #[test]
    fn signal_order_is_significant() {
        let base = sample_signals();
        let mut swapped = base.clone();
        std::mem::swap(&mut swapped.agent, &mut swapped.locale);
        assert_ne!(generate(&base), generate(&swapped));
    }

    #[test]
    fn missing_signal_becomes_placeholder() {
        let value = env_or(&["TUTORING_SIGNAL_THAT_IS_NEVER_SET"]);
        assert_eq!(value, UNAVAILABLE);

        let mut signals = sample_signals();
        signals.timezone = value;
        let fp = generate(&signals);
        assert_eq!(fp.len(), 16);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn collect_never_panics_without_env() {
        // Collection must degrade to placeholders, not error.
        let signals = FingerprintSignals::collect();
        assert!(!signals.platform.is_empty());
        assert_eq!(generate(&signals).len(), 16);
    }
}
