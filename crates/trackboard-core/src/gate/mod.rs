//! Tester access gate.
//!
//! A single shared credential unlocks mutating views for the rest of the
//! app session. Failed attempts are counted in durable storage; reaching
//! the limit locks the gate for a fixed window, during which even the
//! correct credential is refused and no attempt is consumed. The first
//! check after the window clears the lock and resets the counter.
//!
//! | key                        | scope   | value              |
//! |----------------------------|---------|--------------------|
//! | `trackboard.auth`          | session | `"true"`           |
//! | `trackboard.attempts`      | durable | failure count      |
//! | `trackboard.lockout_until` | durable | epoch milliseconds |

pub mod storage;

use std::fmt;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::error::ErrorCode;

pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageError};

pub const AUTH_KEY: &str = "trackboard.auth";
pub const ATTEMPTS_KEY: &str = "trackboard.attempts";
pub const LOCKOUT_KEY: &str = "trackboard.lockout_until";

pub const DEFAULT_PASSWORD: &str = "tester";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_LOCKOUT: Duration = Duration::from_secs(5 * 60);

/// Errors returned by [`AccessGate::login`].
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("incorrect password ({remaining_attempts} attempts remaining)")]
    InvalidCredential { remaining_attempts: u32 },

    #[error("too many failed attempts; try again in {}s", remaining.as_secs().max(1))]
    Locked { remaining: Duration },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl GateError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidCredential { .. } => ErrorCode::InvalidCredential,
            Self::Locked { .. } => ErrorCode::GateLocked,
            Self::Storage(_) => ErrorCode::LocalStorageFailed,
        }
    }
}

/// Gate policy.
#[derive(Clone, PartialEq, Eq)]
pub struct GateConfig {
    pub password: String,
    pub max_attempts: u32,
    pub lockout: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            password: DEFAULT_PASSWORD.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            lockout: DEFAULT_LOCKOUT,
        }
    }
}

impl fmt::Debug for GateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateConfig")
            .field("password", &"<redacted>")
            .field("max_attempts", &self.max_attempts)
            .field("lockout", &self.lockout)
            .finish()
    }
}

/// Credential check with bounded attempts and timed lockout.
///
/// `S` backs the session scope and `D` the durable scope.
pub struct AccessGate<S, D, C = SystemClock> {
    config: GateConfig,
    session: S,
    durable: D,
    clock: C,
}

impl<S: KeyValueStorage, D: KeyValueStorage> AccessGate<S, D> {
    pub fn new(config: GateConfig, session: S, durable: D) -> Self {
        Self::with_clock(config, session, durable, SystemClock)
    }
}

impl<S: KeyValueStorage, D: KeyValueStorage, C: Clock> AccessGate<S, D, C> {
    pub fn with_clock(config: GateConfig, session: S, durable: D, clock: C) -> Self {
        Self {
            config,
            session,
            durable,
            clock,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &GateConfig {
        &self.config
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        read_lenient(&self.session, AUTH_KEY).is_some_and(|value| value == "true")
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.lockout_remaining().is_some()
    }

    /// Time left in the current lockout window.
    #[must_use]
    pub fn lockout_remaining(&self) -> Option<Duration> {
        let until = self.lockout_until()?;
        remaining_until(until, self.clock.now_millis())
    }

    /// Failed attempts counted toward the limit. An expired lock reads as
    /// zero even before it is cleared.
    #[must_use]
    pub fn attempts_used(&self) -> u32 {
        if self
            .lockout_until()
            .is_some_and(|until| remaining_until(until, self.clock.now_millis()).is_none())
        {
            return 0;
        }
        read_lenient(&self.durable, ATTEMPTS_KEY)
            .and_then(|value| value.parse().ok())
            .unwrap_or(0)
    }

    #[must_use]
    pub fn remaining_attempts(&self) -> u32 {
        self.config.max_attempts.saturating_sub(self.attempts_used())
    }

    /// Check `candidate` against the configured credential.
    ///
    /// # Errors
    ///
    /// - [`GateError::Locked`] while a lockout is active (no attempt is
    ///   consumed), or when this failure reaches the attempt limit.
    /// - [`GateError::InvalidCredential`] for a wrong credential below the
    ///   limit.
    /// - [`GateError::Storage`] if gate state cannot be persisted.
    pub fn login(&self, candidate: &str) -> Result<(), GateError> {
        if let Some(remaining) = self.check_lock()? {
            tracing::debug!(remaining_secs = remaining.as_secs(), "login refused while locked");
            return Err(GateError::Locked { remaining });
        }

        if constant_time_eq(candidate.as_bytes(), self.config.password.as_bytes()) {
            self.durable.remove(ATTEMPTS_KEY)?;
            self.session.set(AUTH_KEY, "true")?;
            tracing::info!("tester session unlocked");
            return Ok(());
        }

        let attempts = self.attempts_used().saturating_add(1);
        self.durable.set(ATTEMPTS_KEY, &attempts.to_string())?;
        if attempts >= self.config.max_attempts {
            let lockout_ms = i64::try_from(self.config.lockout.as_millis()).unwrap_or(i64::MAX);
            let until = self.clock.now_millis().saturating_add(lockout_ms);
            self.durable.set(LOCKOUT_KEY, &until.to_string())?;
            tracing::warn!(attempts, "gate locked after repeated failures");
            return Err(GateError::Locked {
                remaining: self.config.lockout,
            });
        }

        let remaining_attempts = self.config.max_attempts - attempts;
        tracing::info!(remaining_attempts, "incorrect password");
        Err(GateError::InvalidCredential { remaining_attempts })
    }

    /// End the session. Attempt and lockout state are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if session storage cannot be written.
    pub fn logout(&self) -> Result<(), GateError> {
        self.session.remove(AUTH_KEY)?;
        Ok(())
    }

    /// Remaining lockout, clearing an expired lock and its counter.
    fn check_lock(&self) -> Result<Option<Duration>, GateError> {
        let Some(until) = self.lockout_until() else {
            return Ok(None);
        };
        if let Some(remaining) = remaining_until(until, self.clock.now_millis()) {
            return Ok(Some(remaining));
        }
        self.durable.remove(LOCKOUT_KEY)?;
        self.durable.remove(ATTEMPTS_KEY)?;
        tracing::info!("lockout expired, attempts reset");
        Ok(None)
    }

    fn lockout_until(&self) -> Option<i64> {
        read_lenient(&self.durable, LOCKOUT_KEY).and_then(|value| value.parse().ok())
    }
}

fn remaining_until(until_ms: i64, now_ms: i64) -> Option<Duration> {
    let left = until_ms.checked_sub(now_ms)?;
    u64::try_from(left)
        .ok()
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

/// Read a key, treating unreadable storage as absent.
fn read_lenient(storage: &impl KeyValueStorage, key: &str) -> Option<String> {
    match storage.get(key) {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(key, "gate storage read failed: {error}");
            None
        }
    }
}

/// Byte comparison whose running time does not depend on where the inputs
/// first differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let len = a.len().max(b.len());
    let mut diff = u8::from(a.len() != b.len());
    for i in 0..len {
        diff |= a.get(i).copied().unwrap_or(0) ^ b.get(i).copied().unwrap_or(0);
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{DateTime, Utc};

    type TestGate = AccessGate<MemoryStorage, MemoryStorage, ManualClock>;

    fn start() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn gate() -> (TestGate, ManualClock, MemoryStorage) {
        let clock = ManualClock::new(start());
        let durable = MemoryStorage::new();
        let gate = AccessGate::with_clock(
            GateConfig::default(),
            MemoryStorage::new(),
            durable.clone(),
            clock.clone(),
        );
        (gate, clock, durable)
    }

    #[test]
    fn correct_password_unlocks_session() {
        let (gate, _, _) = gate();
        assert!(!gate.is_authenticated());
        gate.login("tester").unwrap();
        assert!(gate.is_authenticated());
        gate.logout().unwrap();
        assert!(!gate.is_authenticated());
    }

    #[test]
    fn wrong_password_counts_down() {
        let (gate, _, _) = gate();
        let err = gate.login("nope").unwrap_err();
        assert!(matches!(err, GateError::InvalidCredential { remaining_attempts: 2 }));
        assert_eq!(gate.attempts_used(), 1);
        assert_eq!(gate.remaining_attempts(), 2);
    }

    #[test]
    fn success_resets_counter() {
        let (gate, _, _) = gate();
        gate.login("nope").unwrap_err();
        gate.login("tester").unwrap();
        assert_eq!(gate.attempts_used(), 0);
    }

    #[test]
    fn third_failure_locks_and_correct_password_is_refused() {
        let (gate, _, _) = gate();
        gate.login("a").unwrap_err();
        gate.login("b").unwrap_err();
        let third = gate.login("c").unwrap_err();
        assert!(matches!(third, GateError::Locked { remaining } if remaining == DEFAULT_LOCKOUT));
        assert!(gate.is_locked());

        let fourth = gate.login("tester").unwrap_err();
        assert!(matches!(fourth, GateError::Locked { .. }));
        assert_eq!(fourth.code(), ErrorCode::GateLocked);
        assert_eq!(gate.attempts_used(), 3);
        assert!(!gate.is_authenticated());
    }

    #[test]
    fn expired_lock_clears_and_resets() {
        let (gate, clock, durable) = gate();
        for _ in 0..3 {
            gate.login("wrong").unwrap_err();
        }
        clock.advance(chrono::Duration::seconds(299));
        assert_eq!(gate.lockout_remaining(), Some(Duration::from_secs(1)));

        clock.advance(chrono::Duration::seconds(1));
        assert!(!gate.is_locked());
        assert_eq!(gate.attempts_used(), 0);

        gate.login("tester").unwrap();
        assert!(durable.get(LOCKOUT_KEY).unwrap().is_none());
        assert!(durable.get(ATTEMPTS_KEY).unwrap().is_none());
    }

    #[test]
    fn logout_keeps_attempt_state() {
        let (gate, _, _) = gate();
        gate.login("wrong").unwrap_err();
        gate.logout().unwrap();
        assert_eq!(gate.attempts_used(), 1);
    }

    #[test]
    fn constant_time_eq_handles_lengths() {
        assert!(constant_time_eq(b"tester", b"tester"));
        assert!(!constant_time_eq(b"tester", b"teste"));
        assert!(!constant_time_eq(b"tester\0", b"tester"));
        assert!(!constant_time_eq(b"", b"x"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn debug_redacts_password() {
        let rendered = format!("{:?}", GateConfig::default());
        assert!(!rendered.contains("tester"));
    }
}
