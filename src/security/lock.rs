use async_trait::async_trait;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::pin::{PinCheck, PinVault};

/// How long the app may sit in the background before it locks again.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    Locked,
    /// Lock screen is up and credentials are being entered.
    Unlocking,
    Unlocked,
}

/// Platform biometric prompt (fingerprint, face).
#[async_trait]
pub trait BiometricAuthenticator: Send + Sync {
    /// Hardware present and at least one biometric enrolled.
    async fn is_available(&self) -> bool;

    async fn authenticate(&self, prompt: &str) -> bool;
}

/// App lock driven by foreground/background transitions.
///
/// Times are passed in by the caller so the grace period can be exercised
/// without sleeping.
#[derive(Debug, Clone)]
pub struct AppLock {
    state: LockState,
    security_enabled: bool,
    grace_period: Duration,
    backgrounded_at: Option<Instant>,
}

impl AppLock {
    /// Starts locked exactly when a PIN or biometric unlock is configured.
    pub fn new(security_enabled: bool) -> Self {
        Self {
            state: if security_enabled {
                LockState::Locked
            } else {
                LockState::Unlocked
            },
            security_enabled,
            grace_period: DEFAULT_GRACE_PERIOD,
            backgrounded_at: None,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn is_locked(&self) -> bool {
        self.security_enabled && self.state != LockState::Unlocked
    }

    pub fn set_security_enabled(&mut self, enabled: bool) {
        self.security_enabled = enabled;
        if !enabled {
            self.state = LockState::Unlocked;
        }
    }

    pub fn on_background(&mut self, now: Instant) {
        self.backgrounded_at = Some(now);
    }

    /// Returns the state after coming back to the foreground.
    pub fn on_foreground(&mut self, now: Instant) -> LockState {
        if let Some(since) = self.backgrounded_at.take() {
            let away = now.saturating_duration_since(since);
            if self.security_enabled && away > self.grace_period {
                info!("Locking after {:?} in background", away);
                self.state = LockState::Locked;
            } else {
                debug!("Quick return ({:?}), staying {:?}", away, self.state);
            }
        }
        self.state
    }

    /// Show the lock screen.
    pub fn begin_unlock(&mut self) {
        if self.state == LockState::Locked {
            self.state = LockState::Unlocking;
        }
    }

    pub fn submit_pin(&mut self, vault: &PinVault, entered: &str) -> PinCheck {
        self.begin_unlock();
        let check = vault.check(entered);
        match check {
            PinCheck::Accepted => self.state = LockState::Unlocked,
            PinCheck::Rejected => debug!("Incorrect PIN"),
            PinCheck::Incomplete => {}
        }
        check
    }

    pub async fn unlock_with_biometric(&mut self, authenticator: &dyn BiometricAuthenticator) -> bool {
        if !authenticator.is_available().await {
            return false;
        }

        self.begin_unlock();
        let ok = authenticator.authenticate("Unlock AgroScan").await;
        if ok {
            self.state = LockState::Unlocked;
        }
        ok
    }
}
