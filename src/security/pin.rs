use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const MIN_PIN_LENGTH: usize = 4;
pub const MAX_PIN_LENGTH: usize = 6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PinError {
    #[error("PIN must be 4 to 6 digits")]
    InvalidFormat,
    #[error("PIN confirmation does not match")]
    ConfirmationMismatch,
}

/// Result of checking what has been typed on the keypad so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinCheck {
    /// Keep typing.
    Incomplete,
    Accepted,
    /// Wrong PIN; the keypad should be cleared.
    Rejected,
}

/// Salted SHA-256 digest of the app PIN. The PIN itself is never kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinVault {
    salt: String,
    digest: String,
    length: usize,
}

impl PinVault {
    /// Register a new PIN entered twice.
    pub fn setup(pin: &str, confirmation: &str) -> Result<Self, PinError> {
        validate(pin)?;
        if pin != confirmation {
            return Err(PinError::ConfirmationMismatch);
        }

        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        let salt = hex::encode(salt);

        Ok(Self {
            digest: digest(&salt, pin),
            salt,
            length: pin.len(),
        })
    }

    pub fn pin_length(&self) -> usize {
        self.length
    }

    pub fn matches(&self, pin: &str) -> bool {
        digest(&self.salt, pin) == self.digest
    }

    /// Evaluate keypad input the way the lock screen does: nothing is decided
    /// before four digits, a match unlocks, and a mismatch only counts once
    /// the entry is as long as the stored PIN.
    pub fn check(&self, entered: &str) -> PinCheck {
        if entered.len() < MIN_PIN_LENGTH {
            PinCheck::Incomplete
        } else if self.matches(entered) {
            PinCheck::Accepted
        } else if entered.len() >= self.length {
            PinCheck::Rejected
        } else {
            PinCheck::Incomplete
        }
    }
}

fn validate(pin: &str) -> Result<(), PinError> {
    let length_ok = (MIN_PIN_LENGTH..=MAX_PIN_LENGTH).contains(&pin.len());
    if length_ok && pin.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(PinError::InvalidFormat)
    }
}

fn digest(salt: &str, pin: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(pin.as_bytes());
    hex::encode(hasher.finalize())
}
