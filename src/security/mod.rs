//! App Lock
//!
//! PIN and biometric gate in front of the application. Fully independent of
//! the prediction core.

mod lock;
mod pin;

pub use lock::{AppLock, BiometricAuthenticator, LockState, DEFAULT_GRACE_PERIOD};
pub use pin::{PinCheck, PinError, PinVault, MAX_PIN_LENGTH, MIN_PIN_LENGTH};
