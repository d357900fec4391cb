//! Single-use callback handed to native code.
//!
//! `RhLibRegisterDotNetInitializer` takes a bare `void (*)(void)` with no
//! context argument, so the closure lives in a process-wide slot and the
//! native side receives a trampoline. The trampoline takes the closure out
//! of the slot before running it: the first invocation consumes it, any
//! later invocation finds the slot empty and does nothing.

use crate::error::BridgeError;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{error, warn};

/// C signature of the initializer callback.
pub type InitializerCallback = extern "C" fn();

type Pending = Box<dyn FnOnce() + Send + 'static>;

static PENDING: Mutex<Option<Pending>> = Mutex::new(None);

/// Held while a callback is being registered with native code.
static REGISTRATION: Mutex<()> = Mutex::new(());

/// An armed callback, exposed to native code as a function pointer.
///
/// Registrations are serialized for as long as this value is alive. Dropping
/// it does not disarm the callback; it stays pending until native code calls
/// it.
pub struct OneShotCallback {
    _registration: MutexGuard<'static, ()>,
}

impl OneShotCallback {
    /// Arm `f` as the pending callback.
    pub fn arm<F>(f: F) -> Result<Self, BridgeError>
    where
        F: FnOnce() + Send + 'static,
    {
        let registration = REGISTRATION.lock().unwrap_or_else(PoisonError::into_inner);

        let mut slot = PENDING.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(BridgeError::Callback(
                "a previously registered callback was never invoked".to_string(),
            ));
        }
        *slot = Some(Box::new(f));

        Ok(Self {
            _registration: registration,
        })
    }

    /// Function pointer to pass to native code.
    pub fn as_ptr(&self) -> InitializerCallback {
        trampoline
    }

    /// Check whether an armed callback has not run yet.
    pub fn is_pending() -> bool {
        PENDING
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

extern "C" fn trampoline() {
    let pending = PENDING
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();

    match pending {
        Some(f) => {
            // Unwinding into native frames is undefined behavior.
            if catch_unwind(AssertUnwindSafe(f)).is_err() {
                error!("Initializer callback panicked");
            }
        }
        None => warn!("Initializer callback invoked again; ignoring"),
    }
}
