//! Debug-only fault injection
//!
//! Tests schedule a synthetic failure after N internal steps of an
//! import; the import calls [`FaultInjector::step`] at each checkpoint.
//! The whole mechanism compiles out of release builds: `step` is an
//! inlined no-op there, and `arm` is unavailable.
//!
//! The injector is process-wide. `arm` returns a guard that disarms on
//! drop, so a panicking test cannot leak an armed injector into the next
//! test.

#[cfg(debug_assertions)]
use granary_core::GranaryError;
use granary_core::Result;

#[cfg(debug_assertions)]
mod armed {
    use parking_lot::Mutex;

    pub(super) static REMAINING: Mutex<Option<u64>> = Mutex::new(None);
}

/// Process-wide synthetic failure scheduler
pub struct FaultInjector;

impl FaultInjector {
    /// Schedule a failure after `steps` further checkpoint visits
    ///
    /// `steps = 0` fails at the next checkpoint. The returned guard
    /// disarms on drop.
    #[cfg(debug_assertions)]
    pub fn arm(steps: u64) -> ArmedGuard {
        *armed::REMAINING.lock() = Some(steps);
        ArmedGuard { _private: () }
    }

    /// Consult the injector at a checkpoint
    ///
    /// Returns the scheduled failure when the armed step count runs out.
    #[cfg(debug_assertions)]
    pub fn step() -> Result<()> {
        let mut remaining = armed::REMAINING.lock();
        match remaining.as_mut() {
            Some(0) => {
                *remaining = None;
                Err(GranaryError::io("injected fault"))
            }
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Consult the injector at a checkpoint (release: no-op)
    #[cfg(not(debug_assertions))]
    #[inline(always)]
    pub fn step() -> Result<()> {
        Ok(())
    }
}

/// Disarms the injector when dropped
#[cfg(debug_assertions)]
pub struct ArmedGuard {
    _private: (),
}

#[cfg(debug_assertions)]
impl Drop for ArmedGuard {
    fn drop(&mut self) {
        *armed::REMAINING.lock() = None;
    }
}

#[cfg(all(test, debug_assertions))]
mod tests {
    use super::*;

    // One test: the injector is process-wide and the harness runs tests
    // in parallel threads.
    #[test]
    fn fires_after_scheduled_steps_and_disarms() {
        {
            let _guard = FaultInjector::arm(2);
            assert!(FaultInjector::step().is_ok());
            assert!(FaultInjector::step().is_ok());
            assert!(FaultInjector::step().is_err());
            // One-shot: after firing it stays disarmed.
            assert!(FaultInjector::step().is_ok());
        }

        {
            let _guard = FaultInjector::arm(0);
        }
        assert!(FaultInjector::step().is_ok());
    }
}
