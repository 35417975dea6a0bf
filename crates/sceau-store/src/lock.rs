//! Deadline-bounded mutex acquisition.

use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use sceau_contracts::error::{LedgerError, LedgerResult};

const BACKOFF: Duration = Duration::from_micros(200);

/// Acquire `mutex`, giving up once `timeout` has elapsed.
///
/// `None` waits indefinitely.  A timeout is a retryable `Storage` error; a
/// poisoned lock is not.
pub(crate) fn lock_within<'a, T>(
    mutex: &'a Mutex<T>,
    timeout: Option<Duration>,
    what: &str,
) -> LedgerResult<MutexGuard<'a, T>> {
    let Some(timeout) = timeout else {
        return mutex.lock().map_err(|e| poisoned(what, e));
    };

    let deadline = Instant::now() + timeout;
    loop {
        match mutex.try_lock() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::Poisoned(e)) => return Err(poisoned(what, e)),
            Err(TryLockError::WouldBlock) => {
                if Instant::now() >= deadline {
                    return Err(LedgerError::Storage {
                        reason: format!("timed out after {:?} waiting for {}", timeout, what),
                        retryable: true,
                    });
                }
                std::thread::sleep(BACKOFF);
            }
        }
    }
}

pub(crate) fn poisoned(what: &str, e: impl std::fmt::Display) -> LedgerError {
    LedgerError::Storage {
        reason: format!("{} lock poisoned: {}", what, e),
        retryable: false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::lock_within;

    #[test]
    fn times_out_while_held() {
        let m = Arc::new(Mutex::new(0u32));
        let _held = m.lock().unwrap();

        let err = lock_within(&m, Some(Duration::from_millis(5)), "scope 'global'").unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn acquires_free_lock() {
        let m = Mutex::new(1u32);
        let guard = lock_within(&m, Some(Duration::from_millis(5)), "test").unwrap();
        assert_eq!(*guard, 1);
    }
}
