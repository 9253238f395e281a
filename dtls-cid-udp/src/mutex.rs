//! The lock guarding listener and connection state, here and in the DTLS front-end
//!
//! With the `lock_tracking` feature every acquisition is tagged with its purpose, and acquisitions
//! or critical sections taking a millisecond or more are reported.

use std::ops::{Deref, DerefMut};

#[cfg(feature = "lock_tracking")]
mod tracking {
    use super::*;
    use std::{
        collections::VecDeque,
        fmt::{self, Debug},
        time::{Duration, Instant},
    };
    use tracing::warn;

    #[derive(Debug)]
    struct Inner<T> {
        last_lock_owners: VecDeque<(&'static str, Duration)>,
        value: T,
    }

    /// A mutex remembering who held it last
    pub struct Mutex<T> {
        inner: std::sync::Mutex<Inner<T>>,
    }

    impl<T: Debug> Debug for Mutex<T> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            Debug::fmt(&self.inner, f)
        }
    }

    impl<T> Mutex<T> {
        pub fn new(value: T) -> Self {
            Self {
                inner: std::sync::Mutex::new(Inner {
                    last_lock_owners: VecDeque::new(),
                    value,
                }),
            }
        }

        /// Acquires the lock for a certain purpose
        ///
        /// The purpose will be recorded in the list of last lock owners
        pub fn lock(&self, purpose: &'static str) -> MutexGuard<T> {
            let now = Instant::now();
            let guard = self.inner.lock().unwrap();

            let lock_time = Instant::now();
            let elapsed = lock_time.duration_since(now);

            if elapsed > Duration::from_millis(1) {
                warn!(
                    "locking for {} took {:?}, last owners: {:?}",
                    purpose, elapsed, guard.last_lock_owners
                );
            }

            MutexGuard {
                guard,
                start_time: lock_time,
                purpose,
            }
        }
    }

    pub struct MutexGuard<'a, T> {
        guard: std::sync::MutexGuard<'a, Inner<T>>,
        start_time: Instant,
        purpose: &'static str,
    }

    impl<'a, T> Drop for MutexGuard<'a, T> {
        fn drop(&mut self) {
            if self.guard.last_lock_owners.len() == MAX_LOCK_OWNERS {
                self.guard.last_lock_owners.pop_back();
            }

            let duration = self.start_time.elapsed();

            if duration > Duration::from_millis(1) {
                warn!(
                    "holding the lock for {} took {:?}",
                    self.purpose, duration
                );
            }

            self.guard
                .last_lock_owners
                .push_front((self.purpose, duration));
        }
    }

    impl<'a, T> Deref for MutexGuard<'a, T> {
        type Target = T;

        fn deref(&self) -> &Self::Target {
            &self.guard.value
        }
    }

    impl<'a, T> DerefMut for MutexGuard<'a, T> {
        fn deref_mut(&mut self) -> &mut Self::Target {
            &mut self.guard.value
        }
    }

    const MAX_LOCK_OWNERS: usize = 20;
}

#[cfg(feature = "lock_tracking")]
pub use tracking::{Mutex, MutexGuard};

#[cfg(not(feature = "lock_tracking"))]
mod non_tracking {
    use super::*;

    /// Plain `std` mutex behind the same interface as the tracking one
    #[derive(Debug)]
    pub struct Mutex<T> {
        inner: std::sync::Mutex<T>,
    }

    impl<T> Mutex<T> {
        pub fn new(value: T) -> Self {
            Self {
                inner: std::sync::Mutex::new(value),
            }
        }

        /// Acquires the lock; `_purpose` is only recorded with `lock_tracking`
        pub fn lock(&self, _purpose: &'static str) -> MutexGuard<T> {
            MutexGuard {
                guard: self.inner.lock().unwrap(),
            }
        }
    }

    pub struct MutexGuard<'a, T> {
        guard: std::sync::MutexGuard<'a, T>,
    }

    impl<'a, T> Deref for MutexGuard<'a, T> {
        type Target = T;

        fn deref(&self) -> &Self::Target {
            self.guard.deref()
        }
    }

    impl<'a, T> DerefMut for MutexGuard<'a, T> {
        fn deref_mut(&mut self) -> &mut Self::Target {
            self.guard.deref_mut()
        }
    }
}

#[cfg(not(feature = "lock_tracking"))]
pub use non_tracking::{Mutex, MutexGuard};
