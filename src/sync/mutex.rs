//! Mutex and condition variable wrappers - use parking_lot if available, std otherwise.
//!
//! Both backends expose the parking_lot calling convention: `lock()` returns the
//! guard directly and `Condvar::wait` takes the guard by mutable reference.

#[cfg(feature = "parking_lot")]
pub use parking_lot::{Condvar, Mutex, MutexGuard};

#[cfg(not(feature = "parking_lot"))]
mod std_mutex {
    use std::sync::{
        Condvar as StdCondvar, Mutex as StdMutex, MutexGuard as StdMutexGuard, PoisonError,
    };

    /// Thin wrapper around std::sync::Mutex.
    pub struct Mutex<T>(StdMutex<T>);

    impl<T> Mutex<T> {
        /// Create a new mutex.
        pub const fn new(value: T) -> Self {
            Self(StdMutex::new(value))
        }

        /// Lock the mutex. Poisoning is ignored, as with parking_lot.
        pub fn lock(&self) -> MutexGuard<'_, T> {
            MutexGuard(Some(self.0.lock().unwrap_or_else(PoisonError::into_inner)))
        }
    }

    /// Guard for std mutex.
    ///
    /// The inner guard is only ever absent while a `Condvar::wait` is in progress.
    pub struct MutexGuard<'a, T>(Option<StdMutexGuard<'a, T>>);

    impl<'a, T> std::ops::Deref for MutexGuard<'a, T> {
        type Target = T;

        fn deref(&self) -> &Self::Target {
            self.0.as_deref().expect("guard taken by condvar")
        }
    }

    impl<'a, T> std::ops::DerefMut for MutexGuard<'a, T> {
        fn deref_mut(&mut self) -> &mut Self::Target {
            self.0.as_deref_mut().expect("guard taken by condvar")
        }
    }

    /// Thin wrapper around std::sync::Condvar.
    #[derive(Default)]
    pub struct Condvar(StdCondvar);

    impl Condvar {
        /// Create a new condition variable.
        pub const fn new() -> Self {
            Self(StdCondvar::new())
        }

        /// Block until notified, releasing the guarded lock while waiting.
        pub fn wait<T>(&self, guard: &mut MutexGuard<'_, T>) {
            let inner = guard.0.take().expect("guard taken by condvar");
            guard.0 = Some(self.0.wait(inner).unwrap_or_else(PoisonError::into_inner));
        }

        /// Wake every waiting thread.
        pub fn notify_all(&self) -> usize {
            self.0.notify_all();
            0
        }
    }
}

#[cfg(not(feature = "parking_lot"))]
pub use std_mutex::{Condvar, Mutex, MutexGuard};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_condvar_handoff() {
        let pair = Arc::new((Mutex::new(false), Condvar::new()));
        let remote = Arc::clone(&pair);

        let handle = thread::spawn(move || {
            let (lock, cvar) = &*remote;
            *lock.lock() = true;
            cvar.notify_all();
        });

        let (lock, cvar) = &*pair;
        let mut ready = lock.lock();
        while !*ready {
            cvar.wait(&mut ready);
        }
        drop(ready);

        handle.join().unwrap();
    }
}
