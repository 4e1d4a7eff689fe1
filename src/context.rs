//! Cancellation signal shared between the thread that owns a resource and the
//! threads that need to wait for or trigger its shutdown.

use std::{
    mem::take,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
};

/// A cloneable cancellation signal. Cloning shares the same underlying
/// condition variable, so any clone can set the value and wake every waiter.
#[derive(Debug, Clone, Default)]
pub struct Context<T>(Arc<(Mutex<T>, Condvar)>);

impl<T> Context<T>
where
    T: Default,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cancellation value and wakes every thread blocked in
    /// [`Context::wait_condvar`] or polling [`Context::get_lock_cvar`] directly.
    pub fn cancel_all(&self, val: T) -> Result<(), PoisonError<MutexGuard<'_, T>>> {
        let (lck, cvar) = &*self.0;
        let mut lck = lck.lock()?;
        *lck = val;
        cvar.notify_all();
        Ok(())
    }

    /// Blocks until [`Context::cancel_all`] is called, returning the value it
    /// was set to and resetting the internal state to the default.
    pub fn wait_condvar(&self) -> Result<T, PoisonError<MutexGuard<'_, T>>> {
        let (lck, cvar) = &*self.0;
        let mut lck = lck.lock()?;
        lck = cvar.wait(lck)?;
        let current = take(&mut *lck);
        Ok(current)
    }

    pub fn get_lock_cvar(&self) -> &(Mutex<T>, Condvar) {
        &self.0
    }

    /// Resets the internal value to the default, without waking anyone.
    pub fn reset(&self) -> Result<(), PoisonError<MutexGuard<'_, T>>> {
        let (lck, _) = &*self.0;
        let mut lck = lck.lock()?;
        *lck = <T as Default>::default();
        Ok(())
    }
}

impl Context<bool> {
    /// True once [`Context::cancel_all`] has been called with `true`.
    pub fn is_cancelled(&self) -> bool {
        let (lck, _) = &*self.0;
        *lck.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn cancel_all_wakes_waiter() {
        let ctx: Context<bool> = Context::new();
        let waiter = ctx.clone();
        let handle = thread::spawn(move || waiter.wait_condvar().unwrap());

        thread::sleep(Duration::from_millis(20));
        ctx.cancel_all(true).unwrap();

        assert!(handle.join().unwrap());
    }

    #[test]
    fn is_cancelled_reflects_state() {
        let ctx: Context<bool> = Context::new();
        assert!(!ctx.is_cancelled());
        ctx.cancel_all(true).unwrap();
        assert!(ctx.is_cancelled());
    }
}
