use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

use super::{LockError, LockMode};

#[derive(Debug, Default)]
struct State {
    /// Read holds per thread; a thread may hold several.
    readers: HashMap<ThreadId, usize>,
    writer: Option<ThreadId>,
    write_holds: usize,
    waiting_writers: usize,
}

impl State {
    fn can_read(&self, me: ThreadId) -> bool {
        match self.writer {
            Some(owner) => owner == me,
            // A fresh reader queues behind waiting writers, but a thread that
            // already reads may always read again.
            None => self.waiting_writers == 0 || self.readers.contains_key(&me),
        }
    }

    fn can_write(&self, me: ThreadId) -> bool {
        match self.writer {
            Some(owner) => owner == me,
            None => self.readers.is_empty(),
        }
    }

    fn grant(&mut self, mode: LockMode, me: ThreadId) {
        match mode {
            LockMode::Read => *self.readers.entry(me).or_insert(0) += 1,
            LockMode::Write => {
                self.writer = Some(me);
                self.write_holds += 1;
            }
        }
    }
}

/// A reentrant read/write lock that prefers writers.
///
/// Ownership is tracked per thread, so a thread holding a read lock can take
/// further read locks even while a writer is queued. Upgrading a read hold to
/// a write hold is not supported and blocks until every reader (including the
/// caller) has released.
#[derive(Debug, Default)]
pub(crate) struct LockEntry {
    state: Mutex<State>,
    changed: Condvar,
    /// Holders plus waiters. Only mutated while the owning cache shard is
    /// locked, so a zero count observed there is final.
    pub(super) users: AtomicUsize,
}

impl LockEntry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the lock is granted or `interrupted` is raised.
    pub fn acquire(&self, mode: LockMode, interrupted: &AtomicBool) -> Result<(), LockError> {
        let me = thread::current().id();
        let mut state = self.state.lock();

        match mode {
            LockMode::Read => {
                while !state.can_read(me) {
                    if interrupted.load(Ordering::SeqCst) {
                        return Err(LockError::Interrupted);
                    }
                    self.changed.wait(&mut state);
                }
            }
            LockMode::Write => {
                if !state.can_write(me) {
                    state.waiting_writers += 1;
                    while !state.can_write(me) {
                        if interrupted.load(Ordering::SeqCst) {
                            state.waiting_writers -= 1;
                            // Readers held back by this writer may proceed now
                            self.changed.notify_all();
                            return Err(LockError::Interrupted);
                        }
                        self.changed.wait(&mut state);
                    }
                    state.waiting_writers -= 1;
                }
            }
        }

        state.grant(mode, me);
        Ok(())
    }

    pub fn try_acquire(&self, mode: LockMode) -> bool {
        let me = thread::current().id();
        let mut state = self.state.lock();

        let available = match mode {
            LockMode::Read => state.can_read(me),
            LockMode::Write => state.can_write(me),
        };
        if available {
            state.grant(mode, me);
        }
        available
    }

    pub fn release(&self, mode: LockMode) {
        let me = thread::current().id();
        let mut state = self.state.lock();

        match mode {
            LockMode::Read => {
                if let Some(count) = state.readers.get_mut(&me) {
                    *count -= 1;
                    if *count == 0 {
                        state.readers.remove(&me);
                    }
                } else {
                    tracing::error!("Released a read lock not held by {:?}", me);
                }
            }
            LockMode::Write => {
                debug_assert_eq!(state.writer, Some(me));
                state.write_holds = state.write_holds.saturating_sub(1);
                if state.write_holds == 0 {
                    state.writer = None;
                }
            }
        }

        self.changed.notify_all();
    }

    /// Wake every waiter so it can observe an interruption.
    pub fn wake_all(&self) {
        let _state = self.state.lock();
        self.changed.notify_all();
    }

    pub fn is_locked(&self) -> bool {
        let state = self.state.lock();
        state.writer.is_some() || !state.readers.is_empty()
    }

    #[cfg(test)]
    pub fn waiting_writers(&self) -> usize {
        self.state.lock().waiting_writers
    }
}
