//! Recording sessions.
//!
//! A [`Recording`] observes which rule shapes compile and which plan
//! steps execute on the owning thread. The recorder is a scoped handle
//! over an explicit per-thread slot: starting a session installs it,
//! dropping the handle detaches that thread's recorder only, and
//! other threads never observe it.
//!
//! While a recording is active, the compiled-function cache is
//! bypassed entirely (see [`CompiledCache`](crate::cache::CompiledCache)):
//! a session only ever sees artifacts compiled on its own thread, and
//! shared cache state is never mutated by it.

use std::cell::RefCell;
use std::rc::Rc;

thread_local! {
    static RECORDER: RefCell<Option<Rc<RefCell<RecordingState>>>> = const { RefCell::new(None) };
}

#[derive(Debug, Default)]
struct RecordingState {
    compiled: Vec<String>,
    executed: Vec<String>,
}

/// A scoped, thread-local recording session.
pub struct Recording {
    state: Rc<RefCell<RecordingState>>,
}

impl Recording {
    /// Starts a session on the current thread, replacing any session
    /// already active there.
    pub fn start() -> Recording {
        let state = Rc::new(RefCell::new(RecordingState::default()));
        RECORDER.with(|slot| *slot.borrow_mut() = Some(state.clone()));
        Recording { state }
    }

    /// True when the current thread has an active session.
    pub fn is_active() -> bool {
        RECORDER.with(|slot| slot.borrow().is_some())
    }

    /// Shape hashes compiled during this session, in order.
    pub fn compiled(&self) -> Vec<String> {
        self.state.borrow().compiled.clone()
    }

    /// Targets of plan steps executed during this session, in order,
    /// deduplicated.
    pub fn executed(&self) -> Vec<String> {
        self.state.borrow().executed.clone()
    }
}

impl Drop for Recording {
    fn drop(&mut self) {
        RECORDER.with(|slot| {
            let mut slot = slot.borrow_mut();
            if slot
                .as_ref()
                .is_some_and(|active| Rc::ptr_eq(active, &self.state))
            {
                *slot = None;
            }
        });
    }
}

/// Notes a compilation on the current thread's session, if any.
pub(crate) fn note_compiled(shape_hash: &str) {
    RECORDER.with(|slot| {
        if let Some(state) = slot.borrow().as_ref() {
            state.borrow_mut().compiled.push(shape_hash.to_string());
        }
    });
}

/// Notes a step execution on the current thread's session, if any.
pub(crate) fn note_executed(target: &str) {
    RECORDER.with(|slot| {
        if let Some(state) = slot.borrow().as_ref() {
            let mut state = state.borrow_mut();
            if !state.executed.iter().any(|t| t == target) {
                state.executed.push(target.to_string());
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_scopes_to_its_handle() {
        assert!(!Recording::is_active());
        {
            let session = Recording::start();
            assert!(Recording::is_active());
            note_compiled("abc");
            note_executed("data.X");
            note_executed("data.X");
            assert_eq!(session.compiled(), vec!["abc".to_string()]);
            assert_eq!(session.executed(), vec!["data.X".to_string()]);
        }
        assert!(!Recording::is_active());
    }

    #[test]
    fn sessions_are_thread_local() {
        let _session = Recording::start();
        let seen = std::thread::spawn(Recording::is_active).join().unwrap();
        assert!(!seen);
    }

    #[test]
    fn notes_without_a_session_are_dropped() {
        note_compiled("ignored");
        assert!(!Recording::is_active());
    }
}
