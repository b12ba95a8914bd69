//! Manual-reset events, counting semaphores and multi-object waits.
//!
//! These stand in for the host's native waitable objects. An [`Event`]
//! stays signalled until reset; [`wait_any`] returns the lowest-indexed
//! signalled object, which keeps the "signal-ready event last" convention
//! of `signal_wait` honest (real wait handles win ties).

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Result of a multi-object wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The object at this index became signalled.
    Object(usize),
    Timeout,
}

struct WaitCell {
    fired: Mutex<Option<usize>>,
    cond: Condvar,
}

impl WaitCell {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            fired: Mutex::new(None),
            cond: Condvar::new(),
        })
    }

    fn fire(&self, index: usize) {
        let mut fired = self.fired.lock();
        match *fired {
            Some(existing) if existing <= index => {}
            _ => *fired = Some(index),
        }
        self.cond.notify_all();
    }

    fn wait(&self, timeout: Option<Duration>) -> Option<usize> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut fired = self.fired.lock();
        loop {
            if let Some(index) = *fired {
                return Some(index);
            }
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut fired, deadline).timed_out() {
                        return *fired;
                    }
                }
                None => self.cond.wait(&mut fired),
            }
        }
    }
}

struct EventState {
    set: bool,
    watchers: Vec<(usize, Arc<WaitCell>)>,
}

/// Manual-reset event.
pub struct Event {
    state: Mutex<EventState>,
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

impl Event {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EventState {
                set: false,
                watchers: Vec::new(),
            }),
        }
    }

    pub fn set(&self) {
        let mut state = self.state.lock();
        state.set = true;
        for (index, cell) in &state.watchers {
            cell.fire(*index);
        }
    }

    pub fn reset(&self) {
        self.state.lock().set = false;
    }

    pub fn is_set(&self) -> bool {
        self.state.lock().set
    }

    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        matches!(wait_any(&[self], timeout), WaitOutcome::Object(_))
    }

    fn register(&self, index: usize, cell: &Arc<WaitCell>) {
        let mut state = self.state.lock();
        if state.set {
            cell.fire(index);
        }
        state.watchers.push((index, cell.clone()));
    }

    fn deregister(&self, cell: &Arc<WaitCell>) {
        self.state
            .lock()
            .watchers
            .retain(|(_, w)| !Arc::ptr_eq(w, cell));
    }
}

/// Block until one of `events` is signalled or the timeout elapses.
pub fn wait_any(events: &[&Event], timeout: Option<Duration>) -> WaitOutcome {
    let cell = WaitCell::new();
    for (index, event) in events.iter().enumerate() {
        event.register(index, &cell);
    }
    let outcome = match cell.wait(timeout) {
        Some(index) => WaitOutcome::Object(index),
        None => WaitOutcome::Timeout,
    };
    for event in events {
        event.deregister(&cell);
    }
    outcome
}

/// Counting semaphore used for child-wait accounting.
pub struct Semaphore {
    count: Mutex<usize>,
    cond: Condvar,
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new()
    }
}

impl Semaphore {
    pub fn new() -> Self {
        Self {
            count: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    pub fn release(&self, n: usize) {
        let mut count = self.count.lock();
        *count += n;
        self.cond.notify_all();
    }

    /// Take one unit; returns false on timeout.
    pub fn acquire(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut count = self.count.lock();
        loop {
            if *count > 0 {
                *count -= 1;
                return true;
            }
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut count, deadline).timed_out() && *count == 0 {
                        return false;
                    }
                }
                None => self.cond.wait(&mut count),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn event_is_manual_reset() {
        let ev = Event::new();
        ev.set();
        assert!(ev.wait(Some(Duration::from_millis(1))));
        assert!(ev.is_set());
        ev.reset();
        assert!(!ev.wait(Some(Duration::from_millis(1))));
    }

    #[test]
    fn wait_any_reports_lowest_ready_index() {
        let a = Event::new();
        let b = Event::new();
        b.set();
        a.set();
        assert_eq!(wait_any(&[&a, &b], None), WaitOutcome::Object(0));
    }

    #[test]
    fn wait_any_wakes_on_cross_thread_set() {
        let ev = Arc::new(Event::new());
        let setter = {
            let ev = ev.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                ev.set();
            })
        };
        assert_eq!(
            wait_any(&[&ev], Some(Duration::from_secs(5))),
            WaitOutcome::Object(0)
        );
        setter.join().unwrap();
    }

    #[test]
    fn semaphore_counts() {
        let sem = Semaphore::new();
        sem.release(2);
        assert!(sem.acquire(Some(Duration::from_millis(1))));
        assert!(sem.acquire(Some(Duration::from_millis(1))));
        assert!(!sem.acquire(Some(Duration::from_millis(1))));
    }
}
