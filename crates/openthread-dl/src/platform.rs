//! Platform event system the adapter reports to.
//!
//! The adapter never runs follow-up work inside a native callback. It posts
//! [`DeviceEvent`]s and schedules closures through a [`PlatformLayer`];
//! [`EventLoop`] is a single-threaded cooperative implementation of it.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Deferred unit of work.
pub type Work = Box<dyn FnOnce() + Send>;

pub type EventHandler = Arc<dyn Fn(&DeviceEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityChange {
    Established,
    Lost,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    ThreadStateChange {
        role_changed: bool,
        address_changed: bool,
        net_data_changed: bool,
        child_nodes_changed: bool,
        flags: u32,
    },
    ThreadConnectivityChange(ConnectivityChange),
    ServiceProvisioningChange {
        provisioned: bool,
    },
    SedIntervalChange,
}

/// Outbound interface towards the platform's event loop.
pub trait PlatformLayer: Send + Sync {
    fn post_event(&self, event: DeviceEvent) -> Result<()>;

    fn schedule_work(&self, work: Work) -> Result<()>;

    /// Starts a one-shot timer. Starting a timer whose id is already armed
    /// cancels the previous one.
    fn start_timer(&self, id: TimerId, delay: Duration, work: Work) -> Result<()>;

    fn cancel_timer(&self, id: TimerId);
}

enum Item {
    Event(DeviceEvent),
    Work(Work),
}

struct Timer {
    id: TimerId,
    deadline: Instant,
    work: Work,
}

#[derive(Default)]
struct LoopState {
    queue: VecDeque<Item>,
    timers: Vec<Timer>,
    handlers: Vec<EventHandler>,
    stopped: bool,
}

/// Cooperative single-threaded event loop.
///
/// Items are executed in FIFO order by whichever thread drives the loop,
/// through [`EventLoop::run`] or the step functions used by tests.
#[derive(Default)]
pub struct EventLoop {
    state: Mutex<LoopState>,
    wakeup: Condvar,
}

impl EventLoop {
    pub fn new() -> Arc<Self> {
        Arc::new(EventLoop::default())
    }

    fn lock(&self) -> MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_event_handler(&self, handler: EventHandler) {
        self.lock().handlers.push(handler);
    }

    /// Runs one queued item, returning false if the queue was empty.
    fn run_one(&self) -> bool {
        let (item, handlers) = {
            let mut state = self.lock();
            match state.queue.pop_front() {
                Some(item) => (item, state.handlers.clone()),
                None => return false,
            }
        };
        match item {
            Item::Work(work) => work(),
            Item::Event(event) => {
                log::trace!("dispatching {:?}", event);
                for handler in handlers {
                    handler(&event);
                }
            }
        }
        true
    }

    /// Moves every timer due at `now` into the queue.
    fn expire_timers(&self, now: Instant) -> usize {
        let mut state = self.lock();
        let mut fired = 0;
        let mut i = 0;
        while i < state.timers.len() {
            if state.timers[i].deadline <= now {
                let timer = state.timers.remove(i);
                state.queue.push_back(Item::Work(timer.work));
                fired += 1;
            } else {
                i += 1;
            }
        }
        fired
    }

    /// Runs queued items, including anything they enqueue, until the queue
    /// is empty. Timers that are due are included. Returns the number of
    /// items executed.
    pub fn run_until_idle(&self) -> usize {
        let mut count = 0;
        loop {
            self.expire_timers(Instant::now());
            if !self.run_one() {
                return count;
            }
            count += 1;
        }
    }

    /// Fires a pending timer ahead of its deadline and drains the queue.
    pub fn fire_timer(&self, id: TimerId) -> bool {
        let timer = {
            let mut state = self.lock();
            let pos = state.timers.iter().position(|t| t.id == id);
            pos.map(|p| state.timers.remove(p))
        };
        match timer {
            Some(timer) => {
                self.lock().queue.push_back(Item::Work(timer.work));
                self.run_until_idle();
                true
            }
            None => false,
        }
    }

    pub fn is_timer_armed(&self, id: TimerId) -> bool {
        self.lock().timers.iter().any(|t| t.id == id)
    }

    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Drives the loop on the calling thread until [`EventLoop::stop`].
    pub fn run(&self) {
        loop {
            self.run_until_idle();
            let mut state = self.lock();
            if state.stopped {
                state.stopped = false;
                return;
            }
            if !state.queue.is_empty() {
                continue;
            }
            let next_deadline = state.timers.iter().map(|t| t.deadline).min();
            match next_deadline {
                Some(deadline) => {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    drop(self.wakeup.wait_timeout(state, wait).unwrap_or_else(|e| e.into_inner()));
                }
                None => {
                    drop(self.wakeup.wait(state).unwrap_or_else(|e| e.into_inner()));
                }
            }
        }
    }

    pub fn stop(&self) {
        self.lock().stopped = true;
        self.wakeup.notify_all();
    }
}

impl PlatformLayer for EventLoop {
    fn post_event(&self, event: DeviceEvent) -> Result<()> {
        let mut state = self.lock();
        if state.stopped {
            return Err(Error::Platform("event loop stopped".into()));
        }
        state.queue.push_back(Item::Event(event));
        self.wakeup.notify_all();
        Ok(())
    }

    fn schedule_work(&self, work: Work) -> Result<()> {
        let mut state = self.lock();
        if state.stopped {
            return Err(Error::Platform("event loop stopped".into()));
        }
        state.queue.push_back(Item::Work(work));
        self.wakeup.notify_all();
        Ok(())
    }

    fn start_timer(&self, id: TimerId, delay: Duration, work: Work) -> Result<()> {
        let mut state = self.lock();
        state.timers.retain(|t| t.id != id);
        state.timers.push(Timer {
            id,
            deadline: Instant::now() + delay,
            work,
        });
        self.wakeup.notify_all();
        Ok(())
    }

    fn cancel_timer(&self, id: TimerId) {
        self.lock().timers.retain(|t| t.id != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn work_runs_in_order() {
        let event_loop = EventLoop::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let seen = seen.clone();
            event_loop.schedule_work(Box::new(move || seen.lock().unwrap().push(i))).unwrap();
        }
        assert_eq!(event_loop.run_until_idle(), 3);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn events_reach_every_handler() {
        let event_loop = EventLoop::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let count = count.clone();
            event_loop.add_event_handler(Arc::new(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }
        event_loop.post_event(DeviceEvent::SedIntervalChange).unwrap();
        event_loop.run_until_idle();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn restarting_a_timer_replaces_it() {
        let event_loop = EventLoop::new();
        let count = Arc::new(AtomicUsize::new(0));
        let id = TimerId(7);
        for _ in 0..2 {
            let count = count.clone();
            event_loop
                .start_timer(id, Duration::from_secs(60), Box::new(move || {
                    count.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }
        assert!(event_loop.is_timer_armed(id));
        assert_eq!(event_loop.run_until_idle(), 0);
        assert!(event_loop.fire_timer(id));
        assert!(!event_loop.fire_timer(id));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_ends_run() {
        let event_loop = EventLoop::new();
        let inner = event_loop.clone();
        event_loop
            .schedule_work(Box::new(move || inner.stop()))
            .unwrap();
        event_loop.run();
        assert_eq!(event_loop.pending(), 0);
    }
}
