//! Cooperative timers for a single-threaded agent.
//!
//! Nothing here spawns threads or runs callbacks. A [`TimerQueue`] hands
//! out [`TimerHandle`]s and reports which of them are due on [`poll`];
//! the owner decides what a tick means. Handles are never reused, so a
//! tick polled before a `cancel` can always be recognised as stale by
//! comparing handles.
//!
//! [`poll`]: TimerQueue::poll

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Block (or, for test clocks, advance) for `duration`.
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset_ns: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            base: Instant::now(),
            offset_ns: AtomicU64::new(0),
        })
    }

    pub fn advance(&self, by: Duration) {
        self.offset_ns
            .fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.offset_ns.load(Ordering::SeqCst))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

pub trait TimerService {
    fn schedule_repeating(&mut self, interval: Duration) -> TimerHandle;

    /// Returns false if the handle was not scheduled.
    fn cancel(&mut self, handle: TimerHandle) -> bool;
}

#[derive(Debug)]
struct Timer {
    handle: TimerHandle,
    interval: Duration,
    next_due: Instant,
}

pub struct TimerQueue {
    clock: Arc<dyn Clock>,
    timers: Vec<Timer>,
    next_id: u64,
}

impl TimerQueue {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            timers: Vec::new(),
            next_id: 1,
        }
    }

    /// Every tick that has come due since the last poll, oldest first.
    /// A timer that fell several intervals behind yields one tick per
    /// missed interval.
    pub fn poll(&mut self) -> Vec<TimerHandle> {
        let now = self.clock.now();
        let mut due = Vec::new();

        for timer in &mut self.timers {
            while timer.next_due <= now {
                due.push((timer.next_due, timer.handle));
                timer.next_due += timer.interval;
            }
        }

        due.sort_by_key(|(at, handle)| (*at, handle.0));
        due.into_iter().map(|(_, handle)| handle).collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.iter().map(|t| t.next_due).min()
    }

    pub fn is_scheduled(&self, handle: TimerHandle) -> bool {
        self.timers.iter().any(|t| t.handle == handle)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

impl TimerService for TimerQueue {
    fn schedule_repeating(&mut self, interval: Duration) -> TimerHandle {
        // A zero interval would never stop coming due.
        let interval = interval.max(Duration::from_millis(1));
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;

        self.timers.push(Timer {
            handle,
            interval,
            next_due: self.clock.now() + interval,
        });
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.handle != handle);
        self.timers.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> (Arc<ManualClock>, TimerQueue) {
        let clock = ManualClock::new();
        let queue = TimerQueue::new(clock.clone());
        (clock, queue)
    }

    #[test]
    fn nothing_due_before_interval() {
        let (clock, mut queue) = queue();
        queue.schedule_repeating(Duration::from_secs(1));

        clock.advance(Duration::from_millis(999));

        assert!(queue.poll().is_empty());
    }

    #[test]
    fn repeating_timer_catches_up_once_per_interval() {
        let (clock, mut queue) = queue();
        let handle = queue.schedule_repeating(Duration::from_secs(1));

        clock.advance(Duration::from_millis(3500));

        assert_eq!(queue.poll(), vec![handle, handle, handle]);
        assert!(queue.poll().is_empty());
    }

    #[test]
    fn interleaves_timers_by_deadline() {
        let (clock, mut queue) = queue();
        let fast = queue.schedule_repeating(Duration::from_millis(1000));
        let slow = queue.schedule_repeating(Duration::from_millis(1500));

        clock.advance(Duration::from_millis(2000));

        assert_eq!(queue.poll(), vec![fast, slow, fast]);
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let (clock, mut queue) = queue();
        let handle = queue.schedule_repeating(Duration::from_secs(1));

        assert!(queue.cancel(handle));
        assert!(!queue.cancel(handle));
        clock.advance(Duration::from_secs(5));

        assert!(queue.poll().is_empty());
        assert!(queue.next_deadline().is_none());
    }

    #[test]
    fn manual_clock_keeps_sub_millisecond_steps() {
        let clock = ManualClock::new();

        for _ in 0..4 {
            clock.advance(Duration::from_micros(250));
        }

        assert_eq!(clock.elapsed(), Duration::from_millis(1));
    }

    #[test]
    fn handles_are_not_reused() {
        let (_clock, mut queue) = queue();
        let first = queue.schedule_repeating(Duration::from_secs(1));
        queue.cancel(first);

        let second = queue.schedule_repeating(Duration::from_secs(1));

        assert_ne!(first, second);
    }
}
