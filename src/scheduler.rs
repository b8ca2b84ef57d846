use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::agent::BioGuardAgent;
use crate::dispatch::NotificationDispatcher;
use crate::perception::PerceptionSource;
use crate::timer::{Clock, TimerHandle, TimerQueue, TimerService};
use crate::types::Action;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub samples: u64,
    pub rejected: u64,
    pub escalations: u64,
    pub dispatches: u64,
    pub cancelled: u64,
}

/// Drives an agent from a perception source on one thread: a repeating
/// sampling timer feeds the agent, and between samples the agent's own
/// countdown timers are serviced.
pub struct Scheduler<D, S> {
    agent: BioGuardAgent<D>,
    source: S,
    clock: Arc<dyn Clock>,
    sampling: TimerQueue,
    sample_timer: TimerHandle,
    started: Instant,
    exhausted: bool,
    stats: RunStats,
}

impl<D: NotificationDispatcher, S: PerceptionSource> Scheduler<D, S> {
    pub fn new(
        agent: BioGuardAgent<D>,
        source: S,
        clock: Arc<dyn Clock>,
        sample_interval: Duration,
    ) -> Self {
        let mut sampling = TimerQueue::new(clock.clone());
        let sample_timer = sampling.schedule_repeating(sample_interval);
        let started = clock.now();

        Self {
            agent,
            source,
            clock,
            sampling,
            sample_timer,
            started,
            exhausted: false,
            stats: RunStats::default(),
        }
    }

    pub fn agent(&self) -> &BioGuardAgent<D> {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut BioGuardAgent<D> {
        &mut self.agent
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Service everything that is due right now. Countdown ticks that came
    /// due before a sample are handled before it.
    pub fn tick(&mut self) {
        let actions = self.agent.poll_timers();
        self.record(actions);

        for handle in self.sampling.poll() {
            if handle != self.sample_timer || self.exhausted {
                continue;
            }
            self.sample();
            let actions = self.agent.poll_timers();
            self.record(actions);
        }
    }

    fn sample(&mut self) {
        let now_ms = self.clock.now().duration_since(self.started).as_millis() as u64;
        let Some(input) = self.source.next_perception(now_ms) else {
            info!(samples = self.stats.samples, "perception source exhausted");
            self.exhausted = true;
            self.sampling.cancel(self.sample_timer);
            return;
        };

        self.stats.samples += 1;
        match input.and_then(|raw| self.agent.perceive(&raw)) {
            Ok(action) => self.record([action]),
            Err(e) => {
                // Rejected input is already logged by the agent; source
                // errors land here too and are just as non-fatal.
                debug!(error = %e, "sample dropped");
                self.stats.rejected += 1;
            }
        }
    }

    fn record(&mut self, actions: impl IntoIterator<Item = Action>) {
        for action in actions {
            match action {
                Action::StartCountdown(_) => self.stats.escalations += 1,
                Action::Dispatched(_) => self.stats.dispatches += 1,
                Action::Cancelled => self.stats.cancelled += 1,
                _ => {}
            }
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        [self.sampling.next_deadline(), self.agent.next_deadline()]
            .into_iter()
            .flatten()
            .min()
    }

    /// Run until the source is exhausted and any escalation has finished,
    /// or `max_samples` have been taken.
    pub fn run(&mut self, max_samples: Option<u64>) -> RunStats {
        loop {
            self.tick();

            let limit_hit = max_samples.is_some_and(|max| self.stats.samples >= max);
            if limit_hit && !self.exhausted {
                self.exhausted = true;
                self.sampling.cancel(self.sample_timer);
            }
            let Some(deadline) = self.next_deadline() else {
                break;
            };

            let now = self.clock.now();
            if deadline > now {
                self.clock.sleep(deadline - now);
            }
        }

        info!(stats = ?self.stats, "scheduler stopped");
        self.stats
    }
}
