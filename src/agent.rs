use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::buffer::PerceptionBuffer;
use crate::classifier::classify;
use crate::config::AgentConfig;
use crate::dispatch::NotificationDispatcher;
use crate::error::{BioGuardError, BioGuardResult};
use crate::escalation::EscalationController;
use crate::timer::{Clock, TimerHandle, TimerQueue};
use crate::types::{Action, AgentState, Contact, EscalationPhase, PerceptionFrame, RawPerception};

pub struct BioGuardAgent<D> {
    state: AgentState,
    buffer: PerceptionBuffer,
    escalation: EscalationController,
    timers: TimerQueue,
    dispatcher: D,
    contact: Option<Contact>,
    rejected_count: u64,
    /// A fresh fall arrived while the previous session was still fired.
    pending_edge: bool,
}

impl<D: NotificationDispatcher> BioGuardAgent<D> {
    pub fn new(config: &AgentConfig, dispatcher: D, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: AgentState::Standby,
            buffer: PerceptionBuffer::new(config.buffer_capacity),
            escalation: EscalationController::from_config(config),
            timers: TimerQueue::new(clock),
            dispatcher,
            contact: config.contact.clone(),
            rejected_count: 0,
            pending_edge: false,
        }
    }

    pub fn configure_contact(&mut self, contact: Option<Contact>) {
        info!(
            contact = contact.as_ref().map(|c| c.name.as_str()),
            "caregiver contact configured"
        );
        self.contact = contact;
    }

    pub fn contact(&self) -> Option<&Contact> {
        self.contact.as_ref()
    }

    pub fn current_state(&self) -> AgentState {
        self.state
    }

    pub fn current_countdown(&self) -> Option<u32> {
        self.escalation.remaining()
    }

    pub fn escalation_phase(&self) -> EscalationPhase {
        self.escalation.phase()
    }

    pub fn escalation(&self) -> &EscalationController {
        &self.escalation
    }

    pub fn buffer(&self) -> &PerceptionBuffer {
        &self.buffer
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected_count
    }

    /// Validate boundary input and classify it. Rejected input leaves the
    /// buffer and state untouched.
    pub fn submit_perception(&mut self, raw: &RawPerception) -> BioGuardResult<AgentState> {
        self.perceive(raw).map(|_| self.state)
    }

    /// Like [`submit_perception`](Self::submit_perception) but reports what
    /// the frame set in motion.
    pub fn perceive(&mut self, raw: &RawPerception) -> BioGuardResult<Action> {
        match self.accept(raw) {
            Ok(frame) => Ok(self.step(frame)),
            Err(e) => {
                self.rejected_count += 1;
                warn!(error = %e, state = ?self.state, "perception rejected");
                Err(e)
            }
        }
    }

    fn accept(&self, raw: &RawPerception) -> BioGuardResult<PerceptionFrame> {
        let frame = raw.validate()?;
        if let Some(latest) = self.buffer.latest() {
            if frame.timestamp_ms < latest.timestamp_ms {
                return Err(BioGuardError::OutOfOrder {
                    latest: latest.timestamp_ms,
                    got: frame.timestamp_ms,
                });
            }
        }
        Ok(frame)
    }

    pub fn step(&mut self, frame: PerceptionFrame) -> Action {
        self.buffer.push(frame);
        let next = classify(&frame);
        let previous = std::mem::replace(&mut self.state, next);
        if previous != next {
            info!(from = ?previous, to = ?next, ts = frame.timestamp_ms, "state changed");
        }

        if !is_rising_edge(previous, next) {
            return Action::None;
        }
        if self.escalation.phase() == EscalationPhase::Fired {
            debug!("new fall while previous escalation is fired, deferring");
            self.pending_edge = true;
            return Action::None;
        }
        self.begin_escalation()
    }

    fn begin_escalation(&mut self) -> Action {
        let trigger = self.buffer.latest().copied();
        match self
            .escalation
            .begin(self.contact.clone(), trigger, &mut self.timers)
        {
            Some(session) => Action::StartCountdown(session),
            None => Action::None,
        }
    }

    /// Run every countdown tick that has come due.
    pub fn poll_timers(&mut self) -> Vec<Action> {
        self.timers
            .poll()
            .into_iter()
            .map(|handle| self.on_timer(handle))
            .filter(|action| *action != Action::None)
            .collect()
    }

    /// A cooldown that ends while a fall seen during the fired phase is
    /// still ongoing starts the next session straight away and reports
    /// that instead of [`Action::CooledDown`].
    pub fn on_timer(&mut self, handle: TimerHandle) -> Action {
        let action = self
            .escalation
            .on_tick(handle, &mut self.timers, &mut self.dispatcher);
        if action != Action::CooledDown {
            return action;
        }

        let pending = std::mem::take(&mut self.pending_edge);
        if pending && self.state == AgentState::Alert {
            info!("fall seen during cooldown still ongoing, escalating again");
            return self.begin_escalation();
        }
        action
    }

    pub fn countdown_timer(&self) -> Option<TimerHandle> {
        self.escalation.timer()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Cancel any escalation and fall back to standby. The next alert
    /// frame counts as a fresh detection.
    pub fn reset_escalation(&mut self) -> Action {
        let cancelled = self.escalation.reset(&mut self.timers);
        self.pending_edge = false;
        if self.state != AgentState::Standby {
            debug!(from = ?self.state, "state reset to standby");
            self.state = AgentState::Standby;
        }
        if cancelled {
            Action::Cancelled
        } else {
            Action::None
        }
    }

    /// Close a fired escalation without touching the derived state, so an
    /// alert that is still ongoing does not immediately re-arm.
    pub fn acknowledge(&mut self) -> Action {
        if self.escalation.acknowledge(&mut self.timers) {
            self.pending_edge = false;
            Action::Cancelled
        } else {
            Action::None
        }
    }
}

fn is_rising_edge(previous: AgentState, next: AgentState) -> bool {
    previous != AgentState::Alert && next == AgentState::Alert
}
