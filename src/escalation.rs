//! Countdown from a detected fall to a single caregiver dispatch.
//!
//! ```text
//!          begin()              remaining == 0            cooldown elapsed
//!  Idle ───────────► CountingDown ─────────────► Fired ─────────────────► Idle
//!   ▲                     │        (dispatch once)  │
//!   └──── reset() ────────┴─────── reset() / acknowledge() ┘
//! ```
//!
//! Idle is the absence of a session. A session owns the handle of its
//! countdown timer; ticks carrying any other handle are dropped, which
//! is what keeps a tick polled just before a reset from landing.

use std::time::Duration;

use tracing::{debug, info};

use crate::config::AgentConfig;
use crate::dispatch::{DispatchOutcome, NotificationDispatcher};
use crate::timer::{TimerHandle, TimerService};
use crate::types::{Action, AgentState, AlertContext, Contact, EscalationPhase, PerceptionFrame, SessionId};

#[derive(Debug)]
struct Session {
    id: SessionId,
    phase: EscalationPhase,
    remaining: u32,
    cooldown_left: u32,
    /// `None` once a fired session has no cooldown left to count.
    timer: Option<TimerHandle>,
    target: Option<Contact>,
    trigger: Option<PerceptionFrame>,
}

#[derive(Debug)]
pub struct EscalationController {
    countdown_ticks: u32,
    interval: Duration,
    cooldown_ticks: u32,
    session: Option<Session>,
    next_session: u64,
    last_outcome: Option<DispatchOutcome>,
}

impl EscalationController {
    pub fn new(countdown_ticks: u32, interval: Duration, cooldown_ticks: u32) -> Self {
        Self {
            countdown_ticks: countdown_ticks.max(1),
            interval,
            cooldown_ticks,
            session: None,
            next_session: 1,
            last_outcome: None,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(
            config.countdown_ticks,
            config.countdown_interval(),
            config.cooldown_ticks,
        )
    }

    /// Start a countdown. Returns `None` without touching the running
    /// session if one already exists.
    pub fn begin(
        &mut self,
        target: Option<Contact>,
        trigger: Option<PerceptionFrame>,
        timers: &mut dyn TimerService,
    ) -> Option<SessionId> {
        if let Some(session) = &self.session {
            debug!(
                session = session.id.0,
                phase = ?session.phase,
                "escalation already in progress, not re-arming"
            );
            return None;
        }

        let id = SessionId(self.next_session);
        self.next_session += 1;
        let timer = timers.schedule_repeating(self.interval);

        info!(
            session = id.0,
            ticks = self.countdown_ticks,
            contact = target.as_ref().map(|c| c.name.as_str()),
            "escalation countdown started"
        );
        self.session = Some(Session {
            id,
            phase: EscalationPhase::CountingDown,
            remaining: self.countdown_ticks,
            cooldown_left: self.cooldown_ticks,
            timer: Some(timer),
            target,
            trigger,
        });
        Some(id)
    }

    pub fn on_tick(
        &mut self,
        handle: TimerHandle,
        timers: &mut dyn TimerService,
        dispatcher: &mut dyn NotificationDispatcher,
    ) -> Action {
        let Some(session) = self.session.as_mut() else {
            return Action::None;
        };
        if session.timer != Some(handle) {
            debug!(session = session.id.0, "stale countdown tick dropped");
            return Action::None;
        }

        match session.phase {
            EscalationPhase::CountingDown => {
                session.remaining = session.remaining.saturating_sub(1);
                if session.remaining > 0 {
                    debug!(session = session.id.0, remaining = session.remaining, "countdown");
                    return Action::CountdownTick {
                        remaining: session.remaining,
                    };
                }

                // Fired before dispatching: nothing below can run twice.
                session.phase = EscalationPhase::Fired;
                if self.cooldown_ticks == 0 {
                    // Ticks already polled from this timer must not reach the
                    // Fired arm and close the session.
                    if let Some(timer) = session.timer.take() {
                        timers.cancel(timer);
                    }
                }
                let context = AlertContext {
                    session: session.id,
                    state: AgentState::Alert,
                    frame: session.trigger,
                };
                info!(session = session.id.0, "countdown expired, dispatching");
                let outcome = dispatcher.dispatch(session.target.as_ref(), &context);
                self.last_outcome = Some(outcome);
                Action::Dispatched(context.session)
            }
            EscalationPhase::Fired => {
                session.cooldown_left = session.cooldown_left.saturating_sub(1);
                if session.cooldown_left > 0 {
                    return Action::None;
                }
                if let Some(timer) = session.timer.take() {
                    timers.cancel(timer);
                }
                info!(session = session.id.0, "escalation cooled down");
                self.session = None;
                Action::CooledDown
            }
            EscalationPhase::Idle => Action::None,
        }
    }

    /// Drop any session and its pending ticks. Safe to call when idle.
    pub fn reset(&mut self, timers: &mut dyn TimerService) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        if let Some(timer) = session.timer {
            timers.cancel(timer);
        }
        info!(
            session = session.id.0,
            phase = ?session.phase,
            remaining = session.remaining,
            "escalation reset"
        );
        true
    }

    /// Close a fired session. Does nothing while still counting down.
    pub fn acknowledge(&mut self, timers: &mut dyn TimerService) -> bool {
        match self.phase() {
            EscalationPhase::Fired => self.reset(timers),
            _ => false,
        }
    }

    pub fn phase(&self) -> EscalationPhase {
        self.session
            .as_ref()
            .map_or(EscalationPhase::Idle, |s| s.phase)
    }

    pub fn remaining(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.remaining)
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    pub fn timer(&self) -> Option<TimerHandle> {
        self.session.as_ref().and_then(|s| s.timer)
    }

    pub fn last_outcome(&self) -> Option<&DispatchOutcome> {
        self.last_outcome.as_ref()
    }
}
