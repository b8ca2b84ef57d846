use std::sync::Arc;
use std::time::Duration;

use bioguard_agent::agent::BioGuardAgent;
use bioguard_agent::dispatch::{AlertCue, AlertCueChannel, ChannelDispatcher, DialChannel, DialRequest};
use bioguard_agent::timer::ManualClock;
use bioguard_agent::types::Action;
use bioguard_agent::{AgentConfig, AgentState, Contact, EscalationPhase, PerceptionFrame, Posture, RawPerception};
use crossbeam_channel::Receiver;

struct Harness {
    clock: Arc<ManualClock>,
    agent: BioGuardAgent<ChannelDispatcher>,
    cues: Receiver<AlertCue>,
    dials: Receiver<DialRequest>,
    ts: u64,
}

impl Harness {
    fn new(config: AgentConfig) -> Self {
        let clock = ManualClock::new();
        let (cue, cues) = AlertCueChannel::new();
        let (dial, dials) = DialChannel::new();
        let dispatcher = ChannelDispatcher::new().with_channel(cue).with_channel(dial);
        let agent = BioGuardAgent::new(&config, dispatcher, clock.clone());
        Self {
            clock,
            agent,
            cues,
            dials,
            ts: 0,
        }
    }

    fn submit(&mut self, movement: bool, has_person: bool, posture: Posture) -> AgentState {
        self.ts += 1;
        let raw = RawPerception::from(PerceptionFrame::new(movement, has_person, posture, self.ts));
        self.agent.submit_perception(&raw).expect("valid frame")
    }

    fn fall(&mut self) -> AgentState {
        self.submit(false, true, Posture::Fallen)
    }

    fn walk(&mut self) -> AgentState {
        self.submit(true, true, Posture::Standing)
    }

    fn seconds(&mut self, n: u64) -> Vec<Action> {
        let mut actions = Vec::new();
        for _ in 0..n {
            self.clock.advance(Duration::from_secs(1));
            actions.extend(self.agent.poll_timers());
        }
        actions
    }
}

fn contact() -> Contact {
    Contact {
        name: "Li Wei".into(),
        number: "13800000000".into(),
    }
}

#[test]
fn buffer_keeps_last_ten_frames() {
    let mut h = Harness::new(AgentConfig::default());

    for _ in 0..15 {
        h.submit(false, false, Posture::Standing);
        assert!(h.agent.buffer().len() <= 10);
    }

    let kept: Vec<u64> = h.agent.buffer().iter().map(|f| f.timestamp_ms).collect();
    assert_eq!(kept, (6..=15).collect::<Vec<_>>());
}

#[test]
fn fall_dispatches_exactly_once_after_three_ticks() {
    let mut h = Harness::new(AgentConfig {
        contact: Some(contact()),
        ..AgentConfig::default()
    });

    assert_eq!(h.fall(), AgentState::Alert);
    assert_eq!(h.agent.current_countdown(), Some(3));

    h.seconds(3);

    assert_eq!(h.cues.len(), 1);
    assert_eq!(h.dials.try_recv().unwrap().uri, "tel:13800000000");
    assert_eq!(h.agent.escalation_phase(), EscalationPhase::Fired);

    // UI polling a fired escalation must not dispatch again.
    for _ in 0..5 {
        assert_eq!(h.agent.escalation_phase(), EscalationPhase::Fired);
        h.fall();
    }
    h.seconds(5);
    assert_eq!(h.cues.len(), 1);
}

#[test]
fn reset_after_one_tick_cancels_dispatch() {
    let mut h = Harness::new(AgentConfig::default());
    h.fall();
    let stale = h.agent.countdown_timer().unwrap();
    h.seconds(1);
    assert_eq!(h.agent.current_countdown(), Some(2));

    assert_eq!(h.agent.reset_escalation(), Action::Cancelled);
    // A tick that was already in flight when the reset happened.
    assert_eq!(h.agent.on_timer(stale), Action::None);
    h.seconds(10);

    assert!(h.cues.is_empty());
    assert_eq!(h.agent.escalation_phase(), EscalationPhase::Idle);
    assert_eq!(h.agent.current_countdown(), None);
    assert!(h.agent.next_deadline().is_none());
}

#[test]
fn repeated_alert_does_not_rearm() {
    let mut h = Harness::new(AgentConfig::default());
    h.fall();
    h.seconds(1);

    h.fall();
    h.fall();

    assert_eq!(h.agent.current_countdown(), Some(2));
    h.seconds(2);
    assert_eq!(h.cues.len(), 1);
}

#[test]
fn reset_when_idle_changes_nothing() {
    let mut h = Harness::new(AgentConfig::default());
    h.walk();

    assert_eq!(h.agent.reset_escalation(), Action::None);
    assert_eq!(h.agent.reset_escalation(), Action::None);
    assert_eq!(h.agent.escalation_phase(), EscalationPhase::Idle);
}

#[test]
fn sustained_fall_never_rearms_after_cooldown() {
    let mut h = Harness::new(AgentConfig {
        cooldown_ticks: 2,
        ..AgentConfig::default()
    });
    h.fall();
    h.seconds(3);
    h.fall();

    let actions = h.seconds(2);

    assert_eq!(actions, vec![Action::CooledDown]);
    assert_eq!(h.agent.escalation_phase(), EscalationPhase::Idle);
    h.fall();
    h.seconds(5);
    assert_eq!(h.cues.len(), 1);

    // Person gets up, then falls again: a new session.
    h.walk();
    assert_eq!(h.fall(), AgentState::Alert);
    h.seconds(3);
    let sessions: Vec<u64> = h.cues.try_iter().map(|c| c.session.0).collect();
    assert_eq!(sessions, vec![1, 2]);
}

#[test]
fn alert_without_contact_still_raises_local_cue() {
    let mut h = Harness::new(AgentConfig::default());
    h.fall();

    h.seconds(3);

    assert_eq!(h.cues.len(), 1);
    assert!(h.dials.is_empty());
    let outcome = h.agent.escalation().last_outcome().unwrap();
    assert_eq!(outcome.delivered(), 1);
}

#[test]
fn contact_configured_later_is_used() {
    let mut h = Harness::new(AgentConfig::default());
    h.agent.configure_contact(Some(contact()));
    h.fall();

    h.seconds(3);

    assert_eq!(h.dials.try_recv().unwrap().contact, contact());
}

#[test]
fn malformed_input_keeps_last_valid_state() {
    let mut h = Harness::new(AgentConfig::default());
    h.walk();

    let broken: RawPerception =
        serde_json::from_str(r#"{"movement":true,"hasPerson":true,"timestamp":99}"#).unwrap();

    assert!(h.agent.submit_perception(&broken).is_err());
    assert_eq!(h.agent.current_state(), AgentState::Active);
    assert_eq!(h.agent.buffer().len(), 1);
}

#[test]
fn lagging_loop_keeps_uncooled_alarm_fired() {
    let mut h = Harness::new(AgentConfig {
        cooldown_ticks: 0,
        ..AgentConfig::default()
    });
    h.fall();

    h.clock.advance(Duration::from_secs(5));
    let actions = h.agent.poll_timers();

    assert!(matches!(
        actions.as_slice(),
        [
            Action::CountdownTick { remaining: 2 },
            Action::CountdownTick { remaining: 1 },
            Action::Dispatched(_)
        ]
    ));
    assert_eq!(h.agent.escalation_phase(), EscalationPhase::Fired);
    assert!(h.agent.next_deadline().is_none());
    assert_eq!(h.agent.acknowledge(), Action::Cancelled);
    assert_eq!(h.agent.escalation_phase(), EscalationPhase::Idle);
}

#[test]
fn second_fall_during_cooldown_escalates_once_cooled() {
    let mut h = Harness::new(AgentConfig {
        cooldown_ticks: 2,
        ..AgentConfig::default()
    });
    h.fall();
    h.seconds(3);
    h.walk();
    h.fall();
    assert_eq!(h.agent.escalation_phase(), EscalationPhase::Fired);

    let actions = h.seconds(2);

    assert!(matches!(actions.as_slice(), [Action::StartCountdown(_)]));
    assert_eq!(h.agent.current_countdown(), Some(3));
    h.seconds(3);
    let sessions: Vec<u64> = h.cues.try_iter().map(|c| c.session.0).collect();
    assert_eq!(sessions, vec![1, 2]);
}

#[test]
fn fall_during_cooldown_that_resolves_is_dropped() {
    let mut h = Harness::new(AgentConfig {
        cooldown_ticks: 2,
        ..AgentConfig::default()
    });
    h.fall();
    h.seconds(3);
    h.walk();
    h.fall();
    h.walk();

    let actions = h.seconds(2);

    assert_eq!(actions, vec![Action::CooledDown]);
    assert_eq!(h.agent.escalation_phase(), EscalationPhase::Idle);
}
