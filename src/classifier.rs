use crate::buffer::PerceptionBuffer;
use crate::types::{AgentState, PerceptionFrame, Posture};

/// Maps one frame to an operational state. A fall always wins over an
/// apparently active presence.
pub fn classify(frame: &PerceptionFrame) -> AgentState {
    if frame.posture == Posture::Fallen {
        return AgentState::Alert;
    }

    if frame.has_person && frame.movement {
        AgentState::Active
    } else {
        AgentState::Standby
    }
}

pub fn classify_latest(buffer: &PerceptionBuffer) -> AgentState {
    buffer.latest().map_or(AgentState::Standby, classify)
}
