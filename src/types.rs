use serde::{Deserialize, Serialize};

use crate::error::{BioGuardError, BioGuardResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentState {
    Standby,
    Active,
    Alert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Posture {
    Standing,
    Sitting,
    Fallen,
    Unknown,
}

impl Posture {
    const ALL: [Posture; 4] = [
        Posture::Standing,
        Posture::Sitting,
        Posture::Fallen,
        Posture::Unknown,
    ];

    /// Wire label, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Posture::Standing => "standing",
            Posture::Sitting => "sitting",
            Posture::Fallen => "fallen",
            Posture::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }
}

/// A validated observation. Only built through [`RawPerception::validate`]
/// or [`PerceptionFrame::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PerceptionFrame {
    pub movement: bool,
    pub has_person: bool,
    pub posture: Posture,
    pub timestamp_ms: u64,
}

impl PerceptionFrame {
    pub fn new(movement: bool, has_person: bool, posture: Posture, timestamp_ms: u64) -> Self {
        Self {
            movement,
            has_person,
            posture,
            timestamp_ms,
        }
    }
}

/// Perception input as it arrives at the boundary. Every field may be
/// missing; posture is kept as text so unknown labels can be rejected
/// with a useful message instead of a serde error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPerception {
    pub movement: Option<bool>,
    pub has_person: Option<bool>,
    pub posture: Option<String>,
    #[serde(alias = "timestampMs")]
    pub timestamp: Option<u64>,
}

impl RawPerception {
    pub fn validate(&self) -> BioGuardResult<PerceptionFrame> {
        let movement = self.movement.ok_or(BioGuardError::MissingField("movement"))?;
        let has_person = self
            .has_person
            .ok_or(BioGuardError::MissingField("hasPerson"))?;
        let label = self
            .posture
            .as_deref()
            .ok_or(BioGuardError::MissingField("posture"))?;
        let posture = Posture::parse(label)
            .ok_or_else(|| BioGuardError::InvalidPerception(format!("unknown posture {label:?}")))?;
        let timestamp_ms = self
            .timestamp
            .ok_or(BioGuardError::MissingField("timestamp"))?;

        Ok(PerceptionFrame::new(movement, has_person, posture, timestamp_ms))
    }
}

impl From<PerceptionFrame> for RawPerception {
    fn from(frame: PerceptionFrame) -> Self {
        Self {
            movement: Some(frame.movement),
            has_person: Some(frame.has_person),
            posture: Some(frame.posture.as_str().to_string()),
            timestamp: Some(frame.timestamp_ms),
        }
    }
}

/// Caregiver reference. Opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub number: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SessionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationPhase {
    Idle,
    CountingDown,
    Fired,
}

/// What the agent did in response to a single input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    StartCountdown(SessionId),
    CountdownTick { remaining: u32 },
    Dispatched(SessionId),
    CooledDown,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertContext {
    pub session: SessionId,
    pub state: AgentState,
    pub frame: Option<PerceptionFrame>,
}
