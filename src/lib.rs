//! Fall-alert reasoning core.
//!
//! Perception frames are classified into an [`AgentState`]; a fall starts
//! a cancellable countdown that notifies a caregiver exactly once.

pub mod agent;
pub mod buffer;
pub mod classifier;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod escalation;
pub mod perception;
pub mod scheduler;
pub mod timer;
pub mod types;

pub use agent::BioGuardAgent;
pub use config::AgentConfig;
pub use error::{BioGuardError, BioGuardResult, ChannelError};
pub use types::{AgentState, Contact, EscalationPhase, PerceptionFrame, Posture, RawPerception};
