use super::error::EngineError;
use std::fmt;

/// Lifecycle of a metadynamics run.
///
/// `Configured -> Running <-> Paused -> Finished`. A configured run may also be
/// finished directly. Queries are valid in every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RunState {
    #[default]
    Configured,
    Running,
    Paused,
    Finished,
}

impl RunState {
    pub fn start(self) -> Result<Self, EngineError> {
        match self {
            RunState::Configured => Ok(RunState::Running),
            from => Err(EngineError::InvalidTransition {
                from,
                action: "start",
            }),
        }
    }

    pub fn pause(self) -> Result<Self, EngineError> {
        match self {
            RunState::Running => Ok(RunState::Paused),
            from => Err(EngineError::InvalidTransition {
                from,
                action: "pause",
            }),
        }
    }

    pub fn resume(self) -> Result<Self, EngineError> {
        match self {
            RunState::Paused => Ok(RunState::Running),
            from => Err(EngineError::InvalidTransition {
                from,
                action: "resume",
            }),
        }
    }

    pub fn finish(self) -> Result<Self, EngineError> {
        match self {
            RunState::Finished => Err(EngineError::InvalidTransition {
                from: self,
                action: "finish",
            }),
            _ => Ok(RunState::Finished),
        }
    }

    #[inline]
    pub fn accepts_frames(self) -> bool {
        self == RunState::Running
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunState::Configured => "configured",
            RunState::Running => "running",
            RunState::Paused => "paused",
            RunState::Finished => "finished",
        };
        f.write_str(label)
    }
}
