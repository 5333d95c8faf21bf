//! Commanded state shared by threads, stages and pipelines

/// Start/pause/stop state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ControlState {
    /// Iterations run
    Started,
    /// No new iteration starts; resumable without re-initialisation
    Paused,
    /// Initial and terminal state
    #[default]
    Stopped,
}

impl ControlState {
    pub fn is_started(&self) -> bool {
        matches!(self, ControlState::Started)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, ControlState::Paused)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, ControlState::Stopped)
    }

    /// Display name for the state
    pub fn display_name(&self) -> &'static str {
        match self {
            ControlState::Started => "Started",
            ControlState::Paused => "Paused",
            ControlState::Stopped => "Stopped",
        }
    }
}

impl std::fmt::Display for ControlState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}
