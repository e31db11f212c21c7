//! Build notifications.

use kiln_types::BuildResult;

/// Sent on the controller's broadcast channel when a generation finishes.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildEvent {
    /// Every finished generation, initial or watcher-triggered.
    Build(BuildResult),
    /// Watcher-triggered generations only, sent right after `Build`.
    Rebuild(BuildResult),
}

impl BuildEvent {
    pub fn result(&self) -> &BuildResult {
        match self {
            BuildEvent::Build(result) | BuildEvent::Rebuild(result) => result,
        }
    }

    /// "build" or "rebuild".
    pub fn name(&self) -> &'static str {
        match self {
            BuildEvent::Build(_) => "build",
            BuildEvent::Rebuild(_) => "rebuild",
        }
    }
}
