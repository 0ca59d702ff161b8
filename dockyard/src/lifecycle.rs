//! The lifecycle of an image, from descriptor to exited foreground process.

use std::fmt::{self, Display, Formatter};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum LifecycleState {
    Unbuilt,
    Assembling,
    Built,
    Starting,
    Running,
    Exited,
    Crashed,
}

impl LifecycleState {
    /// Returns `true` if the lifecycle can move from this state to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::{Assembling, Built, Crashed, Exited, Running, Starting, Unbuilt};

        matches!(
            (self, next),
            (Unbuilt, Assembling)
                | (Assembling, Built | Crashed)
                | (Built, Starting)
                | (Starting, Running | Crashed)
                | (Running, Exited | Crashed)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Exited | LifecycleState::Crashed)
    }
}

impl Display for LifecycleState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Unbuilt => "unbuilt",
            LifecycleState::Assembling => "assembling",
            LifecycleState::Built => "built",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Exited => "exited",
            LifecycleState::Crashed => "crashed",
        };

        f.write_str(name)
    }
}

#[derive(thiserror::Error, Debug, Eq, PartialEq)]
#[error("Invalid lifecycle transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: LifecycleState,
    pub to: LifecycleState,
}

/// A shareable handle to the state of one image's lifecycle.
///
/// Clones refer to the same lifecycle, so the state can be observed while a build or launch that
/// owns another handle is in progress.
#[derive(Clone, Debug)]
pub struct Lifecycle {
    history: Arc<Mutex<Vec<LifecycleState>>>,
}

impl Lifecycle {
    /// A lifecycle for an image that has not been built yet.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(LifecycleState::Unbuilt)
    }

    /// A lifecycle for an image that is already built, e.g. one read from an image store.
    #[must_use]
    pub fn built() -> Self {
        Self::starting_at(LifecycleState::Built)
    }

    fn starting_at(state: LifecycleState) -> Self {
        Self {
            history: Arc::new(Mutex::new(vec![state])),
        }
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history
            .last()
            .copied()
            .unwrap_or(LifecycleState::Unbuilt)
    }

    /// All states this lifecycle went through, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<LifecycleState> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn transition(&self, next: LifecycleState) -> Result<(), InvalidTransition> {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let current = history.last().copied().unwrap_or(LifecycleState::Unbuilt);

        if current.can_transition_to(next) {
            log::debug!("Lifecycle: {current} -> {next}");
            history.push(next);
            Ok(())
        } else {
            Err(InvalidTransition {
                from: current,
                to: next,
            })
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::LifecycleState::*;
    use super::*;

    #[test]
    fn full_successful_lifecycle() {
        let lifecycle = Lifecycle::new();

        for state in [Assembling, Built, Starting, Running, Exited] {
            lifecycle.transition(state).unwrap();
        }

        assert_eq!(
            lifecycle.history(),
            vec![Unbuilt, Assembling, Built, Starting, Running, Exited]
        );
        assert!(lifecycle.state().is_terminal());
    }

    #[test]
    fn failures_crash() {
        let build = Lifecycle::new();
        build.transition(Assembling).unwrap();
        build.transition(Crashed).unwrap();

        let launch = Lifecycle::built();
        launch.transition(Starting).unwrap();
        launch.transition(Crashed).unwrap();

        assert_eq!(build.state(), Crashed);
        assert_eq!(launch.state(), Crashed);
    }

    #[test]
    fn rejects_invalid_transitions() {
        let lifecycle = Lifecycle::new();

        assert_eq!(
            lifecycle.transition(Running),
            Err(InvalidTransition {
                from: Unbuilt,
                to: Running
            })
        );
        assert_eq!(lifecycle.state(), Unbuilt);

        let lifecycle = Lifecycle::built();
        lifecycle.transition(Starting).unwrap();
        lifecycle.transition(Running).unwrap();
        lifecycle.transition(Exited).unwrap();

        assert!(lifecycle.transition(Running).is_err());
        assert!(lifecycle.transition(Crashed).is_err());
        assert!(!Built.can_transition_to(Assembling));
        assert!(!Starting.can_transition_to(Exited));
    }

    #[test]
    fn clones_share_state() {
        let lifecycle = Lifecycle::built();
        let observer = lifecycle.clone();

        lifecycle.transition(Starting).unwrap();
        assert_eq!(observer.state(), Starting);
    }
}
