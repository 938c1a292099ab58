//! Step progress for one execution attempt.
//!
//! Steps are identified by position and type: a completion for type `T`
//! advances to the first `T` after the current step. Anything else is
//! ignored, so a misbehaving provider can never move the cursor backwards or
//! onto a step that was not announced.

use crate::provider::{ProgressStep, ProviderEvent, StepKind};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    Done,
    Current,
    Pending,
}

/// What an applied event changed.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    /// A new expected list was announced.
    Expected(Vec<ProgressStep>),
    Completed {
        ordinal: usize,
        step: ProgressStep,
    },
}

/// Point-in-time copy of a tracker.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub active: bool,
    pub steps: Vec<ProgressStep>,
    pub ordinal: Option<usize>,
}

#[derive(Debug, Default)]
pub struct ProgressTracker {
    expected: Vec<ProgressStep>,
    ordinal: Option<usize>,
    active: bool,
}

impl ProgressTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh, empty tracking session.
    pub fn begin(&mut self) {
        self.expected.clear();
        self.ordinal = None;
        self.active = true;
    }

    /// Stop accepting events. The final state stays readable.
    pub fn close(&mut self) {
        self.active = false;
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn apply(&mut self, event: ProviderEvent) -> Option<ProgressUpdate> {
        if !self.active {
            debug!("Ignoring provider event outside an attempt");
            return None;
        }
        match event {
            ProviderEvent::ExpectedSteps { steps, .. } => {
                self.expected = steps;
                self.ordinal = None;
                Some(ProgressUpdate::Expected(self.expected.clone()))
            }
            ProviderEvent::StepComplete { step, .. } => {
                let Some(ordinal) = self.next_position(&step.kind) else {
                    debug!(step = %step.kind, "Ignoring completion for step not expected");
                    return None;
                };
                let slot = &mut self.expected[ordinal];
                if !step.data.is_null() {
                    slot.data = step.data;
                }
                self.ordinal = Some(ordinal);
                Some(ProgressUpdate::Completed {
                    ordinal,
                    step: slot.clone(),
                })
            }
        }
    }

    fn next_position(&self, kind: &StepKind) -> Option<usize> {
        let start = self.ordinal.map_or(0, |o| o + 1);
        self.expected
            .iter()
            .skip(start)
            .position(|s| &s.kind == kind)
            .map(|i| i + start)
    }

    #[must_use]
    pub fn expected(&self) -> &[ProgressStep] {
        &self.expected
    }

    #[must_use]
    pub fn current(&self) -> Option<&ProgressStep> {
        self.ordinal.and_then(|o| self.expected.get(o))
    }

    /// Position of the current step within the expected list.
    #[must_use]
    pub fn completion_ordinal(&self) -> Option<usize> {
        self.ordinal
    }

    #[must_use]
    pub fn state(&self, position: usize) -> Option<StepState> {
        if position >= self.expected.len() {
            return None;
        }
        Some(match self.ordinal {
            Some(o) if position < o => StepState::Done,
            Some(o) if position == o => StepState::Current,
            _ => StepState::Pending,
        })
    }

    #[must_use]
    pub fn states(&self) -> Vec<StepState> {
        (0..self.expected.len())
            .filter_map(|i| self.state(i))
            .collect()
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            active: self.active,
            steps: self.expected.clone(),
            ordinal: self.ordinal,
        }
    }
}
