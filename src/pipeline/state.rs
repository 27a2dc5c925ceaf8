use std::fmt;

use crate::errors::PipelineError;

/// Unit of work whose failure ends a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    /// Per-request workspace setup
    Prepare,
    Extract,
    Normalize,
    Synthesize,
    Align,
    Compose,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Extract => "extract",
            Self::Normalize => "normalize",
            Self::Synthesize => "synthesize",
            Self::Align => "align",
            Self::Compose => "compose",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one request
///
/// `Received -> Extracted -> Normalized -> Synthesized -> Aligned -> Composed -> Done`,
/// with `Failed` reachable from every non-terminal state.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    Received,
    Extracted,
    Normalized,
    Synthesized,
    Aligned,
    Composed,
    Done,
    Failed { stage: PipelineStage, reason: String },
}

impl PipelineState {
    // Position on the happy path, `None` for `Failed`
    fn ordinal(&self) -> Option<u8> {
        match self {
            Self::Received => Some(0),
            Self::Extracted => Some(1),
            Self::Normalized => Some(2),
            Self::Synthesized => Some(3),
            Self::Aligned => Some(4),
            Self::Composed => Some(5),
            Self::Done => Some(6),
            Self::Failed { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed { .. })
    }

    /// Stage that runs while the request sits in this state
    pub fn pending_stage(&self) -> Option<PipelineStage> {
        match self {
            Self::Received => Some(PipelineStage::Extract),
            Self::Extracted => Some(PipelineStage::Normalize),
            Self::Normalized => Some(PipelineStage::Synthesize),
            Self::Synthesized => Some(PipelineStage::Align),
            Self::Aligned | Self::Composed => Some(PipelineStage::Compose),
            Self::Done | Self::Failed { .. } => None,
        }
    }

    /// Whether `next` may follow this state
    pub fn can_transition_to(&self, next: &PipelineState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.ordinal(), next.ordinal()) {
            (_, None) => true,
            (Some(current), Some(next)) => next == current + 1,
            (None, Some(_)) => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Extracted => "extracted",
            Self::Normalized => "normalized",
            Self::Synthesized => "synthesized",
            Self::Aligned => "aligned",
            Self::Composed => "composed",
            Self::Done => "done",
            Self::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { stage, reason } => write!(f, "failed at {}: {}", stage, reason),
            other => f.write_str(other.name()),
        }
    }
}

/// Current state of a request plus every state it went through
#[derive(Debug, Clone)]
pub struct StateMachine {
    history: Vec<PipelineState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            history: vec![PipelineState::Received],
        }
    }

    pub fn current(&self) -> &PipelineState {
        // history always holds at least `Received`
        &self.history[self.history.len() - 1]
    }

    /// Move to `next`, refusing skipped, repeated or backward transitions
    pub fn transition(&mut self, next: PipelineState) -> Result<&PipelineState, PipelineError> {
        let current = self.current();
        if !current.can_transition_to(&next) {
            return Err(PipelineError::InvalidTransition {
                from: current.to_string(),
                to: next.to_string(),
            });
        }
        self.history.push(next);
        Ok(self.current())
    }

    /// Move to `Failed` for the given stage
    pub fn fail(&mut self, stage: PipelineStage, reason: impl Into<String>) -> Result<&PipelineState, PipelineError> {
        self.transition(PipelineState::Failed {
            stage,
            reason: reason.into(),
        })
    }

    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    pub fn into_history(self) -> Vec<PipelineState> {
        self.history
    }
}
