use crate::models::{QueryDescriptor, ResultPage};
use crate::SearchError;
use tracing::debug;

/// What the UI renders. Exactly one state is live at a time.
#[derive(Debug, Clone, PartialEq)]
pub enum PresentationState {
    Idle,
    Loading(QueryDescriptor),
    Success(ResultPage),
    Empty(QueryDescriptor),
    Error {
        descriptor: QueryDescriptor,
        reason: String,
    },
}

impl PresentationState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading(_) => "loading",
            Self::Success(_) => "success",
            Self::Empty(_) => "empty",
            Self::Error { .. } => "error",
        }
    }

    pub fn descriptor(&self) -> Option<&QueryDescriptor> {
        match self {
            Self::Idle => None,
            Self::Loading(descriptor) | Self::Empty(descriptor) => Some(descriptor),
            Self::Success(page) => Some(&page.descriptor),
            Self::Error { descriptor, .. } => Some(descriptor),
        }
    }

    pub fn page(&self) -> Option<&ResultPage> {
        match self {
            Self::Success(page) => Some(page),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading(_))
    }
}

/// Outcome of handing a response to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    Applied,
    /// The response belonged to a superseded descriptor and was ignored.
    Stale,
}

/// Last-request-wins state machine.
///
/// `begin` makes a descriptor current; `resolve` only commits an outcome
/// whose descriptor is still current, whatever order responses arrive in.
#[derive(Debug)]
pub struct PresentationMachine {
    state: PresentationState,
    current: Option<QueryDescriptor>,
}

impl Default for PresentationMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PresentationMachine {
    pub fn new() -> Self {
        Self {
            state: PresentationState::Idle,
            current: None,
        }
    }

    pub fn state(&self) -> &PresentationState {
        &self.state
    }

    pub fn current(&self) -> Option<&QueryDescriptor> {
        self.current.as_ref()
    }

    pub fn begin(&mut self, descriptor: QueryDescriptor) {
        self.current = Some(descriptor.clone());
        self.state = PresentationState::Loading(descriptor);
    }

    /// Term cleared or too short: drop results and forget the in-flight query.
    pub fn clear(&mut self) {
        self.current = None;
        self.state = PresentationState::Idle;
    }

    pub fn resolve(
        &mut self,
        descriptor: &QueryDescriptor,
        outcome: Result<ResultPage, SearchError>,
    ) -> Commit {
        if self.current.as_ref() != Some(descriptor) {
            debug!(term = descriptor.term(), page = descriptor.page(), "discarding superseded response");
            return Commit::Stale;
        }

        self.state = match outcome {
            Ok(page) if page.is_empty() => PresentationState::Empty(descriptor.clone()),
            Ok(page) => PresentationState::Success(page),
            Err(error) => PresentationState::Error {
                descriptor: descriptor.clone(),
                reason: error.user_message().to_string(),
            },
        };
        Commit::Applied
    }
}
