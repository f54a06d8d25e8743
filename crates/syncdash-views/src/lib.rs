// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod dashboard;
pub mod grid;
pub mod revisions;
pub mod runtime;
pub mod slice;
pub mod users;

pub use dashboard::*;
pub use grid::*;
pub use revisions::*;
pub use runtime::*;
pub use slice::*;
pub use users::*;

/// What happened to one load once its response arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Written to the store; carries the number of rows received.
    Applied(usize),
    /// The selection moved on while the request was in flight.
    Ignored,
    Failed { message: String },
}

impl LoadOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    pub fn failure(&self) -> Option<&str> {
        match self {
            Self::Failed { message } => Some(message),
            _ => None,
        }
    }

    pub(crate) fn failed(error: &anyhow::Error) -> Self {
        Self::Failed {
            message: format!("{error:#}"),
        }
    }
}
