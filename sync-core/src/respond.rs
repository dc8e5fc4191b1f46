//! Turning action outcomes into HTTP-shaped responses.
//!
//! Handlers pass a [`ResponseStrategy`] explicitly; [`DefaultResponder`]
//! covers the common cases:
//!
//! | action                 | outcome   | status | body                 |
//! |------------------------|-----------|--------|----------------------|
//! | index / show / update  | success   | 200    | composed payload     |
//! | create                 | success   | 201    | composed payload     |
//! | destroy                | success   | 200    | `{}`                 |
//! | any                    | failure   | 422    | `{"errors": {...}}`  |

use serde::Serialize;
use serde_json::{json, Value};
use sync_types::{SyncError, ValidationErrors};

use crate::compose::ResponsePayload;

/// The controller action being answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// List a collection.
    Index,
    /// Show one record.
    Show,
    /// Create a record.
    Create,
    /// Update a record.
    Update,
    /// Delete a record.
    Destroy,
}

/// Result of running an action.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The action succeeded.
    Success(T),
    /// The action was rejected by validation.
    Failure(ValidationErrors),
}

/// Response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// 200
    Ok,
    /// 201
    Created,
    /// 422
    UnprocessableEntity,
}

impl Status {
    /// Numeric HTTP status code.
    pub fn code(&self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::Created => 201,
            Self::UnprocessableEntity => 422,
        }
    }
}

/// A rendered response.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    /// Status to send.
    pub status: Status,
    /// JSON body.
    pub body: Value,
}

/// Renders outcomes of actions on records of type `R`.
pub trait ResponseStrategy<R>: Send + Sync {
    /// Render `outcome` for `action`.
    fn render(
        &self,
        action: Action,
        outcome: Outcome<ResponsePayload<R>>,
    ) -> Result<Rendered, SyncError>;
}

/// The stock strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultResponder;

impl<R: Serialize> ResponseStrategy<R> for DefaultResponder {
    fn render(
        &self,
        action: Action,
        outcome: Outcome<ResponsePayload<R>>,
    ) -> Result<Rendered, SyncError> {
        match outcome {
            Outcome::Failure(errors) => Ok(Rendered {
                status: Status::UnprocessableEntity,
                body: json!({ "errors": errors }),
            }),
            Outcome::Success(_) if action == Action::Destroy => Ok(Rendered {
                status: Status::Ok,
                body: json!({}),
            }),
            Outcome::Success(payload) => Ok(Rendered {
                status: if action == Action::Create {
                    Status::Created
                } else {
                    Status::Ok
                },
                body: serde_json::to_value(&payload).map_err(SyncError::Serialization)?,
            }),
        }
    }
}
