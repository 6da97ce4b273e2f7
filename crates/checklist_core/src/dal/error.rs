//! Access layer error taxonomy.

use crate::model::object_id::{InvalidObjectId, ObjectId};
use crate::model::todo_list::DocumentError;
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type DalResult<T> = Result<T, DalError>;

/// Failure of one access layer call.
#[derive(Debug)]
pub enum DalError {
    /// External id text does not decode; no store call was made.
    InvalidIdentifier(InvalidObjectId),
    /// A single-list fetch matched no document.
    NotFound(ObjectId),
    /// A stored document does not have the view-model shape.
    MalformedDocument(DocumentError),
    /// Store transport or engine failure; retry policy is the caller's.
    Store(StoreError),
}

impl Display for DalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidIdentifier(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "todo list not found: {id}"),
            Self::MalformedDocument(err) => write!(f, "malformed todo list document: {err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DalError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidIdentifier(err) => Some(err),
            Self::NotFound(_) => None,
            Self::MalformedDocument(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<InvalidObjectId> for DalError {
    fn from(value: InvalidObjectId) -> Self {
        Self::InvalidIdentifier(value)
    }
}

impl From<DocumentError> for DalError {
    fn from(value: DocumentError) -> Self {
        Self::MalformedDocument(value)
    }
}

impl From<StoreError> for DalError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}
