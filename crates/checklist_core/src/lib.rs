//! Data-access layer for named todo lists of checkable items.
//! All list consistency rests on single atomic document-store calls.

pub mod dal;
pub mod logging;
pub mod model;
pub mod store;

pub use dal::error::{DalError, DalResult};
pub use dal::todo_dal::{DalOptions, SummaryStream, ToObjectId, TodoDal};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::object_id::{InvalidObjectId, ObjectId};
pub use model::todo_list::{Document, DocumentError, ListSummary, TodoItem, TodoList};
pub use store::{
    open_store, open_store_in_memory, with_transaction, DocumentStore, Filter, FindQuery,
    Projection, ReturnDocument, SortKey, SqliteDocumentStore, SqliteSession, StoreError,
    StoreResult, StoreSession, Update,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
