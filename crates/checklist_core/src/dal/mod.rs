//! Todo list access layer.
//!
//! # Responsibility
//! - Expose the list/item operation set on top of any `DocumentStore`.
//! - Decode every returned document into a validated view model.
//!
//! # Invariants
//! - Each operation issues at most one store round trip; enumeration issues
//!   one per page.
//! - The layer holds no shared mutable state and never retries.
//! - Errors are returned to the caller, never logged and swallowed.

pub mod error;
pub mod todo_dal;
