//! Domain values shared by the store and access layers.
//!
//! # Responsibility
//! - Define the store-native identifier and its external string codec.
//! - Define the validated view models returned to callers.
//!
//! # Invariants
//! - A list's `ObjectId` is assigned once by the store and never changes.
//! - Item ids are unique within their parent list only.

pub mod object_id;
pub mod todo_list;
