//! Todo list operations over a generic document store.
//!
//! # Responsibility
//! - Translate list/item use-cases into single atomic store calls.
//! - Thread the caller's optional session through to every store call.
//!
//! # Invariants
//! - Item mutations are one `find_one_and_update` scoped by `_id` plus
//!   `items.id`, returning the post-update list; there is no read-modify-write
//!   in process.
//! - A missing list and a missing item collapse into the same `None` result
//!   for item operations.
//! - Identifier decoding happens before any store call.

use crate::dal::error::{DalError, DalResult};
use crate::model::object_id::ObjectId;
use crate::model::todo_list::{fields, Document, ListSummary, TodoList};
use crate::store::{
    with_transaction, DocumentStore, Filter, FindQuery, Projection, ReturnDocument, SortKey,
    Update,
};
use log::debug;
use serde_json::Value;
use std::iter::FusedIterator;
use uuid::Uuid;

const DEFAULT_COLLECTION: &str = "todo_lists";
const DEFAULT_PAGE_SIZE: u32 = 100;

/// Library-level options for the access layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DalOptions {
    /// Collection holding list documents.
    pub collection: String,
    /// Documents fetched per enumeration round trip. Zero is treated as one.
    pub page_size: u32,
}

impl Default for DalOptions {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Anything usable as a list identifier: external text or a decoded id.
pub trait ToObjectId {
    fn to_object_id(&self) -> DalResult<ObjectId>;
}

impl ToObjectId for ObjectId {
    fn to_object_id(&self) -> DalResult<ObjectId> {
        Ok(*self)
    }
}

impl ToObjectId for str {
    fn to_object_id(&self) -> DalResult<ObjectId> {
        Ok(ObjectId::parse(self)?)
    }
}

impl ToObjectId for String {
    fn to_object_id(&self) -> DalResult<ObjectId> {
        self.as_str().to_object_id()
    }
}

impl<T: ToObjectId + ?Sized> ToObjectId for &T {
    fn to_object_id(&self) -> DalResult<ObjectId> {
        (**self).to_object_id()
    }
}

/// Access layer for todo lists and their items.
pub struct TodoDal<S: DocumentStore> {
    store: S,
    options: DalOptions,
}

impl<S: DocumentStore> TodoDal<S> {
    /// Creates an access layer with default options.
    pub fn new(store: S) -> Self {
        Self::with_options(store, DalOptions::default())
    }

    pub fn with_options(store: S, options: DalOptions) -> Self {
        Self { store, options }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn options(&self) -> &DalOptions {
        &self.options
    }

    /// Opens a session for grouping several calls into one atomic unit.
    pub fn start_session(&self) -> DalResult<S::Session> {
        Ok(self.store.start_session()?)
    }

    /// Runs `f` in a session, committing on `Ok` and rolling back on `Err`.
    pub fn transaction<T>(&self, f: impl FnOnce(&S::Session) -> DalResult<T>) -> DalResult<T> {
        with_transaction(&self.store, f)
    }

    /// Lazily enumerates list summaries ordered by name.
    pub fn list_summaries(&self) -> SummaryStream<'_, S> {
        self.list_summaries_in(None)
    }

    /// Session-aware form of [`Self::list_summaries`].
    pub fn list_summaries_in<'a>(
        &'a self,
        session: Option<&'a S::Session>,
    ) -> SummaryStream<'a, S> {
        SummaryStream {
            dal: self,
            session,
            buffer: Vec::new().into_iter(),
            start_after: None,
            exhausted: false,
        }
    }

    /// Creates an empty list and returns its external id.
    pub fn create_list(&self, name: &str) -> DalResult<String> {
        self.create_list_in(name, None)
    }

    pub fn create_list_in(&self, name: &str, session: Option<&S::Session>) -> DalResult<String> {
        let mut doc = Document::new();
        doc.insert(fields::NAME.to_string(), Value::String(name.to_string()));
        doc.insert(fields::ITEMS.to_string(), Value::Array(Vec::new()));

        let id = self.store.insert_one(&self.options.collection, doc, session)?;
        debug!("event=list_create module=dal status=ok list_id={id}");
        Ok(id.encode())
    }

    /// Fetches one list.
    ///
    /// # Errors
    /// - `InvalidIdentifier` when `id` does not decode.
    /// - `NotFound` when no list has this id.
    pub fn get_list(&self, id: impl ToObjectId) -> DalResult<TodoList> {
        self.get_list_in(id, None)
    }

    pub fn get_list_in(
        &self,
        id: impl ToObjectId,
        session: Option<&S::Session>,
    ) -> DalResult<TodoList> {
        let id = id.to_object_id()?;
        let doc = self
            .store
            .find_one(&self.options.collection, &Filter::by_id(id), session)?
            .ok_or(DalError::NotFound(id))?;
        Ok(TodoList::from_document(&doc)?)
    }

    /// Deletes one list; `false` when nothing was removed.
    pub fn delete_list(&self, id: impl ToObjectId) -> DalResult<bool> {
        self.delete_list_in(id, None)
    }

    pub fn delete_list_in(
        &self,
        id: impl ToObjectId,
        session: Option<&S::Session>,
    ) -> DalResult<bool> {
        let id = id.to_object_id()?;
        let deleted = self
            .store
            .delete_one(&self.options.collection, &Filter::by_id(id), session)?;
        debug!("event=list_delete module=dal status=ok list_id={id} deleted={deleted}");
        Ok(deleted == 1)
    }

    /// Appends a new unchecked item and returns the updated list.
    ///
    /// Returns `None` when the list does not exist.
    pub fn create_item(
        &self,
        list_id: impl ToObjectId,
        label: &str,
    ) -> DalResult<Option<TodoList>> {
        self.create_item_in(list_id, label, None)
    }

    pub fn create_item_in(
        &self,
        list_id: impl ToObjectId,
        label: &str,
        session: Option<&S::Session>,
    ) -> DalResult<Option<TodoList>> {
        let list_id = list_id.to_object_id()?;
        let item_id = new_item_id();
        let mut item = Document::new();
        item.insert(fields::ITEM_ID.to_string(), Value::String(item_id.clone()));
        item.insert(fields::LABEL.to_string(), Value::String(label.to_string()));
        item.insert(fields::IS_CHECKED.to_string(), Value::Bool(false));
        let update = Update::Push {
            array: fields::ITEMS.to_string(),
            value: Value::Object(item),
        };

        let list = self.update_list(Filter::by_id(list_id), &update, session)?;
        debug!(
            "event=item_create module=dal status={} list_id={list_id} item_id={item_id}",
            outcome(&list)
        );
        Ok(list)
    }

    /// Sets the checked flag of one item and returns the updated list.
    ///
    /// Returns `None` when either the list or the item is missing.
    pub fn set_item_checked(
        &self,
        list_id: impl ToObjectId,
        item_id: &str,
        checked: bool,
    ) -> DalResult<Option<TodoList>> {
        self.set_item_checked_in(list_id, item_id, checked, None)
    }

    pub fn set_item_checked_in(
        &self,
        list_id: impl ToObjectId,
        item_id: &str,
        checked: bool,
        session: Option<&S::Session>,
    ) -> DalResult<Option<TodoList>> {
        let list_id = list_id.to_object_id()?;
        let update = Update::SetMatched {
            array: fields::ITEMS.to_string(),
            key: fields::ITEM_ID.to_string(),
            key_value: Value::String(item_id.to_string()),
            field: fields::IS_CHECKED.to_string(),
            value: Value::Bool(checked),
        };

        let list = self.update_list(item_filter(list_id, item_id), &update, session)?;
        debug!(
            "event=item_check module=dal status={} list_id={list_id} checked={checked}",
            outcome(&list)
        );
        Ok(list)
    }

    /// Removes one item and returns the updated list.
    ///
    /// Returns `None` when either the list or the item is missing.
    pub fn delete_item(
        &self,
        list_id: impl ToObjectId,
        item_id: &str,
    ) -> DalResult<Option<TodoList>> {
        self.delete_item_in(list_id, item_id, None)
    }

    pub fn delete_item_in(
        &self,
        list_id: impl ToObjectId,
        item_id: &str,
        session: Option<&S::Session>,
    ) -> DalResult<Option<TodoList>> {
        let list_id = list_id.to_object_id()?;
        let update = Update::Pull {
            array: fields::ITEMS.to_string(),
            key: fields::ITEM_ID.to_string(),
            key_value: Value::String(item_id.to_string()),
        };

        let list = self.update_list(item_filter(list_id, item_id), &update, session)?;
        debug!(
            "event=item_delete module=dal status={} list_id={list_id}",
            outcome(&list)
        );
        Ok(list)
    }

    fn update_list(
        &self,
        filter: Filter,
        update: &Update,
        session: Option<&S::Session>,
    ) -> DalResult<Option<TodoList>> {
        let doc = self.store.find_one_and_update(
            &self.options.collection,
            &filter,
            update,
            ReturnDocument::After,
            session,
        )?;
        match doc {
            Some(doc) => Ok(Some(TodoList::from_document(&doc)?)),
            None => Ok(None),
        }
    }

    fn summary_page(
        &self,
        start_after: Option<SortKey>,
        session: Option<&S::Session>,
    ) -> DalResult<Vec<Document>> {
        let query = FindQuery {
            filter: Filter::all(),
            projection: Some(
                Projection::new()
                    .include(fields::NAME)
                    .size_of(fields::ITEM_COUNT, fields::ITEMS),
            ),
            sort_by: fields::NAME.to_string(),
            start_after,
            limit: self.page_size(),
        };
        Ok(self
            .store
            .find_page(&self.options.collection, &query, session)?)
    }

    fn page_size(&self) -> u32 {
        self.options.page_size.max(1)
    }
}

/// Forward-only, non-restartable stream of list summaries.
///
/// Each page is fetched on demand in one store round trip. The stream ends
/// after yielding its first error.
pub struct SummaryStream<'a, S: DocumentStore> {
    dal: &'a TodoDal<S>,
    session: Option<&'a S::Session>,
    buffer: std::vec::IntoIter<Document>,
    start_after: Option<SortKey>,
    exhausted: bool,
}

impl<S: DocumentStore> SummaryStream<'_, S> {
    fn fetch_page(&mut self) -> DalResult<()> {
        let page = self
            .dal
            .summary_page(self.start_after.take(), self.session)?;
        let last_key = page.last().and_then(|doc| SortKey::of(doc, fields::NAME));
        if page.len() < self.dal.page_size() as usize || last_key.is_none() {
            self.exhausted = true;
        }
        self.start_after = last_key;
        self.buffer = page.into_iter();
        Ok(())
    }

    fn fail(&mut self, err: DalError) -> Option<DalResult<ListSummary>> {
        self.exhausted = true;
        self.buffer = Vec::new().into_iter();
        Some(Err(err))
    }
}

impl<S: DocumentStore> Iterator for SummaryStream<'_, S> {
    type Item = DalResult<ListSummary>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(doc) = self.buffer.next() {
                return match ListSummary::from_document(&doc) {
                    Ok(summary) => Some(Ok(summary)),
                    Err(err) => self.fail(err.into()),
                };
            }
            if self.exhausted {
                return None;
            }
            if let Err(err) = self.fetch_page() {
                return self.fail(err);
            }
        }
    }
}

impl<S: DocumentStore> FusedIterator for SummaryStream<'_, S> {}

fn item_filter(list_id: ObjectId, item_id: &str) -> Filter {
    Filter::by_id(list_id).and_eq(format!("{}.{}", fields::ITEMS, fields::ITEM_ID), item_id)
}

/// Fresh item id: 32 lowercase hex characters from a random UUID.
fn new_item_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn outcome(list: &Option<TodoList>) -> &'static str {
    if list.is_some() {
        "ok"
    } else {
        "absent"
    }
}
