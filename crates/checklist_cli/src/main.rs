//! CLI smoke entry point.
//!
//! # Responsibility
//! - Exercise the full list/item operation set against a real store.
//! - Keep output deterministic `key=value` lines for quick sanity checks.
//!
//! Usage: `checklist_cli [STORE_PATH]`; without a path an in-memory store is
//! used.

use checklist_core::{
    core_version, open_store, open_store_in_memory, DalResult, SqliteDocumentStore, TodoDal,
    TodoList,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("checklist_core version={}", core_version());

    let opened = match std::env::args().nth(1) {
        Some(path) => open_store(path),
        None => open_store_in_memory(),
    };
    let dal = match opened {
        Ok(store) => TodoDal::new(store),
        Err(err) => {
            eprintln!("store_open status=error error={err}");
            return ExitCode::FAILURE;
        }
    };

    match run_scenario(&dal) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("scenario status=error error={err}");
            ExitCode::FAILURE
        }
    }
}

/// Returns `false` when a step came back with an unexpected absence.
fn run_scenario(dal: &TodoDal<SqliteDocumentStore>) -> DalResult<bool> {
    let list_id = dal.create_list("Groceries")?;
    println!("create_list status=ok");

    let Some(list) = dal.create_item(&list_id, "Milk")? else {
        println!("create_item status=error reason=list_missing");
        return Ok(false);
    };
    println!("create_item status=ok items={}", list.items().len());
    let Some(item_id) = first_item_id(&list) else {
        println!("create_item status=error reason=item_missing");
        return Ok(false);
    };

    let Some(list) = dal.set_item_checked(&list_id, &item_id, true)? else {
        println!("set_item_checked status=error reason=absent");
        return Ok(false);
    };
    let checked = list.item(&item_id).is_some_and(|item| item.is_checked());
    println!("set_item_checked status=ok checked={checked}");

    for summary in dal.list_summaries() {
        let summary = summary?;
        println!(
            "summary name={} item_count={}",
            summary.name(),
            summary.item_count()
        );
    }

    let Some(list) = dal.delete_item(&list_id, &item_id)? else {
        println!("delete_item status=error reason=absent");
        return Ok(false);
    };
    println!("delete_item status=ok items={}", list.items().len());

    println!("delete_list deleted={}", dal.delete_list(&list_id)?);
    println!("delete_list deleted={}", dal.delete_list(&list_id)?);
    Ok(true)
}

fn first_item_id(list: &TodoList) -> Option<String> {
    list.items().first().map(|item| item.id().to_string())
}

#[cfg(test)]
mod tests {
    use super::{first_item_id, run_scenario};
    use checklist_core::{open_store_in_memory, Document, ObjectId, TodoDal, TodoList};
    use serde_json::json;

    #[test]
    fn scenario_succeeds_on_fresh_store() {
        let dal = TodoDal::new(open_store_in_memory().unwrap());
        assert!(run_scenario(&dal).unwrap());
        assert_eq!(dal.list_summaries().count(), 0);
    }

    #[test]
    fn list_without_items_has_no_first_item() {
        let doc: Document = json!({
            "_id": ObjectId::new().encode(),
            "name": "Empty",
            "items": [],
        })
        .as_object()
        .cloned()
        .unwrap();
        let list = TodoList::from_document(&doc).unwrap();
        assert_eq!(first_item_id(&list), None);
    }
}
