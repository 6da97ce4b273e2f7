use checklist_core::{open_store_in_memory, DalError, ObjectId, SqliteDocumentStore, TodoDal};
use std::collections::HashSet;

fn dal() -> TodoDal<SqliteDocumentStore> {
    TodoDal::new(open_store_in_memory().unwrap())
}

#[test]
fn groceries_scenario() {
    let dal = dal();
    let list_id = dal.create_list("Groceries").unwrap();

    let list = dal.create_item(&list_id, "Milk").unwrap().unwrap();
    assert_eq!(list.items().len(), 1);
    let item = &list.items()[0];
    assert_eq!(item.label(), "Milk");
    assert!(!item.is_checked());
    let item_id = item.id().to_string();

    let list = dal.set_item_checked(&list_id, &item_id, true).unwrap().unwrap();
    assert!(list.item(&item_id).unwrap().is_checked());

    let list = dal.delete_item(&list_id, &item_id).unwrap().unwrap();
    assert!(list.items().is_empty());

    assert!(dal.delete_list(&list_id).unwrap());
    assert!(matches!(dal.get_list(&list_id), Err(DalError::NotFound(_))));
}

#[test]
fn create_item_appends_in_order() {
    let dal = dal();
    let list_id = dal.create_list("Packing").unwrap();

    for (expected_len, label) in ["Socks", "Shirts", "Charger"].into_iter().enumerate() {
        let list = dal.create_item(&list_id, label).unwrap().unwrap();
        assert_eq!(list.items().len(), expected_len + 1);
        let last = list.items().last().unwrap();
        assert_eq!(last.label(), label);
        assert!(!last.is_checked());
    }

    let list = dal.get_list(&list_id).unwrap();
    let labels: Vec<_> = list.items().iter().map(|item| item.label()).collect();
    assert_eq!(labels, ["Socks", "Shirts", "Charger"]);
    let ids: HashSet<_> = list.items().iter().map(|item| item.id()).collect();
    assert_eq!(ids.len(), 3);
}

#[test]
fn create_item_on_missing_list_returns_none() {
    let dal = dal();

    assert!(dal.create_item(ObjectId::new(), "Orphan").unwrap().is_none());
}

#[test]
fn check_and_uncheck_touch_only_target_item() {
    let dal = dal();
    let list_id = dal.create_list("Chores").unwrap();
    dal.create_item(&list_id, "Dishes").unwrap();
    let list = dal.create_item(&list_id, "Laundry").unwrap().unwrap();
    let dishes = list.items()[0].id().to_string();
    let laundry = list.items()[1].id().to_string();

    let list = dal.set_item_checked(&list_id, &laundry, true).unwrap().unwrap();
    assert!(!list.item(&dishes).unwrap().is_checked());
    assert!(list.item(&laundry).unwrap().is_checked());
    assert_eq!(list.item(&laundry).unwrap().label(), "Laundry");

    let list = dal.set_item_checked(&list_id, &laundry, false).unwrap().unwrap();
    assert!(!list.item(&laundry).unwrap().is_checked());
}

#[test]
fn setting_same_state_twice_is_harmless() {
    let dal = dal();
    let list_id = dal.create_list("Repeat").unwrap();
    let list = dal.create_item(&list_id, "Once").unwrap().unwrap();
    let item_id = list.items()[0].id().to_string();

    dal.set_item_checked(&list_id, &item_id, true).unwrap().unwrap();
    let list = dal.set_item_checked(&list_id, &item_id, true).unwrap().unwrap();
    assert!(list.item(&item_id).unwrap().is_checked());
}

#[test]
fn missing_list_and_missing_item_collapse_to_none() {
    let dal = dal();
    let list_id = dal.create_list("Existing").unwrap();
    let list = dal.create_item(&list_id, "Present").unwrap().unwrap();
    let item_id = list.items()[0].id().to_string();

    assert!(dal
        .set_item_checked(ObjectId::new(), &item_id, true)
        .unwrap()
        .is_none());
    assert!(dal
        .set_item_checked(&list_id, "no-such-item", true)
        .unwrap()
        .is_none());
    assert!(dal.delete_item(ObjectId::new(), &item_id).unwrap().is_none());
    assert!(dal.delete_item(&list_id, "no-such-item").unwrap().is_none());

    let untouched = dal.get_list(&list_id).unwrap();
    assert_eq!(untouched.items().len(), 1);
    assert!(!untouched.items()[0].is_checked());
}

#[test]
fn deleting_item_twice_returns_none_the_second_time() {
    let dal = dal();
    let list_id = dal.create_list("Once").unwrap();
    let list = dal.create_item(&list_id, "Gone soon").unwrap().unwrap();
    let item_id = list.items()[0].id().to_string();

    assert!(dal.delete_item(&list_id, &item_id).unwrap().is_some());
    assert!(dal.delete_item(&list_id, &item_id).unwrap().is_none());
}

#[test]
fn item_ids_do_not_cross_lists() {
    let dal = dal();
    let first = dal.create_list("First").unwrap();
    let second = dal.create_list("Second").unwrap();
    let list = dal.create_item(&first, "Only here").unwrap().unwrap();
    let item_id = list.items()[0].id().to_string();

    assert!(dal
        .set_item_checked(&second, &item_id, true)
        .unwrap()
        .is_none());
    assert!(!dal.get_list(&first).unwrap().items()[0].is_checked());
}

#[test]
fn item_operations_reject_invalid_list_identifier() {
    let dal = dal();

    assert!(matches!(
        dal.create_item("bogus", "x"),
        Err(DalError::InvalidIdentifier(_))
    ));
    assert!(matches!(
        dal.set_item_checked("bogus", "x", true),
        Err(DalError::InvalidIdentifier(_))
    ));
    assert!(matches!(
        dal.delete_item("bogus", "x"),
        Err(DalError::InvalidIdentifier(_))
    ));
}
