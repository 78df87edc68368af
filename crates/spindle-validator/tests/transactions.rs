mod support;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use spindle_validator::{TagError, TrackedData, Validator, ValidatorConfig};
use support::{checked_validator, unchecked_validator, RecordingEnv};

#[test]
fn writing_a_tag_read_in_the_same_transaction_fails() {
    let mut v = checked_validator();
    let tag = v.create_tag();
    let mut outcome = None;
    v.track(Some("rendering the list"), |v| {
        v.consume(tag);
        outcome = Some(v.dirty(tag));
    })
    .expect("track");

    let err = outcome.expect("ran").expect_err("write after read");
    let TagError::ConsumedInTransaction { message } = err else {
        panic!("unexpected error kind");
    };
    assert!(message.starts_with("You attempted to update `(an unknown tag)`"));
    assert!(message.ends_with("was first used:\n\n- rendering the list"));
}

#[test]
fn the_guard_ends_with_the_transaction() {
    let mut v = checked_validator();
    let tag = v.create_tag();
    v.track(None, |v| v.consume(tag)).expect("track");
    assert!(!v.in_transaction());
    v.dirty(tag).expect("write after the transaction closed");
}

#[test]
fn tags_reached_through_a_consumed_combinator_are_guarded() {
    let mut v = checked_validator();
    let a = v.create_tag();
    let b = v.create_tag();
    let both = v.combine(&[a, b]);
    let mut outcome = None;
    v.track(None, |v| {
        v.consume(both);
        outcome = Some(v.dirty(b));
    })
    .expect("track");
    assert!(outcome.expect("ran").is_err());
}

#[test]
fn deprecated_mutations_are_reported_not_rejected() {
    let mut v = checked_validator();
    let env = RecordingEnv::default();
    v.set_transaction_env(Box::new(env.clone()));
    let tag = v.create_tag();

    v.track(None, |v| {
        v.consume(tag);
        v.deprecate_mutations_in_transaction(|v| v.dirty(tag))
            .expect("deprecated write goes through");
    })
    .expect("track");

    let deprecations = env.deprecations.borrow();
    assert_eq!(deprecations.len(), 1);
    assert!(deprecations[0].contains("already been used previously"));
}

#[test]
fn nested_transaction_switches_back_to_hard_errors() {
    let mut v = checked_validator();
    let tag = v.create_tag();
    let mut outcome = None;
    v.track(None, |v| {
        v.consume(tag);
        v.deprecate_mutations_in_transaction(|v| {
            outcome = Some(v.run_in_transaction(Some("nested"), |v| v.dirty(tag)));
        });
    })
    .expect("track");
    assert!(outcome.expect("ran").is_err());
}

#[test]
fn deprecating_configuration_applies_to_every_transaction() {
    let mut v = Validator::with_config(ValidatorConfig {
        assertions: true,
        deprecate_mutations: true,
    });
    let env = RecordingEnv::default();
    v.set_transaction_env(Box::new(env.clone()));
    let tag = v.create_tag();
    let mut outcome = None;
    v.track(None, |v| {
        v.consume(tag);
        outcome = Some(v.dirty(tag));
    })
    .expect("track");
    outcome.expect("ran").expect("deprecated write");
    assert_eq!(env.deprecations.borrow().len(), 1);
}

#[test]
fn the_guard_is_off_without_assertions() {
    let mut v = unchecked_validator();
    let tag = v.create_tag();
    let mut outcome = None;
    v.track(None, |v| {
        v.consume(tag);
        outcome = Some(v.dirty(tag));
    })
    .expect("track");
    outcome.expect("ran").expect("unchecked write");
}

#[test]
fn property_tags_are_stable_and_listed() {
    let mut v = checked_validator();
    let person = v.new_entity("Person");
    let name = v.tag_for(person, "name");
    assert_eq!(v.tag_for(person, "name"), name);
    let age = v.tag_for(person, "age");
    assert_ne!(name, age);
    assert_eq!(
        v.tag_meta_for(person),
        vec![("age".to_string(), age), ("name".to_string(), name)]
    );
    assert_eq!(v.entity_label(person), Some("Person"));
}

#[test]
fn dirtying_a_property_notifies_the_host() {
    let mut v = checked_validator();
    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    v.set_property_did_change(move || counter.set(counter.get() + 1));
    let person = v.new_entity("Person");

    v.dirty_tag_for(person, "name").expect("never tagged");
    assert_eq!(calls.get(), 0);

    let tag = v.tag_for(person, "name");
    let snapshot = v.value(tag).expect("value");
    v.dirty_tag_for(person, "name").expect("dirty");
    assert_eq!(calls.get(), 1);
    assert!(!v.validate(tag, snapshot).expect("validate"));
}

#[test]
fn property_write_after_read_names_the_entity_and_key() {
    let mut v = checked_validator();
    let person = v.new_entity("Person");
    let tag = v.tag_for(person, "name");
    let mut outcome = None;
    v.track(Some("rendering Person"), |v| {
        v.consume(tag);
        outcome = Some(v.dirty_tag_for(person, "name"));
    })
    .expect("track");
    let err = outcome.expect("ran").expect_err("write after read");
    let message = err.to_string();
    assert!(message.starts_with("You attempted to update `name` on `Person`"));
    assert!(message.contains("`name` was first used:\n\n- rendering Person"));
}

#[test]
fn tracked_data_reads_and_writes_through_property_tags() {
    let mut v = checked_validator();
    let person = v.new_entity("Person");
    let mut name = TrackedData::with_initializer("name", || "anonymous".to_string());

    let mut seen = None;
    let tag = v
        .track(None, |v| seen = name.get(v, person).cloned())
        .expect("track");
    assert_eq!(seen.as_deref(), Some("anonymous"));
    let snapshot = v.value(tag).expect("value");

    name.set(&mut v, person, "Ada".to_string()).expect("set");
    assert!(!v.validate(tag, snapshot).expect("validate"));
    assert_eq!(name.get(&mut v, person).map(String::as_str), Some("Ada"));
}

#[test]
fn tracked_data_without_initializer_starts_empty() {
    let mut v = checked_validator();
    let item = v.new_entity("Item");
    let mut count: TrackedData<u32> = TrackedData::new("count");
    assert_eq!(count.key(), "count");
    assert_eq!(count.get(&mut v, item), None);
    count.set(&mut v, item, 3).expect("set");
    assert_eq!(count.get(&mut v, item), Some(&3));
}

#[test]
fn tracked_data_writes_are_never_deprecated() {
    let mut v = checked_validator();
    let env = RecordingEnv::default();
    v.set_transaction_env(Box::new(env.clone()));
    let person = v.new_entity("Person");
    let name = RefCell::new(TrackedData::with_initializer("name", String::new));

    let mut outcome = None;
    v.track(None, |v| {
        name.borrow_mut().get(v, person);
        outcome = Some(v.deprecate_mutations_in_transaction(|v| {
            name.borrow_mut().set(v, person, "Grace".to_string())
        }));
    })
    .expect("track");
    assert!(outcome.expect("ran").is_err());
    assert!(env.deprecations.borrow().is_empty());
}
