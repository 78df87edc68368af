mod support;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use spindle_validator::{Cache, Memo, TagError, TagId};
use support::checked_validator;

#[test]
fn frame_combines_every_consumed_tag() {
    let mut v = checked_validator();
    let a = v.create_tag();
    let b = v.create_tag();

    v.begin_track_frame();
    assert!(v.is_tracking());
    v.consume(a);
    v.consume(b);
    v.consume(a);
    let tag = v.end_track_frame().expect("end");
    assert!(!v.is_tracking());

    let snapshot = v.value(tag).expect("value");
    v.dirty(a).expect("dirty");
    assert!(!v.validate(tag, snapshot).expect("validate"));
}

#[test]
fn empty_frame_yields_the_constant_tag() {
    let mut v = checked_validator();
    v.begin_track_frame();
    assert_eq!(v.end_track_frame().expect("end"), TagId::CONSTANT);
}

#[test]
fn single_consumed_tag_is_returned_as_is() {
    let mut v = checked_validator();
    let a = v.create_tag();
    let tag = v.track(None, |v| v.consume(a)).expect("track");
    assert_eq!(tag, a);
}

#[test]
fn nested_frames_only_see_their_own_reads() {
    let mut v = checked_validator();
    let outer_tag = v.create_tag();
    let inner_tag = v.create_tag();

    v.begin_track_frame();
    v.consume(outer_tag);
    v.begin_track_frame();
    assert_eq!(v.frame_depth(), 2);
    v.consume(inner_tag);
    let inner = v.end_track_frame().expect("inner");
    let outer = v.end_track_frame().expect("outer");

    assert_eq!(inner, inner_tag);
    assert_eq!(outer, outer_tag);
}

#[test]
fn closing_without_an_open_frame_fails() {
    let mut v = checked_validator();
    let err = v.end_track_frame().expect_err("no frame");
    assert_eq!(err, TagError::NoOpenFrame);
}

#[test]
fn untracked_reads_are_hidden_from_the_frame() {
    let mut v = checked_validator();
    let a = v.create_tag();
    let b = v.create_tag();
    let tag = v
        .track(None, |v| {
            v.untrack(|v| v.consume(a));
            v.consume(b);
        })
        .expect("track");
    assert_eq!(tag, b);
}

#[test]
fn consume_outside_a_frame_is_a_no_op() {
    let mut v = checked_validator();
    let a = v.create_tag();
    v.consume(a);
    v.dirty(a).expect("nothing was tracked");
}

fn counting_cache(tag: TagId, runs: Rc<Cell<u32>>) -> Cache<u32> {
    Cache::new(move |v| {
        runs.set(runs.get() + 1);
        v.consume(tag);
        runs.get() * 10
    })
}

#[test]
fn cache_recomputes_only_after_a_dependency_changes() {
    let mut v = checked_validator();
    let tag = v.create_tag();
    let runs = Rc::new(Cell::new(0));
    let mut cache = counting_cache(tag, runs.clone());

    assert_eq!(*cache.get_value(&mut v).expect("first"), 10);
    assert_eq!(*cache.get_value(&mut v).expect("second"), 10);
    v.bump();
    assert_eq!(*cache.get_value(&mut v).expect("after bump"), 10);
    assert_eq!(runs.get(), 1);

    v.dirty(tag).expect("dirty");
    assert_eq!(*cache.get_value(&mut v).expect("after dirty"), 20);
    assert_eq!(*cache.get_value(&mut v).expect("again"), 20);
    assert_eq!(runs.get(), 2);
}

#[test]
fn cache_reads_propagate_to_the_enclosing_frame() {
    let mut v = checked_validator();
    let tag = v.create_tag();
    let mut cache = counting_cache(tag, Rc::new(Cell::new(0)));
    cache.get_value(&mut v).expect("warm");

    v.begin_track_frame();
    cache.get_value(&mut v).expect("cached read");
    let outer = v.end_track_frame().expect("end");
    assert_eq!(outer, tag);
}

#[test]
fn nested_caches_invalidate_transitively() {
    let mut v = checked_validator();
    let tag = v.create_tag();
    let inner_runs = Rc::new(Cell::new(0));
    let outer_runs = Rc::new(Cell::new(0));
    let inner = Rc::new(RefCell::new(counting_cache(tag, inner_runs.clone())));

    let inner_handle = inner.clone();
    let outer_counter = outer_runs.clone();
    let mut outer = Cache::new(move |v| {
        outer_counter.set(outer_counter.get() + 1);
        let mut inner = inner_handle.borrow_mut();
        let value = inner.get_value(v).map(|value| value + 1).unwrap_or(0);
        value
    });

    assert_eq!(*outer.get_value(&mut v).expect("first"), 11);
    assert_eq!(*outer.get_value(&mut v).expect("cached"), 11);
    assert_eq!((inner_runs.get(), outer_runs.get()), (1, 1));

    v.dirty(tag).expect("dirty");
    assert_eq!(*outer.get_value(&mut v).expect("recomputed"), 21);
    assert_eq!((inner_runs.get(), outer_runs.get()), (2, 2));
}

#[test]
fn cache_constness_is_known_only_after_first_run() {
    let mut v = checked_validator();
    let mut constant = Cache::with_label("constant", |_v| 42);
    let err = constant.is_const().expect_err("not run yet");
    assert!(err.to_string().contains("(cache: constant)"));

    constant.get_value(&mut v).expect("run");
    assert!(constant.is_const().expect("const"));

    let tag = v.create_tag();
    let mut tracked = Cache::new(move |v| v.consume(tag));
    tracked.get_value(&mut v).expect("run");
    assert!(!tracked.is_const().expect("not const"));
    assert_eq!(tracked.tag(), Some(tag));
}

#[test]
fn memo_behaves_like_a_cache() {
    let mut v = checked_validator();
    let tag = v.create_tag();
    let runs = Rc::new(Cell::new(0));
    let counter = runs.clone();
    let mut memo = Memo::new(move |v| {
        counter.set(counter.get() + 1);
        v.consume(tag);
        "value".to_string()
    });
    assert!(!memo.is_const());

    assert_eq!(memo.call(&mut v).expect("call"), "value");
    memo.call(&mut v).expect("call");
    assert_eq!(runs.get(), 1);
    assert!(!memo.is_const());

    v.dirty(tag).expect("dirty");
    memo.call(&mut v).expect("call");
    assert_eq!(runs.get(), 2);
}
