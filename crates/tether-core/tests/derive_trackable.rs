//! Integration tests for the #[derive(Trackable)] macro.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tether_core::{AsTrackable, Signal, Trackable};
use tether_macros::Trackable;

// Field picked up by name
#[derive(Trackable, Default)]
struct Label {
    trackable: Trackable,
    text: RefCell<String>,
}

// Field picked up by attribute
#[derive(Trackable, Default)]
struct Slider {
    #[trackable]
    lifetime: Trackable,
    value: Cell<i32>,
}

// Generic receiver
#[derive(Trackable)]
struct Mirror<T: Clone + 'static> {
    trackable: Trackable,
    last: RefCell<Option<T>>,
}

// Path override
#[derive(Trackable, Default)]
#[trackable(crate = tether_core)]
struct Gauge {
    trackable: Trackable,
}

#[test]
fn test_derive_by_field_name() {
    let label = Label::default();
    assert_eq!(label.trackable().tracked_count(), 0);
    assert!(std::ptr::eq(label.trackable(), &label.trackable));
}

#[test]
fn test_derive_by_attribute() {
    let slider = Slider::default();
    assert!(std::ptr::eq(slider.trackable(), &slider.lifetime));
}

#[test]
fn test_derive_with_crate_path() {
    let gauge = Gauge::default();
    assert!(std::ptr::eq(gauge.trackable(), &gauge.trackable));
}

#[test]
fn test_receiver_method_follows_lifetime() {
    let text_changed = Signal::<String>::new();
    let label = Rc::new(Label::default());

    let conn = text_changed.connect_receiver(&label, |label, text| {
        *label.text.borrow_mut() = text.clone();
    });
    text_changed.emit("hello".to_string());
    assert_eq!(*label.text.borrow(), "hello");
    assert_eq!(label.trackable().tracked_count(), 1);

    drop(label);
    assert!(conn.empty());
    text_changed.emit("ignored".to_string());
    assert_eq!(text_changed.connection_count(), 0);
}

#[test]
fn test_track_existing_connection() {
    let moved = Signal::<i32>::new();
    let slider = Rc::new(Slider::default());
    let hits = Rc::new(Cell::new(0));

    let hits_clone = hits.clone();
    let conn = moved.connect(move |_| hits_clone.set(hits_clone.get() + 1));
    conn.track(&slider);
    slider.value.set(1);

    moved.emit(1);
    drop(slider);
    moved.emit(2);

    assert_eq!(hits.get(), 1);
    assert!(conn.empty());
}

#[test]
fn test_generic_receiver() {
    let changed = Signal::<u8>::new();
    let mirror = Rc::new(Mirror::<u8> {
        trackable: Trackable::new(),
        last: RefCell::new(None),
    });

    let _conn = changed.connect_receiver(&mirror, |mirror, value| {
        *mirror.last.borrow_mut() = Some(*value);
    });
    changed.emit(7);

    assert_eq!(*mirror.last.borrow(), Some(7));
}
