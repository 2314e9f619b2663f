use std::{
    hash::{DefaultHasher, Hash, Hasher},
    rc::Rc,
};

use pretty_assertions::{assert_eq, assert_ne};

use crate::{fields, Callback, EqualityToken, Field, ToField, ViewModel, Vm, VmSlot};

struct Foo;
struct Bar;

fn hash_of(vm: &Vm) -> u64 {
    let mut hasher = DefaultHasher::new();
    vm.hash(&mut hasher);
    hasher.finish()
}

#[test]
fn equal_to_itself() {
    let vm = Vm::new::<Foo>(fields![1, "a"]);
    assert_eq!(vm, vm);
}

#[test]
fn equal_fields_equal_and_same_hash() {
    let a = Vm::new::<Foo>(fields![1, "a"]);
    let b = Vm::new::<Foo>(fields![1, "a"]);
    assert_eq!(a, b);
    assert_eq!(b, a);
    assert_eq!(hash_of(&a), hash_of(&b));
}

#[test]
fn different_field_not_equal() {
    let a = Vm::new::<Foo>(fields![1, "a"]);
    let b = Vm::new::<Foo>(fields![1, "b"]);
    assert_ne!(a, b);
}

#[test]
fn different_length_not_equal() {
    let a = Vm::new::<Foo>(fields![1, "a"]);
    let b = Vm::new::<Foo>(fields![1, "a", Field::Null]);
    assert_ne!(a, b);
}

#[test]
fn different_type_not_equal() {
    let a = Vm::new::<Foo>(fields![1, "a"]);
    let b = Vm::new::<Bar>(fields![1, "a"]);
    assert_ne!(a, b);
    assert!(a.is::<Foo>());
    assert!(!a.is::<Bar>());
}

#[test]
fn empty_fields() {
    assert_eq!(Vm::new::<Foo>([]), Vm::new::<Foo>(Vec::new()));
    assert_ne!(Vm::new::<Foo>([]), Vm::new::<Bar>([]));
}

#[test]
fn callable_is_rejected() {
    let on_tap = Callback::new(|_: ()| {});
    let e = Vm::try_new::<Foo>(fields![1, on_tap]).unwrap_err();
    assert_eq!(e.index(), 1);
    assert_eq!(e.type_name(), std::any::type_name::<Foo>());
}

#[test]
fn callable_inside_list_is_rejected() {
    let on_tap = Callback::new(|_: ()| {});
    let list = vec![1.to_field(), on_tap.to_field()];
    assert!(Vm::try_new::<Foo>([Field::List(list.into())]).is_err());
}

#[test]
fn fn_pointer_is_rejected() {
    fn handler(_: i32) {}
    let e = Vm::try_new::<Foo>([Field::value(handler as fn(i32))]).unwrap_err();
    assert_eq!(e.index(), 0);
}

#[test]
#[should_panic(expected = "relevant field 0")]
fn new_panics_on_callable() {
    Vm::new::<Foo>([Field::callable::<fn()>()]);
}

#[test]
fn token_override_is_honored() {
    #[derive(Debug)]
    struct Stream(u32);
    impl EqualityToken for Stream {
        fn equal_to(&self, _other: &Self) -> bool {
            true
        }
    }

    let a = Vm::new::<Foo>([Field::token(Rc::new(Stream(1)))]);
    let b = Vm::new::<Foo>([Field::token(Rc::new(Stream(2)))]);
    assert_eq!(a, b);
    assert_eq!(hash_of(&a), hash_of(&b));
}

#[test]
fn dyn_view_model_eq() {
    let a: Box<dyn ViewModel> = Box::new(Vm::new::<Foo>(fields![1]));
    let b: Box<dyn ViewModel> = Box::new(Vm::new::<Foo>(fields![1]));
    let c: Box<dyn ViewModel> = Box::new(Vm::new::<Bar>(fields![1]));
    assert!(*a == *b);
    assert!(*a != *c);
}

#[test]
fn display() {
    let vm = Vm::new::<Foo>(fields![1, "a"]);
    assert_eq!(
        vm.to_string(),
        format!("{}[1, \"a\"]", std::any::type_name::<Foo>())
    );
}

#[test]
fn slot_replace() {
    let mut slot = VmSlot::new();
    assert!(slot.replace(Some(Vm::new::<Foo>(fields![1]))));
    assert!(!slot.replace(Some(Vm::new::<Foo>(fields![1]))));
    assert!(slot.replace(Some(Vm::new::<Foo>(fields![2]))));
    assert!(slot.replace(None));
    assert!(!slot.replace(None));
    assert_eq!(slot.get(), None);
}

#[test]
fn slot_first_none_rebuilds() {
    let mut slot = VmSlot::<Vm>::default();
    assert!(slot.replace(None));
    assert!(!slot.replace(None));
    slot.take();
    assert!(slot.replace(None));
}
