use std::{cell::Cell, rc::Rc};

use assert_call::{call, CallRecorder};
use pretty_assertions::{assert_eq, assert_ne};
use rstest::rstest;

use super::*;
use crate::fields;

#[derive(Debug)]
struct Controller {
    ticks: Cell<u32>,
}
impl EqualityToken for Controller {}

#[derive(Debug)]
struct Loose(u32);
impl EqualityToken for Loose {
    fn equal_to(&self, _other: &Self) -> bool {
        true
    }
}

#[rstest]
#[case(1.to_field(), 1u8.to_field())]
#[case(1i64.to_field(), 1usize.to_field())]
#[case(0.0.to_field(), (-0.0).to_field())]
#[case(f64::NAN.to_field(), f64::NAN.to_field())]
#[case("a".to_field(), String::from("a").to_field())]
#[case(None::<i32>.to_field(), Field::Null)]
#[case(Some(3).to_field(), 3.to_field())]
#[case(vec![1, 2].to_field(), [1, 2][..].to_field())]
#[case(Field::value((1, "x")), Field::value((1, "x")))]
fn equal_fields_hash_equal(#[case] a: Field, #[case] b: Field) {
    assert_eq!(a, b);
    assert_eq!(a.hash_value(), b.hash_value());
}

#[rstest]
#[case(1.to_field(), 2.to_field())]
#[case((-1).to_field(), u64::MAX.to_field())]
#[case(1.to_field(), 1.0.to_field())]
#[case("a".to_field(), 'a'.to_field())]
#[case(().to_field(), Field::Null)]
#[case(vec![1, 2].to_field(), vec![2, 1].to_field())]
#[case(Field::value(1u8), Field::value(1u16))]
fn different_fields(#[case] a: Field, #[case] b: Field) {
    assert_ne!(a, b);
}

#[test]
fn token_defaults_to_identity() {
    let c = Rc::new(Controller {
        ticks: Cell::new(0),
    });
    let same = Field::token(c.clone());
    let other = Field::token(Rc::new(Controller {
        ticks: Cell::new(0),
    }));

    c.ticks.set(5);
    assert_eq!(Field::token(c), same);
    assert_ne!(same, other);
}

#[test]
fn token_override_is_used() {
    let a = Field::token(Rc::new(Loose(1)));
    let b = Field::token(Rc::new(Loose(2)));
    assert_eq!(a, b);
    assert_eq!(a.hash_value(), b.hash_value());
}

#[test]
fn tokens_of_different_types_differ() {
    let a = Field::token(Rc::new(Loose(1)));
    let b = Field::token(Rc::new(Controller {
        ticks: Cell::new(1),
    }));
    assert_ne!(a, b);
}

#[test]
fn token_is_not_equal_to_plain_value() {
    assert_ne!(Field::token(Rc::new(Loose(1))), 1.to_field());
}

#[test]
fn callback_is_callable() {
    let f = Callback::new(|_: ()| {});
    assert!(f.to_field().is_callable());
    assert!(vec![Field::Unit, f.to_field()].to_field().is_callable());
    assert!(!fields![1, "a", None::<u8>].iter().any(Field::is_callable));
}

fn handler(_: i32) {}

#[test]
fn fn_pointer_value_is_callable() {
    assert!(Field::value(handler as fn(i32)).is_callable());
    assert!(Field::value(Some(handler as fn(i32))).is_callable());
    assert!(Field::value((1, handler as fn(i32))).is_callable());
    assert!(Field::value(handler as unsafe fn(i32)).is_callable());
}

#[rstest]
#[case("fn(i32)", true)]
#[case("for<'a> fn(&'a str)", true)]
#[case("core::option::Option<fn()>", true)]
#[case("(u8, unsafe extern \"C\" fn())", true)]
#[case("my_crate::Config", false)]
#[case("my_crate::on_fn(u8)", false)]
#[case("alloc::string::String", false)]
fn fn_pointer_type_names(#[case] name: &str, #[case] expected: bool) {
    assert_eq!(contains_fn_pointer(name), expected);
}

#[test]
fn callback_call() {
    let mut cr = CallRecorder::new();
    let f = Callback::new(|x: u32| call!("called {x}"));
    let g = f.clone();
    f.call(1);
    g.call(2);
    cr.verify(["called 1", "called 2"]);
}

#[test]
fn debug_format() {
    let fields = fields![1, "a", None::<u8>, vec![true]];
    assert_eq!(format!("{fields:?}"), r#"[1, "a", null, [true]]"#);
    assert_eq!(
        format!("{:?}", Field::token(Rc::new(Loose(3)))),
        "Loose(3)"
    );
}

#[test]
fn downcast_value() {
    let Field::Value(value) = Field::value(7u16) else {
        panic!("expected a value field");
    };
    assert_eq!(value.downcast_ref::<u16>(), Some(&7));
    assert_eq!(value.downcast_ref::<u32>(), None);
}
