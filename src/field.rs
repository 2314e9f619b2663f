use std::{
    any::{type_name, Any, TypeId},
    fmt,
    hash::{DefaultHasher, Hash, Hasher},
    rc::Rc,
};

use derive_ex::derive_ex;

#[cfg(test)]
mod tests;

/// Custom equality for values listed in a view-model's relevant fields.
///
/// Implementing this trait tells [`Vm`](crate::Vm) to compare the value with [`equal_to`](Self::equal_to)
/// instead of with `PartialEq`.
/// The default implementation compares by identity, which suits controllers, streams and other handles
/// that have no meaningful structural equality.
pub trait EqualityToken: 'static {
    fn equal_to(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

/// A value taking part in view-model equality.
#[derive(Clone)]
pub enum Field {
    Null,
    Unit,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Char(char),
    Str(Rc<str>),
    List(Rc<[Field]>),
    Value(AnyValue),
    Token(AnyToken),
    /// A function value. Never accepted by [`Vm::try_new`](crate::Vm::try_new).
    Callable(&'static str),
}

impl Field {
    /// Wraps any value that has structural equality.
    ///
    /// Function pointers satisfy the bounds but are functions all the same.
    /// A value whose type is or contains a function pointer becomes [`Field::Callable`].
    pub fn value<T: PartialEq + Hash + fmt::Debug + 'static>(value: T) -> Self {
        let name = type_name::<T>();
        if contains_fn_pointer(name) {
            return Self::Callable(name);
        }
        Self::Value(AnyValue(Rc::new(value)))
    }

    /// Wraps a value compared with [`EqualityToken::equal_to`].
    pub fn token<T: EqualityToken + fmt::Debug>(token: Rc<T>) -> Self {
        Self::Token(AnyToken(token))
    }

    /// Marks a function value of type `F`.
    pub fn callable<F: ?Sized>() -> Self {
        Self::Callable(type_name::<F>())
    }

    pub fn is_callable(&self) -> bool {
        match self {
            Self::Callable(_) => true,
            Self::List(items) => items.iter().any(Self::is_callable),
            _ => false,
        }
    }

    pub(crate) fn hash_value(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) | (Self::Unit, Self::Unit) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::UInt(a), Self::UInt(b)) => a == b,
            (Self::Int(a), Self::UInt(b)) | (Self::UInt(b), Self::Int(a)) => {
                u64::try_from(*a) == Ok(*b)
            }
            (Self::Float(a), Self::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::Char(a), Self::Char(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b) || a == b,
            (Self::Value(a), Self::Value(b)) => a.0.dyn_eq(&*b.0),
            (Self::Token(a), Self::Token(b)) => a.0.dyn_equal_to(&*b.0),
            (Self::Callable(a), Self::Callable(b)) => a == b,
            _ => false,
        }
    }
}
impl Eq for Field {}

impl Hash for Field {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Null => state.write_u8(0),
            Self::Unit => state.write_u8(1),
            Self::Bool(value) => {
                state.write_u8(2);
                value.hash(state);
            }
            // non-negative signed integers hash like their unsigned twins
            Self::Int(value) => match u64::try_from(*value) {
                Ok(value) => {
                    state.write_u8(4);
                    value.hash(state);
                }
                Err(_) => {
                    state.write_u8(3);
                    value.hash(state);
                }
            },
            Self::UInt(value) => {
                state.write_u8(4);
                value.hash(state);
            }
            Self::Float(value) => {
                state.write_u8(5);
                canonical_bits(*value).hash(state);
            }
            Self::Char(value) => {
                state.write_u8(6);
                value.hash(state);
            }
            Self::Str(value) => {
                state.write_u8(7);
                value.hash(state);
            }
            Self::List(items) => {
                state.write_u8(8);
                items.hash(state);
            }
            Self::Value(value) => {
                state.write_u8(9);
                value.0.dyn_hash(state);
            }
            // `equal_to` may equate any two tokens of a type, so only the type is hashed.
            Self::Token(token) => {
                state.write_u8(10);
                token.0.token_type_id().hash(state);
            }
            Self::Callable(name) => {
                state.write_u8(11);
                name.hash(state);
            }
        }
    }
}

// `fn(` not preceded by an identifier character only occurs in function pointer types.
fn contains_fn_pointer(type_name: &str) -> bool {
    type_name.match_indices("fn(").any(|(i, _)| {
        !type_name[..i]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
    })
}

fn canonical_bits(value: f64) -> u64 {
    if value == 0.0 {
        0
    } else if value.is_nan() {
        f64::NAN.to_bits()
    } else {
        value.to_bits()
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Unit => write!(f, "()"),
            Self::Bool(value) => fmt::Debug::fmt(value, f),
            Self::Int(value) => fmt::Debug::fmt(value, f),
            Self::UInt(value) => fmt::Debug::fmt(value, f),
            Self::Float(value) => fmt::Debug::fmt(value, f),
            Self::Char(value) => fmt::Debug::fmt(value, f),
            Self::Str(value) => fmt::Debug::fmt(value, f),
            Self::List(items) => f.debug_list().entries(items.iter()).finish(),
            Self::Value(value) => value.0.fmt_debug(f),
            Self::Token(token) => token.0.fmt_debug(f),
            Self::Callable(name) => write!(f, "<callable {name}>"),
        }
    }
}

/// Type-erased value with structural equality.
#[derive(Clone)]
pub struct AnyValue(Rc<dyn DynValue>);

/// Type-erased [`EqualityToken`].
#[derive(Clone)]
pub struct AnyToken(Rc<dyn DynToken>);

impl AnyToken {
    pub fn downcast_ref<T: EqualityToken>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref()
    }
}
impl AnyValue {
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref()
    }
}

trait DynValue: 'static {
    fn as_any(&self) -> &dyn Any;
    fn dyn_eq(&self, other: &dyn DynValue) -> bool;
    fn dyn_hash(&self, state: &mut dyn Hasher);
    fn fmt_debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}
impl<T: PartialEq + Hash + fmt::Debug + 'static> DynValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn dyn_eq(&self, other: &dyn DynValue) -> bool {
        match other.as_any().downcast_ref::<T>() {
            Some(other) => self == other,
            None => false,
        }
    }
    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<T>().hash(&mut state);
        self.hash(&mut state);
    }
    fn fmt_debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

trait DynToken: 'static {
    fn as_any(&self) -> &dyn Any;
    fn token_type_id(&self) -> TypeId;
    fn dyn_equal_to(&self, other: &dyn DynToken) -> bool;
    fn fmt_debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}
impl<T: EqualityToken + fmt::Debug> DynToken for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn token_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }
    fn dyn_equal_to(&self, other: &dyn DynToken) -> bool {
        match other.as_any().downcast_ref::<T>() {
            Some(other) => self.equal_to(other),
            None => false,
        }
    }
    fn fmt_debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Conversion into a [`Field`].
pub trait ToField {
    fn to_field(&self) -> Field;
}

impl ToField for Field {
    fn to_field(&self) -> Field {
        self.clone()
    }
}
impl ToField for () {
    fn to_field(&self) -> Field {
        Field::Unit
    }
}
impl ToField for bool {
    fn to_field(&self) -> Field {
        Field::Bool(*self)
    }
}
impl ToField for char {
    fn to_field(&self) -> Field {
        Field::Char(*self)
    }
}
impl ToField for str {
    fn to_field(&self) -> Field {
        Field::Str(self.into())
    }
}
impl ToField for String {
    fn to_field(&self) -> Field {
        Field::Str(self.as_str().into())
    }
}

macro_rules! impl_to_field {
    ($variant:ident as $as:ty: $($ty:ty),*) => {
        $(
            impl ToField for $ty {
                fn to_field(&self) -> Field {
                    Field::$variant(*self as $as)
                }
            }
        )*
    };
}
impl_to_field!(Int as i64: i8, i16, i32, i64, isize);
impl_to_field!(UInt as u64: u8, u16, u32, u64, usize);
impl_to_field!(Float as f64: f32, f64);

impl<T: ToField + ?Sized> ToField for &T {
    fn to_field(&self) -> Field {
        T::to_field(self)
    }
}
impl<T: ToField + ?Sized> ToField for Box<T> {
    fn to_field(&self) -> Field {
        T::to_field(self)
    }
}
impl<T: ToField + ?Sized> ToField for Rc<T> {
    fn to_field(&self) -> Field {
        T::to_field(self)
    }
}
impl<T: ToField> ToField for Option<T> {
    fn to_field(&self) -> Field {
        match self {
            Some(value) => value.to_field(),
            None => Field::Null,
        }
    }
}
impl<T: ToField> ToField for [T] {
    fn to_field(&self) -> Field {
        Field::List(self.iter().map(ToField::to_field).collect())
    }
}
impl<T: ToField, const N: usize> ToField for [T; N] {
    fn to_field(&self) -> Field {
        self.as_slice().to_field()
    }
}
impl<T: ToField> ToField for Vec<T> {
    fn to_field(&self) -> Field {
        self.as_slice().to_field()
    }
}

/// Builds a relevant-fields list from expressions implementing [`ToField`].
///
/// ```
/// let fields = statevm::fields![1, "a", Some(2.5)];
/// assert_eq!(fields.len(), 3);
/// ```
#[macro_export]
macro_rules! fields {
    ($($e:expr),* $(,)?) => {
        ::std::vec![$($crate::ToField::to_field(&$e)),*]
    };
}

/// A callback handed to the UI through a view-model.
///
/// Callbacks are recreated on every recomputation, so they must stay out of the relevant fields.
/// Converting one into a [`Field`] yields [`Field::Callable`], which view-model construction rejects.
#[derive_ex(Clone, bound())]
pub struct Callback<A: 'static = ()>(Rc<dyn Fn(A)>);

impl<A: 'static> Callback<A> {
    pub fn new(f: impl Fn(A) + 'static) -> Self {
        Self(Rc::new(f))
    }
    pub fn call(&self, arg: A) {
        (self.0)(arg)
    }
}
impl<A: 'static> fmt::Debug for Callback<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback<{}>", type_name::<A>())
    }
}
impl<A: 'static> ToField for Callback<A> {
    fn to_field(&self) -> Field {
        Field::callable::<Self>()
    }
}
