use std::{
    any::{type_name, TypeId},
    fmt,
    hash::{DefaultHasher, Hash, Hasher},
};

use derive_ex::derive_ex;
use parse_display::Display;

use crate::Field;

#[cfg(test)]
mod tests;

/// Base value of every view-model.
///
/// Two `Vm`s are equal when they were created for the same view-model type and their relevant fields are pairwise equal.
/// Everything else a view-model carries, such as callbacks, is ignored.
///
/// Usually embedded in a struct deriving [`ViewModel`](derive@crate::ViewModel):
///
/// ```
/// use statevm::{fields, Callback, ViewModel, Vm};
///
/// #[derive(ViewModel)]
/// struct Counter {
///     vm: Vm,
///     count: i32,
///     on_increment: Callback,
/// }
///
/// impl Counter {
///     fn new(count: i32, on_increment: Callback) -> Self {
///         Self {
///             vm: Vm::new::<Self>(fields![count]),
///             count,
///             on_increment,
///         }
///     }
/// }
///
/// let a = Counter::new(1, Callback::new(|_| {}));
/// let b = Counter::new(1, Callback::new(|_| {}));
/// assert_eq!(a, b);
/// ```
pub struct Vm {
    kind: TypeId,
    type_name: &'static str,
    fields: Box<[Field]>,
    hash: u64,
}

impl Vm {
    /// Creates a `Vm` for the view-model type `T`.
    ///
    /// # Panics
    ///
    /// Panics if `fields` contains a callable. See [`try_new`](Self::try_new).
    pub fn new<T: ?Sized + 'static>(fields: impl IntoIterator<Item = Field>) -> Self {
        Self::try_new::<T>(fields).unwrap_or_else(|e| panic!("{e}"))
    }

    /// Creates a `Vm` for the view-model type `T`, failing if `fields` contains a callable.
    pub fn try_new<T: ?Sized + 'static>(
        fields: impl IntoIterator<Item = Field>,
    ) -> Result<Self, ConstructionError> {
        let fields: Box<[Field]> = fields.into_iter().collect();
        if let Some(index) = fields.iter().position(Field::is_callable) {
            return Err(ConstructionError {
                type_name: type_name::<T>(),
                index,
            });
        }
        let kind = TypeId::of::<T>();
        let mut hasher = DefaultHasher::new();
        kind.hash(&mut hasher);
        let hash = fields
            .iter()
            .fold(hasher.finish(), |hash, field| hash ^ field.hash_value());
        Ok(Self {
            kind,
            type_name: type_name::<T>(),
            fields,
            hash,
        })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns true if this `Vm` was created for the view-model type `T`.
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.kind == TypeId::of::<T>()
    }
}

impl PartialEq for Vm {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        self.kind == other.kind && self.hash == other.hash && self.fields == other.fields
    }
}
impl Eq for Vm {}

impl Hash for Vm {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name)?;
        f.debug_list().entries(self.fields.iter()).finish()
    }
}
impl fmt::Display for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Display, PartialEq, Eq, Clone, Copy)]
#[display(
    "`{type_name}` has a callable at relevant field {index}. Callbacks must not take part in view-model equality."
)]
pub struct ConstructionError {
    type_name: &'static str,
    index: usize,
}
impl ConstructionError {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
    pub fn index(&self) -> usize {
        self.index
    }
}

impl std::error::Error for ConstructionError {}

/// An immutable snapshot of what a UI node renders.
///
/// Implement with `#[derive(ViewModel)]`, which also derives `PartialEq`, `Eq`, `Hash` and `Debug` from the embedded [`Vm`].
pub trait ViewModel: 'static {
    fn vm(&self) -> &Vm;
}

impl ViewModel for Vm {
    fn vm(&self) -> &Vm {
        self
    }
}

impl PartialEq for dyn ViewModel {
    fn eq(&self, other: &Self) -> bool {
        self.vm() == other.vm()
    }
}

/// Holds the last view-model of a UI node and decides whether a new one requires a rebuild.
#[derive_ex(Default)]
#[default(Self::new())]
pub struct VmSlot<V> {
    vm: Option<V>,
    is_filled: bool,
}

impl<V> VmSlot<V> {
    pub fn new() -> Self {
        Self {
            vm: None,
            is_filled: false,
        }
    }

    pub fn get(&self) -> Option<&V> {
        self.vm.as_ref()
    }

    pub fn take(&mut self) -> Option<V> {
        self.is_filled = false;
        self.vm.take()
    }
}
impl<V: PartialEq> VmSlot<V> {
    /// Stores `vm` and returns true if it differs from the previous one.
    ///
    /// The first call always returns true.
    pub fn replace(&mut self, vm: Option<V>) -> bool {
        let rebuild = !self.is_filled || self.vm != vm;
        self.vm = vm;
        self.is_filled = true;
        rebuild
    }
}
impl<V: fmt::Debug> fmt::Debug for VmSlot<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("VmSlot").field(&self.vm).finish()
    }
}
