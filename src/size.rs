use std::{
    any::TypeId,
    collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque},
    mem,
    rc::Rc,
    sync::Arc,
    time::{Duration, Instant, SystemTime},
};

use indexmap::{IndexMap, IndexSet};

/// Estimate of the memory held by a value.
///
/// Nested values must be measured through the [`Sizer`] passed to
/// [`SizeOf::heap_size`], so that excluded types and shared pointers are
/// accounted for consistently across one traversal.
///
/// Structs are usually implemented with [`size_of_fields!`](crate::size_of_fields),
/// which also provides the per-field breakdown used by detailed snapshots.
pub trait SizeOf {
    /// Heap bytes reachable from this value, not counting `size_of_val(self)`.
    fn heap_size(&self, sizer: &mut Sizer) -> usize;

    /// Heap bytes of this value's own buffer, without following into its
    /// elements.
    fn shallow_heap_size(&self) -> usize {
        0
    }

    /// Named breakdown of this value. Leaves return nothing.
    fn attributes(&self, _sizer: &mut Sizer, _detail: usize) -> Vec<Breakdown> {
        Vec::new()
    }

    /// Inline size plus everything reachable, measured with a fresh [`Sizer`].
    fn deep_size(&self) -> usize {
        let mut sizer = Sizer::new();
        mem::size_of_val(self) + self.heap_size(&mut sizer)
    }

    /// Inline size plus the value's own buffer only.
    fn shallow_size(&self) -> usize {
        mem::size_of_val(self) + self.shallow_heap_size()
    }
}

/// A measured value and, when requested, the measurements of its attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakdown {
    pub name: String,
    /// Total bytes attributed to the value
    pub size: usize,
    /// Bytes stored inline, `size_of_val`
    pub flat: usize,
    pub refs: Vec<Breakdown>,
}

/// Traversal state for one measurement.
#[derive(Debug, Default)]
pub struct Sizer {
    excluded: HashSet<TypeId>,
    seen: HashSet<usize>,
}

impl Sizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count values of `T` as zero bytes wherever they are reached.
    pub fn exclude<T: ?Sized + 'static>(&mut self) -> &mut Self {
        self.excluded.insert(TypeId::of::<T>());
        self
    }

    pub fn is_excluded<T: ?Sized + 'static>(&self) -> bool {
        self.excluded.contains(&TypeId::of::<T>())
    }

    /// Returns true the first time `ptr` is reached in this traversal.
    pub fn first_visit<T: ?Sized>(&mut self, ptr: *const T) -> bool {
        self.seen.insert(ptr.cast::<()>() as usize)
    }

    /// Inline plus heap size of `value`, or zero if its type is excluded.
    pub fn size_of<T: SizeOf + ?Sized + 'static>(&mut self, value: &T) -> usize {
        if self.is_excluded::<T>() {
            return 0;
        }
        mem::size_of_val(value) + value.heap_size(self)
    }

    /// Heap size of `value`, or zero if its type is excluded.
    pub fn heap_of<T: SizeOf + ?Sized + 'static>(&mut self, value: &T) -> usize {
        if self.is_excluded::<T>() {
            return 0;
        }
        value.heap_size(self)
    }

    /// Like [`Sizer::size_of`] for values whose concrete type is erased. No
    /// exclusion check applies to `value` itself.
    pub fn total_size<T: SizeOf + ?Sized>(&mut self, value: &T) -> usize {
        mem::size_of_val(value) + value.heap_size(self)
    }

    /// Measure `value` and, while `detail` is non-zero, its attributes.
    ///
    /// A node with attributes is sized as its inline bytes plus whatever its
    /// attributes hold beyond their own inline bytes, so a parent never counts
    /// an inline field twice.
    pub fn asized<T: SizeOf + ?Sized + 'static>(
        &mut self,
        name: impl Into<String>,
        value: &T,
        detail: usize,
    ) -> Breakdown {
        let name = name.into();
        if self.is_excluded::<T>() {
            return Breakdown {
                name,
                size: 0,
                flat: 0,
                refs: Vec::new(),
            };
        }

        let flat = mem::size_of_val(value);
        let refs = if detail > 0 {
            value.attributes(self, detail - 1)
        } else {
            Vec::new()
        };

        let size = if refs.is_empty() {
            flat + value.heap_size(self)
        } else {
            flat + refs
                .iter()
                .map(|r| r.size.saturating_sub(r.flat))
                .sum::<usize>()
        };

        Breakdown {
            name,
            size,
            flat,
            refs,
        }
    }
}

/// Implement [`SizeOf`] for a struct from the list of its measured fields.
///
/// ```
/// use uis_memprof::{size_of_fields, SizeOf};
///
/// struct Manager {
///     names: Vec<String>,
///     retries: u32,
/// }
/// size_of_fields!(Manager { names, retries });
///
/// let manager = Manager { names: vec!["one".to_string()], retries: 3 };
/// assert!(manager.deep_size() > std::mem::size_of::<Manager>());
/// ```
#[macro_export]
macro_rules! size_of_fields {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::SizeOf for $ty {
            fn heap_size(&self, sizer: &mut $crate::Sizer) -> usize {
                0 $(+ sizer.heap_of(&self.$field))*
            }

            fn attributes(
                &self,
                sizer: &mut $crate::Sizer,
                detail: usize,
            ) -> Vec<$crate::Breakdown> {
                vec![$(sizer.asized(stringify!($field), &self.$field, detail)),*]
            }
        }
    };
}

macro_rules! impl_flat {
    ($($ty:ty),* $(,)?) => {
        $(
            impl SizeOf for $ty {
                fn heap_size(&self, _sizer: &mut Sizer) -> usize {
                    0
                }
            }
        )*
    };
}

impl_flat!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    f32,
    f64,
    str,
    Duration,
    Instant,
    SystemTime,
);

impl SizeOf for String {
    fn heap_size(&self, _sizer: &mut Sizer) -> usize {
        self.capacity()
    }

    fn shallow_heap_size(&self) -> usize {
        self.capacity()
    }
}

impl<T: SizeOf + 'static> SizeOf for [T] {
    fn heap_size(&self, sizer: &mut Sizer) -> usize {
        self.iter().map(|item| sizer.heap_of(item)).sum()
    }
}

impl<T: SizeOf + 'static, const N: usize> SizeOf for [T; N] {
    fn heap_size(&self, sizer: &mut Sizer) -> usize {
        self.iter().map(|item| sizer.heap_of(item)).sum()
    }
}

impl<T: SizeOf + 'static> SizeOf for Vec<T> {
    fn heap_size(&self, sizer: &mut Sizer) -> usize {
        self.shallow_heap_size() + self.iter().map(|item| sizer.heap_of(item)).sum::<usize>()
    }

    fn shallow_heap_size(&self) -> usize {
        self.capacity() * mem::size_of::<T>()
    }
}

impl<T: SizeOf + 'static> SizeOf for VecDeque<T> {
    fn heap_size(&self, sizer: &mut Sizer) -> usize {
        self.shallow_heap_size() + self.iter().map(|item| sizer.heap_of(item)).sum::<usize>()
    }

    fn shallow_heap_size(&self) -> usize {
        self.capacity() * mem::size_of::<T>()
    }
}

impl<T: SizeOf + 'static> SizeOf for Option<T> {
    fn heap_size(&self, sizer: &mut Sizer) -> usize {
        match self {
            Some(value) => sizer.heap_of(value),
            None => 0,
        }
    }
}

impl<T: SizeOf + ?Sized + 'static> SizeOf for Box<T> {
    fn heap_size(&self, sizer: &mut Sizer) -> usize {
        sizer.size_of(&**self)
    }

    fn shallow_heap_size(&self) -> usize {
        mem::size_of_val(&**self)
    }
}

// Reference counts live next to the value in the shared allocation.
const RC_HEADER: usize = 2 * mem::size_of::<usize>();

impl<T: SizeOf + ?Sized + 'static> SizeOf for Arc<T> {
    fn heap_size(&self, sizer: &mut Sizer) -> usize {
        if sizer.first_visit(Arc::as_ptr(self)) {
            RC_HEADER + sizer.size_of(&**self)
        } else {
            0
        }
    }

    fn shallow_heap_size(&self) -> usize {
        RC_HEADER + mem::size_of_val(&**self)
    }
}

impl<T: SizeOf + ?Sized + 'static> SizeOf for Rc<T> {
    fn heap_size(&self, sizer: &mut Sizer) -> usize {
        if sizer.first_visit(Rc::as_ptr(self)) {
            RC_HEADER + sizer.size_of(&**self)
        } else {
            0
        }
    }

    fn shallow_heap_size(&self) -> usize {
        RC_HEADER + mem::size_of_val(&**self)
    }
}

// hashbrown keeps one control byte per bucket next to the entries.
fn hash_table_bytes<T>(capacity: usize) -> usize {
    capacity * (mem::size_of::<T>() + 1)
}

impl<K: SizeOf + 'static, V: SizeOf + 'static, S> SizeOf for HashMap<K, V, S> {
    fn heap_size(&self, sizer: &mut Sizer) -> usize {
        self.shallow_heap_size()
            + self
                .iter()
                .map(|(k, v)| sizer.heap_of(k) + sizer.heap_of(v))
                .sum::<usize>()
    }

    fn shallow_heap_size(&self) -> usize {
        hash_table_bytes::<(K, V)>(self.capacity())
    }
}

impl<T: SizeOf + 'static, S> SizeOf for HashSet<T, S> {
    fn heap_size(&self, sizer: &mut Sizer) -> usize {
        self.shallow_heap_size() + self.iter().map(|item| sizer.heap_of(item)).sum::<usize>()
    }

    fn shallow_heap_size(&self) -> usize {
        hash_table_bytes::<T>(self.capacity())
    }
}

// An index map stores entries with their hash in a vector, plus an index table.
fn index_table_bytes<T>(capacity: usize) -> usize {
    capacity * (mem::size_of::<T>() + 2 * mem::size_of::<usize>())
}

impl<K: SizeOf + 'static, V: SizeOf + 'static, S> SizeOf for IndexMap<K, V, S> {
    fn heap_size(&self, sizer: &mut Sizer) -> usize {
        self.shallow_heap_size()
            + self
                .iter()
                .map(|(k, v)| sizer.heap_of(k) + sizer.heap_of(v))
                .sum::<usize>()
    }

    fn shallow_heap_size(&self) -> usize {
        index_table_bytes::<(K, V)>(self.capacity())
    }
}

impl<T: SizeOf + 'static, S> SizeOf for IndexSet<T, S> {
    fn heap_size(&self, sizer: &mut Sizer) -> usize {
        self.shallow_heap_size() + self.iter().map(|item| sizer.heap_of(item)).sum::<usize>()
    }

    fn shallow_heap_size(&self) -> usize {
        index_table_bytes::<T>(self.capacity())
    }
}

impl<K: SizeOf + 'static, V: SizeOf + 'static> SizeOf for BTreeMap<K, V> {
    fn heap_size(&self, sizer: &mut Sizer) -> usize {
        self.shallow_heap_size()
            + self
                .iter()
                .map(|(k, v)| sizer.heap_of(k) + sizer.heap_of(v))
                .sum::<usize>()
    }

    fn shallow_heap_size(&self) -> usize {
        self.len() * mem::size_of::<(K, V)>()
    }
}

impl<T: SizeOf + 'static> SizeOf for BTreeSet<T> {
    fn heap_size(&self, sizer: &mut Sizer) -> usize {
        self.shallow_heap_size() + self.iter().map(|item| sizer.heap_of(item)).sum::<usize>()
    }

    fn shallow_heap_size(&self) -> usize {
        self.len() * mem::size_of::<T>()
    }
}

impl<A: SizeOf + 'static, B: SizeOf + 'static> SizeOf for (A, B) {
    fn heap_size(&self, sizer: &mut Sizer) -> usize {
        sizer.heap_of(&self.0) + sizer.heap_of(&self.1)
    }
}

impl<A: SizeOf + 'static, B: SizeOf + 'static, C: SizeOf + 'static> SizeOf for (A, B, C) {
    fn heap_size(&self, sizer: &mut Sizer) -> usize {
        sizer.heap_of(&self.0) + sizer.heap_of(&self.1) + sizer.heap_of(&self.2)
    }
}
