use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use indexmap::{IndexMap, IndexSet};

use crate::size::{Breakdown, SizeOf, Sizer};

/// The data-store category holding the single workflow entity of a partition.
pub const WORKFLOW: &str = "workflow";

/// Labels of the internal attributes sampled on every tick.
pub const DSM_DATA: &str = "DSM-Data";
pub const DSM_WSUBS: &str = "DSM-WSubs";
pub const DSM_DELTA_QUEUES: &str = "DSM-Delta-Qs";
pub const DSM_EXECUTOR: &str = "DSM-Executor";
pub const WM_WORKFLOWS: &str = "WM-Workflows";
pub const WM_QUEUE: &str = "WM-Queue";

pub const TRACKED_ATTRIBUTES: [&str; 6] = [
    DSM_DATA,
    DSM_WSUBS,
    DSM_DELTA_QUEUES,
    DSM_EXECUTOR,
    WM_WORKFLOWS,
    WM_QUEUE,
];

/// One entity collection inside a data-store partition.
pub trait Aisle: SizeOf {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A top-level data-store partition, one per workflow.
pub trait Partition {
    /// The collection stored under `category`, if the partition has one.
    fn aisle(&self, category: &str) -> Option<&dyn Aisle>;
}

/// The service whose internals are sampled.
///
/// The profiler only ever reads through these accessors.
pub trait Host: SizeOf + 'static {
    /// The merged configuration object of the service.
    type Config: SizeOf + 'static;

    /// Entity categories of the data-store schema, in schema order.
    fn categories(&self) -> Vec<String>;

    /// Every data-store partition currently held.
    fn partitions(&self) -> Vec<&dyn Partition>;

    /// The internal collections sampled with a shallow estimate, labelled as
    /// in [`TRACKED_ATTRIBUTES`].
    fn tracked_attributes(&self) -> Vec<(&'static str, &dyn SizeOf)>;

    /// Breakdown of the sub-objects walked by the detailed snapshot: the
    /// workflows manager, the data-store manager, the executor, the request
    /// handlers and the resolvers.
    fn detail_roots(&self, sizer: &mut Sizer, detail: usize) -> Vec<Breakdown>;

    fn config(&self) -> &Self::Config;
}

impl<K: SizeOf + 'static, V: SizeOf + 'static, S> Aisle for HashMap<K, V, S> {
    fn len(&self) -> usize {
        HashMap::len(self)
    }
}

impl<K: SizeOf + 'static, V: SizeOf + 'static, S> Aisle for IndexMap<K, V, S> {
    fn len(&self) -> usize {
        IndexMap::len(self)
    }
}

impl<K: SizeOf + 'static, V: SizeOf + 'static> Aisle for BTreeMap<K, V> {
    fn len(&self) -> usize {
        BTreeMap::len(self)
    }
}

impl<T: SizeOf + 'static, S> Aisle for HashSet<T, S> {
    fn len(&self) -> usize {
        HashSet::len(self)
    }
}

impl<T: SizeOf + 'static, S> Aisle for IndexSet<T, S> {
    fn len(&self) -> usize {
        IndexSet::len(self)
    }
}

impl<T: SizeOf + 'static> Aisle for BTreeSet<T> {
    fn len(&self) -> usize {
        BTreeSet::len(self)
    }
}

impl<T: SizeOf + 'static> Aisle for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }
}

impl<T: SizeOf + 'static> Aisle for VecDeque<T> {
    fn len(&self) -> usize {
        VecDeque::len(self)
    }
}

impl<T: SizeOf + 'static> Aisle for Option<T> {
    fn len(&self) -> usize {
        usize::from(self.is_some())
    }
}
