mod keyed_vec;
mod solution;

pub(crate) use keyed_vec::KeyedVec;
pub(crate) use keyed_vec::StorageKey;
pub use solution::Solution;

/// The hash map used throughout the crate; fnv is noticeably faster than the default hasher for
/// the small integer and short string keys we index by.
pub(crate) type HashMap<K, V> = fnv::FnvHashMap<K, V>;

/// The hash set counterpart of [`HashMap`].
pub(crate) type HashSet<K> = fnv::FnvHashSet<K>;
