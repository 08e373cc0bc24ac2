use alloc::boxed::Box;
use core::alloc::Layout;
use core::borrow::Borrow;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::mem::MaybeUninit;

use log::debug;
use log::trace;

use crate::config::TableConfig;
use crate::config::next_power_of_two;
use crate::config::resize_threshold;
use crate::error::Error;
use crate::iter::CursorMut;
use crate::iter::Drain;
use crate::iter::IntoIter;
use crate::iter::Iter;
use crate::iter::IterMut;
use crate::iter::Keys;
use crate::iter::Values;
use crate::iter::ValuesMut;
use crate::presence::PresenceSet;
#[cfg(any(feature = "foldhash", feature = "std"))]
use crate::DefaultHashBuilder;

/// Fold the upper half of the hash code into the lower half, then spread it
/// with a cheap multiplicative mix.
///
/// Fixed and unseeded: the same hash code always lands in the same slot for a
/// given capacity. This is not a defence against adversarial key sets.
#[inline(always)]
pub(crate) fn mix(hash_code: u64) -> u64 {
    let hash = hash_code ^ (hash_code >> 32);
    (hash << 1).wrapping_sub(hash << 8)
}

#[inline(always)]
pub(crate) fn slot_for(hash_code: u64, mask: usize) -> usize {
    mix(hash_code) as usize & mask
}

/// Index-aligned key and value arrays plus the presence bits that say which
/// slots are initialized.
///
/// Dropping a `Slots` only frees the arrays. Live entries must be dropped or
/// moved out by the owner first.
pub(crate) struct Slots<K, V> {
    keys: Box<[MaybeUninit<K>]>,
    values: Box<[MaybeUninit<V>]>,
    pub(crate) present: PresenceSet,
}

impl<K, V> Slots<K, V> {
    /// Allocates storage for `capacity` slots, or `None` if either array
    /// would exceed the largest layout the platform can describe.
    fn try_new(capacity: usize) -> Option<Self> {
        Layout::array::<K>(capacity).ok()?;
        Layout::array::<V>(capacity).ok()?;
        Some(Self::allocate(capacity))
    }

    fn allocate(capacity: usize) -> Self {
        Self {
            keys: Box::new_uninit_slice(capacity),
            values: Box::new_uninit_slice(capacity),
            present: PresenceSet::new(capacity),
        }
    }

    #[inline(always)]
    pub(crate) fn capacity(&self) -> usize {
        self.present.len()
    }

    /// # Safety
    ///
    /// The caller must ensure the presence bit for `index` is set.
    #[inline(always)]
    pub(crate) unsafe fn key(&self, index: usize) -> &K {
        debug_assert!(self.present.get(index));
        // SAFETY: Caller ensures the slot is live, so the key is initialized.
        unsafe { self.keys[index].assume_init_ref() }
    }

    /// # Safety
    ///
    /// The caller must ensure the presence bit for `index` is set.
    #[inline(always)]
    pub(crate) unsafe fn value(&self, index: usize) -> &V {
        debug_assert!(self.present.get(index));
        // SAFETY: Caller ensures the slot is live, so the value is initialized.
        unsafe { self.values[index].assume_init_ref() }
    }

    /// # Safety
    ///
    /// The caller must ensure the presence bit for `index` is set.
    #[inline(always)]
    pub(crate) unsafe fn entry_mut(&mut self, index: usize) -> (&K, &mut V) {
        debug_assert!(self.present.get(index));
        // SAFETY: Caller ensures the slot is live, so both halves are
        // initialized. `keys` and `values` are disjoint fields.
        unsafe {
            (
                self.keys[index].assume_init_ref(),
                self.values[index].assume_init_mut(),
            )
        }
    }

    /// Split borrow used by the mutable iterators.
    pub(crate) fn parts_mut(&mut self) -> (&[MaybeUninit<K>], &mut [MaybeUninit<V>], &PresenceSet) {
        (&self.keys[..], &mut self.values[..], &self.present)
    }

    #[inline(always)]
    fn write(&mut self, index: usize, key: K, value: V) {
        debug_assert!(!self.present.get(index));
        self.keys[index].write(key);
        self.values[index].write(value);
        self.present.set(index);
    }

    /// Moves the entry at `index` out and marks the slot empty.
    ///
    /// # Safety
    ///
    /// The caller must ensure the presence bit for `index` is set.
    #[inline(always)]
    pub(crate) unsafe fn take(&mut self, index: usize) -> (K, V) {
        debug_assert!(self.present.get(index));
        self.present.clear(index);
        // SAFETY: The slot was live until the line above, and clearing its
        // presence bit means nothing will read or drop these values again.
        unsafe {
            (
                self.keys[index].assume_init_read(),
                self.values[index].assume_init_read(),
            )
        }
    }

    /// Moves the entry at `from` into the empty slot `to`.
    ///
    /// # Safety
    ///
    /// The caller must ensure `from` is live and `to` is empty.
    #[inline(always)]
    unsafe fn relocate(&mut self, from: usize, to: usize) {
        debug_assert!(from != to);
        // SAFETY: Caller ensures `from` is live.
        let (key, value) = unsafe { self.take(from) };
        self.write(to, key, value);
    }

    /// Drops every live entry and clears all presence bits.
    pub(crate) fn drop_live(&mut self) {
        if !core::mem::needs_drop::<K>() && !core::mem::needs_drop::<V>() {
            self.present.clear_all();
            return;
        }

        for index in 0..self.capacity() {
            if self.present.get(index) {
                // Cleared first so a panicking destructor cannot cause a
                // double drop later.
                self.present.clear(index);
                // SAFETY: The presence bit was set, so both halves are
                // initialized, and it is now clear so they are never touched
                // again.
                unsafe {
                    self.keys[index].assume_init_drop();
                    self.values[index].assume_init_drop();
                }
            }
        }
    }
}

enum Probe {
    Occupied(usize),
    Vacant(usize),
}

/// An open-addressing hash map with linear probing and backward-shift
/// deletion.
///
/// Keys and values live in two flat arrays indexed by slot, with a separate
/// presence bitset recording which slots are live. There is no per-entry
/// allocation, no tombstone, and no sentinel value: any `K: Hash + Eq` and
/// any `V` can be stored.
///
/// The table grows by doubling as soon as an insert would push the number of
/// entries past `floor(capacity * load_factor)`. Removing an entry shifts
/// later members of its probe run backward so every run stays contiguous.
///
/// ## Performance Characteristics
///
/// - **Memory**: one bit per slot overhead, plus `K` and `V` per slot.
/// - **Lookups**: O(1) expected, O(n) under pathological clustering.
/// - **Resize/compact**: O(capacity), performed all at once.
///
/// ## Example
///
/// ```rust
/// use probe_map::OpenHashMap;
///
/// let mut map = OpenHashMap::new();
/// assert_eq!(map.put(123, 123, 0), 0);
/// assert_eq!(map.put(456, 456, 0), 0);
///
/// assert!(map.contains_key(&123));
/// assert!(!map.contains_key(&789));
/// assert!(map.contains_value(&456));
/// assert_eq!(map.get_or_default(&789, 789), 789);
/// ```
pub struct OpenHashMap<K, V, S = crate::DefaultHashBuilder> {
    slots: Slots<K, V>,
    mask: usize,
    size: usize,
    resize_threshold: usize,
    load_factor: f64,
    hash_builder: S,
}

impl<K, V, S> Drop for OpenHashMap<K, V, S> {
    fn drop(&mut self) {
        self.slots.drop_live();
    }
}

impl<K, V, S> Clone for OpenHashMap<K, V, S>
where
    K: Clone,
    V: Clone,
    S: Clone,
{
    fn clone(&self) -> Self {
        let mut cloned = Self {
            slots: Slots::allocate(self.capacity()),
            mask: self.mask,
            size: 0,
            resize_threshold: self.resize_threshold,
            load_factor: self.load_factor,
            hash_builder: self.hash_builder.clone(),
        };

        // Slot positions are copied as-is, so the probe runs stay valid
        // without rehashing.
        for index in self.slots.present.ones() {
            // SAFETY: `ones` only yields live slots.
            let (key, value) = unsafe { (self.slots.key(index), self.slots.value(index)) };
            cloned.slots.write(index, key.clone(), value.clone());
            cloned.size += 1;
        }

        cloned
    }
}

impl<K, V, S> Debug for OpenHashMap<K, V, S>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S> PartialEq for OpenHashMap<K, V, S>
where
    K: Hash + Eq,
    V: PartialEq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.iter()
            .all(|(key, value)| other.get(key).is_some_and(|v| v == value))
    }
}

impl<K, V, S> Eq for OpenHashMap<K, V, S>
where
    K: Hash + Eq,
    V: Eq,
    S: BuildHasher,
{
}

impl<K, V, S> Default for OpenHashMap<K, V, S>
where
    S: Default,
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

#[cfg(any(feature = "foldhash", feature = "std"))]
impl<K, V> OpenHashMap<K, V, DefaultHashBuilder> {
    /// Creates an empty map with 8 slots and a load factor of 0.6.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_map::OpenHashMap;
    ///
    /// let map: OpenHashMap<u64, u64> = OpenHashMap::new();
    /// assert_eq!(map.capacity(), 8);
    /// assert_eq!(map.resize_threshold(), 4);
    /// ```
    pub fn new() -> Self {
        Self::with_hasher(DefaultHashBuilder::default())
    }

    /// Creates an empty map with at least `capacity` slots and the default
    /// load factor.
    ///
    /// The slot count is rounded up to a power of two. Note that this is the
    /// number of *slots*; the number of entries the map holds before growing
    /// is [`resize_threshold`](Self::resize_threshold).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_map::OpenHashMap;
    ///
    /// let map: OpenHashMap<u64, u64> = OpenHashMap::with_capacity(100);
    /// assert_eq!(map.capacity(), 128);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_config(TableConfig::default().with_initial_capacity(capacity))
    }

    /// Creates an empty map with at least `capacity` slots and the given load
    /// factor.
    ///
    /// # Panics
    ///
    /// Panics if `load_factor` is not strictly between zero and one.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_map::OpenHashMap;
    ///
    /// let map: OpenHashMap<u64, u64> = OpenHashMap::with_capacity_and_load_factor(8, 0.5);
    /// assert_eq!(map.load_factor(), 0.5);
    /// assert_eq!(map.resize_threshold(), 4);
    /// ```
    pub fn with_capacity_and_load_factor(capacity: usize, load_factor: f64) -> Self {
        Self::with_config(TableConfig {
            initial_capacity: capacity,
            load_factor,
        })
    }

    /// Creates an empty map from a [`TableConfig`].
    ///
    /// # Panics
    ///
    /// Panics if the configuration does not pass [`TableConfig::validate`].
    pub fn with_config(config: TableConfig) -> Self {
        Self::with_config_and_hasher(config, DefaultHashBuilder::default())
    }

    /// Creates an empty map from a [`TableConfig`], reporting an invalid
    /// configuration or an impossible allocation as an error instead of
    /// panicking.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_map::Error;
    /// use probe_map::OpenHashMap;
    /// use probe_map::TableConfig;
    ///
    /// let config = TableConfig::default().with_load_factor(2.0);
    /// let result = OpenHashMap::<u64, u64>::try_with_config(config);
    /// assert!(matches!(result, Err(Error::InvalidLoadFactor { .. })));
    /// ```
    pub fn try_with_config(config: TableConfig) -> Result<Self, Error> {
        Self::try_with_config_and_hasher(config, DefaultHashBuilder::default())
    }
}

impl<K, V, S> OpenHashMap<K, V, S> {
    /// Creates an empty map with the default configuration and the given
    /// hasher builder.
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_config_and_hasher(TableConfig::default(), hash_builder)
    }

    /// Creates an empty map with the given configuration and hasher builder.
    ///
    /// # Panics
    ///
    /// Panics if the configuration does not pass [`TableConfig::validate`] or
    /// the requested capacity cannot be allocated.
    pub fn with_config_and_hasher(config: TableConfig, hash_builder: S) -> Self {
        match Self::try_with_config_and_hasher(config, hash_builder) {
            Ok(map) => map,
            Err(error) => panic!("{error}"),
        }
    }

    /// Fallible form of [`with_config_and_hasher`](Self::with_config_and_hasher).
    pub fn try_with_config_and_hasher(config: TableConfig, hash_builder: S) -> Result<Self, Error> {
        config.validate()?;

        let capacity = config.slot_count();
        let slots = Slots::try_new(capacity).ok_or(Error::CapacityOverflow { size: 0 })?;

        Ok(Self {
            slots,
            mask: capacity - 1,
            size: 0,
            resize_threshold: resize_threshold(capacity, config.load_factor),
            load_factor: config.load_factor,
            hash_builder,
        })
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns `true` if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Returns the number of slots in the backing arrays. Always a power of
    /// two.
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Returns the load factor fixed at construction.
    pub fn load_factor(&self) -> f64 {
        self.load_factor
    }

    /// Returns the number of entries the map holds before its next insert of
    /// a new key doubles the capacity.
    ///
    /// Always strictly less than [`capacity`](Self::capacity), so every probe
    /// run ends at an empty slot.
    pub fn resize_threshold(&self) -> usize {
        self.resize_threshold
    }

    /// Returns a reference to the map's hasher builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Removes every entry, dropping the keys and values. The capacity is
    /// kept.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_map::OpenHashMap;
    ///
    /// let mut map = OpenHashMap::new();
    /// for i in 0..100u32 {
    ///     map.insert(i, i);
    /// }
    /// let capacity = map.capacity();
    ///
    /// map.clear();
    /// assert!(map.is_empty());
    /// assert_eq!(map.capacity(), capacity);
    /// ```
    pub fn clear(&mut self) {
        self.size = 0;
        self.slots.drop_live();
    }

    /// Returns an iterator over `(&K, &V)` in slot order.
    ///
    /// The order is unspecified and changes whenever the map is rehashed.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(&self.slots, self.size)
    }

    /// Returns an iterator over `(&K, &mut V)` in slot order.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut::new(&mut self.slots, self.size)
    }

    /// Returns an iterator over the keys.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys::new(self.iter())
    }

    /// Returns an iterator over the values.
    pub fn values(&self) -> Values<'_, K, V> {
        Values::new(self.iter())
    }

    /// Returns an iterator over mutable references to the values.
    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut::new(self.iter_mut())
    }

    /// Removes and yields every entry. The capacity is kept.
    ///
    /// Entries not consumed before the iterator is dropped are dropped with
    /// it.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_map::OpenHashMap;
    ///
    /// let mut map = OpenHashMap::new();
    /// map.insert(1, "a");
    /// map.insert(2, "b");
    ///
    /// let mut drained: Vec<_> = map.drain().collect();
    /// drained.sort();
    /// assert_eq!(drained, vec![(1, "a"), (2, "b")]);
    /// assert!(map.is_empty());
    /// ```
    pub fn drain(&mut self) -> Drain<'_, K, V, S> {
        Drain::new(self)
    }

    /// Removes the live entry at slot `*cursor` or the first one after it,
    /// advancing `*cursor` past it.
    ///
    /// Leaves holes in probe runs, so callers must go on to empty the map.
    pub(crate) fn take_next(&mut self, cursor: &mut usize) -> Option<(K, V)> {
        while *cursor < self.capacity() {
            let index = *cursor;
            *cursor += 1;
            if self.slots.present.get(index) {
                self.size -= 1;
                // SAFETY: Presence checked just above.
                return Some(unsafe { self.slots.take(index) });
            }
        }
        None
    }

    pub(crate) fn slots(&self) -> &Slots<K, V> {
        &self.slots
    }

    pub(crate) fn slots_mut(&mut self) -> &mut Slots<K, V> {
        &mut self.slots
    }

    pub(crate) fn mask(&self) -> usize {
        self.mask
    }
}

impl<K, V, S> OpenHashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    #[inline(always)]
    pub(crate) fn home_slot<Q>(&self, key: &Q) -> usize
    where
        Q: Hash + ?Sized,
    {
        slot_for(self.hash_builder.hash_one(key), self.mask)
    }

    /// Walks the probe run from `key`'s home slot until it finds `key` or an
    /// empty slot.
    ///
    /// Terminates because `size <= resize_threshold < capacity` guarantees at
    /// least one empty slot.
    #[inline]
    fn probe<Q>(&self, key: &Q) -> Probe
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut index = self.home_slot(key);

        while self.slots.present.get(index) {
            // SAFETY: Presence checked by the loop condition.
            if unsafe { self.slots.key(index) }.borrow() == key {
                return Probe::Occupied(index);
            }
            index = (index + 1) & self.mask;
        }

        Probe::Vacant(index)
    }

    #[inline]
    fn find_index<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.probe(key) {
            Probe::Occupied(index) => Some(index),
            Probe::Vacant(_) => None,
        }
    }

    /// Returns `true` if the map contains `key`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_map::OpenHashMap;
    ///
    /// let mut map = OpenHashMap::new();
    /// map.insert("alpha".to_string(), 1);
    ///
    /// assert!(map.contains_key("alpha"));
    /// assert!(!map.contains_key("beta"));
    /// ```
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find_index(key).is_some()
    }

    /// Returns `true` if any live entry holds `value`.
    ///
    /// Values are not indexed: this scans every slot.
    pub fn contains_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.values().any(|v| v == value)
    }

    /// Returns a reference to the value stored for `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = self.find_index(key)?;
        // SAFETY: `find_index` only returns live slots.
        Some(unsafe { self.slots.value(index) })
    }

    /// Returns a mutable reference to the value stored for `key`.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = self.find_index(key)?;
        // SAFETY: `find_index` only returns live slots.
        Some(unsafe { self.slots.entry_mut(index) }.1)
    }

    /// Returns the stored key and value for `key`.
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = self.find_index(key)?;
        // SAFETY: `find_index` only returns live slots.
        Some(unsafe { (self.slots.key(index), self.slots.value(index)) })
    }

    /// Returns a copy of the value stored for `key`, or `default` if the key
    /// is absent.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_map::OpenHashMap;
    ///
    /// let mut counts = OpenHashMap::new();
    /// counts.insert("hits", 3u64);
    ///
    /// assert_eq!(counts.get_or_default("hits", 0), 3);
    /// assert_eq!(counts.get_or_default("misses", 0), 0);
    /// ```
    pub fn get_or_default<Q>(&self, key: &Q, default: V) -> V
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.get(key).cloned().unwrap_or(default)
    }

    /// Stores `value` under `key`, returning the previous value if the key
    /// was present or `default` if it was not.
    ///
    /// If the key is new and the insert would push the size past
    /// [`resize_threshold`](Self::resize_threshold), the capacity is doubled
    /// first.
    ///
    /// # Panics
    ///
    /// Panics if the table needs to grow and cannot. See
    /// [`try_put`](Self::try_put) for a fallible form.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_map::OpenHashMap;
    ///
    /// let mut map = OpenHashMap::new();
    /// assert_eq!(map.put(7, 70, -1), -1);
    /// assert_eq!(map.put(7, 71, -1), 70);
    /// assert_eq!(map.get(&7), Some(&71));
    /// ```
    pub fn put(&mut self, key: K, value: V, default: V) -> V {
        match self.try_put(key, value, default) {
            Ok(previous) => previous,
            Err(error) => panic!("{error}"),
        }
    }

    /// Fallible form of [`put`](Self::put).
    ///
    /// On error the map is left exactly as it was; `key`, `value` and
    /// `default` are dropped.
    pub fn try_put(&mut self, key: K, value: V, default: V) -> Result<V, Error> {
        Ok(self.try_insert(key, value)?.unwrap_or(default))
    }

    /// Stores `value` under `key`, returning the previous value if there was
    /// one.
    ///
    /// # Panics
    ///
    /// Panics if the table needs to grow and cannot.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match self.try_insert(key, value) {
            Ok(previous) => previous,
            Err(error) => panic!("{error}"),
        }
    }

    /// Fallible form of [`insert`](Self::insert).
    pub fn try_insert(&mut self, key: K, value: V) -> Result<Option<V>, Error> {
        match self.probe(&key) {
            Probe::Occupied(index) => {
                // SAFETY: `probe` returned a live slot.
                let slot = unsafe { self.slots.entry_mut(index) }.1;
                Ok(Some(core::mem::replace(slot, value)))
            }
            Probe::Vacant(mut index) => {
                if self.size + 1 > self.resize_threshold {
                    // Small tables with a low load factor can need more than
                    // one doubling before the threshold admits the entry.
                    while self.size + 1 > self.resize_threshold {
                        self.increase_capacity()?;
                    }
                    index = self.vacant_slot(self.home_slot(&key));
                }

                self.slots.write(index, key, value);
                self.size += 1;
                Ok(None)
            }
        }
    }

    /// Removes `key`, returning its value, or `default` if the key was absent.
    ///
    /// The removed slot is refilled by shifting later members of its probe
    /// run backward, so no tombstone is left behind.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_map::OpenHashMap;
    ///
    /// let mut map = OpenHashMap::new();
    /// map.put(1, 10, 0);
    ///
    /// assert_eq!(map.remove(&1, 0), 10);
    /// assert_eq!(map.remove(&1, 0), 0);
    /// assert!(map.is_empty());
    /// ```
    pub fn remove<Q>(&mut self, key: &Q, default: V) -> V
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.take(key).unwrap_or(default)
    }

    /// Removes `key`, returning its value if it was present.
    pub fn take<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove_entry(key).map(|(_, value)| value)
    }

    /// Removes `key`, returning the stored key and value if it was present.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let index = self.find_index(key)?;
        // SAFETY: `find_index` only returns live slots.
        Some(unsafe { self.remove_at(index) })
    }

    /// Removes the entry at `index` and repairs its probe run.
    ///
    /// # Safety
    ///
    /// The caller must ensure `index` is a live slot.
    pub(crate) unsafe fn remove_at(&mut self, index: usize) -> (K, V) {
        // SAFETY: Caller ensures `index` is live.
        let entry = unsafe { self.slots.take(index) };
        self.size -= 1;
        self.compact_chain(index);
        entry
    }

    /// Keeps only the entries for which `keep` returns `true`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_map::OpenHashMap;
    ///
    /// let mut map: OpenHashMap<u32, u32> = (0..50).map(|i| (i, i * 10)).collect();
    /// map.retain(|&k, _| k % 2 == 0);
    ///
    /// assert_eq!(map.len(), 25);
    /// assert!(map.keys().all(|k| k % 2 == 0));
    /// ```
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &mut V) -> bool) {
        let mut cursor = self.cursor_mut();
        while let Some((key, value)) = cursor.next() {
            if !keep(key, value) {
                cursor.remove_current();
            }
        }
    }

    /// Returns a cursor that visits every entry once and may remove the
    /// entry it is positioned on.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_map::OpenHashMap;
    ///
    /// let mut map: OpenHashMap<u32, u32> = (0..10).map(|i| (i, i)).collect();
    ///
    /// let mut cursor = map.cursor_mut();
    /// let mut seen = 0;
    /// while let Some((_, value)) = cursor.next() {
    ///     seen += 1;
    ///     if *value >= 5 {
    ///         cursor.remove_current();
    ///     }
    /// }
    ///
    /// assert_eq!(seen, 10);
    /// assert_eq!(map.len(), 5);
    /// ```
    pub fn cursor_mut(&mut self) -> CursorMut<'_, K, V, S> {
        CursorMut::new(self)
    }

    /// Rebuilds the table at the smallest power-of-two capacity that keeps
    /// the current entries within the load factor.
    ///
    /// Useful for reclaiming space after many removals. Membership and values
    /// are unchanged; slot order may change.
    ///
    /// # Panics
    ///
    /// Panics if the target capacity cannot be allocated.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_map::OpenHashMap;
    ///
    /// let mut map = OpenHashMap::new();
    /// for i in 0..1000u32 {
    ///     map.insert(i, i);
    /// }
    /// for i in 10..1000u32 {
    ///     map.take(&i);
    /// }
    ///
    /// map.compact();
    /// assert_eq!(map.capacity(), 32);
    /// assert_eq!(map.len(), 10);
    /// assert!(map.len() <= map.resize_threshold());
    /// ```
    pub fn compact(&mut self) {
        if let Err(error) = self.try_compact() {
            panic!("{error}");
        }
    }

    /// Fallible form of [`compact`](Self::compact).
    pub fn try_compact(&mut self) -> Result<(), Error> {
        let ideal = (self.size as f64 / self.load_factor + 0.5) as usize;
        let mut capacity = next_power_of_two(ideal);
        // Rounding to nearest can undershoot; the threshold must still admit
        // every live entry.
        while resize_threshold(capacity, self.load_factor) < self.size {
            capacity = capacity
                .checked_mul(2)
                .ok_or(Error::CapacityOverflow { size: self.size })?;
        }

        debug!(
            "compacting open hash map: capacity {} -> {}, size {}",
            self.capacity(),
            capacity,
            self.size
        );
        self.rehash(capacity)
    }

    #[cold]
    #[inline(never)]
    fn increase_capacity(&mut self) -> Result<(), Error> {
        let capacity = self
            .capacity()
            .checked_mul(2)
            .ok_or(Error::CapacityOverflow { size: self.size })?;

        debug!(
            "growing open hash map: capacity {} -> {}, size {}",
            self.capacity(),
            capacity,
            self.size
        );
        self.rehash(capacity)
    }

    /// Moves every live entry into freshly allocated storage of
    /// `new_capacity` slots, then swaps the storage in.
    ///
    /// If the allocation is impossible or a `Hash` impl panics part way, the
    /// old storage is left untouched.
    fn rehash(&mut self, new_capacity: usize) -> Result<(), Error> {
        assert!(
            new_capacity.is_power_of_two(),
            "new capacity must be a power of two"
        );
        debug_assert!(resize_threshold(new_capacity, self.load_factor) >= self.size);

        let mut slots =
            Slots::try_new(new_capacity).ok_or(Error::CapacityOverflow { size: self.size })?;
        let mask = new_capacity - 1;

        for index in self.slots.present.ones() {
            // SAFETY: `ones` only yields live slots.
            let key = unsafe { self.slots.key(index) };
            let mut slot = slot_for(self.hash_builder.hash_one(key), mask);
            while slots.present.get(slot) {
                slot = (slot + 1) & mask;
            }

            // SAFETY: The old slot is live. The bitwise copy is the only owner
            // once the storage is swapped below; until then the old presence
            // bits stay set and the new storage never drops its contents, so
            // an unwind here cannot double drop.
            unsafe {
                slots.write(
                    slot,
                    self.slots.keys[index].assume_init_read(),
                    self.slots.values[index].assume_init_read(),
                );
            }
        }

        let old = core::mem::replace(&mut self.slots, slots);
        // Contents were moved out above; only the arrays are freed.
        drop(old);

        self.mask = mask;
        self.resize_threshold = resize_threshold(new_capacity, self.load_factor);
        Ok(())
    }

    /// First empty slot at or after `index`, wrapping.
    #[inline]
    fn vacant_slot(&self, mut index: usize) -> usize {
        while self.slots.present.get(index) {
            index = (index + 1) & self.mask;
        }
        index
    }

    /// Backward-shift deletion: refill the hole at `deleted` from later in
    /// its run so no live key is separated from its home slot by an empty
    /// slot.
    fn compact_chain(&mut self, mut deleted: usize) {
        let mut index = deleted;
        loop {
            index = (index + 1) & self.mask;
            if !self.slots.present.get(index) {
                return;
            }

            // SAFETY: Presence checked just above.
            let home = self.home_slot(unsafe { self.slots.key(index) });

            // The entry at `index` must move if its run, walked cyclically
            // from `home`, passes through `deleted` before reaching `index`.
            if (index < home && (home <= deleted || deleted <= index))
                || (home <= deleted && deleted <= index)
            {
                trace!("shifting slot {index} back to {deleted} (home {home})");
                // SAFETY: `index` is live and `deleted` is the current hole.
                unsafe { self.slots.relocate(index, deleted) };
                deleted = index;
            }
        }
    }

    /// Checks every structural invariant. Test-only.
    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        assert!(self.capacity().is_power_of_two());
        assert_eq!(self.mask, self.capacity() - 1);
        assert!(self.size <= self.resize_threshold);
        assert!(self.resize_threshold < self.capacity());
        assert_eq!(self.slots.present.count(), self.size);

        for index in self.slots.present.ones() {
            // SAFETY: `ones` only yields live slots.
            let key = unsafe { self.slots.key(index) };
            let mut probe = self.home_slot(key);
            while probe != index {
                assert!(
                    self.slots.present.get(probe),
                    "empty slot {probe} separates slot {index} from its home"
                );
                probe = (probe + 1) & self.mask;
            }
        }
    }
}

impl<K, V, S> Extend<(K, V)> for OpenHashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<'a, K, V, S> Extend<(&'a K, &'a V)> for OpenHashMap<K, V, S>
where
    K: Hash + Eq + Copy,
    V: Copy,
    S: BuildHasher,
{
    fn extend<T: IntoIterator<Item = (&'a K, &'a V)>>(&mut self, iter: T) {
        self.extend(iter.into_iter().map(|(&key, &value)| (key, value)));
    }
}

impl<K, V, S> FromIterator<(K, V)> for OpenHashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::with_hasher(S::default());
        map.extend(iter);
        map
    }
}

impl<K, V, S> IntoIterator for OpenHashMap<K, V, S> {
    type IntoIter = IntoIter<K, V, S>;
    type Item = (K, V);

    fn into_iter(self) -> Self::IntoIter {
        IntoIter::new(self)
    }
}

impl<'a, K, V, S> IntoIterator for &'a OpenHashMap<K, V, S> {
    type IntoIter = Iter<'a, K, V>;
    type Item = (&'a K, &'a V);

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, S> IntoIterator for &'a mut OpenHashMap<K, V, S> {
    type IntoIter = IterMut<'a, K, V>;
    type Item = (&'a K, &'a mut V);

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::cell::Cell;
    use core::hash::BuildHasherDefault;
    use core::hash::Hasher;

    use rand::Rng;
    use rand::SeedableRng;
    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use rand::rngs::SmallRng;
    use siphasher::sip::SipHasher;

    use super::*;

    #[derive(Clone)]
    struct SipHashBuilder {
        k0: u64,
        k1: u64,
    }

    impl BuildHasher for SipHashBuilder {
        type Hasher = SipHasher;

        fn build_hasher(&self) -> Self::Hasher {
            SipHasher::new_with_keys(self.k0, self.k1)
        }
    }

    impl Default for SipHashBuilder {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k0: rng.try_next_u64().unwrap_or(0),
                k1: rng.try_next_u64().unwrap_or(0),
            }
        }
    }

    /// Passes integer keys through unchanged so slot positions are
    /// predictable.
    #[derive(Default)]
    struct IdentityHasher(u64);

    impl Hasher for IdentityHasher {
        fn finish(&self) -> u64 {
            self.0
        }

        fn write(&mut self, bytes: &[u8]) {
            for &b in bytes {
                self.0 = (self.0 << 8) | b as u64;
            }
        }

        fn write_u64(&mut self, n: u64) {
            self.0 = n;
        }

        fn write_u32(&mut self, n: u32) {
            self.0 = n as u64;
        }
    }

    type Identity = BuildHasherDefault<IdentityHasher>;

    /// Key whose hash only depends on `group`, so every key of a group
    /// collides on the same home slot.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Colliding {
        group: u64,
        id: u64,
    }

    impl Hash for Colliding {
        fn hash<H: Hasher>(&self, state: &mut H) {
            state.write_u64(self.group);
        }
    }

    fn sip_map<K, V>() -> OpenHashMap<K, V, SipHashBuilder> {
        OpenHashMap::with_hasher(SipHashBuilder::default())
    }

    fn small_table<K, V>() -> OpenHashMap<K, V, Identity> {
        OpenHashMap::with_config_and_hasher(TableConfig::default(), Identity::default())
    }

    #[test]
    fn test_mix_matches_reference_arithmetic() {
        assert_eq!(mix(0), 0);
        assert_eq!(mix(1), 2u64.wrapping_sub(256));
        // Upper half folds into the lower half before mixing.
        assert_eq!(slot_for(1 << 32, 7), slot_for(1, 7));
        assert_eq!(slot_for(123, 7), 6);
        assert_eq!(slot_for(456, 7), 0);
    }

    #[test]
    fn test_new_defaults() {
        let map: OpenHashMap<u64, u64, SipHashBuilder> = sip_map();
        assert!(map.is_empty());
        assert_eq!(map.len(), 0);
        assert_eq!(map.capacity(), 8);
        assert_eq!(map.load_factor(), 0.6);
        assert_eq!(map.resize_threshold(), 4);
    }

    #[test]
    fn test_capacity_rounds_to_power_of_two() {
        for (requested, expected) in [(0, 1), (1, 1), (5, 8), (8, 8), (100, 128)] {
            let map: OpenHashMap<u64, u64, Identity> = OpenHashMap::with_config_and_hasher(
                TableConfig::default().with_initial_capacity(requested),
                Identity::default(),
            );
            assert_eq!(map.capacity(), expected);
            assert!(map.resize_threshold() < map.capacity());
        }
    }

    #[test]
    fn test_invalid_load_factor() {
        let result = OpenHashMap::<u64, u64, Identity>::try_with_config_and_hasher(
            TableConfig::default().with_load_factor(1.0),
            Identity::default(),
        );
        assert!(matches!(result, Err(Error::InvalidLoadFactor { .. })));
    }

    #[test]
    #[should_panic(expected = "load factor must be in the open interval")]
    fn test_invalid_load_factor_panics() {
        let _map: OpenHashMap<u64, u64, Identity> = OpenHashMap::with_config_and_hasher(
            TableConfig::default().with_load_factor(0.0),
            Identity::default(),
        );
    }

    #[test]
    fn test_basic_scenario() {
        let mut map = small_table();
        assert_eq!(map.put(123u64, 123u64, 0), 0);
        assert_eq!(map.put(456, 456, 0), 0);

        assert!(map.contains_key(&123));
        assert!(map.contains_key(&456));
        assert!(!map.contains_key(&789));

        assert!(map.contains_value(&123));
        assert!(map.contains_value(&456));
        assert!(!map.contains_value(&789));

        assert_eq!(map.get_or_default(&789, 789), 789);
        assert_eq!(map.get_or_default(&123, 789), 123);
        map.assert_invariants();
    }

    #[test]
    fn test_put_returns_previous_or_default() {
        let mut map = sip_map();
        assert_eq!(map.put("a", 1, -1), -1);
        assert_eq!(map.put("a", 2, -1), 1);
        assert_eq!(map.put("a", 3, -1), 2);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&"a"), Some(&3));
    }

    #[test]
    fn test_insert_and_get() {
        let mut map = sip_map();

        assert_eq!(map.insert(1, "hello".to_string()), None);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&1), Some(&"hello".to_string()));
        assert_eq!(map.get(&2), None);

        assert_eq!(
            map.insert(1, "world".to_string()),
            Some("hello".to_string())
        );
        assert_eq!(map.len(), 1);
        assert_eq!(map.get_key_value(&1), Some((&1, &"world".to_string())));
    }

    #[test]
    fn test_get_mut() {
        let mut map = sip_map();
        map.insert(1, "hello".to_string());

        if let Some(value) = map.get_mut(&1) {
            value.push_str(" world");
        }

        assert_eq!(map.get(&1), Some(&"hello world".to_string()));
        assert_eq!(map.get_mut(&2), None);
    }

    #[test]
    fn test_borrowed_lookups() {
        let mut map = sip_map();
        map.insert("key".to_string(), 1);

        assert!(map.contains_key("key"));
        assert_eq!(map.get("key"), Some(&1));
        assert_eq!(map.remove("key", 0), 1);
        assert!(!map.contains_key("key"));
    }

    #[test]
    fn test_remove_absent_is_idempotent() {
        let mut map = sip_map();
        map.put(1, 10, 0);
        map.put(2, 20, 0);

        assert_eq!(map.remove(&3, -1), -1);
        assert_eq!(map.len(), 2);
        assert_eq!(map.remove(&1, -1), 10);
        assert_eq!(map.remove(&1, -1), -1);
        assert_eq!(map.len(), 1);
        assert_eq!(map.take(&2), Some(20));
        assert_eq!(map.take(&2), None);
        assert!(map.is_empty());
    }

    #[test]
    fn test_remove_entry() {
        let mut map = sip_map();
        map.insert(1, "hello".to_string());

        assert_eq!(map.remove_entry(&1), Some((1, "hello".to_string())));
        assert_eq!(map.len(), 0);
        assert_eq!(map.remove_entry(&1), None);
    }

    #[test]
    fn test_twenty_keys_resize_at_least_twice() {
        let mut map = small_table();
        assert_eq!(map.resize_threshold(), 4);

        let mut resizes = 0;
        let mut capacity = map.capacity();
        for key in 0..20u64 {
            map.put(key, key * 3, 0);
            if map.capacity() != capacity {
                resizes += 1;
                capacity = map.capacity();
            }
            assert!(map.len() <= map.resize_threshold());
            assert!(map.resize_threshold() < map.capacity());
        }

        assert!(resizes >= 2, "only {resizes} resizes");
        assert_eq!(map.capacity(), 64);
        for key in 0..20u64 {
            assert_eq!(map.get_or_default(&key, u64::MAX), key * 3);
        }
        map.assert_invariants();
    }

    #[test]
    fn test_grows_when_threshold_is_zero() {
        let mut map: OpenHashMap<u64, u64, Identity> = OpenHashMap::with_config_and_hasher(
            TableConfig::default()
                .with_initial_capacity(1)
                .with_load_factor(0.3),
            Identity::default(),
        );
        assert_eq!(map.resize_threshold(), 0);

        map.insert(1, 1);
        assert_eq!(map.len(), 1);
        assert!(map.len() <= map.resize_threshold());
        assert_eq!(map.capacity(), 4);
        map.assert_invariants();
    }

    #[test]
    fn test_collision_chain_shift_on_remove() {
        let mut map = small_table();
        let a = Colliding { group: 5, id: 0 };
        let b = Colliding { group: 5, id: 1 };
        let c = Colliding { group: 5, id: 2 };

        map.put(a, 'a', '-');
        map.put(b, 'b', '-');
        map.put(c, 'c', '-');

        let home = map.home_slot(&c);
        assert_eq!(map.home_slot(&a), home);
        assert_eq!(map.find_index(&a), Some(home));
        assert_eq!(map.find_index(&b), Some((home + 1) & map.mask));
        assert_eq!(map.find_index(&c), Some((home + 2) & map.mask));

        assert_eq!(map.remove(&b, '-'), 'b');

        // C moved back into B's old slot and is still reachable from its home.
        assert_eq!(map.find_index(&c), Some((home + 1) & map.mask));
        assert_eq!(map.get(&c), Some(&'c'));
        assert_eq!(map.find_index(&a), Some(home));
        assert_eq!(map.get(&a), Some(&'a'));
        assert!(!map.slots.present.get((home + 2) & map.mask));
        map.assert_invariants();
    }

    #[test]
    fn test_shift_across_wraparound() {
        // Capacity 16 (threshold 9): home slots are even, the last is 14, so
        // a run starting there wraps past slot 15 into 0.
        let mut map: OpenHashMap<Colliding, u64, Identity> = OpenHashMap::with_config_and_hasher(
            TableConfig::default().with_initial_capacity(16),
            Identity::default(),
        );

        let group = (0..64u64)
            .find(|&g| slot_for(g, 15) == 14)
            .unwrap();
        let keys: Vec<Colliding> = (0..4).map(|id| Colliding { group, id }).collect();
        for (i, key) in keys.iter().enumerate() {
            map.insert(*key, i as u64);
        }
        assert_eq!(map.capacity(), 16);
        assert_eq!(map.find_index(&keys[2]), Some(0));
        assert_eq!(map.find_index(&keys[3]), Some(1));

        // An entry homed at slot 0 sits behind the wrapped run.
        let zero_group = (0..64u64).find(|&g| slot_for(g, 15) == 0).unwrap();
        let zero = Colliding {
            group: zero_group,
            id: 99,
        };
        map.insert(zero, 99);
        assert_eq!(map.find_index(&zero), Some(2));

        map.take(&keys[1]);
        map.assert_invariants();
        assert_eq!(map.find_index(&keys[2]), Some(15));
        assert_eq!(map.find_index(&keys[3]), Some(0));
        // Home is 0 and slot 0 is still occupied, so it shifts to 1 but no
        // further.
        assert_eq!(map.find_index(&zero), Some(1));

        for (i, key) in keys.iter().enumerate() {
            if i != 1 {
                assert_eq!(map.get(key), Some(&(i as u64)));
            }
        }
        assert_eq!(map.get(&zero), Some(&99));
    }

    #[test]
    fn test_fuzz_removals_under_forced_collisions() {
        let mut rng = SmallRng::seed_from_u64(0x5eed);

        for _ in 0..200 {
            let mut map = small_table();
            let mut model = std::collections::HashMap::new();

            for step in 0..300u64 {
                let key = Colliding {
                    group: rng.random_range(0..4),
                    id: rng.random_range(0..24),
                };
                if rng.random_bool(0.55) {
                    assert_eq!(map.insert(key, step), model.insert(key, step));
                } else {
                    assert_eq!(map.take(&key), model.remove(&key));
                }
                assert_eq!(map.len(), model.len());
            }

            map.assert_invariants();
            for (key, value) in &model {
                assert_eq!(map.get(key), Some(value));
            }
        }
    }

    #[test]
    fn test_collision_handling() {
        let mut map = sip_map();

        for i in 0..1000 {
            map.insert(i, i * 2);
        }
        assert_eq!(map.len(), 1000);

        for i in (0..1000).step_by(2) {
            assert_eq!(map.take(&i), Some(i * 2));
        }
        assert_eq!(map.len(), 500);
        map.assert_invariants();

        for i in (1..1000).step_by(2) {
            assert_eq!(map.get(&i), Some(&(i * 2)));
        }
        for i in (0..1000).step_by(2) {
            assert!(!map.contains_key(&i));
        }
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let mut map = sip_map();
        for i in 0..100 {
            map.insert(i, i.to_string());
        }
        let capacity = map.capacity();

        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.capacity(), capacity);
        assert!(!map.contains_key(&1));
        assert!(!map.contains_value(&"1".to_string()));

        map.insert(1, "again".to_string());
        assert_eq!(map.get(&1), Some(&"again".to_string()));
        map.assert_invariants();
    }

    #[test]
    fn test_compact_preserves_membership() {
        let mut map = sip_map();
        for i in 0..1000u32 {
            map.insert(i, i + 1);
        }
        for i in (0..1000u32).filter(|i| i % 10 != 0) {
            map.take(&i);
        }
        assert_eq!(map.len(), 100);
        let before = map.capacity();

        map.compact();
        assert!(map.capacity() < before);
        // round(100 / 0.6) = 167 -> 256.
        assert_eq!(map.capacity(), 256);
        map.assert_invariants();

        for i in 0..1000u32 {
            assert_eq!(map.contains_key(&i), i % 10 == 0);
            assert_eq!(map.get_or_default(&i, 0), if i % 10 == 0 { i + 1 } else { 0 });
        }
    }

    #[test]
    fn test_compact_rounding_keeps_threshold() {
        // round(3 / 0.7) = 4, but floor(4 * 0.7) = 2 < 3.
        let mut map: OpenHashMap<u64, u64, Identity> = OpenHashMap::with_config_and_hasher(
            TableConfig::default()
                .with_initial_capacity(64)
                .with_load_factor(0.7),
            Identity::default(),
        );
        for i in 0..3 {
            map.insert(i, i);
        }

        map.compact();
        assert_eq!(map.capacity(), 8);
        assert!(map.len() <= map.resize_threshold());
        map.assert_invariants();
    }

    #[test]
    fn test_compact_empty() {
        let mut map: OpenHashMap<u64, u64, Identity> = small_table();
        map.compact();
        assert_eq!(map.capacity(), 1);
        assert_eq!(map.resize_threshold(), 0);

        map.insert(7, 7);
        assert_eq!(map.get(&7), Some(&7));
        map.assert_invariants();
    }

    #[test]
    fn test_retain() {
        let mut map = sip_map();
        for i in 0..200u32 {
            map.insert(i, i);
        }

        map.retain(|&k, v| {
            *v += 1;
            k % 3 == 0
        });

        assert_eq!(map.len(), 67);
        map.assert_invariants();
        for i in 0..200u32 {
            if i % 3 == 0 {
                assert_eq!(map.get(&i), Some(&(i + 1)));
            } else {
                assert!(!map.contains_key(&i));
            }
        }
    }

    #[test]
    fn test_cursor_remove_visits_each_entry_once() {
        let mut rng = SmallRng::seed_from_u64(7);
        let mut map = small_table();
        for _ in 0..400 {
            let key = Colliding {
                group: rng.random_range(0..6),
                id: rng.random_range(0..1000),
            };
            map.insert(key, 0u32);
        }
        let total = map.len();

        let mut visited = 0;
        let mut cursor = map.cursor_mut();
        while let Some((_, value)) = cursor.next() {
            *value += 1;
            visited += 1;
            if visited % 2 == 0 {
                assert!(cursor.remove_current().is_some());
                assert!(cursor.remove_current().is_none());
            }
        }
        drop(cursor);

        assert_eq!(visited, total);
        assert_eq!(map.len(), total - total / 2);
        assert!(map.values().all(|&v| v == 1));
        map.assert_invariants();
    }

    #[test]
    fn test_cursor_remove_everything() {
        let mut map = sip_map();
        for i in 0..500 {
            map.insert(i, i);
        }

        let mut removed = Vec::new();
        let mut cursor = map.cursor_mut();
        while cursor.next().is_some() {
            removed.push(cursor.remove_current().unwrap().0);
        }
        drop(cursor);

        removed.sort();
        assert_eq!(removed, (0..500).collect::<Vec<_>>());
        assert!(map.is_empty());
        map.assert_invariants();
    }

    #[test]
    fn test_iterators() {
        let mut map = sip_map();
        map.insert(1, "one".to_string());
        map.insert(2, "two".to_string());
        map.insert(3, "three".to_string());

        let iter = map.iter();
        assert_eq!(iter.len(), 3);

        let pairs: std::collections::HashMap<i32, String> =
            map.iter().map(|(k, v)| (*k, v.clone())).collect();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs.get(&2), Some(&"two".to_string()));

        let mut keys: Vec<i32> = map.keys().copied().collect();
        keys.sort();
        assert_eq!(keys, vec![1, 2, 3]);

        for value in map.values_mut() {
            value.push('!');
        }
        let mut values: Vec<String> = map.values().cloned().collect();
        values.sort();
        assert_eq!(values, vec!["one!", "three!", "two!"]);

        for (k, v) in &mut map {
            if *k == 1 {
                v.clear();
            }
        }
        assert_eq!(map.get(&1), Some(&String::new()));

        let mut owned: Vec<(i32, String)> = map.into_iter().collect();
        owned.sort();
        assert_eq!(owned[2], (3, "three!".to_string()));
    }

    #[test]
    fn test_drain_partial_then_reuse() {
        let mut map = sip_map();
        for i in 0..50 {
            map.insert(i, vec![i]);
        }

        let mut drain = map.drain();
        let first = drain.next();
        assert!(first.is_some());
        drop(drain);

        assert!(map.is_empty());
        map.assert_invariants();
        map.insert(1, vec![1]);
        assert_eq!(map.get(&1), Some(&vec![1]));
    }

    #[test]
    fn test_extend_and_from_iter() {
        let mut map: OpenHashMap<u32, u32, SipHashBuilder> = (0..10).map(|i| (i, i)).collect();
        map.extend((5..15).map(|i| (i, i * 100)));
        map.extend([(&20u32, &20u32)]);

        assert_eq!(map.len(), 16);
        assert_eq!(map.get(&4), Some(&4));
        assert_eq!(map.get(&5), Some(&500));
        assert_eq!(map.get(&20), Some(&20));
    }

    #[test]
    fn test_clone_is_independent() {
        let mut map = sip_map();
        for i in 0..100 {
            map.insert(i, i.to_string());
        }

        let mut cloned = map.clone();
        assert_eq!(cloned, map);
        cloned.assert_invariants();

        cloned.insert(0, "changed".to_string());
        assert_ne!(cloned, map);
        assert_eq!(map.get(&0), Some(&"0".to_string()));
    }

    #[test]
    fn test_debug_format() {
        let mut map: OpenHashMap<u64, &str, Identity> = small_table();
        assert_eq!(alloc::format!("{map:?}"), "{}");

        map.insert(1, "x");
        assert_eq!(alloc::format!("{map:?}"), "{1: \"x\"}");
    }

    #[test]
    fn test_zero_sized_values() {
        let mut set: OpenHashMap<u64, (), SipHashBuilder> = sip_map();
        for i in 0..100 {
            set.insert(i, ());
        }
        assert_eq!(set.len(), 100);
        assert!(set.contains_key(&99));
        assert_eq!(set.take(&99), Some(()));
        set.assert_invariants();
    }

    struct DropCounter(Rc<Cell<usize>>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn test_every_value_dropped_exactly_once() {
        let drops = Rc::new(Cell::new(0));

        {
            let mut map = sip_map();
            for i in 0..100u32 {
                map.insert(i, DropCounter(drops.clone()));
            }
            // Growth moves values; it must not drop them.
            assert_eq!(drops.get(), 0);

            // Replacing drops the returned old value only.
            drop(map.insert(0, DropCounter(drops.clone())));
            assert_eq!(drops.get(), 1);

            drop(map.take(&1));
            assert_eq!(drops.get(), 2);

            map.compact();
            assert_eq!(drops.get(), 2);

            // Keys 0 and 2..=9 remain below the cut.
            map.retain(|&k, _| k >= 10);
            assert_eq!(drops.get(), 11);

            let drained: Vec<_> = map.drain().take(5).collect();
            assert_eq!(drops.get(), 96);
            drop(drained);
            assert_eq!(drops.get(), 101);

            for i in 0..10u32 {
                map.insert(i, DropCounter(drops.clone()));
            }
            map.clear();
            assert_eq!(drops.get(), 111);

            for i in 0..10u32 {
                map.insert(i, DropCounter(drops.clone()));
            }
        }

        assert_eq!(drops.get(), 121);
    }

    #[test]
    fn test_random_round_trip_against_model() {
        let mut rng = SmallRng::from_os_rng();
        let mut map = sip_map();
        let mut model = std::collections::HashMap::new();

        for _ in 0..5000 {
            let key: u16 = rng.random_range(0..512);
            match rng.random_range(0..4) {
                0 | 1 => {
                    let value: u32 = rng.random();
                    assert_eq!(map.put(key, value, 0), model.insert(key, value).unwrap_or(0));
                }
                2 => assert_eq!(map.remove(&key, 0), model.remove(&key).unwrap_or(0)),
                _ => assert_eq!(
                    map.get_or_default(&key, 0),
                    model.get(&key).copied().unwrap_or(0)
                ),
            }
            assert_eq!(map.len(), model.len());
            assert!(map.len() <= map.resize_threshold());
        }

        map.assert_invariants();
    }
}
