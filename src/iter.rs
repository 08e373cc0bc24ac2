//! Iterators and the removal cursor for [`OpenHashMap`].

use core::hash::BuildHasher;
use core::hash::Hash;
use core::iter::FusedIterator;
use core::mem::MaybeUninit;

use crate::open_hash_map::OpenHashMap;
use crate::open_hash_map::Slots;
use crate::presence::Ones;
use crate::presence::PresenceSet;

/// An iterator over the entries of an [`OpenHashMap`], in slot order.
pub struct Iter<'a, K, V> {
    slots: &'a Slots<K, V>,
    ones: Ones<'a>,
    remaining: usize,
}

impl<'a, K, V> Iter<'a, K, V> {
    pub(crate) fn new(slots: &'a Slots<K, V>, len: usize) -> Self {
        Self {
            slots,
            ones: slots.present.ones(),
            remaining: len,
        }
    }
}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots,
            ones: self.ones.clone(),
            remaining: self.remaining,
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.ones.next()?;
        self.remaining -= 1;
        // SAFETY: `ones` only yields slots whose presence bit is set.
        unsafe { Some((self.slots.key(index), self.slots.value(index))) }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
impl<K, V> FusedIterator for Iter<'_, K, V> {}

/// A mutable iterator over the entries of an [`OpenHashMap`], in slot order.
pub struct IterMut<'a, K, V> {
    keys: &'a [MaybeUninit<K>],
    values: core::slice::IterMut<'a, MaybeUninit<V>>,
    present: &'a PresenceSet,
    index: usize,
    remaining: usize,
}

impl<'a, K, V> IterMut<'a, K, V> {
    pub(crate) fn new(slots: &'a mut Slots<K, V>, len: usize) -> Self {
        let (keys, values, present) = slots.parts_mut();
        Self {
            keys,
            values: values.iter_mut(),
            present,
            index: 0,
            remaining: len,
        }
    }
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        for value in self.values.by_ref() {
            let index = self.index;
            self.index += 1;
            if self.present.get(index) {
                self.remaining -= 1;
                // SAFETY: The presence bit is set, so both halves of the slot
                // are initialized. Each value is yielded at most once.
                return Some(unsafe { (self.keys[index].assume_init_ref(), value.assume_init_mut()) });
            }
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}
impl<K, V> FusedIterator for IterMut<'_, K, V> {}

/// An iterator over the keys of an [`OpenHashMap`].
#[derive(Clone)]
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Keys<'a, K, V> {
    pub(crate) fn new(inner: Iter<'a, K, V>) -> Self {
        Self { inner }
    }
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}
impl<K, V> FusedIterator for Keys<'_, K, V> {}

/// An iterator over the values of an [`OpenHashMap`].
#[derive(Clone)]
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Values<'a, K, V> {
    pub(crate) fn new(inner: Iter<'a, K, V>) -> Self {
        Self { inner }
    }
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {}
impl<K, V> FusedIterator for Values<'_, K, V> {}

/// An iterator over mutable references to the values of an [`OpenHashMap`].
pub struct ValuesMut<'a, K, V> {
    inner: IterMut<'a, K, V>,
}

impl<'a, K, V> ValuesMut<'a, K, V> {
    pub(crate) fn new(inner: IterMut<'a, K, V>) -> Self {
        Self { inner }
    }
}

impl<'a, K, V> Iterator for ValuesMut<'a, K, V> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for ValuesMut<'_, K, V> {}
impl<K, V> FusedIterator for ValuesMut<'_, K, V> {}

/// A draining iterator over the entries of an [`OpenHashMap`].
///
/// Dropping it removes whatever was not consumed.
pub struct Drain<'a, K, V, S> {
    map: &'a mut OpenHashMap<K, V, S>,
    cursor: usize,
}

impl<'a, K, V, S> Drain<'a, K, V, S> {
    pub(crate) fn new(map: &'a mut OpenHashMap<K, V, S>) -> Self {
        Self { map, cursor: 0 }
    }
}

impl<K, V, S> Iterator for Drain<'_, K, V, S> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.map.take_next(&mut self.cursor)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.map.len(), Some(self.map.len()))
    }
}

impl<K, V, S> Drop for Drain<'_, K, V, S> {
    fn drop(&mut self) {
        for _ in &mut *self {}
    }
}

impl<K, V, S> ExactSizeIterator for Drain<'_, K, V, S> {}
impl<K, V, S> FusedIterator for Drain<'_, K, V, S> {}

/// An owning iterator over the entries of an [`OpenHashMap`].
pub struct IntoIter<K, V, S> {
    map: OpenHashMap<K, V, S>,
    cursor: usize,
}

impl<K, V, S> IntoIter<K, V, S> {
    pub(crate) fn new(map: OpenHashMap<K, V, S>) -> Self {
        Self { map, cursor: 0 }
    }
}

impl<K, V, S> Iterator for IntoIter<K, V, S> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.map.take_next(&mut self.cursor)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.map.len(), Some(self.map.len()))
    }
}

impl<K, V, S> ExactSizeIterator for IntoIter<K, V, S> {}
impl<K, V, S> FusedIterator for IntoIter<K, V, S> {}

/// A cursor over an [`OpenHashMap`] that can remove the entry it is on.
///
/// Created by [`OpenHashMap::cursor_mut`]. Call [`next`](Self::next) to move
/// to the following entry and [`remove_current`](Self::remove_current) to
/// take it out. Every entry live when the cursor was created is visited
/// exactly once unless it has been removed, even though removal shifts other
/// entries around.
///
/// The walk starts just below an empty slot and moves downward, wrapping
/// once around the table. Backward-shift deletion only ever moves entries
/// from slots between the removed one and the next empty slot above it,
/// which are exactly the slots the cursor has already passed.
pub struct CursorMut<'a, K, V, S> {
    map: &'a mut OpenHashMap<K, V, S>,
    // Unwrapped slot counter; the slot is `position & mask`.
    position: usize,
    stop: usize,
    current: Option<usize>,
}

impl<'a, K, V, S> CursorMut<'a, K, V, S> {
    pub(crate) fn new(map: &'a mut OpenHashMap<K, V, S>) -> Self {
        // At least one slot is always empty.
        let stop = map.slots().present.last_zero().unwrap_or(0);
        let position = stop + map.capacity();
        Self {
            map,
            position,
            stop,
            current: None,
        }
    }
}

impl<K, V, S> CursorMut<'_, K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Moves to the next entry and returns it, or `None` once every slot has
    /// been visited.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<(&K, &mut V)> {
        let mask = self.map.mask();
        while self.position > self.stop + 1 {
            self.position -= 1;
            let index = self.position & mask;
            if self.map.slots().present.get(index) {
                self.current = Some(index);
                // SAFETY: Presence checked just above.
                return Some(unsafe { self.map.slots_mut().entry_mut(index) });
            }
        }

        self.current = None;
        None
    }

    /// Removes the entry the cursor is on and returns it.
    ///
    /// Returns `None` if the cursor has not been advanced yet, has run off
    /// the end, or its entry was already removed.
    pub fn remove_current(&mut self) -> Option<(K, V)> {
        let index = self.current.take()?;
        // SAFETY: `current` is only set to a live slot, and cleared as soon as
        // that slot is removed. Entries shifted into `index` by an earlier
        // removal are never assigned to `current` again.
        Some(unsafe { self.map.remove_at(index) })
    }
}
