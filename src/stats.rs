//! Probe-length statistics for tuning load factors and hashers.

use alloc::vec;
use alloc::vec::Vec;
use core::hash::BuildHasher;
use core::hash::Hash;

use crate::OpenHashMap;

/// A snapshot of how far entries sit from their home slots.
///
/// The probe length of an entry is the cyclic distance from the slot its hash
/// selects to the slot that actually holds it; zero means it sits at home.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeStats {
    /// Number of live entries.
    pub len: usize,
    /// Number of slots.
    pub capacity: usize,
    /// Entries the table holds before it next grows.
    pub resize_threshold: usize,
    /// Occupied fraction of the slots (`len / capacity`).
    pub load_factor: f64,
    /// Longest probe length of any entry.
    pub max_probe_length: usize,
    /// Average probe length over all entries.
    pub mean_probe_length: f64,
    /// `histogram[d]` is the number of entries with probe length `d`.
    pub histogram: Vec<usize>,
}

impl ProbeStats {
    /// Pretty-print the statistics and a horizontal probe-length histogram.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Open Hash Map Probe Statistics ===");
        println!(
            "Population: {}/{} slots ({:.2}% occupied, threshold {})",
            self.len,
            self.capacity,
            self.load_factor * 100.0,
            self.resize_threshold
        );
        println!(
            "Probe length: max {}, mean {:.3}",
            self.max_probe_length, self.mean_probe_length
        );

        let max = self.histogram.iter().copied().max().unwrap_or(0);
        if max == 0 {
            println!("probe histogram: empty");
            return;
        }

        let max_bar = 60usize;
        let total_units = max_bar * 8;
        let make_bar = |count: usize| -> alloc::string::String {
            if count == 0 {
                return alloc::string::String::new();
            }
            let units = ((count as u128 * total_units as u128).div_ceil(max as u128)) as usize;
            let mut bar = "█".repeat(units / 8);
            match units % 8 {
                1 => bar.push('▏'),
                2 => bar.push('▎'),
                3 => bar.push('▍'),
                4 => bar.push('▌'),
                5 => bar.push('▋'),
                6 => bar.push('▊'),
                7 => bar.push('▉'),
                _ => {}
            }
            bar
        };

        println!("probe histogram ({} entries):", self.len);
        let width = self.histogram.len().saturating_sub(1).to_string().len();
        for (distance, &count) in self.histogram.iter().enumerate() {
            println!("{distance:>width$} | {} ({count})", make_bar(count));
        }
    }
}

impl<K, V, S> OpenHashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Returns probe-length counts: element `d` is the number of entries
    /// stored `d` slots past their home slot.
    ///
    /// The vector is as long as the longest probe plus one, and empty for an
    /// empty map.
    pub fn probe_histogram(&self) -> Vec<usize> {
        let mask = self.mask();
        let slots = self.slots();
        let mut histogram = vec![];

        for index in slots.present.ones() {
            // SAFETY: `ones` only yields live slots.
            let home = self.home_slot(unsafe { slots.key(index) });
            let distance = index.wrapping_sub(home) & mask;
            if histogram.len() <= distance {
                histogram.resize(distance + 1, 0);
            }
            histogram[distance] += 1;
        }

        histogram
    }

    /// Returns a [`ProbeStats`] snapshot of the table.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use probe_map::OpenHashMap;
    ///
    /// let map: OpenHashMap<u32, u32> = (0..100).map(|i| (i, i)).collect();
    /// let stats = map.probe_stats();
    ///
    /// assert_eq!(stats.len, 100);
    /// assert_eq!(stats.histogram.iter().sum::<usize>(), 100);
    /// assert!(stats.load_factor <= map.load_factor());
    /// ```
    pub fn probe_stats(&self) -> ProbeStats {
        let histogram = self.probe_histogram();
        let total: usize = histogram
            .iter()
            .enumerate()
            .map(|(distance, &count)| distance * count)
            .sum();

        ProbeStats {
            len: self.len(),
            capacity: self.capacity(),
            resize_threshold: self.resize_threshold(),
            load_factor: self.len() as f64 / self.capacity() as f64,
            max_probe_length: histogram.len().saturating_sub(1),
            mean_probe_length: if self.is_empty() {
                0.0
            } else {
                total as f64 / self.len() as f64
            },
            histogram,
        }
    }
}
