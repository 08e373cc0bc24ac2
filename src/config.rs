use crate::error::Error;

/// Initial capacity used by [`TableConfig::default`].
pub const DEFAULT_INITIAL_CAPACITY: usize = 8;

/// Load factor used by [`TableConfig::default`].
pub const DEFAULT_LOAD_FACTOR: f64 = 0.6;

/// Construction parameters for an [`OpenHashMap`](crate::OpenHashMap).
///
/// The requested capacity is rounded up to a power of two when the table is
/// built. The load factor is fixed for the lifetime of the table and decides
/// how many entries it holds before doubling:
/// `resize_threshold = floor(capacity * load_factor)`.
///
/// # Examples
///
/// ```rust
/// use probe_map::TableConfig;
///
/// let config = TableConfig::default()
///     .with_initial_capacity(100)
///     .with_load_factor(0.75);
/// assert!(config.validate().is_ok());
///
/// assert!(TableConfig::default().with_load_factor(1.0).validate().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableConfig {
    /// Requested number of slots; rounded up to the next power of two.
    pub initial_capacity: usize,
    /// Fraction of slots that may be occupied before the table grows.
    pub load_factor: f64,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            load_factor: DEFAULT_LOAD_FACTOR,
        }
    }
}

impl TableConfig {
    /// Returns a copy of this configuration with a different initial
    /// capacity.
    pub fn with_initial_capacity(self, initial_capacity: usize) -> Self {
        Self {
            initial_capacity,
            ..self
        }
    }

    /// Returns a copy of this configuration with a different load factor.
    pub fn with_load_factor(self, load_factor: f64) -> Self {
        Self {
            load_factor,
            ..self
        }
    }

    /// Checks that the load factor keeps `resize_threshold < capacity` for
    /// every capacity.
    pub fn validate(&self) -> Result<(), Error> {
        if self.load_factor.is_finite() && self.load_factor > 0.0 && self.load_factor < 1.0 {
            Ok(())
        } else {
            Err(Error::InvalidLoadFactor {
                load_factor: self.load_factor,
            })
        }
    }

    /// Number of slots a table built from this configuration starts with.
    pub fn slot_count(&self) -> usize {
        next_power_of_two(self.initial_capacity)
    }
}

/// Smallest power of two greater than or equal to `n`. Zero maps to one.
///
/// Saturates at the largest power of two representable in `usize`.
#[inline]
pub(crate) fn next_power_of_two(n: usize) -> usize {
    n.checked_next_power_of_two()
        .unwrap_or(1 << (usize::BITS - 1))
}

/// `floor(capacity * load_factor)`.
#[inline]
pub(crate) fn resize_threshold(capacity: usize, load_factor: f64) -> usize {
    let threshold = (capacity as f64 * load_factor) as usize;
    // f64 rounding can land on `capacity` for huge tables with a load factor
    // just under one.
    threshold.min(capacity - 1)
}
