/// Errors reported by fallible [`OpenHashMap`](crate::OpenHashMap)
/// operations.
///
/// A key that is simply absent is never an error; lookups and removals
/// express a miss through a caller-supplied default or an `Option`.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum Error {
    /// The table cannot grow any further: doubling the capacity would overflow
    /// the index type or exceed the largest allocation the platform can
    /// describe.
    #[error("max capacity reached at size={size}")]
    CapacityOverflow {
        /// Number of live entries when growth was attempted.
        size: usize,
    },

    /// The configured load factor is not a finite number strictly between
    /// zero and one.
    #[error("load factor must be in the open interval (0, 1), got {load_factor}")]
    InvalidLoadFactor {
        /// The rejected load factor.
        load_factor: f64,
    },
}
