#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// Table construction parameters and their defaults.
pub mod config;

/// The error type returned by fallible operations.
pub mod error;

pub mod iter;

/// The open-addressing hash map.
///
/// This module provides [`OpenHashMap`], which stores keys and values in
/// flat parallel arrays, resolves collisions by linear probing, and repairs
/// probe runs on removal by shifting entries backward.
pub mod open_hash_map;

mod presence;

#[cfg(feature = "stats")]
pub mod stats;

pub use config::TableConfig;
pub use error::Error;
pub use iter::CursorMut;
pub use open_hash_map::OpenHashMap;
#[cfg(feature = "stats")]
pub use stats::ProbeStats;

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// The hasher builder used when none is specified.
        ///
        /// Fixed-seed foldhash: fast, and deterministic across runs.
        pub type DefaultHashBuilder = foldhash::fast::FixedState;
    } else if #[cfg(feature = "std")] {
        /// The hasher builder used when none is specified.
        pub type DefaultHashBuilder = core::hash::BuildHasherDefault<std::hash::DefaultHasher>;
    } else {
        /// Placeholder used when no default hasher is available.
        ///
        /// Enable the `foldhash` or `std` feature, or supply a hasher builder
        /// explicitly with [`OpenHashMap::with_hasher`].
        pub enum DefaultHashBuilder {}
    }
}
