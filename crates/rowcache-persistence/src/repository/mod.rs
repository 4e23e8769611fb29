//! # Repository Module
//!
//! System-of-record implementations behind the [`RecordSource`] trait.

pub mod memory;
#[cfg(feature = "scylla")]
pub mod scylla_impl;
pub mod traits;

pub use memory::MemoryRecordSource;
#[cfg(feature = "scylla")]
pub use scylla_impl::{ScyllaClient, ScyllaConfig, ScyllaRecordSource};
pub use traits::RecordSource;
