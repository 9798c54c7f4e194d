#![allow(clippy::result_large_err)]

pub mod containers;
pub mod fake_store;
pub mod fixtures;

pub use fake_store::{FakeCall, FakeOperation, FakeStore, FakeStoreStats, glob_match};
