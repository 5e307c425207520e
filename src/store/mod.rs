//! Store layer: the abstract document store API and its in-process backend.

pub mod contracts;
pub mod fixture;
pub mod memory;
