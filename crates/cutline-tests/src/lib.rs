//! Integration test crate for Cutline.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It wires synthetic media sources into the full engine.

#[cfg(test)]
mod support;

#[cfg(test)]
mod scenarios;

#[cfg(test)]
mod concurrency;

#[cfg(test)]
mod resilience;

#[cfg(test)]
mod ffi;
