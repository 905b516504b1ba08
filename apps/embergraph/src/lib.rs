//! # embergraph
//!
//! Command-line front end for `embergraph-core`: argument parsing, command
//! implementations, the user directory demo and the interrupt hook that
//! closes the store.

pub mod cli;
pub mod demo;
