//! Address-space layout planner and indirection-table rewriter for
//! co-located unikernels.
//!
//! The crate is split along the two subcommands it drives: [`layout`] plans
//! where every library's sections land in the combined address space and
//! emits a populated linker script, while [`rewrite`] walks an already
//! linked ELF and relocates cross-section instructions into companion
//! indirection sections so they survive relinking at a new address.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic, missing_docs)]

/// Partitions the global library index by cross-unikernel occurrence count
pub mod classify;
/// CLI surface and the validated configuration derived from it
pub mod config;
/// Constants shared across the planner and rewriter
pub mod constants;
/// Crate-wide error type
pub mod error;
/// The global library index
pub mod index;
/// Address-space layout planning: spacer mode and ASLR mode
pub mod layout;
/// Data model: library section geometry, per-unikernel object sets
pub mod model;
/// A small insertion-ordered map
pub mod ordered_map;
/// Opaque ELF section probing
pub mod probe;
/// Drives the external compiler driver to perform the final unikernel link
pub mod relink;
/// Indirection-table binary rewriting
pub mod rewrite;
/// The indirection size store
pub mod store;
