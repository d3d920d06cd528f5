//! Data model: library section geometry, per-unikernel object sets.

/// Library records: probed or merged section sizes
pub mod library;
/// Section descriptors: the planning-time shape of one ELF section
pub mod section;
/// Per-unikernel aggregation of probed library objects
pub mod unikernel;
