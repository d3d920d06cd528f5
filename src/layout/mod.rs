//! Address-space layout planning: spacer mode and ASLR mode.

/// ASLR-mode layout: per-library, page-aligned blocks
pub mod aslr;
/// The template line processor
pub mod emitter;
/// Spacer-mode layout: the ten-step common/subset/individual placement algorithm
pub mod spacer;

use std::collections::HashMap;

use crate::ordered_map::OrderedMap;

#[derive(Debug, Clone)]
/// The running state and accumulated output of one planning run.
pub struct LayoutPlan {
    /// The current location counter; advances monotonically as sections are emitted
    pub loc_counter: u64,
    /// Named markers recorded during planning (`_etext`, `.data`, `.intrstack`, ...),
    /// in the order they were recorded
    pub section_markers: OrderedMap<u64>,
    /// Per-unikernel linker-script fragment lines, in emission order
    pub unikernel_fragments: HashMap<String, Vec<String>>,
}

impl LayoutPlan {
    /// Start a fresh plan at `initial_loc_counter`, with an empty fragment list
    /// for each of `unikernel_names`.
    pub fn new(initial_loc_counter: u64, unikernel_names: &[String]) -> Self {
        let mut unikernel_fragments = HashMap::new();
        for name in unikernel_names {
            unikernel_fragments.insert(name.clone(), Vec::new());
        }
        Self {
            loc_counter: initial_loc_counter,
            section_markers: OrderedMap::new(),
            unikernel_fragments,
        }
    }

    /// Record a marker at the current location counter
    pub fn mark(&mut self, name: &str, address: u64) {
        self.section_markers.insert(name, address);
    }

    /// Append `line` to every unikernel's fragment
    pub fn push_shared_line(&mut self, unikernel_names: &[String], line: &str) {
        for name in unikernel_names {
            if let Some(fragment) = self.unikernel_fragments.get_mut(name) {
                fragment.push(line.to_string());
            }
        }
    }

    /// Append `line` to a single unikernel's fragment
    pub fn push_line(&mut self, unikernel_name: &str, line: &str) {
        if let Some(fragment) = self.unikernel_fragments.get_mut(unikernel_name) {
            fragment.push(line.to_string());
        }
    }
}
