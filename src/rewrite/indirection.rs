//! The per-section indirection state machine: a sequential append log that
//! accumulates relocated instructions and the branches stitching them back
//! into the original control flow.

use crate::constants::REL32_INSTRUCTION_LEN;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
/// Accumulates the content of one `.ind.<lib>` section as instructions are
/// relocated into it.
pub struct IndirectionState {
    /// Virtual address of the first byte of this indirection section
    pub start_address: u64,
    /// Virtual address the next byte written will land at
    pub current_address: u64,
    /// The section content built up so far
    pub emitted_bytes: Vec<u8>,
    /// `(address, bytes)` for every entry appended, in ascending address order
    pub entries: Vec<(u64, Vec<u8>)>,
    /// How many redirected instructions have been appended back-to-back since
    /// the last non-redirected instruction
    pub consecutive_redirect_count: u32,
}

impl IndirectionState {
    /// Start a fresh, empty indirection section at `start_address`
    pub fn new(start_address: u64) -> Self {
        Self {
            start_address,
            current_address: start_address,
            emitted_bytes: Vec::new(),
            entries: Vec::new(),
            consecutive_redirect_count: 0,
        }
    }

    /// Copy `bytes` verbatim into the section, advancing the current address
    pub fn append_raw(&mut self, address: u64, bytes: &[u8]) {
        self.entries.push((address, bytes.to_vec()));
        self.emitted_bytes.extend_from_slice(bytes);
        self.current_address += bytes.len() as u64;
    }

    /// Append a 5-byte relative branch (`opcode` + signed 32-bit displacement)
    /// whose target is `target`, computed from this entry's own address.
    pub fn append_branch(&mut self, opcode: u8, target: u64) -> Result<()> {
        let source = self.current_address;
        let displacement = target as i64 - (source as i64 + REL32_INSTRUCTION_LEN as i64);
        let displacement = i32::try_from(displacement)
            .map_err(|_| Error::DisplacementOverflow { value: displacement })?;

        let mut bytes = Vec::with_capacity(5);
        bytes.push(opcode);
        bytes.extend_from_slice(&displacement.to_le_bytes());
        self.append_raw(source, &bytes);
        Ok(())
    }

    /// The consecutive-redirect optimization: trim the most recently
    /// appended 5-byte back-edge jump before fusing in the next redirect.
    pub fn retract_trailing_branch(&mut self) {
        let new_len = self.emitted_bytes.len().saturating_sub(5);
        self.emitted_bytes.truncate(new_len);
        self.current_address -= 5;
        self.entries.pop();
    }

    /// Total bytes emitted so far
    pub fn len(&self) -> usize {
        self.emitted_bytes.len()
    }

    /// Whether nothing has been appended yet
    pub fn is_empty(&self) -> bool {
        self.emitted_bytes.is_empty()
    }
}
