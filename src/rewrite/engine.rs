//! The indirection-insertion engine: walks every `.text.<lib>` section of a
//! linked ELF, disassembles it, and relocates cross-section instructions
//! into a paired `.ind.<lib>` section.

use std::path::Path;

use iced_x86::{Decoder, DecoderOptions, Encoder, Instruction, OpKind};
use log::{error, info, warn};
use object::{Object, ObjectSection};

use crate::constants::{IMM32_LOAD_OPCODES, OPCODE_JMP_REL32, OPCODE_NOP, REL32_INSTRUCTION_LEN};
use crate::error::{Error, Result};
use crate::store::IndirectionSizeStore;

use super::indirection::IndirectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperandSource {
    Immediate,
    NearBranch,
    RipRelative,
}

#[derive(Debug, Clone, Copy)]
struct SectionRange {
    virtual_address: u64,
    size: u64,
}

impl SectionRange {
    fn contains(&self, addr: u64) -> bool {
        self.virtual_address != 0
            && addr >= self.virtual_address
            && addr < self.virtual_address + self.size
    }
}

/// Rewrite every eligible `.text.<lib>` section of the ELF at `path` in
/// place, folding observed indirection-section sizes into `store`.
pub fn rewrite_elf(path: &Path, store: &mut IndirectionSizeStore) -> Result<()> {
    let mut file_bytes = std::fs::read(path)?;
    let object_file = object::File::parse(&*file_bytes).map_err(|source| Error::ObjectParse {
        path: path.to_path_buf(),
        source,
    })?;

    let all_sections: Vec<(String, SectionRange)> = object_file
        .sections()
        .filter_map(|section| {
            let name = section.name().ok()?.to_string();
            Some((
                name,
                SectionRange {
                    virtual_address: section.address(),
                    size: section.size(),
                },
            ))
        })
        .collect();

    let mut patches: Vec<(u64, Vec<u8>)> = Vec::new();

    for (name, range) in &all_sections {
        if !name.starts_with(".text.") {
            continue;
        }
        if name.contains("app") {
            info!("skipping application section {name}");
            continue;
        }

        let ind_name = name.replacen(".text", ".ind", 1);
        let Some((_, ind_range)) = all_sections.iter().find(|(n, _)| n == &ind_name) else {
            error!("{name} has no paired indirection section {ind_name}");
            return Err(Error::MissingIndirectionSection {
                lib: name.trim_start_matches(".text.").to_string(),
                section: name.clone(),
                ind: ind_name,
            });
        };

        let section = object_file
            .section_by_name(name)
            .ok_or_else(|| Error::MissingIndirectionSection {
                lib: name.trim_start_matches(".text.").to_string(),
                section: name.clone(),
                ind: ind_name.clone(),
            })?;
        let (file_offset, file_size) = section.file_range().unwrap_or((0, 0));
        let content = section
            .data()
            .map_err(|source| Error::ObjectParse {
                path: path.to_path_buf(),
                source,
            })?
            .to_vec();

        let (patched, ind_state) = rewrite_section(&content, *range, ind_range.virtual_address, &all_sections)?;

        if patched.len() as u64 != file_size {
            warn!(
                "{name}: patched length {} differs from on-disk size {file_size}",
                patched.len()
            );
        }
        patches.push((file_offset, patched));

        let ind_section = object_file
            .section_by_name(&ind_name)
            .ok_or_else(|| Error::MissingIndirectionSection {
                lib: name.trim_start_matches(".text.").to_string(),
                section: name.clone(),
                ind: ind_name.clone(),
            })?;
        let (ind_offset, ind_file_size) = ind_section.file_range().unwrap_or((0, 0));
        if ind_state.len() as u64 > ind_file_size {
            warn!(
                "{ind_name}: emitted {} bytes exceeds reserved {ind_file_size}",
                ind_state.len()
            );
        }
        patches.push((ind_offset, ind_state.emitted_bytes.clone()));

        store.observe(name, ind_state.len() as u64);
    }

    for (offset, bytes) in patches {
        let start = offset as usize;
        file_bytes[start..start + bytes.len()].copy_from_slice(&bytes);
    }

    std::fs::write(path, file_bytes)?;
    Ok(())
}

/// Disassemble and rewrite one `.text.<lib>` section's content.
fn rewrite_section(
    content: &[u8],
    current_section: SectionRange,
    ind_start_va: u64,
    all_sections: &[(String, SectionRange)],
) -> Result<(Vec<u8>, IndirectionState)> {
    let mut decoder = Decoder::with_ip(64, content, current_section.virtual_address, DecoderOptions::NONE);
    let mut patched = Vec::with_capacity(content.len());
    let mut ind = IndirectionState::new(ind_start_va);
    let mut instr = Instruction::default();

    while decoder.can_decode() {
        decoder.decode_out(&mut instr);
        let ip = instr.ip();
        let len = instr.len();
        let start_offset = (ip - current_section.virtual_address) as usize;
        let orig_bytes = &content[start_offset..start_offset + len];

        let candidate = candidate_address(&instr);
        let redirect_target = candidate.filter(|&(addr, source)| {
            !(source == OperandSource::Immediate && !IMM32_LOAD_OPCODES.contains(&orig_bytes[0]))
                && !should_skip(addr, source == OperandSource::RipRelative)
                && requires_redirect(source, addr, &current_section, all_sections)
        });

        let Some((addr, source)) = redirect_target else {
            patched.extend_from_slice(orig_bytes);
            ind.consecutive_redirect_count = 0;
            continue;
        };

        if ind.consecutive_redirect_count > 0 {
            ind.retract_trailing_branch();
        }
        let entry_start = ind.current_address;

        if len == REL32_INSTRUCTION_LEN as usize {
            let opcode = orig_bytes[0];
            ind.append_branch(opcode, addr)?;
            ind.append_branch(OPCODE_JMP_REL32, ip + len as u64)?;
        } else if source == OperandSource::RipRelative {
            let mut encoder = Encoder::new(64);
            encoder
                .encode(&instr, entry_start)
                .map_err(|_| Error::DisplacementNotFound)?;
            let encoded = encoder.take_buffer();
            ind.append_raw(entry_start, &encoded);
            ind.append_branch(OPCODE_JMP_REL32, ip + len as u64)?;
        } else {
            ind.append_raw(entry_start, orig_bytes);
            ind.append_branch(OPCODE_JMP_REL32, ip + len as u64)?;
        }

        let disp = entry_start as i64 - (ip as i64 + REL32_INSTRUCTION_LEN as i64);
        let disp = i32::try_from(disp).map_err(|_| Error::DisplacementOverflow { value: disp })?;
        patched.push(OPCODE_JMP_REL32);
        patched.extend_from_slice(&disp.to_le_bytes());
        for _ in 0..(len - REL32_INSTRUCTION_LEN as usize) {
            patched.push(OPCODE_NOP);
        }

        ind.consecutive_redirect_count += 1;
    }

    Ok((patched, ind))
}

/// Pull a candidate absolute address out of an instruction's structured
/// operand model, along with which kind of operand it came from.
fn candidate_address(instr: &Instruction) -> Option<(u64, OperandSource)> {
    if instr.op_count() > 0
        && matches!(
            instr.op0_kind(),
            OpKind::NearBranch16 | OpKind::NearBranch32 | OpKind::NearBranch64
        )
    {
        return Some((instr.near_branch_target(), OperandSource::NearBranch));
    }

    if instr.is_ip_rel_memory_operand() {
        return Some((instr.ip_rel_memory_address(), OperandSource::RipRelative));
    }

    for i in 0..instr.op_count() {
        if is_immediate_kind(instr.op_kind(i)) {
            return Some((instr.immediate(i), OperandSource::Immediate));
        }
    }

    None
}

fn is_immediate_kind(kind: OpKind) -> bool {
    matches!(
        kind,
        OpKind::Immediate8
            | OpKind::Immediate16
            | OpKind::Immediate32
            | OpKind::Immediate64
            | OpKind::Immediate8to16
            | OpKind::Immediate8to32
            | OpKind::Immediate8to64
            | OpKind::Immediate32to64
    )
}

/// Whether `addr` should never be treated as a redirect candidate, regardless
/// of what it might otherwise reference.
fn should_skip(addr: u64, is_rip: bool) -> bool {
    let hex_len = format!("{addr:x}").len();
    (!is_rip && hex_len < 8) || addr == 0xffffff || hex_len > 8 || addr == 0xffffffff
}

/// `requires_redirect`: an absolute immediate always redirects; a near-branch
/// or RIP-relative target redirects only when it lands outside the current
/// section but inside some other section.
fn requires_redirect(
    source: OperandSource,
    addr: u64,
    current_section: &SectionRange,
    all_sections: &[(String, SectionRange)],
) -> bool {
    if source == OperandSource::Immediate {
        return true;
    }
    if current_section.contains(addr) {
        return false;
    }
    all_sections.iter().any(|(_, range)| range.contains(addr))
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_three_tracked_opcodes_redirect_their_immediate() {
        let current = SectionRange {
            virtual_address: 0x1000,
            size: 0x10,
        };
        // mov edx, 0x12345678
        let mov_edx = [0xBA, 0x78, 0x56, 0x34, 0x12];
        // mov eax, 0x12345678 (untracked opcode, same operand shape)
        let mov_eax = [0xB8, 0x78, 0x56, 0x34, 0x12];

        let (_, redirected) = rewrite_section(&mov_edx, current, 0x9000, &[]).unwrap();
        assert!(!redirected.is_empty());

        let (_, not_redirected) = rewrite_section(&mov_eax, current, 0x9000, &[]).unwrap();
        assert!(not_redirected.is_empty());
    }

    #[test]
    fn section_range_excludes_zero_address_sections() {
        let range = SectionRange {
            virtual_address: 0,
            size: 0x1000,
        };
        assert!(!range.contains(0x500));
    }

    #[test]
    fn section_range_is_half_open() {
        let range = SectionRange {
            virtual_address: 0x1000,
            size: 0x100,
        };
        assert!(range.contains(0x1000));
        assert!(range.contains(0x10ff));
        assert!(!range.contains(0x1100));
    }

    #[test]
    fn should_skip_rejects_the_ffffff_sentinel_and_overlong_literals() {
        assert!(should_skip(0xffffff, false));
        assert!(should_skip(0x1_0000_0000, false)); // 9 hex digits
        assert!(should_skip(0xffffffff, true));
        assert!(!should_skip(0x13010000, false)); // 8 hex digits, non-rip: meets the length floor
    }

    #[test]
    fn short_non_rip_literals_are_skipped() {
        assert!(should_skip(0x1000, false)); // 4 hex digits, non-rip
        assert!(!should_skip(0x1000, true)); // same value, but rip-relative is exempt
    }

    #[test]
    fn immediate_operands_always_require_redirect() {
        let current = SectionRange {
            virtual_address: 0x1000,
            size: 0x100,
        };
        assert!(requires_redirect(
            OperandSource::Immediate,
            0x1050,
            &current,
            &[]
        ));
    }

    #[test]
    fn near_branch_inside_current_section_does_not_redirect() {
        let current = SectionRange {
            virtual_address: 0x1000,
            size: 0x100,
        };
        assert!(!requires_redirect(
            OperandSource::NearBranch,
            0x1050,
            &current,
            &[]
        ));
    }

    #[test]
    fn near_branch_inside_another_section_redirects() {
        let current = SectionRange {
            virtual_address: 0x1000,
            size: 0x100,
        };
        let other = vec![(
            "libbar".to_string(),
            SectionRange {
                virtual_address: 0x2000,
                size: 0x100,
            },
        )];
        assert!(requires_redirect(
            OperandSource::NearBranch,
            0x2050,
            &current,
            &other
        ));
    }
}
