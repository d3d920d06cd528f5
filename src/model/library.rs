//! Library records: one library's section sizes, either as probed from a
//! single object file or merged across every unikernel that contains it.

use std::collections::BTreeMap;

use super::section::SectionDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, num_derive::FromPrimitive)]
/// The ELF type of an object file relevant to planning
pub enum ElfKind {
    /// A relocatable object (`ET_REL`), the normal case for a build-tree `.o`
    Relocatable = 1,
    /// An already-linked executable (`ET_EXEC`)
    Executable = 2,
}

impl From<object::ObjectKind> for ElfKind {
    fn from(kind: object::ObjectKind) -> Self {
        match kind {
            object::ObjectKind::Executable | object::ObjectKind::Dynamic => ElfKind::Executable,
            _ => ElfKind::Relocatable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A library's section sizes, either a single object's own sizes (occurrence
/// count 1, fresh from [`crate::probe`]) or the running worst-case across
/// every unikernel that contains this library (after
/// [`crate::index::GlobalLibraryIndex::observe`] merges have been applied).
pub struct LibraryRecord {
    /// The base object name, e.g. `libhello` for `libhello.o`
    pub name: String,
    /// Relocatable or already-linked
    pub kind: ElfKind,
    /// Section descriptors keyed by section name
    pub sections: BTreeMap<String, SectionDescriptor>,
    /// How many unikernels (so far) have been observed to contain this library
    pub occurrence_count: usize,
}

impl LibraryRecord {
    /// Build a fresh record for one just-probed object file
    pub fn new(name: impl Into<String>, kind: ElfKind) -> Self {
        Self {
            name: name.into(),
            kind,
            sections: BTreeMap::new(),
            occurrence_count: 1,
        }
    }

    /// The size of `section`, or `0` if the section was never recorded
    pub fn section_size(&self, section: &str) -> u64 {
        self.sections.get(section).map(|s| s.size).unwrap_or(0)
    }

    /// The alignment of `section`, or `1` if the section was never recorded
    pub fn section_alignment(&self, section: &str) -> u64 {
        self.sections.get(section).map(|s| s.alignment).unwrap_or(1)
    }

    /// Apply the global index's merge rule: bump the occurrence count, and for
    /// each section in `other`, adopt its size and alignment when its size is
    /// strictly larger than what's currently on record.
    pub fn merge(&mut self, other: &LibraryRecord) {
        self.occurrence_count += 1;
        for (name, incoming) in &other.sections {
            match self.sections.get_mut(name) {
                Some(existing) if incoming.size > existing.size => {
                    existing.size = incoming.size;
                    existing.alignment = incoming.alignment;
                }
                Some(_) => {}
                None => {
                    self.sections.insert(name.clone(), incoming.clone());
                }
            }
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn section(size: u64, alignment: u64) -> SectionDescriptor {
        SectionDescriptor::builder()
            .name(".text".to_string())
            .size(size)
            .alignment(alignment)
            .build()
    }

    #[test]
    fn merge_adopts_strictly_larger_sizes_only() {
        let mut a = LibraryRecord::new("libhello", ElfKind::Relocatable);
        a.sections.insert(".text".into(), section(0x100, 0x10));
        let mut b = LibraryRecord::new("libhello", ElfKind::Relocatable);
        b.sections.insert(".text".into(), section(0x80, 0x20));

        a.merge(&b);
        assert_eq!(a.occurrence_count, 2);
        assert_eq!(a.section_size(".text"), 0x100);

        let mut c = LibraryRecord::new("libhello", ElfKind::Relocatable);
        c.sections.insert(".text".into(), section(0x200, 0x4));
        a.merge(&c);
        assert_eq!(a.section_size(".text"), 0x200);
        assert_eq!(a.section_alignment(".text"), 0x4);
        assert_eq!(a.occurrence_count, 3);
    }
}
