//! Opaque ELF section probing via the `object` crate.
//!
//! The planner never parses ELF bytes itself; it asks `object` for section
//! geometry and treats the result as ground truth.

use std::path::Path;

use log::warn;
use object::{Object, ObjectSection};

use crate::constants::TRACKED_SECTIONS;
use crate::error::Error;
use crate::error::Result;
use crate::model::library::{ElfKind, LibraryRecord};
use crate::model::section::SectionDescriptor;

/// Probe one object file, returning its tracked section geometry.
///
/// Any of the four tracked sections absent from the file is recorded as
/// [`SectionDescriptor::placeholder`] rather than treated as an error, since
/// e.g. a `.bss`-free object is entirely ordinary.
pub fn probe_object(path: &Path, libname: &str) -> Result<LibraryRecord> {
    let bytes = std::fs::read(path)?;
    let file = object::File::parse(&*bytes).map_err(|source| Error::ObjectParse {
        path: path.to_path_buf(),
        source,
    })?;

    let mut record = LibraryRecord::new(libname, ElfKind::from(file.kind()));

    for section_name in TRACKED_SECTIONS {
        let descriptor = match file.section_by_name(section_name) {
            Some(section) => SectionDescriptor::builder()
                .name(section_name.to_string())
                .virtual_address(section.address())
                .file_offset(section.file_range().map(|(off, _)| off).unwrap_or(0))
                .size(section.size())
                .alignment(section.align().max(1))
                .build(),
            None => {
                warn!("{libname}: section {section_name} absent, using zero placeholder");
                SectionDescriptor::placeholder(section_name)
            }
        };
        record.sections.insert(section_name.to_string(), descriptor);
    }

    Ok(record)
}
