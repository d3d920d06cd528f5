//! Per-unikernel aggregation of probed library objects.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::constants::{OBJ_EXT, TRACKED_SECTIONS};
use crate::error::Result;
use crate::ordered_map::OrderedMap;
use crate::probe;

use super::library::LibraryRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Which platform linker subdirectory a unikernel was built against
pub enum PlatformTag {
    /// `libkvmqplat`, the default KVM platform
    Kvmq,
    /// `libkvmfcplat`, the firecracker-flavored KVM platform
    Kvmfc,
}

impl PlatformTag {
    /// The `lib<tag>plat` directory name this tag selects
    pub fn dir_name(self) -> &'static str {
        match self {
            PlatformTag::Kvmq => "libkvmqplat",
            PlatformTag::Kvmfc => "libkvmfcplat",
        }
    }

    /// The short tag used in relinked output file names (`kvmq` / `kvmfc`)
    pub fn short_name(self) -> &'static str {
        match self {
            PlatformTag::Kvmq => "kvmq",
            PlatformTag::Kvmfc => "kvmfc",
        }
    }
}

#[derive(Debug, Clone)]
/// One unikernel's build directory, fully probed
pub struct UnikernelModel {
    /// The unikernel's directory name under `apps/`
    pub name: String,
    /// Absolute path to the unikernel's app directory
    pub workspace_path: PathBuf,
    /// Library objects, in the order they were read from the build directory
    pub objects: OrderedMap<LibraryRecord>,
    /// Summed size of each tracked section across every object in this unikernel
    pub per_section_total_size: HashMap<String, u64>,
    /// Whether this unikernel links the filesystem core (`vfscore`)
    pub uses_filesystem_core: bool,
    /// Whether this unikernel links the parameterization core (`libuklibparam`)
    pub uses_param_core: bool,
    /// Which platform variant this unikernel was built for
    pub platform_tag: PlatformTag,
}

impl UnikernelModel {
    /// Probe every candidate object file under `build_dir`, updating `global_objs`
    /// (the largest-by-file-size copy of each library seen so far, across all
    /// unikernels) as a side effect.
    pub fn from_build_dir(
        name: impl Into<String>,
        workspace_path: impl Into<PathBuf>,
        build_dir: &Path,
        global_objs: &mut HashMap<String, (PathBuf, u64)>,
    ) -> Result<Self> {
        let mut model = UnikernelModel {
            name: name.into(),
            workspace_path: workspace_path.into(),
            objects: OrderedMap::new(),
            per_section_total_size: HashMap::new(),
            uses_filesystem_core: false,
            uses_param_core: false,
            platform_tag: PlatformTag::Kvmq,
        };

        let mut entries: Vec<_> = std::fs::read_dir(build_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        entries.sort();

        for file_name in entries {
            if !is_candidate_object(&file_name) {
                continue;
            }

            let path = build_dir.join(&file_name);
            let libname = file_name.trim_end_matches(OBJ_EXT).to_string();

            let file_size = std::fs::metadata(&path)?.len();
            global_objs
                .entry(libname.clone())
                .and_modify(|(existing_path, existing_size)| {
                    if *existing_size < file_size {
                        *existing_path = path.clone();
                        *existing_size = file_size;
                    }
                })
                .or_insert((path.clone(), file_size));

            let record = probe::probe_object(&path, &libname)?;

            if file_name.contains("vfscore") {
                model.uses_filesystem_core = true;
            }
            if file_name.contains("libuklibparam") {
                model.uses_param_core = true;
            }
            if file_name.contains("libkvmfcplat") {
                model.platform_tag = PlatformTag::Kvmfc;
            }

            for section in TRACKED_SECTIONS {
                let size = record.section_size(section);
                *model
                    .per_section_total_size
                    .entry(section.to_string())
                    .or_insert(0) += size;
            }

            model.objects.insert(libname, record);
        }

        Ok(model)
    }

    /// The total size of `section` summed across this unikernel's objects
    pub fn total_size(&self, section: &str) -> u64 {
        self.per_section_total_size
            .get(section)
            .copied()
            .unwrap_or(0)
    }
}

/// An object file is a probing candidate when it has the `.o` extension, its
/// name doesn't carry the architecture tag `x86_64`, and it isn't a linker
/// droppings file (`*.ld.o`).
fn is_candidate_object(file_name: &str) -> bool {
    file_name.ends_with(OBJ_EXT) && !file_name.contains("x86_64") && !file_name.ends_with(".ld.o")
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_architecture_tagged_and_linker_droppings() {
        assert!(is_candidate_object("libhello.o"));
        assert!(!is_candidate_object("unikernel_kvmq-x86_64_local.o"));
        assert!(!is_candidate_object("extra64.ld.o"));
        assert!(!is_candidate_object("libhello.c"));
    }
}
