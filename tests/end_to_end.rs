//! End-to-end coverage across probing, indexing, classification, and
//! spacer-mode layout, against real (if minimal) ELF relocatable objects
//! built with `object::write` rather than pre-baked fixture binaries.

use std::collections::HashMap;
use std::path::Path;

use object::write::{Object, StandardSegment};
use object::{Architecture, BinaryFormat, Endianness, SectionKind};

use spacer::classify::classify;
use spacer::constants::PAGE_SIZE;
use spacer::index::GlobalLibraryIndex;
use spacer::layout::spacer::{plan, SpacerConfig};
use spacer::model::unikernel::UnikernelModel;

/// Write a minimal ELF64 relocatable object with one `.text` section of
/// `text_size` zeroed bytes (and an empty `.rodata`) to `path`.
fn write_object(path: &Path, text_size: usize) {
    let mut obj = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);

    let text = obj.add_section(
        obj.segment_name(StandardSegment::Text).to_vec(),
        b".text".to_vec(),
        SectionKind::Text,
    );
    obj.append_section_data(text, &vec![0x90u8; text_size], 16);

    let rodata = obj.add_section(
        obj.segment_name(StandardSegment::Data).to_vec(),
        b".rodata".to_vec(),
        SectionKind::ReadOnlyData,
    );
    obj.append_section_data(rodata, &[], 8);

    let bytes = obj.write().expect("object::write can always serialize a minimal object");
    std::fs::write(path, bytes).expect("writing the fixture object to a freshly created tempdir");
}

#[test]
fn shared_and_individual_libraries_classify_and_place_correctly() {
    let workspace = tempfile::tempdir().expect("tempdir creation never fails under normal test conditions");

    let hello_build = workspace.path().join("apps/helloworld/build");
    let hanoi_build = workspace.path().join("apps/hanoi/build");
    std::fs::create_dir_all(&hello_build).expect("creating a fresh subdirectory under a tempdir");
    std::fs::create_dir_all(&hanoi_build).expect("creating a fresh subdirectory under a tempdir");

    // libuksched is shared by both unikernels; libhello/libhanoi are individual.
    write_object(&hello_build.join("libuksched.o"), 0x800);
    write_object(&hello_build.join("libhello.o"), 0x200);
    write_object(&hanoi_build.join("libuksched.o"), 0x800);
    write_object(&hanoi_build.join("libhanoi.o"), 0x300);
    // An architecture-tagged linker dropping that must never be probed.
    write_object(&hello_build.join("unikernel_kvmq-x86_64_local.o"), 0x40);

    let mut global_objs = HashMap::new();
    let helloworld = UnikernelModel::from_build_dir(
        "helloworld",
        workspace.path().join("apps/helloworld"),
        &hello_build,
        &mut global_objs,
    )
    .expect("probing a freshly written, well-formed relocatable object");
    let hanoi = UnikernelModel::from_build_dir(
        "hanoi",
        workspace.path().join("apps/hanoi"),
        &hanoi_build,
        &mut global_objs,
    )
    .expect("probing a freshly written, well-formed relocatable object");

    assert_eq!(helloworld.objects.len(), 2, "the architecture-tagged dropping must be filtered out");

    let mut index = GlobalLibraryIndex::new();
    for (_, record) in helloworld.objects.iter() {
        index.observe(record);
    }
    for (_, record) in hanoi.objects.iter() {
        index.observe(record);
    }

    let classification = classify(&index, 2);
    assert_eq!(classification.common_to_all, vec!["libuksched"]);
    assert!(classification.individual.contains(&"libhello".to_string()));
    assert!(classification.individual.contains(&"libhanoi".to_string()));

    let models = vec![helloworld, hanoi];
    let result = plan(
        &models,
        &index,
        &classification,
        SpacerConfig {
            loc_counter: 0x130000,
            align_text: true,
            use_custom_loader: true,
        },
    );

    let hw_lines = &result.unikernel_fragments["helloworld"];
    let hn_lines = &result.unikernel_fragments["hanoi"];
    assert_eq!(
        hw_lines[0], hn_lines[0],
        "the common-to-all library must land at the same address in every unikernel"
    );
    assert!(hw_lines[0].contains("0x130000"));

    // libuksched (0x800) pushes the shared location counter to the next page
    // before either unikernel's individual library is placed.
    assert!(result.loc_counter > 0x130000 + PAGE_SIZE);
    assert_eq!(result.loc_counter % PAGE_SIZE, 0);
}
