//! ASLR-mode layout: per-library, page-aligned blocks suitable for
//! independent load-time randomization, emitted one unikernel at a time.

use rand::Rng;

use crate::classify::Classification;
use crate::model::unikernel::UnikernelModel;
use crate::store::IndirectionSizeStore;

/// Render one unikernel's ASLR-mode linker-script fragment.
///
/// `aslr_mode` is `1` (page-aligned, insertion order) or `2` (page-aligned,
/// shuffled, with the application's own library pinned last).
pub fn plan_unikernel(
    model: &UnikernelModel,
    classification: &Classification,
    store: &IndirectionSizeStore,
    aslr_mode: u8,
    rng: &mut impl Rng,
) -> Vec<String> {
    let mut lines = Vec::new();

    if !classification.common_to_all.is_empty() {
        let members: Vec<String> = classification
            .common_to_all
            .iter()
            .map(|lib| format!("{lib}.o(.rodata);"))
            .collect();
        lines.push(format!(
            "  .rodata.common : ALIGN(0x1000) {{ {} }}",
            members.join(" ")
        ));
    }

    let mut libs: Vec<String> = model.objects.keys().map(|s| s.to_string()).collect();

    if aslr_mode == 2 {
        let app_index = libs.iter().position(|lib| lib.starts_with("app"));
        let app_lib = app_index.map(|i| libs.remove(i));
        shuffle(&mut libs, rng);
        if let Some(app_lib) = app_lib {
            libs.push(app_lib);
        }
    }

    for lib in &libs {
        let reserved = store.reserved(&format!(".text.{lib}"));
        lines.push(format!(
            "  .text.{lib} : ALIGN(0x1000) {{ {lib}.o(.text); }}"
        ));
        lines.push(format!(
            "  .ind.{lib} : ALIGN(0x1000) {{ BYTE(1); . += 0x{reserved:x}-1; }}"
        ));

        if classification.is_subset_or_individual(lib) {
            lines.push(format!(
                "  .rodata.{lib} : ALIGN(0x1000) {{ {lib}.o(.rodata); }}"
            ));
        }
    }

    lines
}

/// Fisher-Yates, driven by a caller-supplied source so shuffling is testable
fn shuffle<T>(items: &mut [T], rng: &mut impl Rng) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}
