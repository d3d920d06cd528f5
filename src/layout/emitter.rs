//! The template line processor: takes a base linker script and splices in a
//! planned unikernel's generated fragments and marker overrides.

use crate::ordered_map::OrderedMap;

/// Render `template` with `fragment_lines` spliced into the canonical
/// wildcard blocks and `markers` inserted after marker-bearing lines.
///
/// Used for spacer mode as-is; ASLR-mode fragments (already fully formed
/// `ALIGN(0x1000)` blocks) go through the same substitution but markers are
/// typically empty since ASLR mode records none.
pub fn render(template: &str, fragment_lines: &[String], markers: &OrderedMap<u64>) -> String {
    let mut output = String::new();
    let mut lines = template.lines().peekable();

    while let Some(line) = lines.next() {
        let trimmed = line.trim();

        if let Some(section) = wildcard_section(trimmed) {
            output.push_str(&render_section_fragment(fragment_lines, section));
            output.push('\n');
            for rest in lines.by_ref() {
                if rest.trim() == "}" {
                    output.push_str(rest);
                    output.push('\n');
                    break;
                }
            }
            continue;
        }

        output.push_str(line);
        output.push('\n');

        if let Some(marker_name) = marker_name(trimmed) {
            if let Some(addr) = markers.get(marker_name) {
                output.push_str(&format!("  . = 0x{addr:x};\n"));
            }
        }
    }

    output
}

/// Which section a canonical wildcard line draws its fragment from
fn wildcard_section(line: &str) -> Option<&'static str> {
    match line {
        "*(.text)" | "*(.text.*)" => Some(".text"),
        "*(.rodata)" | "*(.rodata.*)" => Some(".rodata"),
        _ => None,
    }
}

/// A marker-bearing line is usually the `<name> = .;` shape (`_etext`,
/// `_ctors`, `_ectors`, ...), keyed by that same name. Four template lines
/// are exceptions: `_data`/`__bss_start` are symbol lines whose template name
/// doesn't match the dotted key the planner records them under
/// (`.data`/`.bss`), and `.init_array : {`/`.intrstack :` are section-opening
/// lines that carry no `= .;` suffix at all.
fn marker_name(line: &str) -> Option<&str> {
    match line {
        "_data = .;" => return Some(".data"),
        "__bss_start = .;" => return Some(".bss"),
        ".init_array : {" => return Some(".init_array"),
        ".intrstack :" => return Some(".intrstack"),
        _ => {}
    }
    line.strip_suffix(" = .;").map(str::trim)
}

fn render_section_fragment(fragment_lines: &[String], section: &str) -> String {
    let prefix = format!("{section}.");
    // ASLR-mode `.ind.<lib>` reservation blocks are emitted immediately after
    // their paired `.text.<lib>` block, so they ride along under `.text`'s
    // wildcard rather than needing a wildcard of their own.
    let ind_prefix = (section == ".text").then(|| ".ind.".to_string());

    fragment_lines
        .iter()
        .filter(|line| {
            let trimmed = line.trim_start();
            trimmed.starts_with(&prefix)
                || ind_prefix.as_ref().is_some_and(|p| trimmed.starts_with(p))
        })
        .cloned()
        .collect::<Vec<_>>()
        .join("\n")
}
