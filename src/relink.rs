//! Drives the external compiler driver to perform the final unikernel link.

use std::path::Path;
use std::process::Command;

use log::{error, info};

use crate::error::{Error, Result};
use crate::model::unikernel::PlatformTag;

/// Fixed linker-script fragment written to `libvfscore/libparam.lds` before
/// relink, when the filesystem core's parameter script is present.
pub const LDS_VFSCORE: &str = "SECTIONS\n{\n __start_vfs__param_arg = LOADADDR(\n vfs__param_arg);\n vfs__param_arg : {\n  KEEP (*(vfs__param_arg))\n }\n __stop_vfs__param_arg = LOADADDR(\n vfs__param_arg) +\n SIZEOF(\n vfs__param_arg);\n}\nINSERT AFTER .uk_thread_inittab;\n";

/// Fixed linker-script fragment written to `libuknetdev/libparam.lds` before
/// relink, when the network device's parameter script is present.
pub const LDS_NETDEV: &str = "SECTIONS\n{\n__start_netdev__param_arg = LOADADDR(\n netdev__param_arg);\n netdev__param_arg : {\n  KEEP (*(netdev__param_arg))\n }\n __stop_netdev__param_arg = LOADADDR(\n netdev__param_arg) +\n SIZEOF(\n netdev__param_arg);\n}INSERT AFTER .uk_thread_inittab;\n";

#[derive(Debug, Clone)]
/// One relink invocation's inputs
pub struct RelinkRequest<'a> {
    /// The unikernel being relinked, used for naming output and error messages
    pub unikernel_name: &'a str,
    /// Path to the unikernel's build directory
    pub build_dir: &'a Path,
    /// Path to the generated `-dT` linker script (`link64_out.lds` or `link64_out_aslr.lds`)
    pub generated_script: &'a Path,
    /// Which platform variant's linker directory to pull extra scripts from
    pub platform_tag: PlatformTag,
    /// Whether ASLR mode is active, which changes the output file suffix
    pub aslr_enabled: bool,
}

/// Invoke the compiler driver, writing any required parameter linker scripts
/// first. Returns the output file path on success.
pub fn relink(request: &RelinkRequest, compiler: &str) -> Result<std::path::PathBuf> {
    let aslr_suffix = if request.aslr_enabled { "_aslr" } else { "" };
    let output_name = format!(
        "unikernel_{}-x86_64_local_align{aslr_suffix}.dbg",
        request.platform_tag.short_name()
    );
    let output_path = request.build_dir.join(&output_name);

    let mut extra_scripts = Vec::new();

    let vfscore_param = request.build_dir.join("libvfscore").join("libparam.lds");
    if vfscore_param.exists() {
        std::fs::write(&vfscore_param, LDS_VFSCORE)?;
        extra_scripts.push(vfscore_param);
    }

    let netdev_param = request.build_dir.join("libuknetdev").join("libparam.lds");
    if netdev_param.exists() {
        std::fs::write(&netdev_param, LDS_NETDEV)?;
        extra_scripts.push(netdev_param);
    }

    let mut command = Command::new(compiler);
    command
        .arg("-nostdlib")
        .arg("-Wl,--omagic")
        .arg("-Wl,--build-id=none")
        .arg("-no-pie")
        .arg("-Wl,-m,elf_x86_64")
        .arg(format!("-Wl,-dT,{}", request.generated_script.display()));

    for script in &extra_scripts {
        command.arg(format!("-Wl,-T,{}", script.display()));
    }

    command.arg("-o").arg(&output_path);
    command.current_dir(request.build_dir);

    info!("relinking {} -> {}", request.unikernel_name, output_path.display());
    let status = command.status()?;

    if !status.success() {
        error!("relink of {} failed: {status}", request.unikernel_name);
        return Err(Error::RelinkFailed {
            unikernel: request.unikernel_name.to_string(),
            code: status.code(),
        });
    }

    Ok(output_path)
}
