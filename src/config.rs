//! CLI surface and the validated configuration derived from it.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::error::{Error, Result};

#[derive(Parser, Debug)]
#[command(
    name = "spacer",
    about = "Address-space layout planner and indirection-table rewriter for co-located unikernels"
)]
/// Top-level command line surface
pub struct Cli {
    /// Which subcommand was invoked
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
/// The two pipeline stages, run as separate invocations
pub enum Command {
    /// Plan address-space layout across a set of unikernels and relink them
    Align(AlignArgs),
    /// Run the indirection-table rewriter over an already-linked ELF
    Rewrite(RewriteArgs),
}

#[derive(Args, Debug, Clone)]
/// Arguments for the `align` subcommand
pub struct AlignArgs {
    /// Root of the unikraft workspace (contains `apps/<uk>/build/`)
    #[arg(long)]
    pub workspace: PathBuf,
    /// Initial location counter
    #[arg(long, default_value_t = 0x130000)]
    pub loc: u64,
    /// Page-align `.text` sections as they're emitted
    #[arg(long, default_value_t = true)]
    pub align: bool,
    /// Perform the relink after planning
    #[arg(long, default_value_t = true)]
    pub rel: bool,
    /// Emit verbose (debug-level) logging
    #[arg(long, default_value_t = false)]
    pub verbose: bool,
    /// Unikernel directory names under `apps/`, comma-separated
    #[arg(long, value_delimiter = ',')]
    pub uks: Vec<String>,
    /// Defer individual libraries to the custom-loader placement pass
    #[arg(long, default_value_t = true)]
    pub custom_loader: bool,
    /// Copy object files between build trees before probing
    #[arg(long, default_value_t = true)]
    pub copy_objs: bool,
    /// ASLR mode: 0 (spacer), 1 (page-aligned), 2 (page-aligned, shuffled)
    #[arg(long, default_value_t = 0)]
    pub aslr: i32,
}

#[derive(Args, Debug, Clone)]
/// Arguments for the `rewrite` subcommand
pub struct RewriteArgs {
    /// Path to the linked ELF to rewrite in place
    #[arg(long)]
    pub file: PathBuf,
    /// Path to the indirection size store JSON file
    #[arg(long)]
    pub store: PathBuf,
    /// Emit verbose (debug-level) logging
    #[arg(long, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Clone)]
/// Validated planner configuration: the fatal-on-bad-input checks from
/// [`AlignArgs`] have already been applied.
pub struct PlannerConfig {
    /// Root of the unikraft workspace
    pub workspace: PathBuf,
    /// Initial location counter
    pub loc_counter: u64,
    /// Whether `.text` sections round up to a page boundary as they're emitted
    pub align_text: bool,
    /// Whether to perform the relink after planning
    pub relink: bool,
    /// Unikernel directory names under `apps/`
    pub unikernel_names: Vec<String>,
    /// Whether individual libraries are deferred to the custom-loader placement pass
    pub use_custom_loader: bool,
    /// Whether to copy object files between build trees before probing
    pub copy_objs: bool,
    /// ASLR mode: 0 (spacer), 1 (page-aligned), 2 (page-aligned, shuffled)
    pub aslr_mode: u8,
}

impl PlannerConfig {
    /// Validate `args`, rejecting fewer than two unikernels or an
    /// out-of-range ASLR mode.
    pub fn from_args(args: &AlignArgs) -> Result<Self> {
        if args.uks.len() < 2 {
            return Err(Error::TooFewUnikernels { found: args.uks.len() });
        }
        if !(0..=2).contains(&args.aslr) {
            return Err(Error::InvalidAslrMode { value: args.aslr });
        }
        if !args.workspace.is_dir() {
            return Err(Error::MissingWorkspace(args.workspace.clone()));
        }

        Ok(Self {
            workspace: args.workspace.clone(),
            loc_counter: args.loc,
            align_text: args.align,
            relink: args.rel,
            unikernel_names: args.uks.clone(),
            use_custom_loader: args.custom_loader,
            copy_objs: args.copy_objs,
            aslr_mode: args.aslr as u8,
        })
    }
}
