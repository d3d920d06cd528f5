//! `spacer`: address-space layout planner and indirection-table rewriter for
//! co-located unikernels.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::Parser;
use log::{error, info, warn};

use spacer::classify::classify;
use spacer::config::{AlignArgs, Cli, Command, PlannerConfig, RewriteArgs};
use spacer::error::Result;
use spacer::index::GlobalLibraryIndex;
use spacer::layout::{aslr, emitter, spacer as spacer_layout};
use spacer::model::unikernel::UnikernelModel;
use spacer::ordered_map::OrderedMap;
use spacer::relink::{self, RelinkRequest};
use spacer::rewrite;
use spacer::store::IndirectionSizeStore;

fn main() {
    let cli = Cli::parse();

    let verbose = match &cli.command {
        Command::Align(args) => args.verbose,
        Command::Rewrite(args) => args.verbose,
    };
    env_logger::Builder::new()
        .filter_level(if verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    let result = match &cli.command {
        Command::Align(args) => run_align(args),
        Command::Rewrite(args) => run_rewrite(args),
    };

    if let Err(err) = result {
        error!("{err}");
        std::process::exit(1);
    }
}

fn run_align(args: &AlignArgs) -> Result<()> {
    let config = PlannerConfig::from_args(args)?;

    let mut models = Vec::new();
    let mut global_objs: HashMap<String, (PathBuf, u64)> = HashMap::new();

    for name in &config.unikernel_names {
        let uk_path = config.workspace.join("apps").join(name);
        let build_dir = uk_path.join("build");
        let model = UnikernelModel::from_build_dir(name.clone(), uk_path, &build_dir, &mut global_objs)?;
        models.push(model);
    }

    let mut index = GlobalLibraryIndex::new();
    for model in &models {
        for (_, record) in model.objects.iter() {
            index.observe(record);
        }
    }

    let classification = classify(&index, models.len());
    info!(
        "classified {} common-to-all, {} common-subset, {} individual libraries",
        classification.common_to_all.len(),
        classification.common_subset.len(),
        classification.individual.len()
    );

    let store_path = config.workspace.join("ind_map.json");
    let store = IndirectionSizeStore::load(&store_path)?;

    let unikernel_fragments: HashMap<String, Vec<String>> = if config.aslr_mode == 0 {
        let plan = spacer_layout::plan(
            &models,
            &index,
            &classification,
            spacer_layout::SpacerConfig {
                loc_counter: config.loc_counter,
                align_text: config.align_text,
                use_custom_loader: config.use_custom_loader,
            },
        );
        render_and_relink(&config, &models, &plan.unikernel_fragments, &plan.section_markers, false)?;
        plan.unikernel_fragments
    } else {
        let mut fragments = HashMap::new();
        let mut rng = rand::thread_rng();
        for model in &models {
            let lines = aslr::plan_unikernel(model, &classification, &store, config.aslr_mode, &mut rng);
            fragments.insert(model.name.clone(), lines);
        }
        render_and_relink(&config, &models, &fragments, &OrderedMap::new(), true)?;
        fragments
    };

    info!("planned {} unikernel fragments", unikernel_fragments.len());
    Ok(())
}

fn render_and_relink(
    config: &PlannerConfig,
    models: &[UnikernelModel],
    fragments: &HashMap<String, Vec<String>>,
    markers: &OrderedMap<u64>,
    aslr_enabled: bool,
) -> Result<()> {
    for model in models {
        let template_path = config
            .workspace
            .join(model.platform_tag.dir_name())
            .join("link64.lds");
        let template = match std::fs::read_to_string(&template_path) {
            Ok(contents) => contents,
            Err(err) => {
                warn!("{}: could not read template ({err}), skipping render", template_path.display());
                continue;
            }
        };

        let empty = Vec::new();
        let lines = fragments.get(&model.name).unwrap_or(&empty);
        let rendered = emitter::render(&template, lines, markers);

        let out_name = if aslr_enabled { "link64_out_aslr.lds" } else { "link64_out.lds" };
        let out_path = config.workspace.join(model.platform_tag.dir_name()).join(out_name);
        std::fs::write(&out_path, rendered)?;

        if config.relink {
            let build_dir = model.workspace_path.join("build");
            let request = RelinkRequest {
                unikernel_name: &model.name,
                build_dir: &build_dir,
                generated_script: &out_path,
                platform_tag: model.platform_tag,
                aslr_enabled,
            };
            match relink::relink(&request, "gcc") {
                Ok(output) => info!("relinked {} -> {}", model.name, output.display()),
                Err(err) => error!("relink of {} failed: {err}", model.name),
            }
        }
    }
    Ok(())
}

fn run_rewrite(args: &RewriteArgs) -> Result<()> {
    let mut store = IndirectionSizeStore::load(&args.store)?;
    rewrite_one(&args.file, &mut store)?;
    store.save(&args.store)?;
    Ok(())
}

fn rewrite_one(file: &Path, store: &mut IndirectionSizeStore) -> Result<()> {
    match rewrite::rewrite_elf(file, store) {
        Ok(()) => {
            info!("rewrote {}", file.display());
            Ok(())
        }
        Err(err) => {
            error!("rewrite of {} failed: {err}", file.display());
            Err(err)
        }
    }
}
