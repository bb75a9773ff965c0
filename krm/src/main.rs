//! Inspect how a package's resources would change when a KRM function regenerates them.
#![deny(missing_docs)]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use nephio_krm::{
    diff::diff,
    inventory::Inventory,
    kptfile::{object_ref_from_condition_type, Kptfile},
    ResourceList,
};
use tracing::{debug, info};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Available Subcommands
#[derive(Subcommand, Debug)]
enum Command {
    /// Diff the objects tracked by Kptfile conditions against a desired set
    Inventory(InventoryOpts),
    /// Diff two resource lists of the same kind by name
    Diff(DiffOpts),
}

#[derive(Args, Debug)]
struct InventoryOpts {
    /// Kptfile whose conditions track the current objects, defaults to the one in the current list.
    #[arg(long)]
    kptfile: Option<PathBuf>,

    /// ResourceList holding the current objects.
    #[arg(long)]
    current: PathBuf,

    /// ResourceList holding the desired objects.
    #[arg(long)]
    new: PathBuf,

    /// Only consider Kptfile conditions with this prefix.
    #[arg(long, default_value = "")]
    prefix: String,
}

#[derive(Args, Debug)]
struct DiffOpts {
    /// Current ResourceList.
    #[arg(long)]
    current: PathBuf,

    /// New ResourceList.
    #[arg(long)]
    new: PathBuf,

    /// Print the current list with its Kptfile conditions updated instead of the diff.
    #[arg(long)]
    update_kptfile: bool,
}

fn read_list(path: &Path) -> Result<ResourceList> {
    let yaml = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    ResourceList::from_yaml(&yaml).with_context(|| format!("parsing {}", path.display()))
}

fn build_inventory(
    kptfile: Option<&Kptfile>,
    prefix: &str,
    current: &ResourceList,
    new: &ResourceList,
) -> Result<Inventory> {
    let mut inventory = Inventory::new();
    if let Some(kptfile) = kptfile {
        for condition in kptfile.conditions()? {
            if !condition.type_.starts_with(prefix) {
                continue;
            }
            match object_ref_from_condition_type(&condition.type_) {
                Some(reference) => inventory.add_existing_condition(reference, condition),
                None => debug!(%condition.type_, "condition does not track an object"),
            }
        }
    }
    for object in current.resources() {
        inventory.add_existing_resource(object.object_ref(), object.clone());
    }
    for object in new.resources() {
        inventory.add_new_resource(object.object_ref(), object.clone());
    }
    Ok(inventory)
}

fn inventory(opts: InventoryOpts) -> Result<()> {
    let current = read_list(&opts.current)?;
    let new = read_list(&opts.new)?;
    let kptfile = match &opts.kptfile {
        Some(path) => {
            let yaml = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Some(Kptfile::from_yaml(&yaml).with_context(|| format!("parsing {}", path.display()))?)
        }
        None => current.kptfile(),
    };

    let diff = build_inventory(kptfile.as_ref(), &opts.prefix, &current, &new)?.diff()?;
    info!(
        create = diff.create_objs.len(),
        update = diff.update_objs.len(),
        delete = diff.delete_objs.len(),
        "inventory diff"
    );
    println!("{}", serde_json::to_string_pretty(&diff)?);
    Ok(())
}

fn diff_lists(opts: DiffOpts) -> Result<()> {
    let mut current = read_list(&opts.current)?;
    let new = read_list(&opts.new)?;

    let current_objects: Vec<_> = current.resources().cloned().collect();
    let new_objects: Vec<_> = new.resources().cloned().collect();
    let diff = diff(&current_objects, &new_objects)?;
    info!(changed = diff.has_changes(), "resource list diff");

    if opts.update_kptfile {
        let mut kptfile: Kptfile = current
            .kptfile()
            .context("current resource list has no Kptfile")?;
        diff.apply_to_kptfile(&mut kptfile)?;
        current.set_kptfile(kptfile);
        print!("{}", current.to_yaml()?);
    } else {
        println!("{}", serde_json::to_string_pretty(&diff)?);
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();

    // Logs go to stderr, stdout carries the result.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env()?,
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();

    debug!(?args.command, "starting");
    match args.command {
        Command::Inventory(opts) => inventory(opts),
        Command::Diff(opts) => diff_lists(opts),
    }
}
