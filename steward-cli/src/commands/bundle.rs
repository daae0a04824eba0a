//! `steward bundle`: license manifest and bundling policy.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use steward_core::{probe::is_target_instance, StewardConfig};
use steward_image::{BundlePlan, ImageManifest};
use steward_platform::{ExcludeSpec, PlatformRegistry, SpecialFile, SpecialFileKind};

use super::metadata_source;
use super::platform::print_excludes;

#[derive(Subcommand, Debug)]
pub enum BundleCommand {
    /// Write the license manifest when the instance carries licenses.
    Manifest(ManifestArgs),

    /// Show what a bundle of a root filesystem would leave out and add.
    Plan(PlanArgs),
}

/// Where licenses come from and whether to look for them at all.
#[derive(Args, Debug)]
pub struct LicenseArgs {
    /// Treat this host as a non-cloud machine; no manifest is written.
    #[arg(long)]
    pub not_gce: bool,

    /// Read licenses from a recursive metadata JSON snapshot.
    #[arg(long, value_name = "PATH")]
    pub metadata_file: Option<PathBuf>,
}

impl LicenseArgs {
    /// A snapshot stands in for the metadata server, so it implies a cloud
    /// instance unless `--not-gce` says otherwise.
    fn is_target(&self) -> bool {
        !self.not_gce && (self.metadata_file.is_some() || is_target_instance(Path::new("/")))
    }
}

/// Arguments for `steward bundle manifest`.
#[derive(Args, Debug)]
pub struct ManifestArgs {
    /// Manifest file to write.
    #[arg(long, value_name = "PATH")]
    pub output: PathBuf,

    #[command(flatten)]
    pub licenses: LicenseArgs,
}

/// Arguments for `steward bundle plan`.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Root filesystem to bundle.
    #[arg(long, default_value = "/")]
    pub root: PathBuf,

    /// Extra path to leave out of the bundle; may be repeated.
    #[arg(long = "exclude", value_name = "PATH")]
    pub excludes: Vec<PathBuf>,

    /// Also write the license manifest to this path.
    #[arg(long, value_name = "PATH")]
    pub manifest: Option<PathBuf>,

    #[command(flatten)]
    pub licenses: LicenseArgs,

    /// Print rsync filter rules instead of tables.
    #[arg(long, conflicts_with = "json")]
    pub rsync_filter: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run(command: BundleCommand, config: &StewardConfig) -> Result<()> {
    match command {
        BundleCommand::Manifest(args) => write_manifest(args, config),
        BundleCommand::Plan(args) => plan(args, config),
    }
}

fn write_manifest(args: ManifestArgs, config: &StewardConfig) -> Result<()> {
    let source = metadata_source(config, args.licenses.metadata_file.as_deref());
    let manifest = ImageManifest::new(source, args.licenses.is_target());
    let written = manifest
        .create_if_needed(&args.output)
        .with_context(|| format!("failed to create manifest {}", args.output.display()))?;

    if written {
        println!("{} wrote {}", "✓".green(), args.output.display());
    } else {
        println!("{}", "No licenses; manifest not written.".dimmed());
    }
    Ok(())
}

fn plan(args: PlanArgs, config: &StewardConfig) -> Result<()> {
    let extra = args.excludes.iter().map(ExcludeSpec::new);
    let mut plan = BundlePlan::build(&args.root, &PlatformRegistry::default(), extra)
        .with_context(|| format!("failed to plan bundle of {}", args.root.display()))?;

    if let Some(path) = args.manifest.as_deref() {
        let source = metadata_source(config, args.licenses.metadata_file.as_deref());
        let manifest = ImageManifest::new(source, args.licenses.is_target());
        plan = plan
            .with_manifest(&manifest, path)
            .with_context(|| format!("failed to create manifest {}", path.display()))?;
    }

    if args.json {
        let json = serde_json::to_string_pretty(&plan).context("failed to serialize bundle plan")?;
        println!("{json}");
        return Ok(());
    }
    if args.rsync_filter {
        print!("{}", plan.rsync_filter());
        return Ok(());
    }

    print_plan(&plan);
    Ok(())
}

#[derive(Tabled)]
struct SpecialFileRow {
    #[tabled(rename = "path")]
    path: String,
    #[tabled(rename = "kind")]
    kind: String,
    #[tabled(rename = "mode")]
    mode: String,
}

impl From<&SpecialFile> for SpecialFileRow {
    fn from(file: &SpecialFile) -> Self {
        let kind = match file.kind {
            SpecialFileKind::CharDevice { major, minor } => format!("char {major}:{minor}"),
            SpecialFileKind::Directory => "dir".to_string(),
        };
        Self {
            path: file.archive_path.clone(),
            kind,
            mode: format!("{:o}", file.mode),
        }
    }
}

fn print_plan(plan: &BundlePlan) {
    println!(
        "{} {} on {}",
        plan.platform.bold(),
        format!("({})", plan.family).dimmed(),
        plan.filesystem_type.cyan()
    );

    if plan.excludes.is_empty() {
        println!("{}", "No excludes.".dimmed());
    } else {
        print_excludes(&plan.excludes);
    }

    if !plan.special_files.is_empty() {
        let mut table = Table::new(plan.special_files.iter().map(SpecialFileRow::from));
        table.with(Style::rounded());
        println!("{table}");
    }

    match &plan.manifest {
        Some(path) => println!("manifest: {}", path.display()),
        None => println!("{}", "manifest: none".dimmed()),
    }
}
