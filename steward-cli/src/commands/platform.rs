//! `steward platform`: show the detected platform of a root filesystem.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use steward_platform::{detect_platform, ExcludeSpec, Platform};

/// Arguments for `steward platform`.
#[derive(Args, Debug)]
pub struct PlatformArgs {
    /// Root filesystem to inspect.
    #[arg(long, default_value = "/")]
    pub root: PathBuf,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl PlatformArgs {
    pub fn run(self) -> Result<()> {
        let platform = detect_platform(&self.root)
            .with_context(|| format!("failed to detect platform under {}", self.root.display()))?;

        if self.json {
            let json = serde_json::to_string_pretty(&platform)
                .context("failed to serialize platform")?;
            println!("{json}");
            return Ok(());
        }

        print_platform(&platform);
        Ok(())
    }
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "field")]
    field: &'static str,
    #[tabled(rename = "value")]
    value: String,
}

#[derive(Tabled)]
pub(crate) struct ExcludeRow {
    #[tabled(rename = "path")]
    path: String,
    #[tabled(rename = "keep dir")]
    keep_dir: &'static str,
    #[tabled(rename = "keep files")]
    keep_files: &'static str,
    #[tabled(rename = "keep subdirs")]
    keep_subdirs: &'static str,
}

impl From<&ExcludeSpec> for ExcludeRow {
    fn from(spec: &ExcludeSpec) -> Self {
        let flag = |on: bool| if on { "yes" } else { "-" };
        Self {
            path: spec.path.display().to_string(),
            keep_dir: flag(spec.preserve_dir),
            keep_files: flag(spec.preserve_file),
            keep_subdirs: flag(spec.preserve_subdir),
        }
    }
}

fn print_platform(platform: &Platform) {
    let name = if platform.is_linux() {
        platform.name().bold()
    } else {
        platform.name().yellow().bold()
    };
    println!("{name}");

    let optional = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
    let rows = vec![
        FieldRow {
            field: "family",
            value: platform.family.label().to_string(),
        },
        FieldRow {
            field: "distribution",
            value: optional(&platform.distribution),
        },
        FieldRow {
            field: "version",
            value: optional(&platform.distribution_version),
        },
        FieldRow {
            field: "codename",
            value: optional(&platform.distribution_codename),
        },
        FieldRow {
            field: "filesystem",
            value: platform.preferred_filesystem_type().to_string(),
        },
    ];
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if platform.exclude_list.is_empty() {
        println!("{}", "No bundle excludes.".dimmed());
        return;
    }
    print_excludes(&platform.exclude_list);
}

pub(crate) fn print_excludes(excludes: &[ExcludeSpec]) {
    let mut table = Table::new(excludes.iter().map(ExcludeRow::from));
    table.with(Style::rounded());
    println!("{table}");
}
