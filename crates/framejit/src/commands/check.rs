//! Check command - convert source files and report diagnostics

use anyhow::{anyhow, Result};
use clap::Args;
use framejit_diagnostics::{Diagnostics, SourceCache};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::compile::{options, Thunks};
use crate::config::Config;
use crate::pipeline::{compile_source, emit, read_source};
use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Input .fj file or directory
    #[arg(default_value = ".")]
    pub input: PathBuf,

    /// Thunk materialization strategy (overrides the config file)
    #[arg(long, value_enum)]
    pub thunks: Option<Thunks>,

    /// Treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

fn is_source(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "fj")
}

/// `.fj` files under `path`, sorted
fn collect_sources(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return if is_source(path) { vec![path.to_path_buf()] } else { Vec::new() };
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_source(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

pub fn run(args: CheckArgs, config: &Config, format: OutputFormat, use_color: bool, verbose: u8) -> Result<()> {
    let options = options(config, args.thunks, None);
    let files = collect_sources(&args.input);

    if files.is_empty() {
        match format {
            OutputFormat::Text => println!("No .fj files found."),
            OutputFormat::Json => println!(
                "{}",
                serde_json::json!({ "success": true, "files": 0, "errors": 0, "warnings": 0 })
            ),
        }
        return Ok(());
    }
    if let OutputFormat::Text = format {
        println!("Checking {} file(s)...", files.len());
    }

    let mut cache = SourceCache::new();
    let mut all_diagnostics = Diagnostics::new();
    let mut methods = 0;
    for file in &files {
        let source = match read_source(file) {
            Ok(source) => source,
            Err(e) => {
                if verbose > 0 {
                    eprintln!("Warning: {}", e);
                }
                continue;
            }
        };
        let filename = file.to_string_lossy().to_string();
        match compile_source(&source, &filename, &mut cache, &options) {
            Ok(compiled) => {
                log::info!(
                    "{}: {} scope(s), {} method(s)",
                    filename,
                    compiled.scopes.len(),
                    compiled.prepared.method_table.len()
                );
                methods += compiled.prepared.method_table.len();
                all_diagnostics.extend(compiled.diagnostics);
            }
            Err(diagnostics) => all_diagnostics.extend(diagnostics),
        }
    }

    emit(&all_diagnostics, &cache, format, use_color)?;
    let errors = all_diagnostics.error_count();
    let warnings = all_diagnostics.warning_count();
    let failed = errors > 0 || (args.strict && warnings > 0);

    match format {
        OutputFormat::Text => {
            if errors > 0 {
                println!(
                    "{}: {} error(s), {} warning(s)",
                    console::style("Check failed").red().bold(),
                    errors,
                    warnings
                );
            } else if failed {
                println!(
                    "{}: {} warning(s) (strict mode)",
                    console::style("Check failed").yellow().bold(),
                    warnings
                );
            } else {
                println!(
                    "{} {} file(s) converted ({} method(s)).",
                    console::style("✓").green(),
                    files.len(),
                    methods
                );
            }
        }
        OutputFormat::Json => {
            let summary = serde_json::json!({
                "type": "summary",
                "success": !failed,
                "files_checked": files.len(),
                "errors": errors,
                "warnings": warnings,
                "methods": methods,
            });
            println!("{}", serde_json::to_string(&summary)?);
        }
    }

    if failed {
        Err(anyhow!("Check failed with errors"))
    } else {
        Ok(())
    }
}
