//! Compile command - convert a source file and print the result

use anyhow::{anyhow, Result};
use clap::{Args, ValueEnum};
use framejit_diagnostics::SourceCache;
use framejit_ir::pretty;
use framejit_transform::CompileOptions;
use framejit_types::ThunkStrategy;
use std::path::PathBuf;

use crate::config::Config;
use crate::pipeline::{compile_source, emit, read_source, Compiled};
use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct CompileArgs {
    /// Input .fj file
    pub input: PathBuf,

    /// What to print
    #[arg(long, value_enum, default_value = "tree")]
    pub emit: Emit,

    /// Thunk materialization strategy (overrides the config file)
    #[arg(long, value_enum)]
    pub thunks: Option<Thunks>,

    /// Deepest expression nesting accepted (overrides the config file)
    #[arg(long)]
    pub max_depth: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Emit {
    /// The converted tree
    Tree,
    /// Scope analysis results
    Scopes,
    /// The method table
    Table,
    All,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Thunks {
    Lazy,
    Eager,
}

impl From<Thunks> for ThunkStrategy {
    fn from(thunks: Thunks) -> Self {
        match thunks {
            Thunks::Lazy => ThunkStrategy::Lazy,
            Thunks::Eager => ThunkStrategy::Eager,
        }
    }
}

/// Config file options with command-line overrides applied
pub fn options(config: &Config, thunks: Option<Thunks>, max_depth: Option<usize>) -> CompileOptions {
    let mut options = config.compile.clone();
    if let Some(thunks) = thunks {
        options = options.with_thunks(thunks.into());
    }
    if let Some(max_depth) = max_depth {
        options = options.with_max_depth(max_depth);
    }
    options
}

fn print_text(compiled: &Compiled, emit: Emit) {
    let all = emit == Emit::All;
    if all || emit == Emit::Scopes {
        if all {
            println!(";; scopes");
        }
        print!("{}", compiled.scopes);
    }
    if all || emit == Emit::Table {
        if all {
            println!(";; method table");
        }
        if compiled.prepared.method_table.is_empty() {
            println!("(empty)");
        } else {
            print!("{}", compiled.prepared.method_table);
        }
    }
    if all || emit == Emit::Tree {
        if all {
            println!(";; tree");
        }
        println!("{}", pretty(&compiled.prepared.root));
    }
}

fn print_json(compiled: &Compiled, emit: Emit, file: &str) -> Result<()> {
    let all = emit == Emit::All;
    let mut output = serde_json::json!({
        "success": true,
        "file": file,
        "scopes": compiled.scopes.len(),
        "frames": compiled.scopes.frame_count(),
        "methods": compiled.prepared.method_table.len(),
    });
    if all || emit == Emit::Scopes {
        output["scope_map"] = serde_json::Value::String(compiled.scopes.to_string());
    }
    if all || emit == Emit::Table {
        let entries: Vec<_> = compiled
            .prepared
            .method_table
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                serde_json::json!({
                    "index": index,
                    "thunk": entry.thunk.to_string(),
                    "lambda": pretty(&entry.lambda),
                })
            })
            .collect();
        output["method_table"] = serde_json::Value::Array(entries);
    }
    if all || emit == Emit::Tree {
        output["tree"] = serde_json::Value::String(pretty(&compiled.prepared.root));
    }
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

pub fn run(args: CompileArgs, config: &Config, format: OutputFormat, use_color: bool) -> Result<()> {
    let options = options(config, args.thunks, args.max_depth);
    let source = read_source(&args.input)?;
    let filename = args.input.to_string_lossy().to_string();

    let mut cache = SourceCache::new();
    let compiled = match compile_source(&source, &filename, &mut cache, &options) {
        Ok(compiled) => compiled,
        Err(diagnostics) => {
            emit(&diagnostics, &cache, format, use_color)?;
            return Err(anyhow!("Compilation of {} failed", filename));
        }
    };
    emit(&compiled.diagnostics, &cache, format, use_color)?;

    match format {
        OutputFormat::Text => print_text(&compiled, args.emit),
        OutputFormat::Json => print_json(&compiled, args.emit, &filename)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let config = Config::parse("[compile]\nthunks = \"eager\"\nmax_depth = 64\n").unwrap();
        let kept = options(&config, None, None);
        assert_eq!(kept.thunks, ThunkStrategy::Eager);
        assert_eq!(kept.max_depth, 64);

        let overridden = options(&config, Some(Thunks::Lazy), Some(8));
        assert_eq!(overridden.thunks, ThunkStrategy::Lazy);
        assert_eq!(overridden.max_depth, 8);
    }
}
