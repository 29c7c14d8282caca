//! framejit - closure conversion for expression trees
//!
//! CLI driver: reads `.fj` sources, converts them and runs the result on
//! the reference executor.

mod commands;
mod config;
mod pipeline;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

/// Closure-conversion compiler for expression trees
#[derive(Parser, Debug)]
#[command(name = "framejit")]
#[command(author, version, about = "Convert and run framejit expression trees")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Configuration file (default: ./framejit.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert a source file and print the result
    Compile(commands::compile::CompileArgs),

    /// Convert and run a source file
    Run(commands::run::RunArgs),

    /// Convert source files and report diagnostics only
    Check(commands::check::CheckArgs),

    /// Explain an error code
    Explain(commands::explain::ExplainArgs),

    /// Initialize a new framejit project
    Init(commands::init::InitArgs),
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let use_color = !cli.no_color && !cli.quiet && atty::is(atty::Stream::Stdout);
    console::set_colors_enabled(use_color);
    console::set_colors_enabled_stderr(use_color);

    let Some(command) = cli.command else {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        cmd.print_help()?;
        println!();
        return Ok(());
    };

    let config = config::load(cli.config.as_deref())?;

    match command {
        Commands::Compile(args) => commands::compile::run(args, &config, cli.format, use_color),
        Commands::Run(args) => commands::run::run(args, &config, cli.format, use_color),
        Commands::Check(args) => commands::check::run(args, &config, cli.format, use_color, cli.verbose),
        Commands::Explain(args) => commands::explain::run(args, cli.format, use_color),
        Commands::Init(args) => commands::init::run(args, cli.format),
    }
}
