//! Init command - initialize a new framejit project

use anyhow::Result;
use clap::Args;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::CONFIG_FILE;
use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Project directory (default: current)
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

pub const DEFAULT_CONFIG: &str = r#"# framejit configuration

[compile]
# Deepest expression nesting the compiler accepts
max_depth = 512
# When nested functions are compiled: "lazy" (first use) or "eager"
thunks = "lazy"
"#;

const DEFAULT_MAIN: &str = r#"; A counter closure over a block variable
(lambda ((start int))
  (block ((count int) (next (fn () int)))
    (set! count start)
    (set! next (lambda () (set!op + count 1) count))
    (call next)
    (call next)))
"#;

/// Write `contents` unless `path` exists. Returns whether it was written.
fn create(path: &Path, contents: &str) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    fs::write(path, contents)?;
    Ok(true)
}

pub fn run(args: InitArgs, format: OutputFormat) -> Result<()> {
    fs::create_dir_all(&args.path)?;
    let project_path = args.path.canonicalize().unwrap_or(args.path.clone());

    if let OutputFormat::Text = format {
        println!("Creating framejit project in {}...\n", project_path.display());
    }

    let mut created = Vec::new();
    for (name, contents) in [(CONFIG_FILE, DEFAULT_CONFIG), ("main.fj", DEFAULT_MAIN)] {
        let written = create(&project_path.join(name), contents)?;
        if written {
            created.push(name);
        }
        if let OutputFormat::Text = format {
            if written {
                println!("  Created {}", name);
            } else {
                println!("  Skipped {} (already exists)", name);
            }
        }
    }

    match format {
        OutputFormat::Text => {
            println!("\nDone! Next steps:");
            println!("  cd {}", project_path.display());
            println!("  framejit run main.fj 10");
        }
        OutputFormat::Json => {
            let result = serde_json::json!({
                "success": true,
                "path": project_path.to_string_lossy(),
                "created": created,
            });
            println!("{}", serde_json::to_string(&result)?);
        }
    }

    Ok(())
}
