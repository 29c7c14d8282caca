//! Run command - convert a source file and execute it

use anyhow::{anyhow, Result};
use clap::Args;
use framejit_diagnostics::{Diagnostics, SourceCache};
use framejit_runtime::{Executable, Value};
use std::path::PathBuf;

use super::compile::{options, Thunks};
use crate::config::Config;
use crate::pipeline::{compile_source, emit, read_source};
use crate::OutputFormat;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Input .fj file
    pub input: PathBuf,

    /// Arguments passed to a lambda root
    pub args: Vec<String>,

    /// Thunk materialization strategy (overrides the config file)
    #[arg(long, value_enum)]
    pub thunks: Option<Thunks>,
}

/// Read a command-line argument: integers, floats, `true`/`false`,
/// `null`, `unit`; anything else is a string.
pub fn parse_argument(text: &str) -> Value {
    if let Ok(i) = text.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(x) = text.parse::<f64>() {
        return Value::Float(x);
    }
    match text {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        "unit" => Value::Unit,
        _ => Value::string(text),
    }
}

pub fn run(args: RunArgs, config: &Config, format: OutputFormat, use_color: bool) -> Result<()> {
    let options = options(config, args.thunks, None);
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

    let values: Vec<Value> = args.args.iter().map(|a| parse_argument(a)).collect();
    let result = Executable::build(&compiled.prepared).and_then(|exe| exe.invoke(values));
    let value = match result {
        Ok(value) => value,
        Err(err) => {
            let mut diagnostics = Diagnostics::new();
            diagnostics.push(err.to_diagnostic());
            emit(&diagnostics, &cache, format, use_color)?;
            return Err(anyhow!("Execution of {} failed", filename));
        }
    };

    match format {
        OutputFormat::Text => println!("{}", value),
        OutputFormat::Json => {
            let output = serde_json::json!({
                "success": true,
                "file": filename,
                "type": value.type_name(),
                "value": value.to_string(),
            });
            println!("{}", serde_json::to_string(&output)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_parsing() {
        assert!(parse_argument("42").equals(&Value::Int(42)));
        assert!(parse_argument("-1.5").equals(&Value::Float(-1.5)));
        assert!(parse_argument("true").equals(&Value::Bool(true)));
        assert!(matches!(parse_argument("null"), Value::Null));
        assert!(parse_argument("hello").equals(&Value::string("hello")));
    }
}
