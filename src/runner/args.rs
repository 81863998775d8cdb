//! Task argument parsing
//!
//! A task's `args` section declares the options it reads from the command
//! line tail. Each scope parses only the options it declares; everything
//! else in the tail is left for other scopes.

use crate::config::types::{ArgSpec, ArgType, Mapping, Value};
use crate::error::{ExecutionError, ExecutionResult};
use clap::{Arg, ArgAction, ArgMatches, Command};

/// Parse `argv` against the argument specifications in `specs`
///
/// Returns one entry per specification. Flags are always present; other
/// arguments fall back to their default, or to null when they have none.
pub fn parse_arguments(specs: &Mapping, argv: &[String]) -> ExecutionResult<Mapping> {
    let specs = read_specs(specs)?;
    if specs.is_empty() {
        return Ok(Mapping::new());
    }

    let tokens = select_tokens(&specs, argv);
    log::trace!("parsing arguments from {:?}", tokens);

    let matches = build_command(&specs)
        .try_get_matches_from(tokens)
        .map_err(|e| ExecutionError::Arguments(e.render().to_string().trim().to_string()))?;

    let mut result = Mapping::new();
    for (name, spec) in &specs {
        let value = argument_value(name, spec, &matches)?;
        result.insert(Value::String(name.clone()), value);
    }

    Ok(result)
}

fn read_specs(specs: &Mapping) -> ExecutionResult<Vec<(String, ArgSpec)>> {
    specs
        .iter()
        .map(|(key, value)| {
            let name = key.as_str().ok_or_else(|| {
                ExecutionError::Arguments("argument names should be strings".to_string())
            })?;
            Ok((name.to_string(), ArgSpec::from_value(name, value)?))
        })
        .collect()
}

/// Keep only the tokens that belong to `specs`, with their values
fn select_tokens(specs: &[(String, ArgSpec)], argv: &[String]) -> Vec<String> {
    let mut selected = Vec::new();
    let mut iter = argv.iter();

    while let Some(token) = iter.next() {
        if let Some((option, _)) = token.split_once('=') {
            if option.starts_with("--") && find_spec(specs, option).is_some() {
                selected.push(token.clone());
            }
            continue;
        }

        let Some(spec) = find_spec(specs, token) else {
            continue;
        };

        selected.push(token.clone());
        if spec.arg_type != ArgType::Flag {
            if let Some(value) = iter.next() {
                selected.push(value.clone());
            }
        }
    }

    selected
}

fn find_spec<'a>(specs: &'a [(String, ArgSpec)], token: &str) -> Option<&'a ArgSpec> {
    if let Some(long) = token.strip_prefix("--") {
        return specs.iter().find(|(name, _)| name == long).map(|(_, spec)| spec);
    }

    let short = token.strip_prefix('-')?;
    let mut chars = short.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => specs
            .iter()
            .find(|(_, spec)| spec.short() == Some(c))
            .map(|(_, spec)| spec),
        _ => None,
    }
}

fn build_command(specs: &[(String, ArgSpec)]) -> Command {
    let mut cmd = Command::new("task")
        .no_binary_name(true)
        .disable_help_flag(true)
        .disable_version_flag(true)
        .args_override_self(true);

    for (name, spec) in specs {
        let mut arg = Arg::new(name.clone()).long(name.clone());

        if let Some(c) = spec.short() {
            arg = arg.short(c);
        }

        if let Some(description) = &spec.description {
            arg = arg.help(description.clone());
        }

        arg = match spec.arg_type {
            ArgType::Flag => arg.action(ArgAction::SetTrue),
            _ => arg
                .action(ArgAction::Set)
                .value_name(name.to_uppercase())
                .allow_hyphen_values(true),
        };

        cmd = cmd.arg(arg);
    }

    cmd
}

fn argument_value(
    name: &str,
    spec: &ArgSpec,
    matches: &ArgMatches,
) -> ExecutionResult<Value> {
    if spec.arg_type == ArgType::Flag {
        if matches.get_flag(name) {
            return Ok(Value::Bool(true));
        }
        return Ok(spec.default.clone().unwrap_or(Value::Bool(false)));
    }

    let Some(raw) = matches.get_one::<String>(name) else {
        if let Some(default) = &spec.default {
            return Ok(default.clone());
        }
        if spec.required {
            return Err(ExecutionError::Arguments(format!(
                "argument --{} is required",
                name
            )));
        }
        return Ok(Value::Null);
    };

    let value = match spec.arg_type {
        ArgType::Int => raw.parse::<i64>().map(Value::from).map_err(|_| {
            ExecutionError::Arguments(format!("argument --{} should be integer, got {}", name, raw))
        })?,
        ArgType::Float => raw.parse::<f64>().map(Value::from).map_err(|_| {
            ExecutionError::Arguments(format!("argument --{} should be number, got {}", name, raw))
        })?,
        _ => Value::String(raw.clone()),
    };

    Ok(value)
}
