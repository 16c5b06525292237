use hrconnect_core::{HrError, Result};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::env;

// Supports both ${VAR} and ${VAR:-default}
static ENV_VAR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").expect("Invalid regex pattern")
});

/// Substitute environment variables in a raw configuration document.
///
/// Lines starting with `#` are left untouched so commented-out examples
/// never require their variables to be set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut missing_vars = Vec::new();
    let mut output = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            output.push(line.to_string());
            continue;
        }

        let replaced = ENV_VAR_REGEX.replace_all(line, |cap: &Captures<'_>| {
            let var_name = &cap[1];
            match env::var(var_name) {
                Ok(value) => value,
                Err(_) => match cap.get(2) {
                    Some(default) => default.as_str().to_string(),
                    None => {
                        missing_vars.push(var_name.to_string());
                        String::new()
                    }
                },
            }
        });
        output.push(replaced.into_owned());
    }

    if !missing_vars.is_empty() {
        missing_vars.sort();
        missing_vars.dedup();
        return Err(HrError::Config(format!(
            "Missing required environment variables: {}. Please set these variables before loading the configuration.",
            missing_vars.join(", ")
        )));
    }

    let mut result = output.join("\n");
    if input.ends_with('\n') {
        result.push('\n');
    }
    Ok(result)
}
