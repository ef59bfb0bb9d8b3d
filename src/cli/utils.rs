use serde_json::{json, Value};
use std::io::{self, BufRead, Write};

use crate::cli::OutputFormat;

/// Output a success message in the appropriate format
pub fn output_success(output_format: &OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            match data {
                Some(Value::Object(fields)) => {
                    if let Some(object) = response.as_object_mut() {
                        object.extend(fields);
                    }
                }
                Some(other) => response["data"] = other,
                None => {}
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output an error message in the appropriate format
pub fn output_error(output_format: &OutputFormat, message: &str) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let response = json!({
                "success": false,
                "error": message
            });
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            eprintln!("Error: {}", message);
        }
    }
    Ok(())
}

/// Print API data as JSON, or through `render` in text mode
pub fn output_data(output_format: &OutputFormat, data: &Value, render: impl FnOnce(&Value)) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(data)?),
        OutputFormat::Text => render(data),
    }
    Ok(())
}

/// Flag value, then environment, then one line from stdin
pub fn resolve_password(provided: Option<String>) -> anyhow::Result<String> {
    if let Some(password) = provided {
        return Ok(password);
    }
    if let Ok(password) = std::env::var("ROADNET_PASSWORD") {
        return Ok(password);
    }

    eprint!("Password: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let password = line.trim_end_matches(&['\r', '\n'][..]).to_string();
    if password.is_empty() {
        anyhow::bail!("No password given");
    }
    Ok(password)
}

/// Render a field for text output, `-` when missing
pub fn field(value: &Value, key: &str) -> String {
    match value.get(key) {
        None | Some(Value::Null) => "-".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
