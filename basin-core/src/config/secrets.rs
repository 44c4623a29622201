use super::ConfigError;

/// Resolve `${...}` placeholders in a string value against the process
/// environment, or a file if the reference is prefixed `file:`.
///
/// Supported forms: `${VAR_NAME}`, `${env:VAR_NAME}`, `${file:/path}`.
pub fn resolve_placeholders(value: &str) -> Result<String, ConfigError> {
    let mut result = value.to_string();
    while let Some(start) = result.find("${") {
        let end = result[start..]
            .find('}')
            .ok_or_else(|| ConfigError::Load(format!("unclosed placeholder in: {value}")))?;
        let reference = &result[start + 2..start + end];
        let resolved = resolve_one(reference)?;
        result = format!("{}{}{}", &result[..start], resolved, &result[start + end + 1..]);
    }
    Ok(result)
}

fn resolve_one(reference: &str) -> Result<String, ConfigError> {
    if let Some(path) = reference.strip_prefix("file:") {
        std::fs::read_to_string(path.trim())
            .map(|s| s.trim().to_string())
            .map_err(|e| ConfigError::Load(format!("secret file '{}': {e}", path.trim())))
    } else {
        let var = reference.strip_prefix("env:").unwrap_or(reference).trim();
        std::env::var(var).map_err(|_| ConfigError::NotFound(var.to_string()))
    }
}
