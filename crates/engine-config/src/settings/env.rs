use crate::settings::error::SettingsError;
use serde_json::Value as JsonValue;

/// Replaces `${VAR}` references in every string of `value`, looking
/// variables up with `lookup`. `$$` escapes a literal dollar sign.
pub fn interpolate<F>(value: &mut JsonValue, lookup: &F) -> Result<(), SettingsError>
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        JsonValue::String(text) => {
            if text.contains('$') {
                *text = expand(text, lookup)?;
            }
            Ok(())
        }
        JsonValue::Array(items) => items.iter_mut().try_for_each(|item| interpolate(item, lookup)),
        JsonValue::Object(map) => map
            .values_mut()
            .try_for_each(|item| interpolate(item, lookup)),
        _ => Ok(()),
    }
}

/// Interpolates from the process environment.
pub fn interpolate_env(value: &mut JsonValue) -> Result<(), SettingsError> {
    interpolate(value, &|name| std::env::var(name).ok())
}

fn expand<F>(text: &str, lookup: &F) -> Result<String, SettingsError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if let Some(after) = tail.strip_prefix("$$") {
            out.push('$');
            rest = after;
        } else if let Some(after) = tail.strip_prefix("${") {
            let end = after
                .find('}')
                .ok_or_else(|| SettingsError::UnterminatedEnvRef(text.to_string()))?;
            let name = &after[..end];
            let resolved =
                lookup(name).ok_or_else(|| SettingsError::MissingEnvVar(name.to_string()))?;
            out.push_str(&resolved);
            rest = &after[end + 1..];
        } else {
            out.push('$');
            rest = &tail[1..];
        }
    }

    out.push_str(rest);
    Ok(out)
}
