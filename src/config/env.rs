use std::collections::BTreeMap;

/// Environment variables, ordered so serialized output is stable
pub type EnvMap = BTreeMap<String, String>;

/// Key prefix used by ecosystem-style files for profile overlays (`env_production`)
pub const PROFILE_KEY_PREFIX: &str = "env_";

/// Overlay `overrides` on top of `base`. Keys present in both take the override value.
pub fn overlay(base: &EnvMap, overrides: &EnvMap) -> EnvMap {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Expand `$VAR` and `${VAR}` references using `lookup`.
///
/// References that `lookup` cannot resolve are left untouched so later
/// validation can still see them.
pub fn expand_vars<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) if is_var_name(&braced[..end]) => (&braced[..end], end + 2),
                _ => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            if is_var_name(&after[..end]) {
                (&after[..end], end)
            } else {
                ("", 0)
            }
        };

        match (consumed, lookup(name)) {
            (0, _) => {
                out.push('$');
                rest = after;
            }
            (_, Some(value)) => {
                out.push_str(&value);
                rest = &after[consumed..];
            }
            (_, None) => {
                out.push('$');
                out.push_str(&after[..consumed]);
                rest = &after[consumed..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Expand against the current process environment
pub fn expand_from_process(input: &str) -> String {
    expand_vars(input, |name| std::env::var(name).ok())
}

/// Whether `input` still holds a `$VAR` or `${VAR}` reference
pub fn has_unexpanded_var(input: &str) -> bool {
    expand_vars(input, |_| Some(String::new())) != input
}

fn is_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
