//! Naming helpers: default column names and resource short names.

/// Convert a single identifier from camelCase to snake_case.
/// e.g. "relatedDummy" -> "related_dummy", "embeddedDummy.name" -> "embedded_dummy_name"
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c == '.' {
            out.push('_');
        } else if c.is_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Last segment of a namespaced class name: "App\\Entity\\Dummy" -> "Dummy".
pub fn short_name_of(class: &str) -> String {
    class
        .rsplit(|c| c == '\\' || c == ':' || c == '.')
        .next()
        .unwrap_or(class)
        .to_string()
}

/// Collection path segment for a short name: "RelatedDummy" -> "related_dummies".
pub fn path_segment(short_name: &str) -> String {
    let snake = to_snake_case(short_name);
    if let Some(stem) = snake.strip_suffix('y') {
        if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return format!("{}ies", stem);
        }
    }
    if snake.ends_with('s') || snake.ends_with('x') || snake.ends_with("sh") || snake.ends_with("ch") {
        return format!("{}es", snake);
    }
    format!("{}s", snake)
}
