/// File-name-safe slug for a query.
///
/// Lower-cases, turns whitespace runs into `_` and drops anything that is
/// not alphanumeric, `_` or `-`.
/// Example: `"Gaming Laptop 16GB!"` → `"gaming_laptop_16gb"`
pub fn query_slug(query: &str) -> String {
    let slug: String = query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if slug.is_empty() {
        "products".to_string()
    } else {
        slug
    }
}
