//! Display name resolution.

/// Prefix of server-generated display names.
pub const GENERATED_NAME_PREFIX: &str = "User-";

/// Generate a display name of the form `User-<8 hex chars>`.
#[must_use]
pub fn generate_display_name() -> String {
    format!("{GENERATED_NAME_PREFIX}{:08x}", rand::random::<u32>())
}

/// Use the client-supplied name, or generate one when it is absent, empty
/// or only whitespace. Supplied names are kept verbatim.
#[must_use]
pub fn resolve_display_name(requested: Option<&str>) -> String {
    match requested {
        Some(name) if !name.trim().is_empty() => name.to_string(),
        _ => generate_display_name(),
    }
}
