// query.rs — Query path normalization.
//
// Operators configure one allow path (default `data.docker.authz.allow`).
// The embedded engine wants the dotted form; the managed engine and the
// remote data API address documents by slash path (`/docker/authz/allow`).
// Only the mismatched shape is rewritten; anything else passes through.

/// Normalize `path` for the backend it will be sent to.
///
/// - dotted form with `slash_form == true`: drop the leading `data` segment
///   and turn dots into slashes (`data.a.b` → `/a/b`).
/// - slash form with `slash_form == false`: prepend `data` and turn slashes
///   into dots (`/a/b` → `data.a.b`).
/// - every other combination, including the empty string, is unchanged.
pub fn normalize_query_path(path: &str, slash_form: bool) -> String {
    if slash_form {
        if let Some(rest) = strip_data_segment(path) {
            return rest.replace('.', "/");
        }
    } else if path.starts_with('/') {
        return format!("data{}", path.replace('/', "."));
    }
    path.to_string()
}

/// `data` or `data.<rest>` → `""` or `.<rest>`.
fn strip_data_segment(path: &str) -> Option<&str> {
    let rest = path.strip_prefix("data")?;
    (rest.is_empty() || rest.starts_with('.')).then_some(rest)
}
