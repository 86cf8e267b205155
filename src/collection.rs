// bucket_ingestor/src/collection.rs
// Maps object identifiers to target collection names.

use std::sync::LazyLock;

use regex::Regex;

use crate::DEFAULT_COLLECTION_NAME;

// Trailing job number, e.g. the `_42` in `orders_42`.
static JOB_SUFFIX: LazyLock<Regex,> =
    LazyLock::new(|| Regex::new(r"^(?P<name>.+?)_\d+$",).expect("static regex is valid",),);

/// Derives the target collection for an object identifier.
///
/// The extension and a trailing `_<digits>` job suffix are dropped from the
/// last path segment, and path segments are joined with `.` so nested keys
/// land in namespaced collections (`raw/orders_42.json` -> `raw.orders`).
/// Never returns an empty name.
pub fn derive_collection_name(identifier: &str,) -> String {
    let mut segments: Vec<&str,> = identifier.split('/',).filter(|s| !s.is_empty(),).collect();

    let Some(last,) = segments.pop() else {
        return DEFAULT_COLLECTION_NAME.to_string();
    };

    let stem = strip_extension(last,);
    let stem = JOB_SUFFIX
        .captures(stem,)
        .and_then(|caps| caps.name("name",),)
        .map_or(stem, |m| m.as_str(),);

    if !stem.is_empty() {
        segments.push(stem,);
    }

    let name = segments.join(".",).replace('$', "_",);
    if name.is_empty() { DEFAULT_COLLECTION_NAME.to_string() } else { name }
}

fn strip_extension(segment: &str,) -> &str {
    match segment.rfind('.',) {
        Some(0,) | None => segment,
        Some(pos,) => &segment[..pos],
    }
}
