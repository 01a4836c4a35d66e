use std::path::{Component, Path};

/// Returns true when `raw_path` is relative and cannot leave the directory it is joined onto.
///
/// Both `/` and `\` count as separators so archive entries written on either
/// platform are judged the same way.
pub fn is_safe_relative_path(raw_path: &str) -> bool {
    if raw_path.trim().is_empty() || raw_path.contains('\0') {
        return false;
    }
    if raw_path.starts_with('/') || raw_path.starts_with('\\') {
        return false;
    }
    if has_drive_prefix(raw_path) {
        return false;
    }
    if raw_path
        .split(['/', '\\'])
        .any(|segment| segment == "..")
    {
        return false;
    }
    // `.` and `./` name the directory itself.
    if raw_path
        .split(['/', '\\'])
        .all(|segment| segment.is_empty() || segment == ".")
    {
        return false;
    }
    !Path::new(raw_path).components().any(|component| {
        matches!(
            component,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

fn has_drive_prefix(raw_path: &str) -> bool {
    let mut chars = raw_path.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic()
    )
}

/// First path segment of a relative item, with a trailing `/` when the item is nested.
///
/// `2048/conf/x.cfg` keys as `2048/`, `2048.sh` keys as itself.
pub fn top_level_key(relative_path: &str) -> String {
    let trimmed = relative_path.trim_start_matches("./");
    match trimmed.split_once(['/', '\\']) {
        Some((head, _)) => format!("{head}/"),
        None => trimmed.to_string(),
    }
}
