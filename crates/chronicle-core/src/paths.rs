use std::path::Component;
use std::path::Path;
use std::path::MAIN_SEPARATOR_STR;

/// Lexically normalize a path: `.` segments are dropped, `..` pops the previous
/// segment, and duplicate or trailing separators disappear. The filesystem is
/// never consulted, so symlinks are not resolved.
pub fn normalize_path(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }

    let mut prefix = String::new();
    let mut absolute = false;
    let mut parts: Vec<String> = Vec::new();
    for component in Path::new(raw).components() {
        match component {
            Component::Prefix(value) => {
                prefix = value.as_os_str().to_string_lossy().into_owned();
            }
            Component::RootDir => absolute = true,
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(last) if last != ".." => {
                    parts.pop();
                }
                // `..` above the root stays at the root.
                _ if absolute => {}
                _ => parts.push("..".to_string()),
            },
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
        }
    }

    let mut normalized = prefix;
    if absolute {
        normalized.push_str(MAIN_SEPARATOR_STR);
    }
    normalized.push_str(&parts.join(MAIN_SEPARATOR_STR));
    if normalized.is_empty() {
        ".".to_string()
    } else {
        normalized
    }
}

/// Normalize `raw`, first joining it onto `base` when it is relative and a base
/// is available.
pub fn resolve_path(raw: &str, base: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    if Path::new(raw).is_absolute() || base.trim().is_empty() {
        return normalize_path(raw);
    }
    let joined = Path::new(base.trim()).join(raw);
    normalize_path(&joined.to_string_lossy())
}

/// True when `path` equals `root` or sits beneath it. Both sides are normalized
/// first; the comparison itself is byte-exact, so `/a/bc` is not under `/a/b`.
pub fn is_within(path: &str, root: &str) -> bool {
    let path = normalize_path(path);
    let root = normalize_path(root);
    if path.is_empty() || root.is_empty() {
        return false;
    }
    if path == root {
        return true;
    }
    if root.ends_with(MAIN_SEPARATOR_STR) {
        return path.starts_with(&root);
    }
    path.strip_prefix(&root)
        .is_some_and(|rest| rest.starts_with(MAIN_SEPARATOR_STR))
}
