//! Repo-relative path arithmetic used to turn import strings into candidates.
//!
//! All paths use `/` separators and never start with `/`. A path that would
//! climb above the repository root is unresolvable.

/// Directory part of a repo-relative path (`""` for top-level files)
pub fn parent_dir(path: &str) -> &str {
    path.rfind('/').map_or("", |idx| &path[..idx])
}

/// File name without its final extension
pub fn file_stem(path: &str) -> &str {
    let name = path.rfind('/').map_or(path, |idx| &path[idx + 1..]);
    name.rfind('.').filter(|&idx| idx > 0).map_or(name, |idx| &name[..idx])
}

/// Join and normalize; `None` when the result escapes the root
pub fn join(dir: &str, rel: &str) -> Option<String> {
    if dir.is_empty() {
        normalize(rel)
    } else {
        normalize(&format!("{dir}/{rel}"))
    }
}

/// Resolve `.` and `..` segments
pub fn normalize(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// `levels` directories above `dir`
pub fn ancestor(dir: &str, levels: usize) -> Option<String> {
    let mut current = dir.to_string();
    for _ in 0..levels {
        if current.is_empty() {
            return None;
        }
        current = parent_dir(&current).to_string();
    }
    Some(current)
}

/// Crate source root for a Rust file: the path up to the last `src`
/// component, or the file's directory.
pub fn rust_crate_root(path: &str) -> String {
    let dir = parent_dir(path);
    let segments: Vec<&str> = dir.split('/').collect();
    match segments.iter().rposition(|segment| *segment == "src") {
        Some(idx) => segments[..=idx].join("/"),
        None => dir.to_string(),
    }
}

/// Directory that holds the child modules of a Rust file
pub fn rust_module_dir(path: &str) -> String {
    let dir = parent_dir(path);
    match file_stem(path) {
        "lib" | "main" | "mod" => dir.to_string(),
        stem if dir.is_empty() => stem.to_string(),
        stem => format!("{dir}/{stem}"),
    }
}
