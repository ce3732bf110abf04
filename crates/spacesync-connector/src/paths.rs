//! OU path semantics.
//!
//! Paths are slash-delimited ancestry strings (`/Company/Eng`). Comparison
//! is done on normalized form: surrounding whitespace and trailing slashes
//! stripped.

/// Normalize a path for comparison.
#[must_use]
pub fn normalize(path: &str) -> &str {
    path.trim().trim_end_matches('/')
}

/// Check whether `path` lies within the subtree rooted at `ancestor`
/// (inclusive).
#[must_use]
pub fn is_under(path: &str, ancestor: &str) -> bool {
    let p = normalize(path);
    let a = normalize(ancestor);
    if p == a {
        return true;
    }
    p.starts_with(a) && p.as_bytes().get(a.len()) == Some(&b'/')
}

/// Parent path of a normalized path, if any (`/Company/Eng` -> `/Company`).
#[must_use]
pub fn parent(path: &str) -> Option<&str> {
    let p = normalize(path);
    let idx = p.rfind('/')?;
    if idx == 0 {
        // Direct child of "/"; the parent is the filesystem-style root,
        // which is never an OU of its own here.
        None
    } else {
        Some(&p[..idx])
    }
}

/// Last path segment (`/Company/Eng` -> `Eng`).
#[must_use]
pub fn leaf(path: &str) -> &str {
    let p = normalize(path);
    p.rsplit('/').next().unwrap_or(p)
}
