//! Project identity: storage form of a project path and its stable fingerprint.

use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};

/// Storage form of a project path: backslashes become forward slashes.
pub fn normalize_project_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Stable 16-hex-char fingerprint of a project directory.
///
/// The path is made absolute and lexically normalized (no filesystem access, so the
/// directory need not exist). On Windows, MSYS drive paths (`/c/Users/...`) map to
/// `C:/Users/...` and the result is case-folded.
pub fn hash_project_path(path: &str) -> String {
    let canonical = canonical_form(path, cfg!(windows));
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(digest)[..16].to_string()
}

fn canonical_form(path: &str, windows: bool) -> String {
    let mut text = normalize_project_path(path);
    if windows {
        if let Some(mapped) = msys_drive(&text) {
            text = mapped;
        }
    }

    let raw = Path::new(&text);
    let absolute = if raw.is_absolute() || (windows && has_drive(&text)) {
        raw.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(raw))
            .unwrap_or_else(|_| raw.to_path_buf())
    };

    let mut out = normalize_project_path(&lexical_normalize(&absolute).to_string_lossy());
    if out.len() > 1 && out.ends_with('/') && !out.ends_with(":/") {
        out.pop();
    }
    if windows {
        out = out.to_lowercase();
    }
    out
}

fn has_drive(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// `/c/rest` → `C:/rest`.
fn msys_drive(text: &str) -> Option<String> {
    let rest = text.strip_prefix('/')?;
    let mut chars = rest.chars();
    let drive = chars.next().filter(|c| c.is_ascii_alphabetic())?;
    match chars.next() {
        Some('/') => Some(format!("{}:/{}", drive.to_ascii_uppercase(), chars.as_str())),
        None => Some(format!("{}:/", drive.to_ascii_uppercase())),
        _ => None,
    }
}

/// Resolve `.` and `..` without touching the filesystem.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_converts_backslashes() {
        assert_eq!(normalize_project_path(r"C:\work\app"), "C:/work/app");
        assert_eq!(normalize_project_path("/home/u/app"), "/home/u/app");
    }

    #[test]
    fn hash_is_sixteen_hex_chars() {
        let h = hash_project_path("/home/u/app");
        assert_eq!(h.len(), 16);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hash_ignores_dots_and_trailing_slash() {
        let base = hash_project_path("/home/u/app");
        assert_eq!(hash_project_path("/home/u/app/"), base);
        assert_eq!(hash_project_path("/home/u/./app"), base);
        assert_eq!(hash_project_path("/home/u/lib/../app"), base);
        assert_ne!(hash_project_path("/home/u/other"), base);
    }

    #[test]
    fn relative_paths_resolve_against_cwd() {
        let cwd = std::env::current_dir().unwrap();
        let abs = cwd.join("some-project");
        assert_eq!(
            hash_project_path("some-project"),
            hash_project_path(&abs.to_string_lossy())
        );
    }

    #[test]
    fn windows_form_maps_msys_and_folds_case() {
        assert_eq!(canonical_form("/c/Users/Dev/App", true), "c:/users/dev/app");
        assert_eq!(canonical_form(r"C:\Users\Dev\App", true), "c:/users/dev/app");
        assert_eq!(canonical_form("/home/Dev/App", false), "/home/Dev/App");
    }
}
