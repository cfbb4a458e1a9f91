use std::{
    borrow::Cow,
    path::{Component, Path, PathBuf},
};

use crate::error::FolioError;

/// Utility function to replace separators and convert to unicode (via to_string_lossy) on os path.
pub fn os_path_to_string<P: AsRef<Path>>(os_path_ref: P) -> String {
    let res = os_path_ref
        .as_ref()
        .components()
        .map(|c| match c {
            Component::RootDir => Cow::from("".to_string()),
            _ => c.as_os_str().to_string_lossy(),
        })
        .collect::<Vec<_>>()
        .join("/");
    tracing::trace!(
        "os_path_to_string: turned {:?} into {}",
        os_path_ref.as_ref().components(),
        res
    );
    res
}

/// Turn a heading or title string into a regularized anchor string
pub fn to_anchor(title: &str) -> String {
    title
        .trim()
        .to_lowercase()
        .replace(char::is_whitespace, "-")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-')
        .collect()
}

/// The file stem as an owned string, the display title of a page.
pub fn file_stem_string<P: AsRef<Path>>(path: P) -> String {
    path.as_ref()
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

pub fn file_name_string<P: AsRef<Path>>(path: P) -> String {
    path.as_ref()
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Dot-prefixed entries (`.git`, `.folio.toml`, editor swap files) are never part of a vault.
pub fn is_hidden<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// True if any component of `path` below `root` is hidden.
pub fn has_hidden_component<P: AsRef<Path>, R: AsRef<Path>>(root: R, path: P) -> bool {
    match path.as_ref().strip_prefix(root.as_ref()) {
        Ok(rel) => rel.components().any(|c| match c {
            Component::Normal(name) => name.to_string_lossy().starts_with('.'),
            _ => false,
        }),
        Err(_) => is_hidden(path),
    }
}

/// Lexically normalize `path`, resolving `.` and `..` without touching the filesystem.
pub fn normalize_path<P: AsRef<Path>>(path: P) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.as_ref().components() {
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

/// Resolve `path` against `root` and refuse anything that escapes the root.
pub fn ensure_within<P: AsRef<Path>, R: AsRef<Path>>(
    root: R,
    path: P,
) -> Result<PathBuf, FolioError> {
    let root = root.as_ref();
    let joined = if path.as_ref().is_absolute() {
        normalize_path(path.as_ref())
    } else {
        normalize_path(root.join(path.as_ref()))
    };
    if joined.starts_with(root) {
        Ok(joined)
    } else {
        Err(FolioError::InvalidPath(path.as_ref().to_path_buf()))
    }
}

/// Check a user-supplied file or folder name. Separators, empty names and dot-names are rejected.
pub fn validate_name(name: &str) -> Result<&str, FolioError> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed.starts_with('.')
        || trimmed.contains('/')
        || trimmed.contains('\\')
        || trimmed.contains('\0')
    {
        return Err(FolioError::InvalidPath(PathBuf::from(name)));
    }
    Ok(trimmed)
}

/// The first sibling path `"<stem> <n>.<ext>"`, n = 1, 2, ... that does not exist yet.
pub fn next_free_sibling<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();
    let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let stem = file_stem_string(path);
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let mut counter = 1usize;
    loop {
        let candidate = parent.join(format!("{stem} {counter}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_to_anchor() {
        assert_eq!(to_anchor("Hello World"), "hello-world");
        assert_eq!(to_anchor("  Trailing spaces  "), "trailing-spaces");
        assert_eq!(to_anchor("Under_score & ampersand!"), "underscore--ampersand");
        assert_eq!(to_anchor("Città"), "città");
        assert_eq!(to_anchor("???"), "");
    }

    #[test]
    fn test_hidden() {
        assert!(is_hidden("/vault/.git"));
        assert!(!is_hidden("/vault/notes.md"));
        assert!(has_hidden_component("/vault", "/vault/.obsidian/a.md"));
        assert!(!has_hidden_component("/vault", "/vault/notes/a.md"));
    }

    #[test]
    fn test_ensure_within() {
        let root = Path::new("/vault");
        assert_eq!(
            ensure_within(root, "notes/a.md").unwrap(),
            PathBuf::from("/vault/notes/a.md")
        );
        assert_eq!(
            ensure_within(root, "/vault/notes/../a.md").unwrap(),
            PathBuf::from("/vault/a.md")
        );
        assert!(matches!(
            ensure_within(root, "../escape.md"),
            Err(FolioError::InvalidPath(_))
        ));
        assert!(ensure_within(root, "/elsewhere/a.md").is_err());
    }

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name(" Page ").unwrap(), "Page");
        assert!(validate_name("").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name(".hidden").is_err());
    }

    #[test]
    fn test_stems() {
        assert_eq!(file_stem_string("/vault/My Page.md"), "My Page");
        assert_eq!(file_name_string("/vault/My Page.md"), "My Page.md");
        assert_eq!(os_path_to_string(Path::new("/vault/a/b.md")), "/vault/a/b.md");
    }
}
