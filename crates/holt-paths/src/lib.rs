//! Canonical path resolution for the editor bridge.
//!
//! The remote editor identifies buffers and breakpoints by path *string*
//! equality, not inode identity, so every path that crosses the RPC boundary
//! must be reduced to a single canonical spelling first. Canonicalization
//! resolves relative segments, symbolic links, and platform alias prefixes
//! (e.g. a symlinked OS temp directory), so two spellings of the same
//! physical file always serialize identically.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("path not found: {}", path.display())]
    NotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("path {} is outside the workspace root {}", path.display(), root.display())]
    OutsideWorkspace { path: PathBuf, root: PathBuf },

    #[error("failed to canonicalize {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type PathResult<T> = Result<T, PathError>;

/// Resolves caller-supplied paths against a configured workspace root.
///
/// The root itself is canonicalized at construction, so membership checks
/// compare canonical forms on both sides.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    pub fn new(workspace_root: impl AsRef<Path>) -> PathResult<Self> {
        let root = canonicalize_existing(workspace_root.as_ref())?;
        Ok(Self { root })
    }

    /// The canonical workspace root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonicalize `path` and enforce the workspace policy.
    ///
    /// Relative paths are resolved against the workspace root. Fails with
    /// [`PathError::NotFound`] when the file does not exist and
    /// [`PathError::OutsideWorkspace`] when the canonical path escapes the
    /// root (a policy check, not a filesystem error).
    pub fn canonicalize(&self, path: impl AsRef<Path>) -> PathResult<PathBuf> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        let canonical = canonicalize_existing(&absolute)?;
        if !canonical.starts_with(&self.root) {
            return Err(PathError::OutsideWorkspace {
                path: canonical,
                root: self.root.clone(),
            });
        }
        Ok(canonical)
    }

    /// Render a canonical path for responses: workspace-relative when the
    /// file lives under the root, absolute otherwise (library sources,
    /// generated files, and other results the language servers may point at).
    pub fn display_path(&self, path: impl AsRef<Path>) -> String {
        let path = path.as_ref();
        // Best effort: results from the remote peer are usually already
        // canonical, but a non-canonical spelling still displays correctly
        // when it resolves under the root.
        let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        match canonical.strip_prefix(&self.root) {
            Ok(relative) => relative.display().to_string(),
            Err(_) => canonical.display().to_string(),
        }
    }
}

fn canonicalize_existing(path: &Path) -> PathResult<PathBuf> {
    std::fs::canonicalize(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            PathError::NotFound {
                path: path.to_path_buf(),
                source,
            }
        } else {
            PathError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace() -> (tempfile::TempDir, PathResolver) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/main.py"), "print('hi')\n").unwrap();
        let resolver = PathResolver::new(dir.path()).unwrap();
        (dir, resolver)
    }

    #[test]
    fn relative_and_absolute_spellings_agree() {
        let (dir, resolver) = workspace();

        let relative = resolver.canonicalize("src/main.py").unwrap();
        let absolute = resolver.canonicalize(dir.path().join("src/main.py")).unwrap();
        assert_eq!(relative, absolute);
        assert!(relative.is_absolute());
    }

    #[test]
    fn missing_file_is_not_found() {
        let (_dir, resolver) = workspace();

        let err = resolver.canonicalize("src/missing.py").unwrap_err();
        assert!(matches!(err, PathError::NotFound { .. }));
    }

    #[test]
    fn escaping_the_root_is_a_policy_error() {
        let (_dir, resolver) = workspace();
        let outside = tempfile::NamedTempFile::new().unwrap();

        let err = resolver.canonicalize(outside.path()).unwrap_err();
        assert!(matches!(err, PathError::OutsideWorkspace { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_prefix_resolves_to_real_target() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real");
        std::fs::create_dir(&real).unwrap();
        std::fs::write(real.join("file.py"), "x = 1\n").unwrap();
        std::os::unix::fs::symlink(&real, dir.path().join("alias")).unwrap();

        let resolver = PathResolver::new(&real).unwrap();
        let via_alias = resolver
            .canonicalize(dir.path().join("alias/file.py"))
            .unwrap();
        let via_real = resolver.canonicalize(real.join("file.py")).unwrap();
        assert_eq!(via_alias, via_real);
    }

    #[test]
    fn display_path_is_workspace_relative_inside_the_root() {
        let (dir, resolver) = workspace();

        let canonical = resolver.canonicalize("src/main.py").unwrap();
        assert_eq!(resolver.display_path(&canonical), "src/main.py");

        let outside = tempfile::NamedTempFile::new().unwrap();
        let rendered = resolver.display_path(outside.path());
        assert!(Path::new(&rendered).is_absolute());
        let _ = dir;
    }
}
