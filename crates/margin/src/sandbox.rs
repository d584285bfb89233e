//! Sandboxed access to the projects directory.
//!
//! Every file-touching operation goes through [`Sandbox`], which guarantees
//! that resolved paths stay beneath the projects root:
//!
//! ```text
//! <root>/
//! ├── proj-a/          - a project (one normal path component)
//! │   ├── README.md
//! │   └── src/...
//! └── proj-b/
//! ```
//!
//! Relative paths are validated lexically first (no `..`, no absolute paths),
//! then canonicalized so symlinks cannot point outside the project either.

use std::io;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default maximum size of a file returned by [`Sandbox::read_text_file`].
pub const DEFAULT_PREVIEW_LIMIT: u64 = 1024 * 1024;

/// Errors from sandboxed path resolution and file access
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Path would escape the sandbox or is malformed
    #[error("invalid path: {0}")]
    InvalidPath(String),
    /// Project directory does not exist
    #[error("project not found: {0}")]
    ProjectNotFound(String),
    /// File or directory does not exist
    #[error("file not found: {0}")]
    NotFound(String),
    /// Path exists but is not a regular file
    #[error("not a file: {0}")]
    NotAFile(String),
    /// File is larger than the preview limit
    #[error("file too large: {path} is {size} bytes (limit {limit})")]
    TooLarge {
        /// Offending path
        path: String,
        /// Actual size in bytes
        size: u64,
        /// Configured limit in bytes
        limit: u64,
    },
    /// File content is not valid UTF-8
    #[error("not a text file: {0}")]
    NotText(String),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Kind of a node in a project tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Directory
    Dir,
    /// Regular file
    File,
}

/// A node in a project's file tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Entry name (not the full path)
    pub name: String,
    /// Whether this is a directory or a file
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Children, present for directories only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeNode>>,
}

impl TreeNode {
    fn dir(name: impl Into<String>, children: Vec<TreeNode>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Dir,
            children: Some(children),
        }
    }

    fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::File,
            children: None,
        }
    }
}

/// File metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    /// Whether the path is a regular file
    pub is_file: bool,
    /// Size in bytes
    pub size: u64,
}

/// Resolve `relative` beneath `root`.
///
/// Fails with [`SandboxError::InvalidPath`] if `relative` is empty, absolute,
/// contains a `..` segment, or canonicalizes to somewhere outside `root`, and
/// with [`SandboxError::NotFound`] if the target does not exist. The returned
/// path is canonical.
pub fn resolve_within(root: &Path, relative: &str) -> Result<PathBuf, SandboxError> {
    let relative_path = check_relative(relative)?;

    let resolved = canonicalize(&root.join(relative_path), relative)?;
    let canonical_root = canonicalize(root, relative)?;
    contained(resolved, &canonical_root, relative)
}

fn contained(resolved: PathBuf, root: &Path, display: &str) -> Result<PathBuf, SandboxError> {
    if !resolved.starts_with(root) {
        return Err(SandboxError::InvalidPath(display.to_string()));
    }
    Ok(resolved)
}

/// Lexical validation of a project-relative path.
fn check_relative(relative: &str) -> Result<&Path, SandboxError> {
    let path = Path::new(relative);
    if relative.trim().is_empty() {
        return Err(SandboxError::InvalidPath(relative.to_string()));
    }

    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(SandboxError::InvalidPath(relative.to_string()));
            }
        }
    }

    Ok(path)
}

fn canonicalize(path: &Path, display: &str) -> Result<PathBuf, SandboxError> {
    std::fs::canonicalize(path)
        .map_err(|e| not_found_as(e, || SandboxError::NotFound(display.to_string())))
}

fn not_found_as(e: io::Error, missing: impl FnOnce() -> SandboxError) -> SandboxError {
    match e.kind() {
        io::ErrorKind::NotFound => missing(),
        _ => SandboxError::Io(e),
    }
}

/// The projects directory and the operations allowed beneath it.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
    preview_limit: u64,
}

impl Sandbox {
    /// Create a sandbox rooted at `root`. The directory is created lazily by
    /// [`Sandbox::list_projects`].
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            preview_limit: DEFAULT_PREVIEW_LIMIT,
        }
    }

    /// Set the maximum size of files returned by [`Sandbox::read_text_file`].
    pub fn with_preview_limit(mut self, limit: u64) -> Self {
        self.preview_limit = limit;
        self
    }

    /// The projects root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a project name to its canonical directory.
    ///
    /// The name must be a single normal path component naming a real
    /// directory directly under the root. Symlinked projects are rejected,
    /// matching [`Sandbox::list_projects`], which never lists them.
    pub async fn resolve_project(&self, project: &str) -> Result<PathBuf, SandboxError> {
        let mut components = Path::new(project).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {}
            _ => return Err(SandboxError::InvalidPath(project.to_string())),
        }

        let dir = self.root.join(project);
        let metadata = tokio::fs::symlink_metadata(&dir)
            .await
            .map_err(|e| not_found_as(e, || SandboxError::ProjectNotFound(project.to_string())))?;
        if metadata.file_type().is_symlink() {
            return Err(SandboxError::InvalidPath(project.to_string()));
        }
        if !metadata.is_dir() {
            return Err(SandboxError::ProjectNotFound(project.to_string()));
        }

        let canonical_root = tokio::fs::canonicalize(&self.root).await?;
        let canonical_dir = tokio::fs::canonicalize(&dir).await?;
        contained(canonical_dir, &canonical_root, project)
    }

    /// Resolve a file path relative to a project.
    ///
    /// The relative path is checked lexically before the filesystem is
    /// consulted, so traversal attempts are always reported as
    /// [`SandboxError::InvalidPath`]. The canonical target must stay inside
    /// the canonical project directory.
    pub async fn resolve_file(&self, project: &str, relative: &str) -> Result<PathBuf, SandboxError> {
        let relative_path = check_relative(relative)?;
        let project_dir = self.resolve_project(project).await?;

        let resolved = tokio::fs::canonicalize(project_dir.join(relative_path))
            .await
            .map_err(|e| not_found_as(e, || SandboxError::NotFound(relative.to_string())))?;
        contained(resolved, &project_dir, relative)
    }

    /// Resolve a path that must name a regular file, such as the target of
    /// a thought stream.
    pub async fn resolve_regular_file(
        &self,
        project: &str,
        relative: &str,
    ) -> Result<PathBuf, SandboxError> {
        let file = self.resolve_file(project, relative).await?;
        if !self.stat_file(&file).await?.is_file {
            return Err(SandboxError::NotAFile(relative.to_string()));
        }
        Ok(file)
    }

    /// List project directory names, sorted. Creates the root if missing.
    pub async fn list_projects(&self) -> Result<Vec<String>, SandboxError> {
        tokio::fs::create_dir_all(&self.root).await?;

        let mut projects = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                projects.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        projects.sort();
        Ok(projects)
    }

    /// Build the file tree of a project.
    ///
    /// Directories come before files; each group is sorted by name. Symlinks
    /// and special files are skipped.
    pub async fn tree(&self, project: &str) -> Result<TreeNode, SandboxError> {
        let dir = self.resolve_project(project).await?;
        let children = build_tree(&dir).await?;
        Ok(TreeNode::dir(project, children))
    }

    /// Stat a resolved path.
    pub async fn stat_file(&self, path: &Path) -> Result<FileStat, SandboxError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| not_found_as(e, || SandboxError::NotFound(path.display().to_string())))?;
        Ok(FileStat {
            is_file: metadata.is_file(),
            size: metadata.len(),
        })
    }

    /// Read a resolved path as UTF-8 text, subject to the preview limit.
    pub async fn read_text_file(&self, path: &Path) -> Result<String, SandboxError> {
        let display = path.display().to_string();
        let stat = self.stat_file(path).await?;
        if !stat.is_file {
            return Err(SandboxError::NotAFile(display));
        }
        if stat.size > self.preview_limit {
            return Err(SandboxError::TooLarge {
                path: display,
                size: stat.size,
                limit: self.preview_limit,
            });
        }

        let bytes = tokio::fs::read(path).await?;
        String::from_utf8(bytes).map_err(|_| SandboxError::NotText(display))
    }
}

async fn build_tree(dir: &Path) -> Result<Vec<TreeNode>, SandboxError> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        // DirEntry::file_type does not follow symlinks
        let file_type = entry.file_type().await?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if file_type.is_dir() {
            dirs.push((name, entry.path()));
        } else if file_type.is_file() {
            files.push(name);
        }
    }

    dirs.sort_by(|a, b| a.0.cmp(&b.0));
    files.sort();

    let mut nodes = Vec::with_capacity(dirs.len() + files.len());
    for (name, path) in dirs {
        let children = Box::pin(build_tree(&path)).await?;
        nodes.push(TreeNode::dir(name, children));
    }
    nodes.extend(files.into_iter().map(TreeNode::file));
    Ok(nodes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    fn fixture() -> (TempDir, Sandbox) {
        let dir = TempDir::new().unwrap();
        let proj = dir.path().join("proj1");
        std::fs::create_dir_all(proj.join("src/nested")).unwrap();
        std::fs::create_dir_all(proj.join("docs")).unwrap();
        std::fs::write(proj.join("README.md"), "# Project\n").unwrap();
        std::fs::write(proj.join("src/main.rs"), "fn main() {}\n").unwrap();
        std::fs::write(proj.join("src/nested/deep.txt"), "deep").unwrap();
        std::fs::write(proj.join("docs/guide.md"), "guide").unwrap();
        std::fs::create_dir_all(dir.path().join("proj2")).unwrap();
        std::fs::write(dir.path().join("secret.txt"), "outside").unwrap();

        let sandbox = Sandbox::new(dir.path());
        (dir, sandbox)
    }

    // ==================== resolve_within Tests ====================

    #[test]
    fn test_traversal_rejected_without_touching_fs() {
        let result = resolve_within(Path::new("/sandbox/proj1"), "../../etc/passwd");
        assert!(matches!(result, Err(SandboxError::InvalidPath(_))));
    }

    #[test]
    fn test_absolute_path_rejected() {
        let result = resolve_within(Path::new("/sandbox/proj1"), "/etc/passwd");
        assert!(matches!(result, Err(SandboxError::InvalidPath(_))));
    }

    #[test]
    fn test_inner_parent_segment_rejected() {
        let (dir, _) = fixture();
        let root = dir.path().join("proj1");

        let result = resolve_within(&root, "src/../README.md");
        assert!(matches!(result, Err(SandboxError::InvalidPath(_))));
    }

    #[test]
    fn test_empty_path_rejected() {
        let (dir, _) = fixture();
        let result = resolve_within(dir.path(), "  ");
        assert!(matches!(result, Err(SandboxError::InvalidPath(_))));
    }

    #[test]
    fn test_existing_file_resolves() {
        let (dir, _) = fixture();
        let root = dir.path().join("proj1");

        let resolved = resolve_within(&root, "src/main.rs").unwrap();
        let expected = std::fs::canonicalize(root.join("src/main.rs")).unwrap();
        assert_eq!(resolved, expected);
    }

    #[test]
    fn test_current_dir_segments_tolerated() {
        let (dir, _) = fixture();
        let root = dir.path().join("proj1");

        let resolved = resolve_within(&root, "./src/./main.rs").unwrap();
        assert!(resolved.ends_with("src/main.rs"));
    }

    #[test]
    fn test_missing_file_not_found() {
        let (dir, _) = fixture();
        let root = dir.path().join("proj1");

        let result = resolve_within(&root, "src/missing.rs");
        assert!(matches!(result, Err(SandboxError::NotFound(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_rejected() {
        let (dir, _) = fixture();
        let root = dir.path().join("proj1");
        std::os::unix::fs::symlink(dir.path().join("secret.txt"), root.join("link.txt")).unwrap();

        let result = resolve_within(&root, "link.txt");
        assert!(matches!(result, Err(SandboxError::InvalidPath(_))));
    }

    // ==================== Sandbox Tests ====================

    #[tokio::test]
    async fn test_resolve_project() {
        let (dir, sandbox) = fixture();

        let resolved = sandbox.resolve_project("proj1").await.unwrap();
        let expected = std::fs::canonicalize(dir.path().join("proj1")).unwrap();
        assert_eq!(resolved, expected);
    }

    #[tokio::test]
    async fn test_resolve_project_rejects_traversal() {
        let (_dir, sandbox) = fixture();

        for bad in ["..", ".", "", "proj1/src", "/etc", "../proj1"] {
            let result = sandbox.resolve_project(bad).await;
            assert!(
                matches!(result, Err(SandboxError::InvalidPath(_))),
                "expected InvalidPath for {bad:?}, got {result:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_resolve_project_missing() {
        let (_dir, sandbox) = fixture();

        let result = sandbox.resolve_project("nope").await;
        assert!(matches!(result, Err(SandboxError::ProjectNotFound(_))));
    }

    #[tokio::test]
    async fn test_resolve_project_file_is_not_project() {
        let (_dir, sandbox) = fixture();

        let result = sandbox.resolve_project("secret.txt").await;
        assert!(matches!(result, Err(SandboxError::ProjectNotFound(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_project_cannot_escape_root() {
        let (dir, sandbox) = fixture();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "top secret").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("evil")).unwrap();

        let projects = sandbox.list_projects().await.unwrap();
        assert!(!projects.iter().any(|p| p == "evil"));

        let result = sandbox.resolve_project("evil").await;
        assert!(matches!(result, Err(SandboxError::InvalidPath(_))));

        let result = sandbox.resolve_file("evil", "secret.txt").await;
        assert!(matches!(result, Err(SandboxError::InvalidPath(_))));

        let result = sandbox.tree("evil").await;
        assert!(matches!(result, Err(SandboxError::InvalidPath(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_file_cannot_escape_project() {
        let (dir, sandbox) = fixture();
        std::os::unix::fs::symlink(
            dir.path().join("secret.txt"),
            dir.path().join("proj1/link.txt"),
        )
        .unwrap();

        let result = sandbox.resolve_file("proj1", "link.txt").await;
        assert!(matches!(result, Err(SandboxError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn test_resolve_file_traversal_checked_before_project() {
        let (_dir, sandbox) = fixture();

        // Even for a missing project, traversal is reported as invalid
        let result = sandbox.resolve_file("missing", "../../etc/passwd").await;
        assert!(matches!(result, Err(SandboxError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn test_resolve_file() {
        let (_dir, sandbox) = fixture();

        let resolved = sandbox.resolve_file("proj1", "docs/guide.md").await.unwrap();
        assert!(resolved.ends_with("proj1/docs/guide.md"));

        let result = sandbox.resolve_file("proj1", "docs/missing.md").await;
        assert!(matches!(result, Err(SandboxError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_resolve_regular_file_rejects_directory() {
        let (_dir, sandbox) = fixture();

        let file = sandbox
            .resolve_regular_file("proj1", "src/main.rs")
            .await
            .unwrap();
        assert!(file.ends_with("src/main.rs"));

        let result = sandbox.resolve_regular_file("proj1", "src").await;
        assert!(matches!(result, Err(SandboxError::NotAFile(p)) if p == "src"));
    }

    #[tokio::test]
    async fn test_list_projects_sorted_dirs_only() {
        let (_dir, sandbox) = fixture();

        let projects = sandbox.list_projects().await.unwrap();
        assert_eq!(projects, vec!["proj1".to_string(), "proj2".to_string()]);
    }

    #[tokio::test]
    async fn test_list_projects_creates_root() {
        let dir = TempDir::new().unwrap();
        let sandbox = Sandbox::new(dir.path().join("projects"));

        let projects = sandbox.list_projects().await.unwrap();
        assert!(projects.is_empty());
        assert!(dir.path().join("projects").is_dir());
    }

    #[tokio::test]
    async fn test_tree_dirs_first_then_files() {
        let (_dir, sandbox) = fixture();

        let tree = sandbox.tree("proj1").await.unwrap();
        assert_eq!(tree.name, "proj1");
        assert_eq!(tree.kind, NodeKind::Dir);

        let children = tree.children.unwrap();
        let names: Vec<_> = children.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["docs", "src", "README.md"]);

        let src = &children[1];
        let src_names: Vec<_> = src
            .children
            .as_ref()
            .unwrap()
            .iter()
            .map(|n| n.name.as_str())
            .collect();
        assert_eq!(src_names, vec!["nested", "main.rs"]);
    }

    #[tokio::test]
    async fn test_tree_serialization_shape() {
        let (_dir, sandbox) = fixture();

        let tree = sandbox.tree("proj2").await.unwrap();
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["type"], "dir");
        assert_eq!(json["children"], serde_json::json!([]));

        let file = serde_json::to_value(TreeNode::file("a.txt")).unwrap();
        assert_eq!(file, serde_json::json!({"name": "a.txt", "type": "file"}));
    }

    #[tokio::test]
    async fn test_read_text_file() {
        let (_dir, sandbox) = fixture();
        let path = sandbox.resolve_file("proj1", "README.md").await.unwrap();

        let text = sandbox.read_text_file(&path).await.unwrap();
        assert_eq!(text, "# Project\n");

        let stat = sandbox.stat_file(&path).await.unwrap();
        assert!(stat.is_file);
        assert_eq!(stat.size, 10);
    }

    #[tokio::test]
    async fn test_read_text_file_rejects_directory() {
        let (_dir, sandbox) = fixture();
        let path = sandbox.resolve_file("proj1", "src").await.unwrap();

        let result = sandbox.read_text_file(&path).await;
        assert!(matches!(result, Err(SandboxError::NotAFile(_))));
    }

    #[tokio::test]
    async fn test_read_text_file_too_large() {
        let (_dir, sandbox) = fixture();
        let sandbox = sandbox.with_preview_limit(4);
        let path = sandbox.resolve_file("proj1", "README.md").await.unwrap();

        let result = sandbox.read_text_file(&path).await;
        assert!(matches!(
            result,
            Err(SandboxError::TooLarge { size: 10, limit: 4, .. })
        ));
    }

    #[tokio::test]
    async fn test_read_text_file_binary() {
        let (dir, sandbox) = fixture();
        std::fs::write(dir.path().join("proj1/blob.bin"), [0xff, 0xfe, 0x00]).unwrap();
        let path = sandbox.resolve_file("proj1", "blob.bin").await.unwrap();

        let result = sandbox.read_text_file(&path).await;
        assert!(matches!(result, Err(SandboxError::NotText(_))));
    }
}
