//! Candidate file set for dynamic resolution.
//!
//! `FileStore` abstracts whole-file reads and writes so the resolver can run
//! against the real filesystem (`DiskStore`) or an in-memory tree
//! (`MemoryStore`).

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};

use regex::Regex;

use crate::config::ScanConfig;
use crate::error::WorkspaceError;

/// How a candidate file is searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// html, htm, xhtml
    Markup,
    /// Single-file components: markup with embedded script blocks.
    Component,
    /// JavaScript and TypeScript sources.
    Script,
}

impl FileKind {
    pub fn of(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "html" | "htm" | "xhtml" => Some(FileKind::Markup),
            "vue" | "svelte" | "astro" => Some(FileKind::Component),
            "js" | "mjs" | "cjs" | "jsx" | "ts" | "tsx" => Some(FileKind::Script),
            _ => None,
        }
    }

    /// Has class attributes worth parsing.
    pub fn is_markup_like(self) -> bool {
        matches!(self, FileKind::Markup | FileKind::Component)
    }

    pub fn is_script_like(self) -> bool {
        matches!(self, FileKind::Script | FileKind::Component)
    }
}

/// Whole-file text storage.
pub trait FileStore {
    /// Directory that `/`-prefixed script sources resolve against.
    fn root(&self) -> &Path;

    /// Files eligible for search, in path order, capped at `scan.max_files`.
    fn list_candidates(
        &self,
        scan: &ScanConfig,
    ) -> impl Future<Output = Result<Vec<PathBuf>, WorkspaceError>> + Send;

    fn read(&self, path: &Path) -> impl Future<Output = io::Result<String>> + Send;

    fn write(&self, path: &Path, text: &str) -> impl Future<Output = io::Result<()>> + Send;

    /// The path this store knows `path` by: relative paths resolve against
    /// the root and `.`/`..` components are collapsed.
    fn locate(&self, path: &Path) -> PathBuf {
        normalize(&self.root().join(path))
    }
}

/// The filesystem under a workspace root.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// A relative root is taken from the current directory.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
        Self {
            root: normalize(&root),
        }
    }
}

impl FileStore for DiskStore {
    fn root(&self) -> &Path {
        &self.root
    }

    fn list_candidates(
        &self,
        scan: &ScanConfig,
    ) -> impl Future<Output = Result<Vec<PathBuf>, WorkspaceError>> + Send {
        let root = self.root.clone();
        let scan = scan.clone();
        async move {
            if !tokio::fs::metadata(&root).await.is_ok_and(|m| m.is_dir()) {
                return Err(WorkspaceError::MissingRoot { root });
            }
            let files = tokio::task::spawn_blocking(move || walk(&root, &scan)).await?;
            Ok(files)
        }
    }

    fn read(&self, path: &Path) -> impl Future<Output = io::Result<String>> + Send {
        let path = path.to_path_buf();
        async move { tokio::fs::read_to_string(&path).await }
    }

    fn write(&self, path: &Path, text: &str) -> impl Future<Output = io::Result<()>> + Send {
        let path = path.to_path_buf();
        let text = text.to_string();
        async move { tokio::fs::write(&path, text).await }
    }
}

fn walk(root: &Path, scan: &ScanConfig) -> Vec<PathBuf> {
    let filter = scan.clone();
    let walker = ignore::WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            entry.depth() == 0
                || !is_dir
                || !filter.is_excluded_dir(&entry.file_name().to_string_lossy())
        })
        .build();

    let mut files = Vec::new();
    for entry in walker.flatten() {
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        if scan.allows_extension(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    cap(files, scan.max_files)
}

fn cap(mut files: Vec<PathBuf>, max_files: usize) -> Vec<PathBuf> {
    if files.len() > max_files {
        tracing::warn!(
            target: "classmap::workspace",
            found = files.len(),
            max_files,
            "candidate set truncated"
        );
        files.truncate(max_files);
    }
    files
}

/// An in-memory file tree.
///
/// Reads and writes can be made to fail per path, and every successful write
/// is recorded in order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    root: PathBuf,
    inner: Mutex<MemoryFiles>,
}

#[derive(Debug, Default)]
struct MemoryFiles {
    files: BTreeMap<PathBuf, String>,
    writes: Vec<PathBuf>,
    failing_reads: BTreeSet<PathBuf>,
    failing_writes: BTreeSet<PathBuf>,
}

impl MemoryStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            inner: Mutex::default(),
        }
    }

    /// Add a file, relative paths being taken from the root.
    pub fn with_file(self, path: impl AsRef<Path>, text: impl Into<String>) -> Self {
        self.insert(path, text);
        self
    }

    pub fn insert(&self, path: impl AsRef<Path>, text: impl Into<String>) {
        let path = self.root.join(path);
        self.lock().files.insert(path, text.into());
    }

    /// Current contents of a file.
    pub fn get(&self, path: impl AsRef<Path>) -> Option<String> {
        let path = self.root.join(path);
        self.lock().files.get(&path).cloned()
    }

    /// Paths written so far, in order.
    pub fn writes(&self) -> Vec<PathBuf> {
        self.lock().writes.clone()
    }

    pub fn fail_reads(&self, path: impl AsRef<Path>) {
        let path = self.root.join(path);
        self.lock().failing_reads.insert(path);
    }

    pub fn fail_writes(&self, path: impl AsRef<Path>) {
        let path = self.root.join(path);
        self.lock().failing_writes.insert(path);
    }

    fn lock(&self) -> MutexGuard<'_, MemoryFiles> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl FileStore for MemoryStore {
    fn root(&self) -> &Path {
        &self.root
    }

    fn list_candidates(
        &self,
        scan: &ScanConfig,
    ) -> impl Future<Output = Result<Vec<PathBuf>, WorkspaceError>> + Send {
        let files: Vec<PathBuf> = self
            .lock()
            .files
            .keys()
            .filter(|path| scan.allows_extension(path))
            .filter(|path| {
                let relative = path.strip_prefix(&self.root).unwrap_or(path);
                !relative.parent().is_some_and(|dir| {
                    dir.components()
                        .any(|c| scan.is_excluded_dir(&c.as_os_str().to_string_lossy()))
                })
            })
            .cloned()
            .collect();
        let files = cap(files, scan.max_files);
        async move { Ok(files) }
    }

    fn read(&self, path: &Path) -> impl Future<Output = io::Result<String>> + Send {
        let result = {
            let inner = self.lock();
            if inner.failing_reads.contains(path) {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "read refused"))
            } else {
                inner
                    .files
                    .get(path)
                    .cloned()
                    .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
            }
        };
        async move { result }
    }

    fn write(&self, path: &Path, text: &str) -> impl Future<Output = io::Result<()>> + Send {
        let result = {
            let mut inner = self.lock();
            if inner.failing_writes.contains(path) {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "write refused"))
            } else {
                inner.files.insert(path.to_path_buf(), text.to_string());
                inner.writes.push(path.to_path_buf());
                Ok(())
            }
        };
        async move { result }
    }
}

/// Collapse `.` and `..` components without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Local scripts a markup document loads with `<script src>`.
///
/// Sources resolve against the document's directory, or against `root` when
/// they start with `/`. Remote and protocol-relative URLs are ignored.
pub fn linked_scripts(html: &str, document: &Path, root: &Path) -> Vec<PathBuf> {
    static RE_SCRIPT_SRC: OnceLock<Regex> = OnceLock::new();
    let re = RE_SCRIPT_SRC.get_or_init(|| {
        Regex::new(r#"(?i)<script\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#)
            .expect("script src pattern is valid")
    });

    let base = document.parent().unwrap_or(root);
    let mut scripts = Vec::new();
    for caps in re.captures_iter(html) {
        let Some(src) = caps.get(1).map(|m| m.as_str().trim()) else {
            continue;
        };
        let lower = src.to_ascii_lowercase();
        if src.starts_with("//") || lower.starts_with("http:") || lower.starts_with("https:") {
            continue;
        }
        let src = src.split(['?', '#']).next().unwrap_or(src);
        if src.is_empty() {
            continue;
        }
        let path = match src.strip_prefix('/') {
            Some(rooted) => root.join(rooted),
            None => base.join(src),
        };
        let path = normalize(&path);
        if !scripts.contains(&path) {
            scripts.push(path);
        }
    }
    scripts
}

/// Deterministic search order: the active document, then the scripts it
/// links, then everything else in path order.
pub fn order_candidates(
    listed: Vec<PathBuf>,
    active: Option<&Path>,
    linked: &[PathBuf],
) -> Vec<PathBuf> {
    let mut ordered: Vec<PathBuf> = Vec::with_capacity(listed.len() + 1 + linked.len());
    let mut seen = BTreeSet::new();
    let mut push = |path: PathBuf, ordered: &mut Vec<PathBuf>| {
        if seen.insert(normalize(&path)) {
            ordered.push(path);
        }
    };

    if let Some(active) = active {
        push(active.to_path_buf(), &mut ordered);
    }
    for script in linked {
        push(script.clone(), &mut ordered);
    }
    let mut rest = listed;
    rest.sort();
    for path in rest {
        push(path, &mut ordered);
    }
    ordered
}

/// Compare two paths after lexical normalisation.
pub fn same_file(a: &Path, b: &Path) -> bool {
    normalize(a) == normalize(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_kinds() {
        assert_eq!(FileKind::of(Path::new("a/index.HTML")), Some(FileKind::Markup));
        assert_eq!(FileKind::of(Path::new("App.vue")), Some(FileKind::Component));
        assert_eq!(FileKind::of(Path::new("main.tsx")), Some(FileKind::Script));
        assert_eq!(FileKind::of(Path::new("style.css")), None);
        assert!(FileKind::Component.is_markup_like() && FileKind::Component.is_script_like());
        assert!(!FileKind::Script.is_markup_like());
    }

    #[test]
    fn test_linked_scripts() {
        let html = r#"<script src="./app.js"></script>
<script type="module" src="/lib/ui.js?v=2"></script>
<script src="https://cdn.tailwindcss.com"></script>
<script src="//cdn.example.com/x.js"></script>
<script src="../shared/util.js"></script>"#;
        let scripts = linked_scripts(html, Path::new("/ws/pages/index.html"), Path::new("/ws"));
        assert_eq!(
            scripts,
            vec![
                PathBuf::from("/ws/pages/app.js"),
                PathBuf::from("/ws/lib/ui.js"),
                PathBuf::from("/ws/shared/util.js"),
            ]
        );
    }

    #[test]
    fn test_order_candidates() {
        let listed = vec![
            PathBuf::from("/ws/z.js"),
            PathBuf::from("/ws/a.js"),
            PathBuf::from("/ws/index.html"),
            PathBuf::from("/ws/app.js"),
        ];
        let ordered = order_candidates(
            listed,
            Some(Path::new("/ws/index.html")),
            &[PathBuf::from("/ws/app.js")],
        );
        assert_eq!(
            ordered,
            vec![
                PathBuf::from("/ws/index.html"),
                PathBuf::from("/ws/app.js"),
                PathBuf::from("/ws/a.js"),
                PathBuf::from("/ws/z.js"),
            ]
        );
    }

    #[tokio::test]
    async fn test_memory_store_filters_and_fails() {
        let store = MemoryStore::new("/ws")
            .with_file("index.html", "<p></p>")
            .with_file("node_modules/lib/index.js", "x")
            .with_file("README.md", "# hi")
            .with_file("src/app.js", "y");
        let listed = store.list_candidates(&ScanConfig::default()).await.unwrap();
        assert_eq!(
            listed,
            vec![PathBuf::from("/ws/index.html"), PathBuf::from("/ws/src/app.js")]
        );

        store.fail_writes("src/app.js");
        assert!(store.write(Path::new("/ws/src/app.js"), "z").await.is_err());
        store.write(Path::new("/ws/index.html"), "<b></b>").await.unwrap();
        assert_eq!(store.get("index.html").as_deref(), Some("<b></b>"));
        assert_eq!(store.writes(), vec![PathBuf::from("/ws/index.html")]);

        store.fail_reads("index.html");
        assert!(store.read(Path::new("/ws/index.html")).await.is_err());
    }

    #[tokio::test]
    async fn test_disk_store_walk() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join("dist")).unwrap();
        std::fs::write(root.join("index.html"), "<p></p>").unwrap();
        std::fs::write(root.join("src/app.js"), "x").unwrap();
        std::fs::write(root.join("dist/bundle.js"), "y").unwrap();
        std::fs::write(root.join("notes.txt"), "z").unwrap();

        let store = DiskStore::new(root);
        let listed = store.list_candidates(&ScanConfig::default()).await.unwrap();
        assert_eq!(listed, vec![root.join("index.html"), root.join("src/app.js")]);

        let mut capped = ScanConfig::default();
        capped.max_files = 1;
        assert_eq!(store.list_candidates(&capped).await.unwrap().len(), 1);
    }

    #[test]
    fn test_locate_resolves_against_root() {
        let store = MemoryStore::new("/ws");
        assert_eq!(store.locate(Path::new("src/../index.html")), PathBuf::from("/ws/index.html"));
        assert_eq!(store.locate(Path::new("/other/./a.js")), PathBuf::from("/other/a.js"));
    }

    #[test]
    fn test_disk_store_root_is_absolute() {
        let cwd = std::env::current_dir().unwrap();
        let store = DiskStore::new("./site/../web");
        assert_eq!(store.root(), cwd.join("web"));
        assert_eq!(store.locate(Path::new("index.html")), cwd.join("web/index.html"));
    }

    #[tokio::test]
    async fn test_disk_store_missing_root() {
        let store = DiskStore::new("/definitely/not/here/classmap");
        assert!(matches!(
            store.list_candidates(&ScanConfig::default()).await,
            Err(WorkspaceError::MissingRoot { .. })
        ));
    }
}
