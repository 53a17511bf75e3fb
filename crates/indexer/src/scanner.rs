use crate::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

const DEFAULT_MAX_FILE_BYTES: u64 = 1_048_576; // 1 MB

/// What the scanner walks and what it leaves out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Files larger than this are never indexed
    pub max_file_bytes: u64,
    /// Glob patterns matched against repo-relative paths (`**/generated/**`)
    pub exclude: Vec<String>,
    /// Walk dot-files and dot-directories
    pub include_hidden: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            exclude: Vec::new(),
            include_hidden: false,
        }
    }
}

/// A file found by the scanner
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScannedFile {
    /// Repo-relative path with `/` separators; the identity used everywhere else
    pub relative: String,
    pub absolute: PathBuf,
}

/// Scanner for finding source files in a project
#[derive(Debug, Clone)]
pub struct FileScanner {
    root: PathBuf,
    options: ScanOptions,
    exclude: GlobSet,
    skip_dirs: Vec<PathBuf>,
}

impl FileScanner {
    pub fn new(root: impl AsRef<Path>, options: ScanOptions) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &options.exclude {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            root: root.as_ref().to_path_buf(),
            exclude: builder.build()?,
            options,
            skip_dirs: Vec::new(),
        })
    }

    /// Never descend into `dir` (the engine's own cache directory)
    #[must_use]
    pub fn skipping(mut self, dir: impl Into<PathBuf>) -> Self {
        self.skip_dirs.push(dir.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scan the project for source files (.gitignore aware), sorted by path
    pub fn scan(&self) -> Vec<ScannedFile> {
        let mut files = Vec::new();

        let root = self.root.clone();
        let skip_dirs = self.skip_dirs.clone();
        let exclude = self.exclude.clone();
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .hidden(!self.options.include_hidden)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .require_git(false);
        builder.filter_entry(move |entry| {
            let path = entry.path();
            if skip_dirs.iter().any(|dir| path.starts_with(dir)) {
                return false;
            }
            if Self::is_ignored_scope(path, &root) {
                return false;
            }
            relative_path(&root, path).map_or(true, |rel| rel.is_empty() || !exclude.is_match(&rel))
        });

        for result in builder.build() {
            match result {
                Ok(entry) => {
                    let Some(file_type) = entry.file_type() else {
                        continue;
                    };
                    if !file_type.is_file() {
                        continue;
                    }

                    let path = entry.path();
                    if let Ok(meta) = entry.metadata() {
                        if meta.len() > self.options.max_file_bytes {
                            log::debug!(
                                "Skipping large file {} ({} bytes > {})",
                                path.display(),
                                meta.len(),
                                self.options.max_file_bytes
                            );
                            continue;
                        }
                    }

                    if Self::is_noise_file(path) || !Self::is_source_file(path) {
                        continue;
                    }

                    let Some(relative) = relative_path(&self.root, path) else {
                        continue;
                    };
                    files.push(ScannedFile {
                        relative,
                        absolute: path.to_path_buf(),
                    });
                }
                Err(e) => log::warn!("Failed to read entry: {e}"),
            }
        }

        files.sort();
        log::debug!("Found {} source files under {}", files.len(), self.root.display());
        files
    }

    /// Check if file is a source code file
    fn is_source_file(path: &Path) -> bool {
        if let Some(file_name) = path.file_name().and_then(|name| name.to_str()) {
            if matches!(
                file_name,
                "Dockerfile" | "Makefile" | "makefile" | "Justfile" | "Gemfile"
            ) {
                return true;
            }
        }

        path.extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
    }

    fn is_ignored_scope(path: &Path, root: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(root) else {
            return false;
        };
        relative.components().any(|component| match component {
            Component::Normal(name) => {
                let lowered = name.to_string_lossy().to_lowercase();
                IGNORED_SCOPES.contains(&lowered.as_str())
            }
            _ => false,
        })
    }

    fn is_noise_file(path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| {
                NOISE_FILE_NAMES
                    .iter()
                    .any(|candidate| name.eq_ignore_ascii_case(candidate))
            })
    }
}

/// Repo-relative `/`-separated form of `path`, `None` outside the root
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Some(parts.join("/"))
}

const IGNORED_SCOPES: &[&str] = &[
    // VCS / tooling
    ".git",
    ".hg",
    ".svn",
    ".idea",
    ".vscode",
    // caches / builds
    ".cache",
    "node_modules",
    ".next",
    ".turbo",
    ".parcel-cache",
    ".nuxt",
    ".svelte-kit",
    "dist",
    "coverage",
    "target",
    ".terraform",
    ".venv",
    "venv",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    "__pycache__",
    // vendored code
    "vendor",
    "third_party",
    "third-party",
];

const NOISE_FILE_NAMES: &[&str] = &[
    "package-lock.json",
    "pnpm-lock.yaml",
    "yarn.lock",
    "Cargo.lock",
    "poetry.lock",
];

const SUPPORTED_EXTENSIONS: &[&str] = &[
    // General purpose languages
    "rs", "py", "pyi", "pyw", "js", "mjs", "cjs", "ts", "mts", "cts", "tsx", "jsx", "java", "kt",
    "kts", "go", "c", "h", "cpp", "cc", "cxx", "hpp", "hh", "hxx", "cs", "rb", "swift", "php",
    "scala", "dart", "zig", "lua", "ex", "exs", "clj",
    // Scripts
    "sh", "bash", "zsh", "fish", "ps1",
    // Docs
    "md", "mdx", "rst", "txt",
    // Config / data / infra
    "yaml", "yml", "json", "toml", "ini", "cfg", "conf", "gradle", "xml", "html", "css", "scss",
    "sql", "tf", "hcl", "proto",
];

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn relative(files: &[ScannedFile]) -> Vec<&str> {
        files.iter().map(|f| f.relative.as_str()).collect()
    }

    #[test]
    fn finds_sources_with_relative_sorted_paths() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("pkg/sub")).unwrap();
        fs::write(temp.path().join("pkg/sub/b.py"), "x = 1\n").unwrap();
        fs::write(temp.path().join("a.rs"), "fn main() {}\n").unwrap();
        fs::write(temp.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let files = FileScanner::new(temp.path(), ScanOptions::default()).unwrap().scan();
        assert_eq!(relative(&files), vec!["a.rs", "pkg/sub/b.py"]);
    }

    #[test]
    fn skips_ignored_directories_and_gitignored_paths() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("node_modules/dep")).unwrap();
        fs::create_dir_all(temp.path().join("generated")).unwrap();
        fs::write(temp.path().join("node_modules/dep/index.js"), "x").unwrap();
        fs::write(temp.path().join("generated/out.py"), "x = 1\n").unwrap();
        fs::write(temp.path().join(".gitignore"), "/generated\n").unwrap();
        fs::write(temp.path().join("src.rs"), "fn main() {}").unwrap();

        let files = FileScanner::new(temp.path(), ScanOptions::default()).unwrap().scan();
        assert_eq!(relative(&files), vec!["src.rs"]);
    }

    #[test]
    fn applies_size_limit_excludes_and_skip_dirs() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("fixtures")).unwrap();
        fs::create_dir_all(temp.path().join("cache")).unwrap();
        fs::write(temp.path().join("fixtures/data.json"), "{}").unwrap();
        fs::write(temp.path().join("cache/manifest.json"), "{}").unwrap();
        fs::write(temp.path().join("big.py"), "x".repeat(2_000)).unwrap();
        fs::write(temp.path().join("small.py"), "x = 1\n").unwrap();

        let options = ScanOptions {
            max_file_bytes: 1_000,
            exclude: vec!["fixtures/**".to_string()],
            include_hidden: false,
        };
        let files = FileScanner::new(temp.path(), options)
            .unwrap()
            .skipping(temp.path().join("cache"))
            .scan();
        assert_eq!(relative(&files), vec!["small.py"]);
    }

    #[test]
    fn rejects_invalid_globs() {
        let options = ScanOptions {
            exclude: vec!["a[".to_string()],
            ..ScanOptions::default()
        };
        assert!(FileScanner::new(".", options).is_err());
    }

    #[test]
    fn relative_paths_use_forward_slashes() {
        let root = Path::new("/repo");
        assert_eq!(
            relative_path(root, &root.join("a").join("b.rs")).as_deref(),
            Some("a/b.rs")
        );
        assert_eq!(relative_path(root, Path::new("/elsewhere/x.rs")), None);
    }
}
