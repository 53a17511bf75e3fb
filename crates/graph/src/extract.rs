use crate::resolve::{ancestor, join, parent_dir, rust_crate_root, rust_module_dir};
use crate::types::{Candidate, FileReferences, ImportSpec};
use context_code_chunker::Language;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// Identifiers shorter than this never produce symbol references
pub const MIN_SYMBOL_LEN: usize = 3;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("valid identifier regex"));

static PY_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*import[ \t]+([^\n#;]+)").expect("valid regex"));
static PY_FROM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*from[ \t]+(\.*)([\w.]*)[ \t]+import[ \t]+(\([^)]*\)|[^\n#;]+)")
        .expect("valid regex")
});

static RS_MOD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?[ \t]+)?mod[ \t]+([A-Za-z_][A-Za-z0-9_]*)[ \t]*;")
        .expect("valid regex")
});
static RS_USE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?[ \t]+)?use[ \t]+([^;]+);").expect("valid regex")
});

static ES_FROM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:^|[\s;])(?:import|export)\b[^'";]*?\bfrom\s*['"]([^'"]+)['"]"#)
        .expect("valid regex")
});
static ES_BARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^\s*import\s*['"]([^'"]+)['"]"#).expect("valid regex"));
static ES_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b(?:require|import)\(\s*['"]([^'"]+)['"]\s*\)"#).expect("valid regex")
});

static C_INCLUDE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^[ \t]*#[ \t]*include[ \t]*"([^"]+)""#).expect("valid regex"));

static JVM_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*import[ \t]+(?:static[ \t]+)?([A-Za-z_][\w.]*?)(\.\*)?[ \t]*;?[ \t\r]*$")
        .expect("valid regex")
});

const ES_EXTENSIONS: &[&str] = &[
    "", ".ts", ".tsx", ".d.ts", ".js", ".jsx", ".mjs", ".cjs", "/index.ts", "/index.tsx",
    "/index.js", "/index.jsx",
];

impl FileReferences {
    /// Derive a file's outgoing references from its content.
    ///
    /// `defines` lists the top-level symbols the file declares (typically the
    /// names of its class and function chunks).
    pub fn extract<I, S>(path: &str, content: &str, language: Language, defines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let imports = match language {
            Language::Python => python_imports(path, content),
            Language::Rust => rust_imports(path, content),
            lang if lang.is_ecmascript() => ecmascript_imports(path, content),
            Language::C | Language::Cpp => c_includes(path, content),
            Language::Java | Language::Kotlin => jvm_imports(content, language),
            _ => Vec::new(),
        };
        let identifiers = IDENTIFIER
            .find_iter(content)
            .map(|m| m.as_str())
            .filter(|ident| ident.len() >= MIN_SYMBOL_LEN)
            .map(ToString::to_string)
            .collect();
        Self {
            path: path.to_string(),
            language,
            imports,
            identifiers,
            defines: defines.into_iter().map(Into::into).collect(),
        }
    }
}

fn exact(paths: impl IntoIterator<Item = Option<String>>) -> Vec<Candidate> {
    let mut seen = BTreeSet::new();
    paths
        .into_iter()
        .flatten()
        .filter(|path| seen.insert(path.clone()))
        .map(Candidate::Exact)
        .collect()
}

fn python_imports(path: &str, content: &str) -> Vec<ImportSpec> {
    let dir = parent_dir(path);
    let mut specs = Vec::new();

    for caps in PY_IMPORT.captures_iter(content) {
        for module in caps[1].split(',') {
            let module = module.split_whitespace().next().unwrap_or("");
            if module.is_empty() {
                continue;
            }
            let rel = module.replace('.', "/");
            let candidates = exact([dir, "", "src"].into_iter().flat_map(|root| {
                [
                    join(root, &format!("{rel}.py")),
                    join(root, &format!("{rel}/__init__.py")),
                ]
            }));
            specs.push(ImportSpec {
                raw: module.to_string(),
                candidates,
            });
        }
    }

    for caps in PY_FROM.captures_iter(content) {
        let dots = caps[1].len();
        let rel = caps[2].replace('.', "/");
        let roots: Vec<String> = if dots > 0 {
            ancestor(dir, dots - 1).into_iter().collect()
        } else {
            vec![dir.to_string(), String::new(), "src".to_string()]
        };
        let names: Vec<&str> = caps[3]
            .trim_matches(|c| c == '(' || c == ')')
            .split(',')
            .filter_map(|name| name.split_whitespace().next())
            .filter(|name| *name != "*")
            .collect();
        let module_base = |root: &str| {
            if rel.is_empty() {
                Some(root.to_string())
            } else {
                join(root, &rel)
            }
        };

        let mut emit = |raw: String, submodule: Option<&str>| {
            let mut paths = Vec::new();
            for root in &roots {
                let Some(base) = module_base(root) else { continue };
                if let Some(name) = submodule {
                    paths.push(join(&base, &format!("{name}.py")));
                    paths.push(join(&base, &format!("{name}/__init__.py")));
                }
                if !rel.is_empty() {
                    paths.push(Some(format!("{base}.py")));
                    paths.push(join(&base, "__init__.py"));
                }
            }
            let candidates = exact(paths);
            if !candidates.is_empty() {
                specs.push(ImportSpec { raw, candidates });
            }
        };

        let module = format!("{}{}", &caps[1], &caps[2]);
        if names.is_empty() {
            emit(module, None);
        } else {
            for name in names {
                let raw = if module.ends_with('.') {
                    format!("{module}{name}")
                } else {
                    format!("{module}.{name}")
                };
                emit(raw, Some(name));
            }
        }
    }
    specs
}

fn rust_imports(path: &str, content: &str) -> Vec<ImportSpec> {
    let module_dir = rust_module_dir(path);
    let crate_root = rust_crate_root(path);
    let mut specs = Vec::new();

    for caps in RS_MOD.captures_iter(content) {
        let name = &caps[1];
        specs.push(ImportSpec {
            raw: format!("mod {name}"),
            candidates: exact([
                join(&module_dir, &format!("{name}.rs")),
                join(&module_dir, &format!("{name}/mod.rs")),
            ]),
        });
    }

    for caps in RS_USE.captures_iter(content) {
        for use_path in expand_use_tree(caps[1].trim()) {
            let segments: Vec<&str> = use_path.split("::").map(str::trim).collect();
            let (base, rest) = match segments.first().copied() {
                Some("crate") => (Some(crate_root.clone()), &segments[1..]),
                Some("self") => (Some(module_dir.clone()), &segments[1..]),
                Some("super") => {
                    let supers = segments.iter().take_while(|s| **s == "super").count();
                    (ancestor(&module_dir, supers), &segments[supers..])
                }
                _ => (None, &segments[..]),
            };
            let Some(base) = base else { continue };
            let mut paths = Vec::new();
            for len in (1..=rest.len()).rev() {
                let rel = rest[..len].join("/");
                paths.push(join(&base, &format!("{rel}.rs")));
                paths.push(join(&base, &format!("{rel}/mod.rs")));
            }
            let candidates = exact(paths);
            if !candidates.is_empty() {
                specs.push(ImportSpec {
                    raw: use_path,
                    candidates,
                });
            }
        }
    }
    specs
}

/// Flatten `a::{b, c::d}` one level into `a::b`, `a::c::d`
fn expand_use_tree(tree: &str) -> Vec<String> {
    let tree = tree.split(" as ").next().unwrap_or(tree).trim();
    match tree.find('{') {
        Some(open) => {
            let prefix = tree[..open].trim_end_matches("::").trim();
            let inner = tree[open + 1..].trim_end_matches('}');
            inner
                .split(',')
                .map(|item| item.split(" as ").next().unwrap_or(item).trim())
                .filter(|item| !item.is_empty() && !item.contains('{') && !item.contains('}'))
                .map(|item| {
                    if item == "self" {
                        prefix.to_string()
                    } else {
                        format!("{prefix}::{item}")
                    }
                })
                .collect()
        }
        None => vec![tree.trim_end_matches("::*").to_string()],
    }
}

fn ecmascript_imports(path: &str, content: &str) -> Vec<ImportSpec> {
    let dir = parent_dir(path);
    let mut seen = BTreeSet::new();
    let mut specs = Vec::new();
    let sources = ES_FROM
        .captures_iter(content)
        .chain(ES_BARE.captures_iter(content))
        .chain(ES_CALL.captures_iter(content));
    for caps in sources {
        let source = caps[1].to_string();
        if !seen.insert(source.clone()) {
            continue;
        }
        let base = if let Some(rooted) = source.strip_prefix('/') {
            crate::resolve::normalize(rooted)
        } else if source.starts_with('.') {
            join(dir, &source)
        } else {
            None
        };
        let Some(base) = base else { continue };
        let stripped = base
            .strip_suffix(".js")
            .or_else(|| base.strip_suffix(".jsx"))
            .map(ToString::to_string);
        let mut paths: Vec<Option<String>> = ES_EXTENSIONS
            .iter()
            .map(|ext| Some(format!("{base}{ext}")))
            .collect();
        if let Some(stripped) = stripped {
            paths.push(Some(format!("{stripped}.ts")));
            paths.push(Some(format!("{stripped}.tsx")));
        }
        specs.push(ImportSpec {
            raw: source,
            candidates: exact(paths),
        });
    }
    specs
}

fn c_includes(path: &str, content: &str) -> Vec<ImportSpec> {
    let dir = parent_dir(path);
    C_INCLUDE
        .captures_iter(content)
        .map(|caps| {
            let header = &caps[1];
            ImportSpec {
                raw: header.to_string(),
                candidates: exact([
                    join(dir, header),
                    join("", header),
                    join("include", header),
                    join("src", header),
                ]),
            }
        })
        .filter(|spec| !spec.candidates.is_empty())
        .collect()
}

fn jvm_imports(content: &str, language: Language) -> Vec<ImportSpec> {
    let ext = if language == Language::Kotlin { "kt" } else { "java" };
    JVM_IMPORT
        .captures_iter(content)
        .filter(|caps| caps.get(2).is_none())
        .map(|caps| {
            let qualified = caps[1].trim_end_matches('.');
            let segments: Vec<&str> = qualified.split('.').collect();
            let mut candidates = vec![Candidate::Suffix(format!("{}.{ext}", segments.join("/")))];
            if segments.len() > 1 {
                // `import static pkg.Type.member`
                let owner = segments[..segments.len() - 1].join("/");
                candidates.push(Candidate::Suffix(format!("{owner}.{ext}")));
            }
            ImportSpec {
                raw: qualified.to_string(),
                candidates,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn exact_paths(spec: &ImportSpec) -> Vec<String> {
        spec.candidates
            .iter()
            .map(|c| match c {
                Candidate::Exact(p) | Candidate::Suffix(p) => p.clone(),
            })
            .collect()
    }

    #[test]
    fn python_absolute_and_relative_imports() {
        let refs = FileReferences::extract(
            "pkg/b.py",
            "import a, os.path as p\nfrom . import sibling\nfrom ..core.models import (User, Group)\n",
            Language::Python,
            Vec::<String>::new(),
        );
        let raws: Vec<_> = refs.imports.iter().map(|s| s.raw.as_str()).collect();
        assert_eq!(
            raws,
            vec!["a", "os.path", ".sibling", "..core.models.User", "..core.models.Group"]
        );
        assert_eq!(exact_paths(&refs.imports[0])[0], "pkg/a.py");
        assert!(exact_paths(&refs.imports[0]).contains(&"a.py".to_string()));
        assert_eq!(exact_paths(&refs.imports[2])[0], "pkg/sibling.py");
        assert!(refs.imports.iter().all(|spec| !spec.candidates.is_empty()));
    }

    #[test]
    fn python_relative_import_above_root_is_dropped() {
        let refs = FileReferences::extract(
            "b.py",
            "from .. import x\n",
            Language::Python,
            Vec::<String>::new(),
        );
        assert!(refs.imports.is_empty());
    }

    #[test]
    fn rust_mod_and_use_paths() {
        let refs = FileReferences::extract(
            "src/lib.rs",
            "mod net;\npub mod store;\nuse crate::net::{Client, tcp::Stream};\nuse std::fmt;\n",
            Language::Rust,
            Vec::<String>::new(),
        );
        let raws: Vec<_> = refs.imports.iter().map(|s| s.raw.as_str()).collect();
        assert_eq!(
            raws,
            vec!["mod net", "mod store", "crate::net::Client", "crate::net::tcp::Stream"]
        );
        assert_eq!(exact_paths(&refs.imports[0]), vec!["src/net.rs", "src/net/mod.rs"]);
        assert_eq!(exact_paths(&refs.imports[3])[0], "src/net/tcp/Stream.rs");
        assert!(exact_paths(&refs.imports[3]).contains(&"src/net.rs".to_string()));
    }

    #[test]
    fn ecmascript_relative_sources_only() {
        let refs = FileReferences::extract(
            "web/src/app.ts",
            "import { a } from './a';\nimport React from 'react';\nexport * from '../lib/util.js';\nconst c = require('./c');\nimport './side-effect';\n",
            Language::TypeScript,
            Vec::<String>::new(),
        );
        let raws: Vec<_> = refs.imports.iter().map(|s| s.raw.as_str()).collect();
        assert_eq!(raws, vec!["./a", "../lib/util.js", "./side-effect", "./c"]);
        assert!(exact_paths(&refs.imports[0]).contains(&"web/src/a.ts".to_string()));
        assert!(exact_paths(&refs.imports[1]).contains(&"web/lib/util.ts".to_string()));
    }

    #[test]
    fn jvm_imports_use_suffix_candidates() {
        let refs = FileReferences::extract(
            "app/src/main/java/com/acme/App.java",
            "import com.acme.util.Strings;\nimport java.util.*;\n",
            Language::Java,
            Vec::<String>::new(),
        );
        assert_eq!(refs.imports.len(), 1);
        assert_eq!(
            refs.imports[0].candidates[0],
            Candidate::Suffix("com/acme/util/Strings.java".to_string())
        );
    }

    #[test]
    fn identifiers_skip_short_names() {
        let refs =
            FileReferences::extract("x.py", "ab = compute_total(xs)\n", Language::Python, ["main"]);
        assert!(refs.identifiers.contains("compute_total"));
        assert!(!refs.identifiers.contains("ab"));
        assert!(refs.defines.contains("main"));
    }
}
