use crate::error::{ChunkerError, Result};
use crate::profile::SyntaxProfile;
use tree_sitter::{Node, Parser};

/// Category of a top-level unit before size limits are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnitKind {
    Imports,
    Class,
    Function,
    Other,
}

/// A member inside a class body, used as a split point for oversized classes
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Member {
    pub name: Option<String>,
    /// Start of the member including attached comments/attributes
    pub start: usize,
}

/// One top-level unit. After [`AstAnalyzer::units`] returns, units are
/// sorted, non-overlapping and cover `0..content.len()` exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Unit {
    pub kind: UnitKind,
    pub name: Option<String>,
    pub start: usize,
    pub end: usize,
    pub members: Vec<Member>,
}

/// AST-based analyzer producing top-level semantic units
pub(crate) struct AstAnalyzer {
    profile: &'static SyntaxProfile,
    parser: Parser,
}

impl AstAnalyzer {
    pub fn new(profile: &'static SyntaxProfile) -> Result<Self> {
        let mut parser = Parser::new();
        parser
            .set_language(&profile.grammar())
            .map_err(|e| ChunkerError::tree_sitter(format!("failed to set language: {e}")))?;
        Ok(Self { profile, parser })
    }

    /// Parse `content` and return gapless top-level units.
    ///
    /// Fails when the parser yields no tree or the tree contains syntax errors.
    pub fn units(&mut self, content: &str) -> Result<Vec<Unit>> {
        let tree = self
            .parser
            .parse(content, None)
            .ok_or_else(|| ChunkerError::tree_sitter("parser produced no tree"))?;
        let root = tree.root_node();
        if root.has_error() {
            let at = first_error(root).unwrap_or(0);
            return Err(ChunkerError::tree_sitter(format!("syntax error near byte {at}")));
        }

        let mut units: Vec<Unit> = Vec::new();
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            if self.profile.is_trivia(child.kind()) {
                continue;
            }
            let unit = self.classify(child, content);
            match units.last_mut() {
                Some(prev)
                    if prev.kind == unit.kind
                        && matches!(unit.kind, UnitKind::Imports | UnitKind::Other) =>
                {
                    prev.end = unit.end;
                }
                _ => units.push(unit),
            }
        }

        fill_gaps(&mut units, content.len());
        Ok(units)
    }

    fn classify(&self, node: Node<'_>, content: &str) -> Unit {
        let inner = self.unwrap_declaration(node);
        let kind = match inner {
            Some(inner) => self.unit_kind(node, inner),
            None if is_reexport(node) => UnitKind::Imports,
            None => UnitKind::Other,
        };
        let name = match (kind, inner) {
            (UnitKind::Class | UnitKind::Function, Some(inner)) => symbol_name(inner, content),
            _ => None,
        };
        let members = match (kind, inner) {
            (UnitKind::Class, Some(inner)) => self.members(inner, content, name.as_deref()),
            _ => Vec::new(),
        };
        Unit {
            kind,
            name,
            start: node.start_byte(),
            end: node.end_byte(),
            members,
        }
    }

    fn unwrap_declaration<'t>(&self, node: Node<'t>) -> Option<Node<'t>> {
        for (wrapper, field) in self.profile.wrappers {
            if node.kind() == *wrapper {
                return node.child_by_field_name(field);
            }
        }
        Some(node)
    }

    fn unit_kind(&self, outer: Node<'_>, inner: Node<'_>) -> UnitKind {
        let kind = inner.kind();
        if self.profile.import_kinds.contains(&kind) {
            return UnitKind::Imports;
        }
        if self.profile.bodiless_imports.contains(&kind)
            && inner.child_by_field_name("body").is_none()
        {
            return UnitKind::Imports;
        }
        if self.profile.class_kinds.contains(&kind) {
            return UnitKind::Class;
        }
        if self.profile.function_kinds.contains(&kind) {
            return UnitKind::Function;
        }
        if is_reexport(outer) {
            return UnitKind::Imports;
        }
        UnitKind::Other
    }

    fn members(&self, class: Node<'_>, content: &str, owner: Option<&str>) -> Vec<Member> {
        let Some(body) = class.child_by_field_name("body") else {
            return Vec::new();
        };
        let mut members = Vec::new();
        let mut pending_trivia: Option<usize> = None;
        let mut cursor = body.walk();
        for child in body.named_children(&mut cursor) {
            if self.profile.is_trivia(child.kind()) {
                pending_trivia.get_or_insert(child.start_byte());
                continue;
            }
            let Some(inner) = self.unwrap_declaration(child) else {
                pending_trivia = None;
                continue;
            };
            if self.profile.method_kinds.contains(&inner.kind()) {
                let name = symbol_name(inner, content).map(|name| match owner {
                    Some(owner) => format!("{owner}.{name}"),
                    None => name,
                });
                members.push(Member {
                    name,
                    start: pending_trivia.unwrap_or(child.start_byte()),
                });
            }
            pending_trivia = None;
        }
        members
    }
}

/// Extend each unit backwards over the trivia before it; the last unit
/// also takes everything up to end of file.
fn fill_gaps(units: &mut [Unit], len: usize) {
    let mut cursor = 0;
    for unit in units.iter_mut() {
        unit.start = cursor;
        cursor = unit.end;
    }
    if let Some(last) = units.last_mut() {
        last.end = len;
    }
}

fn symbol_name(node: Node<'_>, content: &str) -> Option<String> {
    ["name", "type"]
        .iter()
        .find_map(|field| node.child_by_field_name(field))
        .and_then(|name| name.utf8_text(content.as_bytes()).ok())
        .map(ToString::to_string)
}

/// `export { x } from './y'` style statements
fn is_reexport(node: Node<'_>) -> bool {
    node.kind() == "export_statement" && node.child_by_field_name("source").is_some()
}

fn first_error(node: Node<'_>) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_byte());
    }
    let mut cursor = node.walk();
    let children: Vec<_> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|child| child.has_error())
        .find_map(first_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::Language;
    use pretty_assertions::assert_eq;

    fn analyze(language: Language, code: &str) -> Vec<Unit> {
        let profile = language.syntax_profile().unwrap();
        AstAnalyzer::new(profile).unwrap().units(code).unwrap()
    }

    fn kinds(units: &[Unit]) -> Vec<UnitKind> {
        units.iter().map(|u| u.kind).collect()
    }

    #[test]
    fn python_units_cover_file() {
        let code = "import os\nfrom sys import path\n\n\nclass A:\n    def m(self):\n        return 1\n\n# helper\ndef f():\n    pass\n\nX = 1\n";
        let units = analyze(Language::Python, code);
        assert_eq!(
            kinds(&units),
            vec![
                UnitKind::Imports,
                UnitKind::Class,
                UnitKind::Function,
                UnitKind::Other
            ]
        );
        assert_eq!(units[0].start, 0);
        assert_eq!(units.last().unwrap().end, code.len());
        for pair in units.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(units[1].name.as_deref(), Some("A"));
        assert_eq!(units[1].members[0].name.as_deref(), Some("A.m"));
        assert!(code[units[2].start..units[2].end].starts_with("\n\n# helper\ndef f"));
    }

    #[test]
    fn python_decorated_definitions_are_unwrapped() {
        let code = "@cache\ndef f():\n    return 1\n";
        let units = analyze(Language::Python, code);
        assert_eq!(kinds(&units), vec![UnitKind::Function]);
        assert_eq!(units[0].name.as_deref(), Some("f"));
    }

    #[test]
    fn rust_attributes_attach_to_following_item() {
        let code = "use std::fmt;\nmod util;\n\n#[derive(Debug)]\nstruct S;\n\nimpl S {\n    /// doc\n    fn a(&self) {}\n    fn b(&self) {}\n}\n";
        let units = analyze(Language::Rust, code);
        assert_eq!(
            kinds(&units),
            vec![UnitKind::Imports, UnitKind::Class, UnitKind::Class]
        );
        assert!(code[units[1].start..units[1].end].contains("#[derive(Debug)]"));
        assert_eq!(units[2].name.as_deref(), Some("S"));
        let members: Vec<_> = units[2].members.iter().map(|m| m.name.clone().unwrap()).collect();
        assert_eq!(members, vec!["S.a".to_string(), "S.b".to_string()]);
        assert!(code[units[2].members[0].start..].starts_with("/// doc"));
    }

    #[test]
    fn javascript_exports_are_classified_by_declaration() {
        let code = "import x from './x';\nexport function run() {}\nexport class C { go() {} }\nexport { y } from './y';\nconst z = 1;\n";
        let units = analyze(Language::JavaScript, code);
        assert_eq!(
            kinds(&units),
            vec![
                UnitKind::Imports,
                UnitKind::Function,
                UnitKind::Class,
                UnitKind::Imports,
                UnitKind::Other
            ]
        );
        assert_eq!(units[1].name.as_deref(), Some("run"));
        assert_eq!(units[2].members[0].name.as_deref(), Some("C.go"));
    }

    #[test]
    fn syntax_errors_are_reported() {
        let profile = Language::Python.syntax_profile().unwrap();
        let err = AstAnalyzer::new(profile)
            .unwrap()
            .units("def broken(:\n    pass\n")
            .unwrap_err();
        match err {
            ChunkerError::TreeSitterError(reason) => {
                assert!(reason.starts_with("syntax error near byte"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
