//! Language detection table: one row per grammar.
//!
//! Adding a language means adding a row here; the analyzer itself is
//! grammar-agnostic and only consults the node kind lists below.

use crate::language::Language;

/// Node-kind vocabulary of one tree-sitter grammar
#[derive(Debug)]
pub struct SyntaxProfile {
    pub language: Language,
    grammar: fn() -> tree_sitter::Language,
    /// Top-level statements that form the imports chunk
    pub import_kinds: &'static [&'static str],
    /// Declarations that become one `class` chunk (methods included)
    pub class_kinds: &'static [&'static str],
    /// Free-standing functions
    pub function_kinds: &'static [&'static str],
    /// Members a class is split into when it exceeds the ceiling
    pub method_kinds: &'static [&'static str],
    /// Wrapper nodes and the field holding the real declaration
    pub wrappers: &'static [(&'static str, &'static str)],
    /// Nodes that attach to the following unit instead of forming one
    pub trivia_kinds: &'static [&'static str],
    /// Declarations that act as imports when they have no body (`mod foo;`)
    pub bodiless_imports: &'static [&'static str],
}

impl SyntaxProfile {
    pub fn grammar(&self) -> tree_sitter::Language {
        (self.grammar)()
    }

    pub fn is_trivia(&self, kind: &str) -> bool {
        self.trivia_kinds.contains(&kind) || kind.ends_with("comment")
    }
}

fn rust_grammar() -> tree_sitter::Language {
    tree_sitter_rust::LANGUAGE.into()
}

fn python_grammar() -> tree_sitter::Language {
    tree_sitter_python::LANGUAGE.into()
}

fn javascript_grammar() -> tree_sitter::Language {
    tree_sitter_javascript::LANGUAGE.into()
}

fn typescript_grammar() -> tree_sitter::Language {
    tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
}

fn tsx_grammar() -> tree_sitter::Language {
    tree_sitter_typescript::LANGUAGE_TSX.into()
}

static RUST: SyntaxProfile = SyntaxProfile {
    language: Language::Rust,
    grammar: rust_grammar,
    import_kinds: &["use_declaration", "extern_crate_declaration"],
    class_kinds: &[
        "struct_item",
        "enum_item",
        "union_item",
        "trait_item",
        "impl_item",
        "mod_item",
    ],
    function_kinds: &["function_item"],
    method_kinds: &["function_item", "function_signature_item"],
    wrappers: &[],
    trivia_kinds: &["attribute_item", "inner_attribute_item"],
    bodiless_imports: &["mod_item"],
};

static PYTHON: SyntaxProfile = SyntaxProfile {
    language: Language::Python,
    grammar: python_grammar,
    import_kinds: &[
        "import_statement",
        "import_from_statement",
        "future_import_statement",
    ],
    class_kinds: &["class_definition"],
    function_kinds: &["function_definition"],
    method_kinds: &["function_definition"],
    wrappers: &[("decorated_definition", "definition")],
    trivia_kinds: &[],
    bodiless_imports: &[],
};

const ECMA_IMPORTS: &[&str] = &["import_statement"];
const ECMA_FUNCTIONS: &[&str] = &["function_declaration", "generator_function_declaration"];
const ECMA_WRAPPERS: &[(&str, &str)] = &[("export_statement", "declaration")];

static JAVASCRIPT: SyntaxProfile = SyntaxProfile {
    language: Language::JavaScript,
    grammar: javascript_grammar,
    import_kinds: ECMA_IMPORTS,
    class_kinds: &["class_declaration"],
    function_kinds: ECMA_FUNCTIONS,
    method_kinds: &["method_definition"],
    wrappers: ECMA_WRAPPERS,
    trivia_kinds: &[],
    bodiless_imports: &[],
};

const TS_CLASSES: &[&str] = &[
    "class_declaration",
    "abstract_class_declaration",
    "interface_declaration",
    "enum_declaration",
    "internal_module",
];
const TS_FUNCTIONS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "function_signature",
];
const TS_METHODS: &[&str] = &[
    "method_definition",
    "method_signature",
    "abstract_method_signature",
];

static TYPESCRIPT: SyntaxProfile = SyntaxProfile {
    language: Language::TypeScript,
    grammar: typescript_grammar,
    import_kinds: ECMA_IMPORTS,
    class_kinds: TS_CLASSES,
    function_kinds: TS_FUNCTIONS,
    method_kinds: TS_METHODS,
    wrappers: ECMA_WRAPPERS,
    trivia_kinds: &[],
    bodiless_imports: &[],
};

static TSX: SyntaxProfile = SyntaxProfile {
    language: Language::Tsx,
    grammar: tsx_grammar,
    import_kinds: ECMA_IMPORTS,
    class_kinds: TS_CLASSES,
    function_kinds: TS_FUNCTIONS,
    method_kinds: TS_METHODS,
    wrappers: ECMA_WRAPPERS,
    trivia_kinds: &[],
    bodiless_imports: &[],
};

pub(crate) fn lookup(language: Language) -> Option<&'static SyntaxProfile> {
    match language {
        Language::Rust => Some(&RUST),
        Language::Python => Some(&PYTHON),
        Language::JavaScript => Some(&JAVASCRIPT),
        Language::TypeScript => Some(&TYPESCRIPT),
        Language::Tsx => Some(&TSX),
        _ => None,
    }
}
