//! Line checks run at each validation pass
//!
//! Three independent checks, in priority order:
//! 1. placeholders (incomplete output)
//! 2. forbidden constructs (dynamic evaluation, shell escapes)
//! 3. imports outside the allow-list
//!
//! Within one line the leftmost violation wins; equal positions fall back to
//! the priority order above.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Which check fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CheckKind {
    /// Stub left in place of real output (`TODO`, bare `pass`, `...`)
    Placeholder,
    /// Dynamic evaluation or shell escape
    Forbidden,
    /// Import of a module outside the base set and allow-list
    Import,
}

impl CheckKind {
    /// Label used in stop reasons
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Placeholder => "placeholder",
            Self::Forbidden => "forbidden pattern",
            Self::Import => "disallowed import",
        }
    }
}

/// One failing check on one line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Check that fired
    pub kind: CheckKind,
    /// Pattern label or module name
    pub matched: String,
    /// Offending line, trimmed
    pub line: String,
    /// Byte column of the match
    pub column: usize,
}

impl Violation {
    /// Human-readable stop reason
    #[must_use]
    pub fn reason(&self) -> String {
        match self.kind {
            CheckKind::Import => format!("disallowed import '{}': {}", self.matched, self.line),
            kind => format!("{} detected ({}): {}", kind.as_str(), self.matched, self.line),
        }
    }
}

struct Pattern {
    label: &'static str,
    regex: Regex,
}

fn compile(table: &[(&'static str, &str)]) -> Vec<Pattern> {
    table
        .iter()
        .filter_map(|&(label, src)| match Regex::new(src) {
            Ok(regex) => Some(Pattern { label, regex }),
            Err(e) => {
                tracing::error!(pattern = label, error = %e, "invalid check pattern");
                None
            }
        })
        .collect()
}

static PLACEHOLDERS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    compile(&[
        ("TODO", r"\bTODO\b"),
        ("FIXME", r"\bFIXME\b"),
        ("ellipsis", r"^\s*(\.\.\.|…)\s*$"),
        ("bare pass", r"^\s*pass\s*$"),
        ("not implemented", r"(?i)\bnot\s+(yet\s+)?implemented\b"),
        ("unimplemented", r"\b(unimplemented|todo)!\s*\("),
    ])
});

static FORBIDDEN: Lazy<Vec<Pattern>> = Lazy::new(|| {
    compile(&[
        ("eval", r"\beval\s*\("),
        ("exec", r"\bexec\s*\("),
        ("dynamic import", r"\b__import__\s*\("),
        ("os.system", r"\bos\.system\s*\("),
        ("os.popen", r"\bos\.popen\s*\("),
        ("shell=True", r"\bshell\s*=\s*True\b"),
        ("Runtime.exec", r"Runtime\.getRuntime\(\)\.exec\s*\("),
        ("child_process", r"\bchild_process\b"),
    ])
});

static IMPORTS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    compile(&[
        ("from", r"^\s*from\s+([A-Za-z_][\w.]*)\s+import\b"),
        ("import", r"^\s*import\s+([A-Za-z_][\w.]*)"),
        ("use", r"^\s*(?:pub\s+)?use\s+([A-Za-z_][\w:]*)"),
        ("require", r#"\brequire\(\s*['"]([^'"]+)['"]\s*\)"#),
    ])
});

/// Modules that are always permitted
const BASE_MODULES: &[&str] = &[
    // Rust
    "std", "core", "alloc", "crate", "self", "super",
    // Python standard library (common subset)
    "abc", "argparse", "asyncio", "base64", "collections", "contextlib", "copy", "csv",
    "dataclasses", "datetime", "decimal", "enum", "functools", "hashlib", "heapq", "io",
    "itertools", "json", "logging", "math", "os", "pathlib", "random", "re", "shutil",
    "string", "sys", "tempfile", "threading", "time", "typing", "unittest", "uuid",
    // Node core
    "fs", "path", "util", "events", "crypto", "http", "https", "url",
];

fn first_match(patterns: &[Pattern], line: &str, kind: CheckKind) -> Option<Violation> {
    patterns
        .iter()
        .filter_map(|p| {
            p.regex.find(line).map(|m| Violation {
                kind,
                matched: p.label.to_string(),
                line: line.trim().to_string(),
                column: m.start(),
            })
        })
        .min_by_key(|v| v.column)
}

fn root_of(module: &str) -> &str {
    module
        .split(|c| c == '.' || c == ':' || c == '/')
        .find(|s| !s.is_empty())
        .unwrap_or(module)
}

/// Whether `module` is permitted by the base set or the allow-list
///
/// `pkg.sub` is allowed when `pkg` is listed.
#[must_use]
pub fn module_allowed(module: &str, allowed: &[String]) -> bool {
    if BASE_MODULES.contains(&root_of(module)) {
        return true;
    }
    allowed.iter().any(|entry| {
        module == entry
            || module
                .strip_prefix(entry.as_str())
                .is_some_and(|rest| rest.starts_with('.') || rest.starts_with("::") || rest.starts_with('/'))
    })
}

fn import_violation(line: &str, allowed: &[String]) -> Option<Violation> {
    IMPORTS.iter().find_map(|p| {
        let caps = p.regex.captures(line)?;
        let module = caps.get(1)?;
        let name = module.as_str().trim_end_matches("::");
        (!module_allowed(name, allowed)).then(|| Violation {
            kind: CheckKind::Import,
            matched: name.to_string(),
            line: line.trim().to_string(),
            column: caps.get(0).map_or(0, |m| m.start()),
        })
    })
}

/// Enabled checks
#[derive(Debug, Clone, Default)]
pub struct CheckSet {
    pub placeholders: bool,
    pub forbidden: bool,
    /// `None` disables the import check
    pub allowed_modules: Option<Vec<String>>,
}

impl CheckSet {
    /// Earliest violation on `line`, if any
    #[must_use]
    pub fn check_line(&self, line: &str) -> Option<Violation> {
        let mut found: Vec<Violation> = Vec::with_capacity(3);
        if self.placeholders {
            found.extend(first_match(&PLACEHOLDERS, line, CheckKind::Placeholder));
        }
        if self.forbidden {
            found.extend(first_match(&FORBIDDEN, line, CheckKind::Forbidden));
        }
        if let Some(allowed) = &self.allowed_modules {
            found.extend(import_violation(line, allowed));
        }
        // min_by_key keeps the first of equal columns
        found.into_iter().min_by_key(|v| v.column)
    }
}
