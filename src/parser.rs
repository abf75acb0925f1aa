// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Parser boundary.
//!
//! The engine consumes a module-level AST and never implements grammar
//! itself. [`ModuleParser`] is the seam: the loader supplies the grammar
//! mode, the parser returns declarations and top-level statements. The
//! bundled [`DefaultParser`] recognizes the declaration subset the engine
//! executes; a full syntax front end plugs in through
//! [`Loader::with_parser`](crate::Loader::with_parser).

use crate::error::{ModuleError, Result};
use crate::value::Value;
use regex::Regex;

/// Grammar mode for a module body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleMode {
    /// CommonJS: require/module.exports, mutable exports object
    CommonJs,
    /// ECMAScript modules: static import/export, live bindings
    Esm,
}

/// A parsed module body.
#[derive(Debug, Clone)]
pub struct ModuleAst {
    /// The grammar mode the body was parsed under
    pub mode: ModuleMode,
    /// Top-level statements in source order
    pub body: Vec<Stmt>,
}

/// A bound name introduced by an import declaration.
#[derive(Debug, Clone)]
pub enum ImportBinding {
    /// `import foo from 'module'`
    Default(String),
    /// `import { foo } from 'module'` / `import { foo as bar } from 'module'`
    Named(String, Option<String>),
    /// `import * as foo from 'module'`
    Namespace(String),
}

/// Parsed import declaration.
#[derive(Debug, Clone)]
pub struct ImportDecl {
    /// The module specifier (e.g. `./foo.js`, `lodash`)
    pub specifier: String,
    /// Bound names; empty for a side-effect-only import
    pub bindings: Vec<ImportBinding>,
    /// 1-based source line of the declaration
    pub line: usize,
}

/// A module-level expression the engine can evaluate.
#[derive(Debug, Clone)]
pub enum Expr {
    /// A literal value
    Literal(Value),
    /// Reference to a module-local binding
    Ident(String),
    /// Property read off a module-local binding (`base.key`)
    Member(String, String),
    /// An empty object literal (fresh object per evaluation)
    ObjectLiteral,
}

/// A top-level statement relevant to the module system.
#[derive(Debug, Clone)]
pub enum Stmt {
    /// `const name = require('spec')` or bare `require('spec')`
    Require {
        /// The requested specifier
        specifier: String,
        /// Local name the exports are bound to, if any
        binding: Option<String>,
    },
    /// `const name = expr`
    Local {
        /// The local name
        name: String,
        /// Initializer
        value: Expr,
    },
    /// `name = expr` on an existing local binding
    Assign {
        /// The local name
        name: String,
        /// New value
        value: Expr,
    },
    /// `exports.name = expr`
    ExportsAssign {
        /// Property name on the exports object
        name: String,
        /// Assigned value
        value: Expr,
    },
    /// `module.exports = expr`
    ModuleExportsAssign {
        /// Replacement exports value
        value: Expr,
    },
    /// An import declaration
    Import(ImportDecl),
    /// `export const name = expr`
    ExportNamed {
        /// Exported (and local) name
        name: String,
        /// Initializer
        value: Expr,
    },
    /// `export default expr`
    ExportDefault {
        /// The default value
        value: Expr,
    },
    /// `export { a, b as c }`
    ExportList {
        /// (local, exported alias) pairs
        names: Vec<(String, Option<String>)>,
    },
}

/// The parser collaborator.
///
/// `parse` turns source text into an AST under a fixed grammar mode. The
/// parser does not guess: module-only syntax under [`ModuleMode::CommonJs`]
/// is a [`ModuleError::Static`] with the source location, and the loader
/// never retries with an alternate mode.
pub trait ModuleParser: Send + Sync {
    /// Parse `source` under `mode`.
    fn parse(&self, source: &str, mode: ModuleMode) -> Result<ModuleAst>;
}

/// Declaration-level parser bundled with the engine.
///
/// Line-oriented: each top-level line is matched against the declaration
/// forms the engine executes, and unrecognized lines are skipped. Enough to
/// drive resolution, interop, and the test corpus without a syntax front
/// end.
pub struct DefaultParser {
    require_bind: Regex,
    require_bare: Regex,
    module_exports: Regex,
    exports_assign: Regex,
    local_bind: Regex,
    assign: Regex,
    import_from: Regex,
    import_bare: Regex,
    export_decl: Regex,
    export_default: Regex,
    export_list: Regex,
    module_keyword: Regex,
}

impl DefaultParser {
    /// Create the parser, compiling the declaration patterns once.
    pub fn new() -> Self {
        Self {
            require_bind: Regex::new(
                r#"^(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*require\(\s*['"]([^'"]+)['"]\s*\)"#,
            )
            .unwrap(),
            require_bare: Regex::new(r#"^require\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap(),
            module_exports: Regex::new(r"^module\.exports\s*=\s*(.+)$").unwrap(),
            exports_assign: Regex::new(
                r"^(?:module\.)?exports\.([A-Za-z_$][\w$]*)\s*=\s*(.+)$",
            )
            .unwrap(),
            local_bind: Regex::new(r"^(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(.+)$")
                .unwrap(),
            assign: Regex::new(r"^([A-Za-z_$][\w$]*)\s*=\s*(.+)$").unwrap(),
            import_from: Regex::new(
                r#"^import\s+(?:([A-Za-z_$][\w$]*)\s*,?\s*)?(?:\{([^}]*)\}\s*)?(?:\*\s+as\s+([A-Za-z_$][\w$]*)\s*)?from\s*['"]([^'"]+)['"]"#,
            )
            .unwrap(),
            import_bare: Regex::new(r#"^import\s*['"]([^'"]+)['"]"#).unwrap(),
            export_decl: Regex::new(
                r"^export\s+(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(.+)$",
            )
            .unwrap(),
            export_default: Regex::new(r"^export\s+default\s+(.+)$").unwrap(),
            export_list: Regex::new(r"^export\s*\{([^}]*)\}").unwrap(),
            module_keyword: Regex::new(r"^(import|export)\b").unwrap(),
        }
    }

    fn parse_cjs_line(&self, line: &str, raw: &str, lineno: usize) -> Result<Option<Stmt>> {
        if let Some(caps) = self.module_keyword.captures(line) {
            let keyword = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let column = raw.find(keyword).unwrap_or(0) + 1;
            let message = if keyword == "import" {
                "Cannot use import statement outside a module".to_string()
            } else {
                "Unexpected token 'export'".to_string()
            };
            return Err(ModuleError::static_error(message, lineno, column));
        }
        if let Some(caps) = self.require_bind.captures(line) {
            return Ok(Some(Stmt::Require {
                specifier: caps[2].to_string(),
                binding: Some(caps[1].to_string()),
            }));
        }
        if let Some(caps) = self.require_bare.captures(line) {
            return Ok(Some(Stmt::Require {
                specifier: caps[1].to_string(),
                binding: None,
            }));
        }
        if let Some(caps) = self.module_exports.captures(line) {
            return Ok(Some(Stmt::ModuleExportsAssign {
                value: parse_expr(&caps[1]),
            }));
        }
        if let Some(caps) = self.exports_assign.captures(line) {
            return Ok(Some(Stmt::ExportsAssign {
                name: caps[1].to_string(),
                value: parse_expr(&caps[2]),
            }));
        }
        if let Some(caps) = self.local_bind.captures(line) {
            return Ok(Some(Stmt::Local {
                name: caps[1].to_string(),
                value: parse_expr(&caps[2]),
            }));
        }
        if let Some(caps) = self.assign.captures(line) {
            return Ok(Some(Stmt::Assign {
                name: caps[1].to_string(),
                value: parse_expr(&caps[2]),
            }));
        }
        Ok(None)
    }

    fn parse_esm_line(&self, line: &str, lineno: usize) -> Option<Stmt> {
        if let Some(caps) = self.import_from.captures(line) {
            let mut bindings = Vec::new();
            if let Some(default) = caps.get(1) {
                bindings.push(ImportBinding::Default(default.as_str().to_string()));
            }
            if let Some(named) = caps.get(2) {
                bindings.extend(parse_name_list(named.as_str()).into_iter().map(
                    |(imported, alias)| ImportBinding::Named(imported, alias),
                ));
            }
            if let Some(ns) = caps.get(3) {
                bindings.push(ImportBinding::Namespace(ns.as_str().to_string()));
            }
            return Some(Stmt::Import(ImportDecl {
                specifier: caps[4].to_string(),
                bindings,
                line: lineno,
            }));
        }
        if let Some(caps) = self.import_bare.captures(line) {
            return Some(Stmt::Import(ImportDecl {
                specifier: caps[1].to_string(),
                bindings: Vec::new(),
                line: lineno,
            }));
        }
        if let Some(caps) = self.export_default.captures(line) {
            return Some(Stmt::ExportDefault {
                value: parse_expr(&caps[1]),
            });
        }
        if let Some(caps) = self.export_decl.captures(line) {
            return Some(Stmt::ExportNamed {
                name: caps[1].to_string(),
                value: parse_expr(&caps[2]),
            });
        }
        if let Some(caps) = self.export_list.captures(line) {
            return Some(Stmt::ExportList {
                names: parse_name_list(&caps[1]),
            });
        }
        if let Some(caps) = self.local_bind.captures(line) {
            return Some(Stmt::Local {
                name: caps[1].to_string(),
                value: parse_expr(&caps[2]),
            });
        }
        if let Some(caps) = self.assign.captures(line) {
            return Some(Stmt::Assign {
                name: caps[1].to_string(),
                value: parse_expr(&caps[2]),
            });
        }
        None
    }
}

impl Default for DefaultParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleParser for DefaultParser {
    fn parse(&self, source: &str, mode: ModuleMode) -> Result<ModuleAst> {
        let mut body = Vec::new();
        for (idx, raw) in source.lines().enumerate() {
            let line = raw.trim().trim_end_matches(';');
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            let lineno = idx + 1;
            let stmt = match mode {
                ModuleMode::CommonJs => self.parse_cjs_line(line, raw, lineno)?,
                ModuleMode::Esm => self.parse_esm_line(line, lineno),
            };
            if let Some(stmt) = stmt {
                body.push(stmt);
            }
        }
        Ok(ModuleAst { mode, body })
    }
}

/// Parse `a, b as c` name lists from import/export braces.
fn parse_name_list(list: &str) -> Vec<(String, Option<String>)> {
    let mut names = Vec::new();
    for part in list.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match part.split_once(" as ") {
            Some((name, alias)) => {
                names.push((name.trim().to_string(), Some(alias.trim().to_string())));
            }
            None => names.push((part.to_string(), None)),
        }
    }
    names
}

fn parse_expr(src: &str) -> Expr {
    let s = src.trim().trim_end_matches(';').trim();
    if s == "{}" || s == "{ }" {
        return Expr::ObjectLiteral;
    }
    match s {
        "true" => return Expr::Literal(Value::Boolean(true)),
        "false" => return Expr::Literal(Value::Boolean(false)),
        "null" => return Expr::Literal(Value::Null),
        "undefined" => return Expr::Literal(Value::Undefined),
        _ => {}
    }
    if (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
        || (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
    {
        return Expr::Literal(Value::String(s[1..s.len() - 1].to_string()));
    }
    if let Ok(n) = s.parse::<f64>() {
        return Expr::Literal(Value::Number(n));
    }
    if let Some((base, key)) = s.split_once('.') {
        if is_ident(base) && is_ident(key) {
            return Expr::Member(base.to_string(), key.to_string());
        }
    }
    if is_ident(s) {
        return Expr::Ident(s.to_string());
    }
    Expr::Literal(Value::Undefined)
}

fn is_ident(s: &str) -> bool {
    !s.is_empty()
        && s.chars().enumerate().all(|(i, c)| {
            c == '_' || c == '$' || if i == 0 { c.is_alphabetic() } else { c.is_alphanumeric() }
        })
}
