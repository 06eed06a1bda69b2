//! Layer 1 (§4.8): parse the generated program into an AST and walk it,
//! rejecting anything on the import whitelist / call denylist before the
//! program ever reaches layer 2 or 3 (property P5).
//!
//! The sandbox's accepted language is Rhai (§4.8 "Chosen sandbox
//! language"): an embeddable, AST-inspectable scripting language with no
//! file/network/process-spawn surface in its standard library, so this
//! walk is a real static-analysis pass rather than source-text pattern
//! matching.

use std::collections::HashSet;

use rhai::{ASTNode, Engine, Expr, Stmt, AST};

use crate::error::{Error, Result};

/// Function names a validated program may never call, even though none of
/// them are registered by [`super::engine::restricted_engine`] — rejecting
/// them syntactically is defense-in-depth against a future host-function
/// registration accidentally reintroducing one (§4.8 layer 1 vs layer 2).
/// Covers the source spec's denylist categories: dynamic-code constructs
/// (`eval`), process spawn, network, and file I/O outside the run's temp
/// dir.
const CALL_DENYLIST: &[&str] = &[
    "eval",
    "call",
    "spawn",
    "exec",
    "system",
    "open",
    "read_file",
    "write_file",
    "remove_file",
    "create_dir",
    "remove_dir",
    "connect",
    "bind",
    "import",
];

/// Parse `source` and reject it if it contains a disallowed import or a
/// denylisted call, before any execution attempt. Returns the compiled
/// [`AST`] on success so layer 2/3 can reuse the parse instead of
/// re-lexing.
pub fn validate(engine: &Engine, source: &str, allowed_imports: &[String]) -> Result<AST> {
    let ast = engine
        .compile(source)
        .map_err(|e| Error::SandboxViolation(format!("parse error: {e}")))?;

    let allowed: HashSet<&str> = allowed_imports.iter().map(String::as_str).collect();
    let mut violation: Option<String> = None;

    ast.walk(&mut |nodes: &[ASTNode]| {
        if violation.is_some() {
            return false; // short-circuit once a violation is found
        }
        match nodes.last() {
            Some(ASTNode::Stmt(Stmt::Import(expr, _, ..))) => {
                let module = expr
                    .get_literal_value::<rhai::ImmutableString>()
                    .map(|s| s.to_string());
                match module {
                    Some(m) if allowed.contains(m.as_str()) => {}
                    Some(m) => {
                        violation = Some(format!("import of disallowed module '{m}'"));
                        return false;
                    }
                    None => {
                        violation =
                            Some("import with a non-literal module path is not allowed".into());
                        return false;
                    }
                }
            }
            Some(ASTNode::Expr(Expr::FnCall(call, _))) => {
                let name = call.name.as_str();
                if CALL_DENYLIST.contains(&name) {
                    violation = Some(format!("call to denylisted function '{name}'"));
                    return false;
                }
            }
            _ => {}
        }
        true
    });

    match violation {
        Some(reason) => Err(Error::SandboxViolation(reason)),
        None => Ok(ast),
    }
}
