//! Code Execution Sandbox (§4.8): three layers of defense between a
//! generated program and the host.
//!
//! 1. [`validator::validate`] — parse and walk the AST, reject disallowed
//!    imports and denylisted calls (property P5).
//! 2. [`engine::restricted_engine`] — compile and run only against a
//!    zero-builtin engine with pure-computation packages registered.
//! 3. This module — execute under a wall-clock timeout, either in-process
//!    (default) or inside a [`ContainerRuntime`] when configured, and
//!    capture stdout/stderr into a line-capped buffer.
//!
//! Grounded on the teacher's former subprocess-timeout pattern
//! (`wait_for_exit_with_timeout`), reworked here around an in-process
//! interpreter instead of a child process, plus a trait seam for true
//! container isolation.

pub mod engine;
pub mod validator;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::{CodeConfig, ContainerLimits};
use crate::error::{Error, Result};
use crate::types::CodeResult;

/// Output captured from a container run (§4.8 layer 3, container path).
#[derive(Debug, Clone)]
pub struct ContainerOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

/// True OS-level isolation for layer 3, used when
/// `CodeConfig::enable_container_sandbox` is set. No implementation ships
/// in this crate (the concrete runtime — gVisor, Firecracker, a plain
/// Docker `--network=none --read-only` invocation — is an excluded
/// collaborator concern, §1); this trait is the seam a deployment wires in.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn run(
        &self,
        source: &str,
        limits: &ContainerLimits,
        timeout_ms: u64,
    ) -> Result<ContainerOutput>;
}

/// Validate, compile, and execute `source`, returning a fully populated
/// [`CodeResult`]. `problem` is carried through only for the result's
/// `problem` field; it plays no role in validation or execution.
///
/// A validation failure (layer 1) and a runtime failure (layer 3) are both
/// folded into `CodeResult{success: false, ...}` rather than propagated as
/// `Err` — per §7, `SandboxViolation`/`SandboxTimeout` are soft failures the
/// caller strategy turns into a result, not a top-level error.
pub async fn run(
    problem: &str,
    source: &str,
    config: &CodeConfig,
    container: Option<&Arc<dyn ContainerRuntime>>,
) -> CodeResult {
    let engine = engine::restricted_engine(config);

    let ast = match validator::validate(&engine, source, &config.allowed_imports) {
        Ok(ast) => ast,
        Err(e) => {
            return CodeResult {
                problem: problem.to_string(),
                code: source.to_string(),
                stdout: String::new(),
                stderr: e.to_string(),
                success: false,
                explanation: format!("rejected before execution: {e}"),
                truncated: false,
            };
        }
    };

    if config.enable_container_sandbox {
        if let Some(runtime) = container {
            return match runtime
                .run(source, &config.container_limits, config.execution_timeout_ms)
                .await
            {
                Ok(out) => CodeResult {
                    problem: problem.to_string(),
                    code: source.to_string(),
                    stdout: out.stdout,
                    stderr: out.stderr,
                    success: out.success,
                    explanation: String::new(),
                    truncated: false,
                },
                Err(e) => CodeResult {
                    problem: problem.to_string(),
                    code: source.to_string(),
                    stdout: String::new(),
                    stderr: e.to_string(),
                    success: false,
                    explanation: format!("container execution failed: {e}"),
                    truncated: false,
                },
            };
        }
        tracing::warn!(
            "container sandbox enabled but no ContainerRuntime configured; falling back to in-process execution"
        );
    }

    run_in_process(problem, source, ast, config).await
}

async fn run_in_process(
    problem: &str,
    source: &str,
    ast: rhai::AST,
    config: &CodeConfig,
) -> CodeResult {
    let timeout = std::time::Duration::from_millis(config.execution_timeout_ms);
    let max_lines = config.max_output_lines;
    let config = config.clone();

    let blocking = tokio::task::spawn_blocking(move || execute_ast(&config, ast, max_lines));

    match tokio::time::timeout(timeout, blocking).await {
        Ok(Ok((stdout, stderr, success, truncated))) => CodeResult {
            problem: problem.to_string(),
            code: source.to_string(),
            stdout,
            stderr,
            success,
            explanation: if success {
                "executed successfully".to_string()
            } else {
                "execution raised an error".to_string()
            },
            truncated,
        },
        Ok(Err(join_err)) => CodeResult {
            problem: problem.to_string(),
            code: source.to_string(),
            stdout: String::new(),
            stderr: join_err.to_string(),
            success: false,
            explanation: "execution task panicked".to_string(),
            truncated: false,
        },
        Err(_) => {
            let err = Error::SandboxTimeout {
                duration_ms: config.execution_timeout_ms,
            };
            CodeResult {
                problem: problem.to_string(),
                code: source.to_string(),
                stdout: String::new(),
                stderr: err.to_string(),
                success: false,
                explanation: err.to_string(),
                truncated: false,
            }
        }
    }
}

/// Runs on a blocking-pool thread: builds a fresh restricted engine, wires
/// line-capped stdout/stderr capture, and evaluates the already-validated
/// AST. Returns `(stdout, stderr, success, truncated)`.
fn execute_ast(config: &CodeConfig, ast: rhai::AST, max_lines: usize) -> (String, String, bool, bool) {
    let mut rhai_engine = engine::restricted_engine(config);

    let stdout = Arc::new(Mutex::new(Vec::<String>::new()));
    let stderr = Arc::new(Mutex::new(Vec::<String>::new()));

    let stdout_w = stdout.clone();
    rhai_engine.on_print(move |s| {
        let mut buf = stdout_w.lock().unwrap();
        if buf.len() < max_lines {
            buf.push(s.to_string());
        }
    });
    let stderr_w = stderr.clone();
    rhai_engine.on_debug(move |s, _src, _pos| {
        let mut buf = stderr_w.lock().unwrap();
        if buf.len() < max_lines {
            buf.push(s.to_string());
        }
    });

    let mut scope = rhai::Scope::new();
    let run_result = rhai_engine.run_ast_with_scope(&mut scope, &ast);

    let mut out_lines = stdout.lock().unwrap().clone();
    let mut err_lines = stderr.lock().unwrap().clone();
    let truncated = out_lines.len() >= max_lines || err_lines.len() >= max_lines;

    let success = match run_result {
        Ok(()) => true,
        Err(e) => {
            err_lines.push(e.to_string());
            false
        }
    };

    if out_lines.len() > max_lines {
        out_lines.truncate(max_lines);
    }
    if err_lines.len() > max_lines {
        err_lines.truncate(max_lines);
    }

    (out_lines.join("\n"), err_lines.join("\n"), success, truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn valid_program_produces_stdout_p5() {
        let config = CodeConfig::default();
        let result = run("double 21", "print(21 * 2);", &config, None).await;
        assert!(result.success);
        assert_eq!(result.stdout.trim(), "42");
        assert!(result.stderr.is_empty());
    }

    #[tokio::test]
    async fn denylisted_call_never_executes_p5() {
        let config = CodeConfig::default();
        let result = run("breakout attempt", "exec(\"rm -rf /\");", &config, None).await;
        assert!(!result.success);
        assert!(result.stdout.is_empty());
        assert!(result.explanation.contains("rejected before execution"));
    }

    #[tokio::test]
    async fn runtime_error_is_reported_not_panicked() {
        let config = CodeConfig::default();
        let result = run("divide by zero", "let x = 1 / 0; print(x);", &config, None).await;
        assert!(!result.success);
        assert!(result.stdout.is_empty());
    }

    #[tokio::test]
    async fn infinite_loop_never_succeeds_s5() {
        // Bounded either by the wall-clock timeout or by the restricted
        // engine's own operation-count ceiling (§4.8 layer 2 resource
        // limits) — whichever trips first, the program must not "succeed".
        let mut config = CodeConfig::default();
        config.execution_timeout_ms = 200;
        let result = run("spin forever", "loop { }", &config, None).await;
        assert!(!result.success);
        assert!(result.stdout.is_empty());
    }
}
