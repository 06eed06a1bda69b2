//! Layer 2 (§4.8): restricted compilation. A [`rhai::Engine`] built with
//! `Engine::new_raw()` starts with zero registered functions, operators, or
//! packages; registering only [`rhai::packages::ArithmeticPackage`] and its
//! pure-computation siblings means the engine has no I/O surface to exploit
//! even if layer 1's AST walk missed something, because the call simply
//! doesn't resolve.

use rhai::packages::{ArithmeticPackage, BasicArrayPackage, BasicMapPackage, BasicStringPackage, LogicPackage, Package};
use rhai::Engine;

use crate::config::CodeConfig;

/// Build an engine with only pure-computation packages registered, and
/// resource limits standing in for a CPU/memory cap (§4.8 layer 2/3: "rhai's
/// standard library has no file/network/process I/O, making it safe by
/// construction").
pub fn restricted_engine(config: &CodeConfig) -> Engine {
    let mut engine = Engine::new_raw();
    engine.register_global_module(ArithmeticPackage::new().as_shared_module());
    engine.register_global_module(LogicPackage::new().as_shared_module());
    engine.register_global_module(BasicStringPackage::new().as_shared_module());
    engine.register_global_module(BasicArrayPackage::new().as_shared_module());
    engine.register_global_module(BasicMapPackage::new().as_shared_module());

    engine.set_max_operations(5_000_000);
    engine.set_max_expr_depth(64);
    engine.set_max_string_size(1_000_000);
    engine.set_max_array_size(100_000);
    engine.set_max_map_size(100_000);
    engine.set_max_call_levels(32);

    let _ = config; // reserved: future per-run tuning of the limits above

    engine
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restricted_engine_runs_pure_arithmetic() {
        let engine = restricted_engine(&CodeConfig::default());
        let result: i64 = engine.eval("2 + 2 * 10").unwrap();
        assert_eq!(result, 22);
    }

    #[test]
    fn restricted_engine_has_no_print_registered() {
        // `print` is a default-package builtin the raw engine never gets;
        // stdout capture is wired separately via `on_print` in the executor.
        let engine = restricted_engine(&CodeConfig::default());
        let outcome: Result<(), _> = engine.run("print(\"hi\");");
        assert!(outcome.is_err());
    }

    #[test]
    fn restricted_engine_rejects_runaway_recursion() {
        let engine = restricted_engine(&CodeConfig::default());
        let outcome: Result<i64, _> = engine.eval(
            "fn rec(n) { if n <= 0 { 0 } else { 1 + rec(n - 1) } } rec(1000)",
        );
        assert!(outcome.is_err());
    }
}
