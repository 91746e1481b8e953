#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use memscope::layout::{DataModel, Parser};
use memscope::Type;

/// Global mutex to serialize integration tests that share the global scope.
pub fn serial() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|err| err.into_inner())
}

/// Routes `log` output through the test harness; set `RUST_LOG=debug` to see scope traffic.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Parses a single descriptor against the LP64 data model.
pub fn ty(descriptor: &str) -> Arc<Type> {
    Parser::with_model(descriptor, DataModel::Lp64)
        .single()
        .unwrap_or_else(|err| panic!("descriptor {descriptor:?} failed to parse: {err}"))
        .ty
}
