use std::{
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    time::Instant,
};

use tokio::sync::OnceCell;

use super::{CompileError, CompileResult, Program};
use crate::observability::metrics::record_compilation;

const COMPILING: u8 = 1;
const COMPILED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    NotCompiled,
    Compiling,
    Compiled,
}

/// Holds one lazily compiled program.
///
/// The first caller compiles; concurrent callers wait for that result
/// instead of compiling again. Failures are cached like successes.
#[derive(Debug, Default)]
pub struct CompileSlot {
    cell: OnceCell<Result<Arc<Program>, CompileError>>,
    state: AtomicU8,
}

impl CompileSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SlotState {
        match self.state.load(Ordering::Acquire) {
            COMPILED => SlotState::Compiled,
            COMPILING => SlotState::Compiling,
            _ => SlotState::NotCompiled,
        }
    }

    /// Returns the cached program, compiling it with `compile` on first use.
    /// `kind` labels the compilation in metrics (`request` or `response`).
    pub async fn get_or_compile<F>(
        &self,
        kind: &'static str,
        compile: F,
    ) -> Result<Arc<Program>, CompileError>
    where
        F: FnOnce() -> CompileResult<Program>,
    {
        self.cell
            .get_or_init(|| async {
                self.state.store(COMPILING, Ordering::Release);
                let started = Instant::now();
                let result = compile().map(Arc::new);
                record_compilation(kind, result.is_ok(), started.elapsed().as_secs_f64());
                if let Err(error) = &result {
                    tracing::warn!(kind, error = %error, "Validator compilation failed");
                }
                self.state.store(COMPILED, Ordering::Release);
                result
            })
            .await
            .clone()
    }
}
