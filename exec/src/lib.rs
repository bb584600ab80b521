//! jit68 execution engine: translation cache, runtime helpers,
//! interrupt line and the dispatcher driving the
//! lookup → translate → execute cycle.

pub mod cache;
pub mod dispatch;
pub mod helpers;
pub mod irq;
pub mod runtime;

pub use cache::{CacheStats, TranslationCache, UnitId};
pub use dispatch::{DispatchStats, Dispatcher, ExitReason};
pub use irq::{InterruptPoller, IrqLine};
pub use runtime::{GuestRam, Runtime};

use jit68_backend::{CodeBuffer, HostCodeGen};
use jit68_core::{CodeFetch, JitConfig, Result, TranslationUnit};
use jit68_frontend::m68k::MIN_BUFFER_HEADROOM;
use jit68_frontend::{translate_block, HelperTable, TranslateOptions};

/// Code buffer, host backend and translation settings.
pub struct TranslationContext<B: HostCodeGen> {
    pub backend: B,
    pub code_buf: CodeBuffer,
    /// Offset where unit code starts (after prologue/epilogue).
    pub code_gen_start: usize,
    pub opts: TranslateOptions,
    pub helpers: HelperTable,
}

impl<B: HostCodeGen> TranslationContext<B> {
    /// Map the code buffer and emit the shared prologue and epilogue.
    pub fn new(mut backend: B, config: &JitConfig) -> Result<Self> {
        let mut code_buf = CodeBuffer::new(config.code_buffer_size)?;
        backend.emit_prologue(&mut code_buf);
        backend.emit_epilogue(&mut code_buf);
        let code_gen_start = code_buf.offset();
        Ok(Self {
            backend,
            code_buf,
            code_gen_start,
            opts: TranslateOptions::from(config),
            helpers: helpers::helper_table(),
        })
    }

    /// Whether the buffer must be reset before the next translation.
    pub fn needs_flush(&self) -> bool {
        self.code_buf.remaining() < MIN_BUFFER_HEADROOM
    }

    /// Drop all generated unit code. Every unit must be invalidated
    /// along with it.
    pub fn flush(&mut self) {
        self.code_buf.set_offset(self.code_gen_start);
    }

    pub fn translate(&mut self, fetch: &mut dyn CodeFetch, pc: u32) -> TranslationUnit {
        translate_block(
            &self.backend,
            &mut self.code_buf,
            fetch,
            pc,
            &self.opts,
            &self.helpers,
        )
    }
}
