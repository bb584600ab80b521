use std::ffi::c_void;
use std::fmt;
use std::sync::Arc;

use jit68_backend::{HostCodeGen, X86_64CodeGen};
use jit68_core::cpu::{CpuState, SR_IPL_MASK, SR_S};
use jit68_core::{
    Bus, ExceptionEntry, ExitCode, FaultInfo, FunctionCode, JitConfig, JitError, Result, Size,
    StackFrameEntry,
};

use crate::cache::{CacheStats, TranslationCache};
use crate::irq::{InterruptPoller, IrqLine};
use crate::runtime::Runtime;
use crate::TranslationContext;

/// Why [`Dispatcher::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Shutdown was requested on the interrupt line.
    Shutdown,
    /// STOP executed and no interrupt was accepted.
    Stopped,
    /// [`Dispatcher::run_for`] executed its block budget.
    BudgetExhausted,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub blocks: u64,
    pub translations: u64,
    pub exceptions: u64,
    pub interrupts: u64,
    /// Blocks left early because a store hit translated code.
    pub smc_exits: u64,
    pub buffer_flushes: u64,
}

impl fmt::Display for DispatchStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "blocks         {}", self.blocks)?;
        writeln!(f, "translations   {}", self.translations)?;
        writeln!(f, "exceptions     {}", self.exceptions)?;
        writeln!(f, "interrupts     {}", self.interrupts)?;
        writeln!(f, "smc exits      {}", self.smc_exits)?;
        write!(f, "buffer flushes {}", self.buffer_flushes)
    }
}

/// Single-threaded execution loop.
///
/// Each round checks the interrupt line, resolves the current PC to
/// a translated unit (compiling on a miss), runs it and handles the
/// exit code it returns.
pub struct Dispatcher<B: HostCodeGen = X86_64CodeGen> {
    cpu: Box<CpuState>,
    rt: Box<Runtime>,
    ctx: TranslationContext<B>,
    irq: Arc<IrqLine>,
    entry: Box<dyn ExceptionEntry>,
    config: JitConfig,
    stats: DispatchStats,
}

impl Dispatcher<X86_64CodeGen> {
    /// Dispatcher with `ram_size` bytes of guest RAM at address 0 and
    /// `bus` behind it.
    pub fn new(config: JitConfig, ram_size: usize, bus: Box<dyn Bus>) -> Result<Self> {
        if !cfg!(target_arch = "x86_64") {
            return Err(JitError::UnsupportedHost(std::env::consts::ARCH));
        }
        Self::with_backend(X86_64CodeGen::new(), config, ram_size, bus)
    }
}

impl<B: HostCodeGen> Dispatcher<B> {
    pub fn with_backend(
        backend: B,
        config: JitConfig,
        ram_size: usize,
        bus: Box<dyn Bus>,
    ) -> Result<Self> {
        config.validate()?;
        let rt = Box::new(Runtime::new(&config, ram_size, bus)?);
        let ctx = TranslationContext::new(backend, &config)?;
        tracing::debug!(
            model = ?config.cpu_model,
            ram_size,
            code_buffer = config.code_buffer_size,
            "dispatcher ready"
        );
        let mut d = Self {
            cpu: Box::new(CpuState::new(config.cpu_model)),
            rt,
            ctx,
            irq: Arc::new(IrqLine::new()),
            entry: Box::new(StackFrameEntry),
            config,
            stats: DispatchStats::default(),
        };
        d.install();
        Ok(d)
    }

    /// Point the runtime plumbing fields of `CpuState` at the objects
    /// generated code and helpers use.
    fn install(&mut self) {
        self.cpu.ram_base = self.rt.ram.as_mut_ptr();
        self.cpu.ram_size = self.rt.ram.len() as u64;
        self.cpu.code_pages = self.rt.cache.code_pages().as_ptr();
        self.cpu.irq = self.irq.as_ptr();
        let rt: *mut Runtime = &mut *self.rt;
        self.cpu.runtime = rt as *mut c_void;
    }

    pub fn config(&self) -> &JitConfig {
        &self.config
    }

    pub fn cpu(&self) -> &CpuState {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut CpuState {
        &mut self.cpu
    }

    pub fn ram(&self) -> &[u8] {
        self.rt.ram.as_slice()
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.rt.cache
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.rt.cache.stats()
    }

    pub fn irq_line(&self) -> Arc<IrqLine> {
        Arc::clone(&self.irq)
    }

    pub fn set_exception_entry(&mut self, entry: Box<dyn ExceptionEntry>) {
        self.entry = entry;
    }

    /// Copy `data` into guest memory at `addr`, invalidating any
    /// translated code it overlaps.
    pub fn write_memory(&mut self, addr: u32, data: &[u8]) {
        for (i, &b) in data.iter().enumerate() {
            let a = addr.wrapping_add(i as u32);
            self.rt
                .store(a, Size::Byte, FunctionCode::SupervisorData, b as u32);
        }
    }

    pub fn read_memory(&mut self, addr: u32, size: Size) -> u32 {
        self.rt.load(addr, size, FunctionCode::SupervisorData)
    }

    /// Start a poller that feeds this dispatcher's interrupt line from
    /// `sample` at the configured interval.
    pub fn spawn_poller<S>(&self, sample: S) -> std::io::Result<InterruptPoller>
    where
        S: FnMut() -> u8 + Send + 'static,
    {
        InterruptPoller::with_config(self.irq_line(), &self.config, sample)
    }

    /// Publish the bus's current interrupt level on the line, for
    /// embedders that run without an [`InterruptPoller`].
    pub fn sync_irq_from_bus(&mut self) {
        let level = self.rt.bus.interrupt_level();
        self.irq.publish(level);
    }

    /// Hardware reset: supervisor mode, mask 7, SSP and PC from
    /// vectors 0 and 1.
    pub fn reset(&mut self) {
        let fc = FunctionCode::SupervisorProgram;
        let ssp = self.rt.load(0, Size::Long, fc);
        let pc = self.rt.load(4, Size::Long, fc);
        let cpu = &mut *self.cpu;
        cpu.sr = SR_S | SR_IPL_MASK;
        cpu.vbr = 0;
        cpu.a[7] = ssp;
        cpu.pc = pc;
        cpu.stopped = 0;
        cpu.exception = 0;
        cpu.irq_ack = 0;
        tracing::debug!(ssp = format_args!("{ssp:#x}"), pc = format_args!("{pc:#x}"), "reset");
    }

    // -- Invalidation --

    pub fn invalidate_range(&mut self, lo: u32, hi: u32) -> usize {
        self.rt.cache.invalidate_range(lo, hi)
    }

    /// Drop every unit and reclaim the code buffer.
    pub fn invalidate_all(&mut self) {
        self.rt.cache.invalidate_all();
        self.ctx.flush();
    }

    /// Drop the unit whose host code contains `ptr`.
    pub fn invalidate_host(&mut self, ptr: *const u8) -> bool {
        self.ctx
            .code_buf
            .offset_of(ptr)
            .and_then(|off| self.rt.cache.invalidate_host(off))
            .is_some()
    }

    // -- Execution loop --

    /// Run until shutdown is requested or the CPU stops.
    pub fn run(&mut self) -> ExitReason {
        self.run_inner(None)
    }

    /// Like [`Dispatcher::run`], executing at most `blocks` units.
    pub fn run_for(&mut self, blocks: u64) -> ExitReason {
        self.run_inner(Some(blocks))
    }

    fn run_inner(&mut self, budget: Option<u64>) -> ExitReason {
        let mut executed = 0u64;
        loop {
            if self.irq.is_shutdown() {
                return ExitReason::Shutdown;
            }
            self.check_interrupt();
            if self.cpu.stopped != 0 {
                return ExitReason::Stopped;
            }
            if budget.is_some_and(|b| executed >= b) {
                return ExitReason::BudgetExhausted;
            }

            let pc = self.cpu.pc;
            let host = self.resolve(pc);
            tracing::trace!(pc = format_args!("{pc:#x}"), "dispatch");
            // SAFETY: `host` is the start of a live unit emitted into
            // this context's buffer.
            let code = unsafe { self.execute(host) };
            executed += 1;
            self.stats.blocks += 1;
            if self.cpu.code_dirty != 0 {
                self.cpu.code_dirty = 0;
                self.stats.smc_exits += 1;
            }
            self.handle_exit(code);
        }
    }

    /// Accept a pending interrupt if the mask allows it. Level 7 is
    /// taken only when it was not already seen.
    fn check_interrupt(&mut self) -> bool {
        let level = self.irq.level() as u32;
        let mask = self.cpu.interrupt_mask();
        let edge = level == 7 && self.cpu.irq_ack != 7;
        self.cpu.irq_ack = level;
        if level == 0 || !(level > mask || edge) {
            return false;
        }
        tracing::trace!(level, pc = format_args!("{:#x}", self.cpu.pc), "interrupt");
        self.entry
            .raise_interrupt(&mut self.cpu, &mut *self.rt, level as u8);
        self.stats.interrupts += 1;
        true
    }

    fn resolve(&mut self, pc: u32) -> usize {
        if let Some(id) = self.rt.cache.lookup(pc) {
            if let Some(unit) = self.rt.cache.touch(id) {
                return unit.host_offset;
            }
        }
        self.translate(pc)
    }

    fn translate(&mut self, pc: u32) -> usize {
        if self.ctx.needs_flush() {
            tracing::info!(
                used = self.ctx.code_buf.offset(),
                units = self.rt.cache.len(),
                "code buffer exhausted, flushing"
            );
            self.invalidate_all();
            self.stats.buffer_flushes += 1;
        }
        let fc = FunctionCode::from_sr(self.cpu.sr, true);
        let unit = {
            let mut fetch = self.rt.fetcher(fc);
            self.ctx.translate(&mut fetch, pc)
        };
        let host = unit.host_offset;
        let id = self.rt.cache.insert(unit);
        self.rt.cache.touch(id);
        self.stats.translations += 1;
        host
    }

    /// Enter generated code at `host_offset`.
    ///
    /// # Safety
    /// `host_offset` must be the start of a unit emitted into this
    /// context's code buffer.
    unsafe fn execute(&mut self, host_offset: usize) -> ExitCode {
        self.install();
        // Prologue signature:
        //   fn(env: *mut CpuState, code: *const u8) -> usize
        let prologue: unsafe extern "C" fn(*mut CpuState, *const u8) -> usize =
            std::mem::transmute(self.ctx.code_buf.base_ptr());
        let code = self.ctx.code_buf.ptr_at(host_offset);
        let env: *mut CpuState = &mut *self.cpu;
        let raw = prologue(env, code);
        ExitCode::from_raw(raw).unwrap_or_else(|| {
            tracing::error!(raw, "unknown exit code from generated code");
            ExitCode::Lookup
        })
    }

    fn handle_exit(&mut self, code: ExitCode) {
        match code {
            ExitCode::Next | ExitCode::Lookup | ExitCode::Interrupt | ExitCode::Stop => {}
            ExitCode::Exception => self.raise_pending(),
            ExitCode::Reset => {
                tracing::debug!("RESET instruction");
                self.rt.bus.reset();
            }
        }
    }

    /// Deliver the exception generated code left in `CpuState`.
    fn raise_pending(&mut self) {
        let Some(vector) = self.cpu.take_exception() else {
            return;
        };
        let fault = FaultInfo {
            pc: self.cpu.fault_pc,
            opcode: self.cpu.fault_opcode as u16,
            length: self.cpu.fault_len,
        };
        tracing::debug!(
            vector,
            pc = format_args!("{:#x}", fault.pc),
            opcode = format_args!("{:#06x}", fault.opcode),
            "guest exception"
        );
        self.stats.exceptions += 1;
        self.entry
            .raise_exception(&mut self.cpu, &mut *self.rt, vector, &fault);
    }
}
