//! Interrupt line shared between the poller thread, the dispatcher
//! and generated code.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use jit68_core::JitConfig;
use parking_lot::{Condvar, Mutex};

/// Published interrupt state.
///
/// Generated code reads `level` and the shutdown word at
/// `IRQ_SHUTDOWN_OFFSET` through the pointer in `CpuState::irq`, so
/// the two words lead the struct.
#[repr(C)]
pub struct IrqLine {
    level: AtomicU32,
    shutdown: AtomicU32,
    lock: Mutex<()>,
    wake: Condvar,
}

impl IrqLine {
    pub fn new() -> Self {
        Self {
            level: AtomicU32::new(0),
            shutdown: AtomicU32::new(0),
            lock: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    #[inline]
    pub fn level(&self) -> u8 {
        self.level.load(Ordering::Acquire) as u8
    }

    /// Publish a new level (0..=7) and wake anyone waiting.
    pub fn publish(&self, level: u8) {
        let _guard = self.lock.lock();
        self.level.store((level & 7) as u32, Ordering::Release);
        self.wake.notify_all();
    }

    /// Ask the dispatcher to return at its next interrupt check.
    pub fn request_shutdown(&self) {
        let _guard = self.lock.lock();
        self.shutdown.store(1, Ordering::Release);
        self.wake.notify_all();
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire) != 0
    }

    pub fn clear_shutdown(&self) {
        self.shutdown.store(0, Ordering::Release);
    }

    /// Block until the line changes or `timeout` passes. Returns
    /// false on timeout.
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut guard = self.lock.lock();
        !self.wake.wait_for(&mut guard, timeout).timed_out()
    }

    pub(crate) fn as_ptr(&self) -> *const AtomicU32 {
        &self.level
    }
}

impl Default for IrqLine {
    fn default() -> Self {
        Self::new()
    }
}

struct PollerControl {
    stop: Mutex<bool>,
    cv: Condvar,
}

/// Background thread sampling the interrupt priority lines.
///
/// A level is published only after two consecutive samples agree,
/// which filters glitches while the lines settle.
pub struct InterruptPoller {
    control: Arc<PollerControl>,
    handle: Option<JoinHandle<()>>,
}

impl InterruptPoller {
    /// Poller sampling every `config.poll_interval_us`.
    pub fn with_config<S>(
        line: Arc<IrqLine>,
        config: &JitConfig,
        sample: S,
    ) -> std::io::Result<Self>
    where
        S: FnMut() -> u8 + Send + 'static,
    {
        Self::spawn(line, config.poll_interval(), sample)
    }

    pub fn spawn<S>(line: Arc<IrqLine>, interval: Duration, mut sample: S) -> std::io::Result<Self>
    where
        S: FnMut() -> u8 + Send + 'static,
    {
        let control = Arc::new(PollerControl {
            stop: Mutex::new(false),
            cv: Condvar::new(),
        });
        let ctl = Arc::clone(&control);
        let handle = thread::Builder::new()
            .name("irq-poller".into())
            .spawn(move || {
                let mut last = None;
                let mut published = line.level();
                let mut stop = ctl.stop.lock();
                while !*stop {
                    let level = sample() & 7;
                    if last == Some(level) && level != published {
                        tracing::trace!(level, "interrupt level changed");
                        line.publish(level);
                        published = level;
                    }
                    last = Some(level);
                    ctl.cv.wait_for(&mut stop, interval);
                }
            })?;
        Ok(Self {
            control,
            handle: Some(handle),
        })
    }

    /// Stop sampling and join the thread.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        *self.control.stop.lock() = true;
        self.control.cv.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for InterruptPoller {
    fn drop(&mut self) {
        self.shutdown();
    }
}
