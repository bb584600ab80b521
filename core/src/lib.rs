//! Shared types of the jit68 translation engine: guest CPU state
//! layout, translation units, bus and exception interfaces,
//! configuration and errors.

pub mod bus;
pub mod config;
pub mod cpu;
pub mod error;
pub mod exception;
pub mod types;
pub mod unit;

pub use bus::{Bus, CodeFetch, GuestMemory, OpenBus};
pub use config::JitConfig;
pub use cpu::{CpuModel, CpuState};
pub use error::{JitError, Result};
pub use exception::{ExceptionEntry, FaultInfo, StackFrameEntry};
pub use types::{CcMask, Cond, FunctionCode, RegSet, Size};
pub use unit::{Boundary, ExitCode, TranslationUnit};
