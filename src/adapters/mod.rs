//! Concrete implementations of the external interfaces.
//!
//! - `memory`: in-process fakes with failure injection
//! - `file`: durable single-host state backend
//! - `tcp`: connect-only health probe
//! - `command`: operator-supplied executables
//! - `log`: notifications as structured log lines

mod command;
mod file;
mod log;
mod memory;
mod tcp;

pub use command::{CommandHook, CommandProbe, CommandPromoter, CommandRouting, HookError, EX_TEMPFAIL};
pub use file::FileStateBackend;
pub use log::LogPublisher;
pub use memory::{MemoryProbe, MemoryPromoter, MemoryPublisher, MemoryRouting, MemoryStateBackend};
pub use tcp::TcpProbe;
