#![cfg_attr(not(feature = "hosted"), no_std)]

extern crate alloc;

pub mod arch;
pub mod config;
pub mod console;
pub mod error;
mod kernel;
pub mod task;

pub use config::KernelConfig;
pub use error::{LoadError, TaskError, TaskResult};
pub use kernel::Kernel;
pub use task::{CloneFlags, Halt, Pid, TaskInfo, TaskState, UserStack, WaitChannel, WaitQueue};

#[cfg(feature = "hosted")]
pub use arch::hosted::Hosted;
