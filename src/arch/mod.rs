//! Architecture seam of the tasking core.
//!
//! Everything the scheduler needs from the machine goes through [`Arch`]:
//! building a fresh execution context, switching between two contexts,
//! masking interrupts around critical sections, and idling until the next
//! interrupt.

use alloc::boxed::Box;

use crate::error::TaskResult;

#[cfg(feature = "hosted")]
pub mod hosted;
#[cfg(all(target_arch = "x86_64", target_os = "none"))]
pub mod x86;

/// The code a freshly built context starts executing. It never returns.
pub type ContextEntry = Box<dyn FnOnce() + Send + 'static>;

/// What woke a halted CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Irq {
    /// A timer tick that the caller still has to account.
    Timer,
    /// Some interrupt whose handler already ran.
    External,
}

pub trait Arch: Send + Sync + 'static {
    type Context: Send;

    /// Context slot for the per-CPU scheduler loop. It is filled by the
    /// first switch away from the loop.
    fn scheduler_context(&self) -> Self::Context;

    /// Builds a context that runs `entry` the first time it is switched to.
    /// Fails when the machine has no room for another one.
    fn new_context(&self, entry: ContextEntry) -> TaskResult<Self::Context>;

    /// Saves the running context into `from` and resumes `to`.
    ///
    /// # Safety
    ///
    /// Both pointers must stay valid until the call returns in `from`, and
    /// `to` must hold a context that is not running anywhere else.
    unsafe fn switch(&self, from: *mut Self::Context, to: *const Self::Context);

    /// Last switch away from `from`, which is never resumed. Whatever backs
    /// it may be reclaimed from here on.
    ///
    /// # Safety
    ///
    /// As for [`Arch::switch`].
    unsafe fn exit_to(&self, from: *mut Self::Context, to: *const Self::Context) -> !;

    fn without_interrupts<R>(&self, f: impl FnOnce() -> R) -> R;

    fn enable_interrupts(&self);

    fn disable_interrupts(&self);

    /// Idles until an interrupt arrives. `None` means no interrupt source is
    /// left and the CPU would sleep forever.
    fn wait_for_interrupt(&self) -> Option<Irq>;
}
