//! A simulated single CPU built from host threads.
//!
//! Every context owns a baton. Switching releases the target's baton and
//! parks on our own, so exactly one context executes at any moment. Tasks run
//! on dedicated threads; the scheduler loop runs on whichever thread calls
//! [`Kernel::run`](crate::Kernel::run).
//!
//! A task that exits unwinds its thread back to the top and hands the CPU on
//! from there, so finished tasks hold no host thread.
//!
//! While idle the CPU receives one timer tick per [`Arch::wait_for_interrupt`]
//! call, until the configured idle budget runs out.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use super::{Arch, ContextEntry, Irq};
use crate::error::{TaskError, TaskResult};

/// Idle ticks delivered before the hosted CPU reports it has nothing left.
pub const DEFAULT_IDLE_BUDGET: u64 = 100_000;

const TASK_THREAD_STACK: usize = 256 * 1024;

#[derive(Default)]
struct Baton {
    ready: Mutex<bool>,
    signal: Condvar,
}

impl Baton {
    fn release(&self) {
        let mut ready = self.ready.lock().unwrap_or_else(|e| e.into_inner());
        *ready = true;
        self.signal.notify_one();
    }

    fn wait(&self) {
        let mut ready = self.ready.lock().unwrap_or_else(|e| e.into_inner());
        while !*ready {
            ready = self.signal.wait(ready).unwrap_or_else(|e| e.into_inner());
        }
        *ready = false;
    }
}

pub struct HostedContext {
    baton: Arc<Baton>,
}

/// Unwind payload carrying the baton to release once a task thread is done.
struct Exited {
    next: Arc<Baton>,
}

pub struct Hosted {
    idle_budget: AtomicU64,
    idle_ticks: AtomicU64,
}

impl Default for Hosted {
    fn default() -> Self {
        Self::new()
    }
}

impl Hosted {
    pub fn new() -> Self {
        Self::with_idle_budget(DEFAULT_IDLE_BUDGET)
    }

    pub fn with_idle_budget(budget: u64) -> Self {
        Self {
            idle_budget: AtomicU64::new(budget),
            idle_ticks: AtomicU64::new(0),
        }
    }

    /// Timer ticks delivered to the idle loop so far.
    pub fn idle_ticks(&self) -> u64 {
        self.idle_ticks.load(Ordering::Acquire)
    }
}

impl Arch for Hosted {
    type Context = HostedContext;

    fn scheduler_context(&self) -> HostedContext {
        HostedContext {
            baton: Arc::new(Baton::default()),
        }
    }

    fn new_context(&self, entry: ContextEntry) -> TaskResult<HostedContext> {
        let baton = Arc::new(Baton::default());
        let parked = baton.clone();
        thread::Builder::new()
            .name("hosted-task".into())
            .stack_size(TASK_THREAD_STACK)
            .spawn(move || {
                parked.wait();
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(entry));
                match outcome.map_err(|payload| payload.downcast::<Exited>()) {
                    Err(Ok(exited)) => exited.next.release(),
                    _ => {
                        // The scheduler is parked on us; nobody could ever resume it.
                        let _ = writeln!(std::io::stderr(), "hosted task panicked, aborting");
                        std::process::abort();
                    }
                }
            })
            .map_err(|err| {
                log::error!("Failed to start hosted task thread: {}", err);
                TaskError::TableFull
            })?;
        Ok(HostedContext { baton })
    }

    unsafe fn switch(&self, from: *mut HostedContext, to: *const HostedContext) {
        // Take both handles first: once `to` runs, it may touch the table that
        // owns these contexts.
        let own = (*from).baton.clone();
        let next = (*to).baton.clone();
        next.release();
        own.wait();
    }

    unsafe fn exit_to(&self, _from: *mut HostedContext, to: *const HostedContext) -> ! {
        let next = (*to).baton.clone();
        std::panic::resume_unwind(Box::new(Exited { next }))
    }

    fn without_interrupts<R>(&self, f: impl FnOnce() -> R) -> R {
        f()
    }

    fn enable_interrupts(&self) {}

    fn disable_interrupts(&self) {}

    fn wait_for_interrupt(&self) -> Option<Irq> {
        let granted = self
            .idle_budget
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| left.checked_sub(1))
            .is_ok();
        if granted {
            self.idle_ticks.fetch_add(1, Ordering::AcqRel);
            Some(Irq::Timer)
        } else {
            None
        }
    }
}
