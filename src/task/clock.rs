use spin::{Mutex, MutexGuard};

use crate::arch::Arch;
use crate::error::{TaskError, TaskResult};
use crate::task::wait::WaitChannel;
use crate::Kernel;

/// The global tick counter. Advanced only by the timer interrupt.
pub struct TickSource {
    ticks: Mutex<u64>,
}

impl Default for TickSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSource {
    pub const fn new() -> Self {
        Self {
            ticks: Mutex::new(0),
        }
    }

    pub fn now(&self) -> u64 {
        *self.ticks.lock()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, u64> {
        self.ticks.lock()
    }

    pub(crate) fn mutex(&self) -> &Mutex<u64> {
        &self.ticks
    }
}

impl<A: Arch> Kernel<A> {
    /// One timer tick: bump the counter, expire bounded sleeps and charge the
    /// running task's quantum. Returns the new tick count.
    pub fn advance(&self) -> u64 {
        self.arch.without_interrupts(|| {
            let mut ticks = self.clock.lock();
            *ticks += 1;

            let mut table = self.table.lock();
            let woken = table.expire_sleepers();
            table.charge_tick(self.config.quantum_ticks);
            if woken > 0 {
                log::trace!("Tick {}: {} sleeper(s) timed out", *ticks, woken);
            }
            *ticks
        })
    }

    pub fn uptime(&self) -> u64 {
        self.arch.without_interrupts(|| self.clock.now())
    }

    /// Blocks the caller for `n` ticks. Zero only yields.
    pub fn sleep_ticks(&self, n: i64) -> TaskResult<()> {
        let n = u64::try_from(n).map_err(|_| TaskError::InvalidArgument)?;
        if n == 0 {
            self.yield_now();
            return Ok(());
        }
        if self.getpid().is_none() {
            return Err(TaskError::NoCurrentTask);
        }

        self.arch.without_interrupts(|| {
            let mut ticks = self.clock.lock();
            let start = *ticks;
            while *ticks - start < n {
                if self.killed() {
                    return Err(TaskError::Interrupted);
                }
                let left = n - (*ticks - start);
                ticks = self.sleep_bounded(WaitChannel::Timer, left, self.clock.mutex(), ticks);
            }
            Ok(())
        })
    }
}
