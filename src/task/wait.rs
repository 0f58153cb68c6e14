//! Sleep and wakeup on wait channels.
//!
//! A sleeper names what it waits for, gives up the lock protecting that
//! condition, and blocks. The table lock is taken before the caller's lock is
//! released, so a `wake_all` racing with the sleeper either runs before the
//! caller checked its condition or finds it already asleep.

use core::sync::atomic::Ordering;
use spin::{Mutex, MutexGuard};

use super::tcb::{Pid, TaskState};
use crate::arch::Arch;
use crate::error::{TaskError, TaskResult};
use crate::kernel::TableGuard;
use crate::Kernel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(pub u64);

/// What a sleeping task waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitChannel {
    /// A child of this task changed to a zombie.
    ChildExit(Pid),
    /// The tick counter moved.
    Timer,
    /// Anything else, minted by [`Kernel::new_channel`].
    Custom(ChannelId),
}

impl<A: Arch> Kernel<A> {
    /// A channel no other caller will ever receive.
    pub fn new_channel(&self) -> WaitChannel {
        WaitChannel::Custom(ChannelId(
            self.next_channel.fetch_add(1, Ordering::Relaxed),
        ))
    }

    /// Releases `guard`, sleeps on `channel` and reacquires `lock` once woken.
    ///
    /// Returns at once when the caller was already killed, so callers loop on
    /// their condition and check [`Kernel::killed`].
    pub fn sleep<'a, T: ?Sized>(
        &self,
        channel: WaitChannel,
        lock: &'a Mutex<T>,
        guard: MutexGuard<'a, T>,
    ) -> MutexGuard<'a, T> {
        self.sleep_on(channel, None, lock, guard)
    }

    /// Like [`Kernel::sleep`], but the timer wakes the caller after `ticks`
    /// ticks even if nobody signals `channel`.
    pub fn sleep_bounded<'a, T: ?Sized>(
        &self,
        channel: WaitChannel,
        ticks: u64,
        lock: &'a Mutex<T>,
        guard: MutexGuard<'a, T>,
    ) -> MutexGuard<'a, T> {
        self.sleep_on(channel, Some(ticks.max(1)), lock, guard)
    }

    fn sleep_on<'a, T: ?Sized>(
        &self,
        channel: WaitChannel,
        bound: Option<u64>,
        lock: &'a Mutex<T>,
        guard: MutexGuard<'a, T>,
    ) -> MutexGuard<'a, T> {
        self.arch.without_interrupts(|| {
            let table = self.table.lock();
            drop(guard);
            drop(self.block_current(table, channel, bound));
            lock.lock()
        })
    }

    /// Sleep for callers whose condition is guarded by the table lock itself.
    pub(crate) fn sleep_locked<'a>(
        &'a self,
        table: TableGuard<'a, A>,
        channel: WaitChannel,
    ) -> TableGuard<'a, A> {
        self.block_current(table, channel, None)
    }

    fn block_current<'a>(
        &'a self,
        mut table: TableGuard<'a, A>,
        channel: WaitChannel,
        bound: Option<u64>,
    ) -> TableGuard<'a, A> {
        let Some(task) = table.current_task_mut() else {
            log::warn!("Sleep on {:?} outside of any task", channel);
            return table;
        };
        if task.killed {
            return table;
        }

        task.channel = Some(channel);
        task.sleep_ticks = bound;
        task.state = TaskState::Sleeping;
        self.sched(table)
    }

    /// Wakes every task sleeping on `channel`.
    pub fn wake_all(&self, channel: WaitChannel) -> usize {
        self.arch
            .without_interrupts(|| self.table.lock().wake_all(channel))
    }
}

/// A condition variable over a private channel.
///
/// ```ignore
/// let mut count = lock.lock();
/// count = queue.wait_until(&lock, count, |count| *count > 0)?;
/// ```
pub struct WaitQueue<A: Arch> {
    kernel: &'static Kernel<A>,
    channel: WaitChannel,
}

impl<A: Arch> WaitQueue<A> {
    pub fn new(kernel: &'static Kernel<A>) -> Self {
        Self {
            channel: kernel.new_channel(),
            kernel,
        }
    }

    pub fn channel(&self) -> WaitChannel {
        self.channel
    }

    /// Sleeps until `condition` holds for the guarded value.
    pub fn wait_until<'a, T: ?Sized>(
        &self,
        lock: &'a Mutex<T>,
        mut guard: MutexGuard<'a, T>,
        mut condition: impl FnMut(&mut T) -> bool,
    ) -> TaskResult<MutexGuard<'a, T>> {
        loop {
            if condition(&mut *guard) {
                return Ok(guard);
            }
            if self.kernel.killed() {
                return Err(TaskError::Interrupted);
            }
            guard = self.kernel.sleep(self.channel, lock, guard);
        }
    }

    /// Sleeps until `condition` holds or `ticks` ticks have passed. The flag
    /// tells which of the two happened.
    pub fn wait_until_bounded<'a, T: ?Sized>(
        &self,
        lock: &'a Mutex<T>,
        mut guard: MutexGuard<'a, T>,
        ticks: u64,
        mut condition: impl FnMut(&mut T) -> bool,
    ) -> TaskResult<(MutexGuard<'a, T>, bool)> {
        let start = self.kernel.uptime();
        loop {
            if condition(&mut *guard) {
                return Ok((guard, true));
            }
            if self.kernel.killed() {
                return Err(TaskError::Interrupted);
            }
            let elapsed = self.kernel.uptime() - start;
            if elapsed >= ticks {
                return Ok((guard, false));
            }
            guard = self
                .kernel
                .sleep_bounded(self.channel, ticks - elapsed, lock, guard);
        }
    }

    pub fn notify_all(&self) -> usize {
        self.kernel.wake_all(self.channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_compare_by_kind_and_id() {
        assert_eq!(WaitChannel::ChildExit(Pid(3)), WaitChannel::ChildExit(Pid(3)));
        assert_ne!(WaitChannel::ChildExit(Pid(3)), WaitChannel::ChildExit(Pid(4)));
        assert_ne!(
            WaitChannel::Custom(ChannelId(1)),
            WaitChannel::Custom(ChannelId(2))
        );
        assert_ne!(WaitChannel::Timer, WaitChannel::Custom(ChannelId(0)));
    }
}
