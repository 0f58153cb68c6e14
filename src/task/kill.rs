use super::tcb::{Pid, TaskState};
use crate::arch::Arch;
use crate::error::{TaskError, TaskResult};
use crate::Kernel;

impl<A: Arch> Kernel<A> {
    /// Marks `pid` killed. The task notices at its next kernel boundary;
    /// a sleeper is woken so that it notices promptly.
    pub fn kill(&self, pid: Pid) -> TaskResult<()> {
        self.arch.without_interrupts(|| {
            let mut table = self.table.lock();
            let slot = table.find(pid).ok_or(TaskError::NotFound)?;
            let task = table.slot_mut(slot);
            if !task.is_live() {
                return Err(TaskError::NotFound);
            }

            if !task.killed {
                log::debug!("Task {} killed", pid);
            }
            task.killed = true;
            if task.state == TaskState::Sleeping {
                task.wake();
            }
            Ok(())
        })
    }

    /// Whether the running task has been killed. Once true, stays true.
    pub fn killed(&self) -> bool {
        self.arch.without_interrupts(|| {
            self.table
                .lock()
                .current_task()
                .is_some_and(|task| task.killed)
        })
    }
}
