use super::tcb::{Pid, TaskState};
use super::wait::WaitChannel;
use crate::arch::Arch;
use crate::error::{TaskError, TaskResult};
use crate::Kernel;

impl<A: Arch> Kernel<A> {
    /// Ends the running task with `status`.
    ///
    /// Children go to the init task, the parent is woken, and the task stays
    /// a zombie until it is reaped.
    pub fn exit(&self, status: i32) -> ! {
        self.arch.disable_interrupts();
        let mut table = self.table.lock();
        let Some(slot) = table.current() else {
            drop(table);
            panic!("exit called outside of any task");
        };
        let pid = table.slot(slot).pid;
        let parent = table.slot(slot).parent;

        let heir = table.init_pid().filter(|&init| {
            init != pid
                && table
                    .find(init)
                    .is_some_and(|init| table.slot(init).is_live())
        });
        if table.init_pid() == Some(pid) {
            let orphans = table
                .iter()
                .filter(|task| task.parent == Some(pid) && task.is_live())
                .count();
            if orphans > 0 {
                log::warn!("Init task {} exiting with {} live children", pid, orphans);
            } else {
                log::debug!("Init task {} exiting", pid);
            }
        }
        if table.reparent(pid, heir) {
            if let Some(heir) = heir {
                table.wake_all(WaitChannel::ChildExit(heir));
            }
        }
        if let Some(parent) = parent {
            table.wake_all(WaitChannel::ChildExit(parent));
        }

        let task = table.slot_mut(slot);
        task.resources = None;
        task.exit_status = status;
        task.state = TaskState::Zombie;
        log::debug!("Task {} exited with status {}", pid, status);

        self.sched_exit(table)
    }

    /// Reaps one zombie child and returns its pid and exit status, sleeping
    /// until a child exits if none has.
    pub fn wait(&self) -> TaskResult<(Pid, i32)> {
        self.arch.without_interrupts(|| {
            let mut table = self.table.lock();
            let me = table
                .current_task()
                .map(|task| task.pid)
                .ok_or(TaskError::NoCurrentTask)?;

            loop {
                let mut have_children = false;
                let mut zombie = None;
                for (slot, task) in table.iter().enumerate() {
                    if task.state == TaskState::Unused || task.parent != Some(me) {
                        continue;
                    }
                    have_children = true;
                    if task.state == TaskState::Zombie {
                        zombie = Some(slot);
                        break;
                    }
                }

                if let Some(slot) = zombie {
                    let child = table.slot(slot);
                    let reaped = (child.pid, child.exit_status);
                    table.free(slot);
                    log::debug!("Task {} reaped {} (status {})", me, reaped.0, reaped.1);
                    return Ok(reaped);
                }
                if !have_children {
                    return Err(TaskError::NoChildren);
                }
                if table.current_task().is_some_and(|task| task.killed) {
                    return Err(TaskError::Interrupted);
                }
                table = self.sleep_locked(table, WaitChannel::ChildExit(me));
            }
        })
    }

    /// Frees a zombie nobody will wait for: a root task, or an orphan whose
    /// heir died first.
    pub fn reap_detached(&self, pid: Pid) -> Option<i32> {
        self.arch.without_interrupts(|| {
            let mut table = self.table.lock();
            let slot = table.find(pid)?;
            let task = table.slot(slot);
            if task.state != TaskState::Zombie || task.parent.is_some() {
                return None;
            }
            let status = task.exit_status;
            table.free(slot);
            Some(status)
        })
    }
}
