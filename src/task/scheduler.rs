use super::table::Selection;
use super::tcb::TaskState;
use crate::arch::{Arch, Irq};
use crate::error::{TaskError, TaskResult};
use crate::kernel::TableGuard;
use crate::Kernel;

/// Why [`Kernel::run`] gave the CPU back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    /// No task is runnable and none is waiting for anything.
    Quiescent,
    /// Tasks are asleep but the machine will never deliver another interrupt.
    Stalled,
}

/// A `time_to_complete` argument must be a positive tick count.
pub(crate) fn deadline_from(value: i64) -> TaskResult<u64> {
    match u64::try_from(value) {
        Ok(deadline) if deadline > 0 => Ok(deadline),
        _ => Err(TaskError::InvalidArgument),
    }
}

impl<A: Arch> Kernel<A> {
    /// The per-CPU scheduler loop.
    ///
    /// Picks the runnable task with the earliest completion time and switches
    /// to it; idles when there is none. On bare metal this never returns.
    pub fn run(&self) -> Halt {
        log::info!("Scheduler started");
        loop {
            match self.arch.without_interrupts(|| self.dispatch()) {
                Selection::Task(_) | Selection::Deferred => continue,
                Selection::Idle => {}
            }

            if !self.arch.without_interrupts(|| self.table.lock().has_sleepers()) {
                log::info!("Scheduler stopped: nothing left to run");
                return Halt::Quiescent;
            }
            match self.arch.wait_for_interrupt() {
                Some(Irq::Timer) => {
                    self.advance();
                }
                Some(Irq::External) => {}
                None => {
                    log::warn!("Scheduler stopped: tasks asleep with no interrupt source");
                    return Halt::Stalled;
                }
            }
        }
    }

    /// One scheduling decision. When a task is chosen, returns after it
    /// switches back.
    fn dispatch(&self) -> Selection {
        let mut table = self.table.lock();
        let selection = table.select_next();
        let Selection::Task(slot) = selection else {
            return selection;
        };
        let Some(to) = table.slot(slot).context.as_ref().map(|c| c as *const A::Context) else {
            log::error!("Runnable task {} has no context", table.slot(slot).pid);
            table.slot_mut(slot).state = TaskState::Zombie;
            return Selection::Idle;
        };

        table.slot_mut(slot).state = TaskState::Running;
        table.cpu.current = Some(slot);
        table.cpu.quantum_used = 0;
        table.cpu.need_resched = false;

        log::trace!("Switching to task {}", table.slot(slot).pid);
        let from: *mut A::Context = &mut table.cpu.scheduler;
        // The table lock stays held across the switch; whoever resumes on
        // the other side releases it.
        unsafe { self.arch.switch(from, to) };

        table.cpu.current = None;
        selection
    }

    /// Switches from the current task back to the scheduler loop.
    ///
    /// The caller holds the table lock and has already moved the task out of
    /// `Running`. The lock is held again when this returns.
    pub(crate) fn sched<'a>(&'a self, mut table: TableGuard<'a, A>) -> TableGuard<'a, A> {
        let Some(slot) = table.current() else {
            log::error!("sched called from the scheduler loop");
            return table;
        };
        let task = table.slot_mut(slot);
        if task.state == TaskState::Running {
            panic!("sched: task {} is still running", task.pid);
        }
        let Some(from) = task.context.as_mut().map(|c| c as *mut A::Context) else {
            panic!("sched: task {} has no context", task.pid);
        };
        let to: *const A::Context = &table.cpu.scheduler;

        unsafe { self.arch.switch(from, to) };
        table
    }

    /// Leaves a zombie for good. The scheduler resumes holding the lock, so
    /// our guard is forgotten rather than dropped.
    pub(crate) fn sched_exit(&self, mut table: TableGuard<'_, A>) -> ! {
        let Some(slot) = table.current() else {
            drop(table);
            panic!("sched_exit called from the scheduler loop");
        };
        let task = table.slot_mut(slot);
        let Some(from) = task.context.as_mut().map(|c| c as *mut A::Context) else {
            panic!("sched_exit: task {} has no context", task.pid);
        };
        let to: *const A::Context = &table.cpu.scheduler;

        core::mem::forget(table);
        unsafe { self.arch.exit_to(from, to) }
    }

    /// Gives up the CPU for one scheduling round.
    pub fn yield_now(&self) {
        self.arch.without_interrupts(|| {
            let mut table = self.table.lock();
            match table.current_task_mut() {
                Some(task) => task.state = TaskState::Runnable,
                None => return,
            }
            drop(self.sched(table));
        })
    }

    /// Yields, and additionally sits out the next scheduling pass while any
    /// other task is runnable.
    pub fn yield_and_defer(&self) {
        self.arch.without_interrupts(|| {
            let mut table = self.table.lock();
            match table.current_task_mut() {
                Some(task) => {
                    task.skip_next_round = true;
                    task.state = TaskState::Runnable;
                }
                None => return,
            }
            drop(self.sched(table));
        })
    }

    /// Changes the caller's completion time. Raising it yields so that a
    /// task with an earlier deadline can run now.
    pub fn set_deadline(&self, time_to_complete: i64) -> TaskResult<()> {
        let deadline = deadline_from(time_to_complete)?;
        let previous = self.replace_completion_time(deadline)?;
        if deadline > previous {
            self.yield_now();
        }
        Ok(())
    }

    /// Stores a new completion time for the caller and returns the old one.
    pub(crate) fn replace_completion_time(&self, deadline: u64) -> TaskResult<u64> {
        self.arch.without_interrupts(|| {
            let mut table = self.table.lock();
            let task = table.current_task_mut().ok_or(TaskError::NoCurrentTask)?;
            let previous = core::mem::replace(&mut task.completion_time, deadline);
            log::trace!("Task {} deadline {} -> {}", task.pid, previous, deadline);
            Ok(previous)
        })
    }

    /// Entry from the timer interrupt: account the tick, then act on the
    /// running task the way a trap return would.
    pub fn timer_interrupt(&self) {
        self.advance();
        self.preempt();
    }

    /// Kills exit here; tasks whose quantum ran out yield.
    pub fn preempt(&self) {
        let (killed, need_resched) = self.arch.without_interrupts(|| {
            let table = self.table.lock();
            match table.current_task() {
                Some(task) => (task.killed, table.cpu.need_resched),
                None => (false, false),
            }
        });

        if killed {
            self.exit(-1);
        }
        if need_resched {
            self.yield_now();
        }
    }
}
