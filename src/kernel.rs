use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::AtomicU64;
use spin::{Mutex, MutexGuard};

use crate::arch::Arch;
use crate::config::KernelConfig;
use crate::task::clock::TickSource;
use crate::task::program::{NoPrograms, ProgramLoader};
use crate::task::table::TaskTable;
use crate::task::tcb::{Pid, TaskInfo};

pub(crate) type TableGuard<'a, A> = MutexGuard<'a, TaskTable<<A as Arch>::Context>>;

/// The tasking core: tick source, task table and the CPU they run on.
///
/// One value exists for the life of the system. Operations that create tasks
/// need it as `&'static`, since new contexts keep a reference to it.
pub struct Kernel<A: Arch> {
    pub(crate) arch: A,
    pub(crate) config: KernelConfig,
    pub(crate) clock: TickSource,
    pub(crate) table: Mutex<TaskTable<A::Context>>,
    pub(crate) loader: Box<dyn ProgramLoader>,
    pub(crate) next_channel: AtomicU64,
}

impl<A: Arch> Kernel<A> {
    pub fn new(arch: A, config: KernelConfig) -> Self {
        Self::with_loader(arch, config, NoPrograms)
    }

    pub fn with_loader(arch: A, config: KernelConfig, loader: impl ProgramLoader + 'static) -> Self {
        let config = config.sanitized();
        let scheduler = arch.scheduler_context();
        log::info!(
            "Tasking initialized: {} slots, quantum {} tick(s)",
            config.max_tasks,
            config.quantum_ticks
        );

        Self {
            arch,
            config,
            clock: TickSource::new(),
            table: Mutex::new(TaskTable::new(config.max_tasks, scheduler)),
            loader: Box::new(loader),
            next_channel: AtomicU64::new(1),
        }
    }

    pub fn arch(&self) -> &A {
        &self.arch
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Pid of the running task, `None` from the scheduler loop.
    pub fn getpid(&self) -> Option<Pid> {
        self.arch
            .without_interrupts(|| self.table.lock().current_task().map(|task| task.pid))
    }

    pub fn snapshot(&self) -> Vec<TaskInfo> {
        self.arch.without_interrupts(|| {
            self.table
                .lock()
                .iter()
                .filter(|task| task.state != crate::task::TaskState::Unused)
                .map(|task| task.info())
                .collect()
        })
    }

    pub fn task_info(&self, pid: Pid) -> Option<TaskInfo> {
        self.arch.without_interrupts(|| {
            let table = self.table.lock();
            table.find(pid).map(|slot| table.slot(slot).info())
        })
    }

    /// Prints one line per task straight to the console, whatever the log
    /// level. Meant for a console key binding or a panic path.
    pub fn procdump(&self) {
        for task in self.snapshot() {
            crate::println!(
                "{} {} {} deadline={} chan={:?}{}",
                task.pid,
                task.state.name(),
                task.name,
                task.completion_time,
                task.channel,
                if task.killed { " killed" } else { "" }
            );
        }
    }
}
