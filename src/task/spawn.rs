use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use bitflags::bitflags;

use super::program::TaskBody;
use super::resource::{AddressSpace, ResourceTable, UserStack};
use super::tcb::{Pid, TaskKind, TaskState};
use crate::arch::Arch;
use crate::error::{TaskError, TaskResult};
use crate::Kernel;

bitflags! {
    /// What a new task shares with its creator instead of copying.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CloneFlags: u32 {
        const VM = 1 << 0;
        const FILES = 1 << 1;
        const THREAD = Self::VM.bits() | Self::FILES.bits();
    }
}

/// The parts of the creating task a child starts from.
struct Creator {
    pid: Pid,
    name: String,
    completion_time: u64,
    space: Option<Arc<AddressSpace>>,
    resources: Option<Arc<ResourceTable>>,
}

impl<A: Arch> Kernel<A> {
    /// New process with a private copy of the caller's resources.
    pub fn fork<F>(&'static self, body: F) -> TaskResult<Pid>
    where
        F: FnOnce() -> i32 + Send + 'static,
    {
        self.spawn(CloneFlags::empty(), None, Box::new(body))
    }

    /// New thread sharing the caller's address space and resources, running
    /// on `stack`.
    pub fn clone<F>(&'static self, stack: UserStack, body: F) -> TaskResult<Pid>
    where
        F: FnOnce() -> i32 + Send + 'static,
    {
        self.spawn(CloneFlags::THREAD, Some(stack), Box::new(body))
    }

    /// Child of the running task. `flags` picks what is shared.
    pub fn spawn(
        &'static self,
        flags: CloneFlags,
        stack: Option<UserStack>,
        body: TaskBody,
    ) -> TaskResult<Pid> {
        let creator = self.arch.without_interrupts(|| {
            let table = self.table.lock();
            table
                .current_task()
                .map(|task| Creator {
                    pid: task.pid,
                    name: task.name.clone(),
                    completion_time: task.completion_time,
                    space: task.space.clone(),
                    resources: task.resources.clone(),
                })
                .ok_or(TaskError::NoCurrentTask)
        })?;

        let name = creator.name.clone();
        self.create(flags, stack, Some(creator), None, name, body)
    }

    /// Parentless task, as a kernel creates at boot. Without a completion
    /// time it gets the configured default.
    pub fn spawn_kernel_task<F>(
        &'static self,
        name: &str,
        completion_time: Option<u64>,
        body: F,
    ) -> TaskResult<Pid>
    where
        F: FnOnce() -> i32 + Send + 'static,
    {
        if completion_time == Some(0) {
            return Err(TaskError::InvalidArgument);
        }
        self.create(
            CloneFlags::empty(),
            None,
            None,
            completion_time,
            name.to_string(),
            Box::new(body),
        )
    }

    fn create(
        &'static self,
        flags: CloneFlags,
        stack: Option<UserStack>,
        creator: Option<Creator>,
        completion_time: Option<u64>,
        name: String,
        body: TaskBody,
    ) -> TaskResult<Pid> {
        let parent_space = creator.as_ref().and_then(|creator| creator.space.clone());
        if let Some(stack) = stack {
            if !parent_space
                .as_ref()
                .is_some_and(|space| stack.is_valid_in(space))
            {
                log::debug!("Rejected user stack {:#x}", stack.base);
                return Err(TaskError::InvalidArgument);
            }
        }

        let (slot, pid) = self.arch.without_interrupts(|| {
            let mut table = self.table.lock();
            let slot = table.allocate().ok_or(TaskError::TableFull)?;
            Ok::<_, TaskError>((slot, table.slot(slot).pid))
        })?;

        // The slot is ours as an embryo; build the rest without the lock.
        let space = match parent_space {
            Some(space) if flags.contains(CloneFlags::VM) => space,
            Some(space) => Arc::new(space.duplicate()),
            None => Arc::new(AddressSpace::new(self.config.root_image_size)),
        };
        let parent_resources = creator.as_ref().and_then(|creator| creator.resources.clone());
        let resources = match parent_resources {
            Some(resources) if flags.contains(CloneFlags::FILES) => resources,
            Some(resources) => Arc::new(resources.duplicate()),
            None => Arc::new(ResourceTable::new()),
        };
        let context = match self.arch.new_context(Box::new(move || {
            self.task_start(body);
        })) {
            Ok(context) => context,
            Err(err) => {
                self.arch
                    .without_interrupts(|| self.table.lock().free(slot));
                log::warn!("No context for task {}: {}", pid, err);
                return Err(err);
            }
        };
        let completion_time = completion_time
            .or(creator.as_ref().map(|creator| creator.completion_time))
            .unwrap_or(self.config.default_completion_time);
        let parent = creator.as_ref().map(|creator| creator.pid);
        let kind = if flags.contains(CloneFlags::VM) {
            TaskKind::Thread
        } else {
            TaskKind::Process
        };

        self.arch.without_interrupts(|| {
            let mut table = self.table.lock();
            let task = table.slot_mut(slot);
            task.parent = parent;
            task.kind = kind;
            task.name = name;
            task.context = Some(context);
            task.completion_time = completion_time;
            task.space = Some(space);
            task.resources = Some(resources);
            task.user_stack = stack;
            task.state = TaskState::Runnable;
        });
        log::debug!(
            "Created {:?} {} (parent {:?}, deadline {})",
            kind,
            pid,
            parent,
            completion_time
        );
        Ok(pid)
    }

    /// First code every task runs. The scheduler switched here with the
    /// table lock held.
    fn task_start(&self, body: TaskBody) -> ! {
        unsafe { self.table.force_unlock() };
        self.arch.enable_interrupts();
        let status = body();
        self.exit(status)
    }
}
