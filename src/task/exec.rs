use alloc::string::ToString;
use alloc::sync::Arc;
use core::convert::Infallible;

use super::program::Program;
use super::scheduler::deadline_from;
use super::tcb::TaskKind;
use crate::arch::Arch;
use crate::error::{TaskError, TaskResult};
use crate::Kernel;

impl<A: Arch> Kernel<A> {
    /// Replaces the caller's image with `path`. Only returns on failure, in
    /// which case the caller is left untouched.
    pub fn exec(&self, path: &str, args: &[&str]) -> TaskResult<Infallible> {
        let pid = self.getpid().ok_or(TaskError::NoCurrentTask)?;
        let Program { space, entry } = self.loader.load(path, args).map_err(|err| {
            log::debug!("Task {} failed to exec {}: {}", pid, path, err);
            TaskError::from(err)
        })?;

        self.arch.without_interrupts(|| {
            let mut table = self.table.lock();
            if let Some(task) = table.current_task_mut() {
                task.space = Some(Arc::new(space));
                task.kind = TaskKind::Process;
                task.user_stack = None;
                task.name = path.to_string();
            }
        });
        log::debug!("Task {} now runs {}", pid, path);

        let status = entry();
        self.exit(status)
    }

    /// Sets the caller's completion time and execs `path` under it. On
    /// failure the previous completion time is restored.
    pub fn spawn_with_deadline(
        &self,
        time_to_complete: i64,
        path: &str,
        args: &[&str],
    ) -> TaskResult<Infallible> {
        let deadline = deadline_from(time_to_complete)?;
        let previous = self.replace_completion_time(deadline)?;
        match self.exec(path, args) {
            Ok(never) => match never {},
            Err(err) => {
                self.replace_completion_time(previous)?;
                Err(err)
            }
        }
    }
}
