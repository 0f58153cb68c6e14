use thiserror::Error;

pub type TaskResult<T> = Result<T, TaskError>;

/// Failures reported by the tasking primitives.
///
/// None of these are fatal to the kernel; each one is returned to the task
/// that issued the call and leaves every other task untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("invalid argument")]
    InvalidArgument,
    #[error("task table is full")]
    TableFull,
    #[error("interrupted by kill request")]
    Interrupted,
    #[error("no such task")]
    NotFound,
    #[error("no children to wait for")]
    NoChildren,
    #[error("not called from a task")]
    NoCurrentTask,
    #[error("program load failed: {0}")]
    LoadFailed(#[from] LoadError),
}

impl TaskError {
    /// Value handed back across the system call boundary.
    pub const fn errno(&self) -> isize {
        -1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("program not found")]
    NotFound,
    #[error("invalid program image")]
    InvalidImage,
}
