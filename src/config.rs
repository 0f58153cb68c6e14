/// Number of task slots when nothing else is configured.
pub const MAX_TASKS: usize = 64;
/// Timer ticks a task may run before the trap-return path preempts it.
pub const DEFAULT_QUANTUM_TICKS: u64 = 1;
/// Deadline hint given to root tasks that don't ask for one.
pub const DEFAULT_COMPLETION_TIME: u64 = 100;
/// Address space size of root tasks, in bytes.
pub const ROOT_IMAGE_SIZE: usize = 16 * crate::task::resource::PAGE_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    pub max_tasks: usize,
    pub quantum_ticks: u64,
    pub default_completion_time: u64,
    pub root_image_size: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_tasks: MAX_TASKS,
            quantum_ticks: DEFAULT_QUANTUM_TICKS,
            default_completion_time: DEFAULT_COMPLETION_TIME,
            root_image_size: ROOT_IMAGE_SIZE,
        }
    }
}

impl KernelConfig {
    pub fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = max_tasks.max(1);
        self
    }

    pub fn with_quantum_ticks(mut self, quantum_ticks: u64) -> Self {
        self.quantum_ticks = quantum_ticks.max(1);
        self
    }

    pub fn with_default_completion_time(mut self, completion_time: u64) -> Self {
        self.default_completion_time = completion_time.max(1);
        self
    }

    pub fn with_root_image_size(mut self, size: usize) -> Self {
        self.root_image_size = size;
        self
    }

    /// Clamps zero values that would make the table or the quantum useless.
    pub(crate) fn sanitized(self) -> Self {
        Self {
            max_tasks: self.max_tasks.max(1),
            quantum_ticks: self.quantum_ticks.max(1),
            default_completion_time: self.default_completion_time.max(1),
            root_image_size: self.root_image_size,
        }
    }
}
