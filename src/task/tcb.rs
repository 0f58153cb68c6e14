use alloc::string::String;
use alloc::sync::Arc;
use core::fmt;

use super::resource::{AddressSpace, ResourceTable, UserStack};
use super::wait::WaitChannel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub u64);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaskState {
    Unused,
    Embryo,
    Runnable,
    Running,
    Sleeping,
    Zombie,
}

impl TaskState {
    pub fn name(&self) -> &'static str {
        match self {
            TaskState::Unused => "unused",
            TaskState::Embryo => "embryo",
            TaskState::Runnable => "runble",
            TaskState::Running => "run",
            TaskState::Sleeping => "sleep",
            TaskState::Zombie => "zombie",
        }
    }
}

/// Whether a task owns its address space or borrows its creator's.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaskKind {
    Process,
    Thread,
}

/// Task control block. Lives in a table slot and is only touched with the
/// table lock held.
pub struct Tcb<C> {
    pub pid: Pid,
    pub state: TaskState,
    pub kind: TaskKind,
    pub parent: Option<Pid>,
    pub name: String,
    pub context: Option<C>,
    pub channel: Option<WaitChannel>,
    pub sleep_ticks: Option<u64>,
    pub killed: bool,
    pub completion_time: u64,
    pub skip_next_round: bool,
    pub exit_status: i32,
    pub space: Option<Arc<AddressSpace>>,
    pub resources: Option<Arc<ResourceTable>>,
    pub user_stack: Option<UserStack>,
}

impl<C> Tcb<C> {
    pub fn unused() -> Self {
        Self {
            pid: Pid(0),
            state: TaskState::Unused,
            kind: TaskKind::Process,
            parent: None,
            name: String::new(),
            context: None,
            channel: None,
            sleep_ticks: None,
            killed: false,
            completion_time: 0,
            skip_next_round: false,
            exit_status: 0,
            space: None,
            resources: None,
            user_stack: None,
        }
    }

    /// Alive in the sense of `kill`: a slot that is neither free nor a corpse.
    pub fn is_live(&self) -> bool {
        !matches!(self.state, TaskState::Unused | TaskState::Zombie)
    }

    /// Sleeping -> Runnable, forgetting what it waited for.
    pub fn wake(&mut self) {
        self.state = TaskState::Runnable;
        self.channel = None;
        self.sleep_ticks = None;
    }

    pub fn info(&self) -> TaskInfo {
        TaskInfo {
            pid: self.pid,
            parent: self.parent,
            state: self.state,
            kind: self.kind,
            name: self.name.clone(),
            channel: self.channel,
            sleep_ticks: self.sleep_ticks,
            killed: self.killed,
            completion_time: self.completion_time,
            skip_next_round: self.skip_next_round,
            space_id: self.space.as_ref().map(|space| space.id()),
            resources_id: self.resources.as_ref().map(|resources| resources.id()),
        }
    }
}

/// A copy of one TCB's scheduling-relevant fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub pid: Pid,
    pub parent: Option<Pid>,
    pub state: TaskState,
    pub kind: TaskKind,
    pub name: String,
    pub channel: Option<WaitChannel>,
    pub sleep_ticks: Option<u64>,
    pub killed: bool,
    pub completion_time: u64,
    pub skip_next_round: bool,
    pub space_id: Option<u64>,
    pub resources_id: Option<u64>,
}
