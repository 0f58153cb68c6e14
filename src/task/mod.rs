pub mod clock;
mod exec;
mod kill;
mod process;
pub mod program;
pub mod resource;
pub mod scheduler;
mod spawn;
pub(crate) mod table;
pub mod tcb;
pub mod wait;

pub use clock::TickSource;
pub use program::{NoPrograms, Program, ProgramLoader, ProgramMain, ProgramRegistry, TaskBody};
pub use resource::{AddressSpace, ResourceTable, UserStack, PAGE_SIZE};
pub use scheduler::Halt;
pub use spawn::CloneFlags;
pub use tcb::{Pid, TaskInfo, TaskKind, TaskState};
pub use wait::{ChannelId, WaitChannel, WaitQueue};
