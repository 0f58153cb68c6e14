mod common;

use std::sync::atomic::{AtomicUsize, Ordering};

use common::{kernel, kernel_with_loader, Trace};
use good_os_tasking::arch::hosted::HostedContext;
use good_os_tasking::arch::{Arch, ContextEntry, Irq};
use good_os_tasking::task::{ProgramRegistry, TaskKind, PAGE_SIZE};
use good_os_tasking::{
    Halt, Hosted, Kernel, KernelConfig, LoadError, Pid, TaskError, TaskResult, TaskState,
    UserStack,
};

#[test]
fn fork_then_wait_reaps_the_child() {
    let kernel = kernel(KernelConfig::default());
    let seen = Trace::new();

    let s = seen.clone();
    kernel
        .spawn_kernel_task("parent", None, move || {
            let child = kernel.fork(|| 7);
            s.push(child.map(|pid| (pid, 0)));
            s.push(kernel.wait());
            s.push(kernel.wait());
            0
        })
        .unwrap();

    assert_eq!(kernel.run(), Halt::Quiescent);
    assert_eq!(
        seen.take(),
        [Ok((Pid(2), 0)), Ok((Pid(2), 7)), Err(TaskError::NoChildren)]
    );
    assert_eq!(kernel.task_info(Pid(2)), None);
}

#[test]
fn fork_copies_and_clone_shares() {
    let kernel = kernel(KernelConfig::default());
    let seen = Trace::new();

    let s = seen.clone();
    kernel
        .spawn_kernel_task("parent", Some(9), move || {
            let me = kernel.task_info(kernel.getpid().unwrap()).unwrap();

            let child = kernel.fork(|| 0).unwrap();
            let info = kernel.task_info(child).unwrap();
            s.push((
                info.kind,
                info.space_id == me.space_id,
                info.resources_id == me.resources_id,
                info.completion_time,
                info.parent,
            ));
            let _ = kernel.wait();

            let thread = kernel.clone(UserStack::new(PAGE_SIZE), || 0).unwrap();
            let info = kernel.task_info(thread).unwrap();
            s.push((
                info.kind,
                info.space_id == me.space_id,
                info.resources_id == me.resources_id,
                info.completion_time,
                info.parent,
            ));
            let _ = kernel.wait();
            0
        })
        .unwrap();

    kernel.run();
    assert_eq!(
        seen.take(),
        [
            (TaskKind::Process, false, false, 9, Some(Pid(1))),
            (TaskKind::Thread, true, true, 9, Some(Pid(1))),
        ]
    );
}

#[test]
fn clone_rejects_a_bad_stack_without_using_a_slot() {
    let kernel = kernel(KernelConfig::default());
    let seen = Trace::new();

    let s = seen.clone();
    kernel
        .spawn_kernel_task("parent", None, move || {
            s.push(kernel.clone(UserStack::new(0), || 0).err());
            s.push(kernel.clone(UserStack::new(PAGE_SIZE + 1), || 0).err());
            s.push(kernel.clone(UserStack::new(1 << 40), || 0).err());
            s.push(kernel.wait().err());
            0
        })
        .unwrap();

    kernel.run();
    assert_eq!(kernel.snapshot().len(), 1);
    assert_eq!(
        seen.take(),
        [
            Some(TaskError::InvalidArgument),
            Some(TaskError::InvalidArgument),
            Some(TaskError::InvalidArgument),
            Some(TaskError::NoChildren),
        ]
    );
    assert_eq!(
        kernel.clone(UserStack::new(PAGE_SIZE), || 0),
        Err(TaskError::NoCurrentTask)
    );
}

#[test]
fn full_table_refuses_new_tasks() {
    let kernel = kernel(KernelConfig::default().with_max_tasks(2));
    let seen = Trace::new();

    let s = seen.clone();
    let parent = kernel
        .spawn_kernel_task("parent", None, move || {
            s.push(kernel.fork(|| 0).map(|_| ()));
            s.push(kernel.fork(|| 0).map(|_| ()));
            let _ = kernel.wait();
            // The reaped slot is free again.
            s.push(kernel.fork(|| 0).map(|_| ()));
            let _ = kernel.wait();
            0
        })
        .unwrap();

    kernel.run();
    assert_eq!(seen.take(), [Ok(()), Err(TaskError::TableFull), Ok(())]);

    // The parent's corpse still holds a slot until someone reaps it.
    assert!(kernel.spawn_kernel_task("late", None, || 0).is_ok());
    assert_eq!(
        kernel.spawn_kernel_task("too late", None, || 0),
        Err(TaskError::TableFull)
    );
    assert_eq!(kernel.reap_detached(parent), Some(0));
    assert!(kernel.spawn_kernel_task("in time", None, || 0).is_ok());
}

/// A hosted CPU with room for only a few more contexts.
struct Cramped {
    cpu: Hosted,
    room: AtomicUsize,
}

impl Arch for Cramped {
    type Context = HostedContext;

    fn scheduler_context(&self) -> HostedContext {
        self.cpu.scheduler_context()
    }

    fn new_context(&self, entry: ContextEntry) -> TaskResult<HostedContext> {
        self.room
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |room| room.checked_sub(1))
            .map_err(|_| TaskError::TableFull)?;
        self.cpu.new_context(entry)
    }

    unsafe fn switch(&self, from: *mut HostedContext, to: *const HostedContext) {
        self.cpu.switch(from, to)
    }

    unsafe fn exit_to(&self, from: *mut HostedContext, to: *const HostedContext) -> ! {
        self.cpu.exit_to(from, to)
    }

    fn without_interrupts<R>(&self, f: impl FnOnce() -> R) -> R {
        self.cpu.without_interrupts(f)
    }

    fn enable_interrupts(&self) {}

    fn disable_interrupts(&self) {}

    fn wait_for_interrupt(&self) -> Option<Irq> {
        self.cpu.wait_for_interrupt()
    }
}

#[test]
fn failed_context_leaves_no_task_behind() {
    good_os_tasking::console::init_hosted(log::LevelFilter::Warn);
    let cpu = Cramped {
        cpu: Hosted::new(),
        room: AtomicUsize::new(2),
    };
    let kernel: &'static Kernel<Cramped> =
        Box::leak(Box::new(Kernel::new(cpu, KernelConfig::default())));
    let seen = Trace::new();

    let s = seen.clone();
    let parent = kernel
        .spawn_kernel_task("parent", None, move || {
            s.push(kernel.fork(|| 5).map(|_| kernel.snapshot().len()));
            s.push(kernel.fork(|| 6).map(|_| kernel.snapshot().len()));
            s.push(Ok(kernel.snapshot().len()));
            s.push(kernel.wait().map(|(_, status)| status as usize));
            0
        })
        .unwrap();

    assert_eq!(kernel.run(), Halt::Quiescent);
    assert_eq!(seen.take(), [Ok(2), Err(TaskError::TableFull), Ok(2), Ok(5)]);
    assert_eq!(
        kernel.spawn_kernel_task("late", None, || 0),
        Err(TaskError::TableFull)
    );
    assert_eq!(kernel.snapshot().len(), 1);
    assert_eq!(kernel.reap_detached(parent), Some(0));
}

#[test]
fn orphans_are_handed_to_init() {
    let kernel = kernel(KernelConfig::default());
    let seen = Trace::new();

    let s = seen.clone();
    kernel
        .spawn_kernel_task("init", None, move || {
            let _ = kernel.fork(move || {
                let _ = kernel.fork(|| 3);
                2
            });
            s.push(kernel.wait());
            s.push(kernel.wait());
            s.push(kernel.wait());
            0
        })
        .unwrap();

    kernel.run();
    assert_eq!(
        seen.take(),
        [
            Ok((Pid(2), 2)),
            Ok((Pid(3), 3)),
            Err(TaskError::NoChildren)
        ]
    );
}

#[test]
fn kill_interrupts_wait() {
    let kernel = kernel(KernelConfig::default());
    let seen = Trace::new();

    let s = seen.clone();
    let parent = kernel
        .spawn_kernel_task("parent", Some(1), move || {
            let _ = kernel.fork(move || {
                let _ = kernel.sleep_ticks(3);
                0
            });
            s.push(kernel.wait());
            s.push(kernel.wait());
            0
        })
        .unwrap();
    kernel
        .spawn_kernel_task("killer", Some(2), move || {
            let _ = kernel.kill(parent);
            0
        })
        .unwrap();

    assert_eq!(kernel.run(), Halt::Quiescent);
    assert_eq!(
        seen.take(),
        [Err(TaskError::Interrupted), Err(TaskError::Interrupted)]
    );
    // The child outlived its parent, which was init, so nobody reaps it.
    let orphan = kernel
        .snapshot()
        .into_iter()
        .find(|task| task.pid == Pid(3))
        .unwrap();
    assert_eq!(orphan.state, TaskState::Zombie);
    assert_eq!(orphan.parent, None);
    assert_eq!(kernel.reap_detached(Pid(3)), Some(0));
}

fn answer(args: Vec<String>) -> i32 {
    40 + args.len() as i32
}

#[test]
fn spawn_with_deadline_execs_or_restores() {
    let registry = ProgramRegistry::new();
    registry.register("answer", 2 * PAGE_SIZE, answer);
    registry.register("corrupt", 0, answer);
    let kernel = kernel_with_loader(KernelConfig::default(), registry);
    let seen = Trace::new();

    let s = seen.clone();
    kernel
        .spawn_kernel_task("shell", Some(50), move || {
            let c = s.clone();
            let _ = kernel.fork(move || {
                let me = kernel.getpid().unwrap();
                let deadline = || kernel.task_info(me).unwrap().completion_time;

                let missing = kernel.spawn_with_deadline(7, "missing", &[]).err();
                c.push((missing, deadline()));
                let corrupt = kernel.spawn_with_deadline(7, "corrupt", &[]).err();
                c.push((corrupt, deadline()));
                let invalid = kernel.spawn_with_deadline(0, "answer", &[]).err();
                c.push((invalid, deadline()));

                let _ = kernel.spawn_with_deadline(7, "answer", &["a", "b"]);
                -1
            });
            s.push((None, kernel.wait().map_or(0, |(_, status)| status as u64)));
            0
        })
        .unwrap();

    kernel.run();
    assert_eq!(
        seen.take(),
        [
            (Some(TaskError::LoadFailed(LoadError::NotFound)), 50),
            (Some(TaskError::LoadFailed(LoadError::InvalidImage)), 50),
            (Some(TaskError::InvalidArgument), 50),
            (None, 42),
        ]
    );
}

#[test]
fn exec_replaces_the_image() {
    let registry = ProgramRegistry::new();
    registry.register("answer", 2 * PAGE_SIZE, answer);
    let kernel = kernel_with_loader(KernelConfig::default(), registry);

    let pid = kernel
        .spawn_kernel_task("loader", None, move || {
            let _ = kernel.exec("answer", &["x"]);
            -1
        })
        .unwrap();

    kernel.run();
    let info = kernel.task_info(pid).unwrap();
    assert_eq!(info.name, "answer");
    assert_eq!(info.state, TaskState::Zombie);
    assert_eq!(kernel.reap_detached(pid), Some(41));
}
