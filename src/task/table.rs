use alloc::vec::Vec;

use super::tcb::{Pid, TaskState, Tcb};
use super::wait::WaitChannel;

/// Per-CPU scheduler state. Single core: the table owns the only one.
pub(crate) struct Cpu<C> {
    pub current: Option<usize>,
    pub scheduler: C,
    pub quantum_used: u64,
    pub need_resched: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Selection {
    /// Run the task in this slot.
    Task(usize),
    /// Only deferred tasks were runnable; try again right away.
    Deferred,
    /// Nothing is runnable.
    Idle,
}

/// Fixed-capacity registry of task control blocks.
pub(crate) struct TaskTable<C> {
    slots: Vec<Tcb<C>>,
    next_pid: u64,
    init: Option<Pid>,
    pub cpu: Cpu<C>,
}

impl<C> TaskTable<C> {
    pub fn new(capacity: usize, scheduler: C) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, Tcb::unused);
        Self {
            slots,
            next_pid: 1,
            init: None,
            cpu: Cpu {
                current: None,
                scheduler,
                quantum_used: 0,
                need_resched: false,
            },
        }
    }

    pub fn slot(&self, slot: usize) -> &Tcb<C> {
        &self.slots[slot]
    }

    pub fn slot_mut(&mut self, slot: usize) -> &mut Tcb<C> {
        &mut self.slots[slot]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tcb<C>> {
        self.slots.iter()
    }

    /// Reserves a free slot as an embryo with a fresh pid.
    pub fn allocate(&mut self) -> Option<usize> {
        let slot = self
            .slots
            .iter()
            .position(|task| task.state == TaskState::Unused)?;
        let pid = Pid(self.next_pid);
        self.next_pid += 1;

        let task = &mut self.slots[slot];
        *task = Tcb::unused();
        task.pid = pid;
        task.state = TaskState::Embryo;
        if self.init.is_none() {
            self.init = Some(pid);
        }
        Some(slot)
    }

    /// Returns a slot to the pool, dropping its context and resources.
    pub fn free(&mut self, slot: usize) {
        self.slots[slot] = Tcb::unused();
    }

    /// The first task ever created; it inherits orphans.
    pub fn init_pid(&self) -> Option<Pid> {
        self.init
    }

    pub fn find(&self, pid: Pid) -> Option<usize> {
        self.slots
            .iter()
            .position(|task| task.state != TaskState::Unused && task.pid == pid)
    }

    pub fn current(&self) -> Option<usize> {
        self.cpu.current
    }

    pub fn current_task(&self) -> Option<&Tcb<C>> {
        self.cpu.current.map(|slot| &self.slots[slot])
    }

    pub fn current_task_mut(&mut self) -> Option<&mut Tcb<C>> {
        self.cpu.current.map(|slot| &mut self.slots[slot])
    }

    /// Earliest-deadline-first pick over the runnable tasks.
    ///
    /// Tasks flagged `skip_next_round` sit this pass out and lose the flag.
    /// Ties on `completion_time` go to the lower pid.
    pub fn select_next(&mut self) -> Selection {
        let mut best: Option<(u64, Pid, usize)> = None;
        let mut deferred = false;

        for (slot, task) in self.slots.iter_mut().enumerate() {
            if task.state != TaskState::Runnable {
                continue;
            }
            if task.skip_next_round {
                task.skip_next_round = false;
                deferred = true;
                continue;
            }
            let key = (task.completion_time, task.pid, slot);
            if best.map_or(true, |current| key < current) {
                best = Some(key);
            }
        }

        match best {
            Some((_, _, slot)) => Selection::Task(slot),
            None if deferred => Selection::Deferred,
            None => Selection::Idle,
        }
    }

    /// Wakes every task sleeping on `channel`; returns how many woke.
    pub fn wake_all(&mut self, channel: WaitChannel) -> usize {
        let mut woken = 0;
        for task in self.slots.iter_mut() {
            if task.state == TaskState::Sleeping && task.channel == Some(channel) {
                task.wake();
                woken += 1;
            }
        }
        if woken > 0 {
            log::trace!("Woke {} task(s) on {:?}", woken, channel);
        }
        woken
    }

    /// One tick passed: count down bounded sleeps and wake the expired ones.
    pub fn expire_sleepers(&mut self) -> usize {
        let mut woken = 0;
        for task in self.slots.iter_mut() {
            if task.state != TaskState::Sleeping {
                continue;
            }
            if let Some(left) = task.sleep_ticks {
                let left = left.saturating_sub(1);
                if left == 0 {
                    task.wake();
                    woken += 1;
                } else {
                    task.sleep_ticks = Some(left);
                }
            }
        }
        woken
    }

    /// Charges one tick to the running task and flags a reschedule once its
    /// quantum is used up.
    pub fn charge_tick(&mut self, quantum: u64) {
        if self.cpu.current.is_none() {
            return;
        }
        self.cpu.quantum_used += 1;
        if self.cpu.quantum_used >= quantum {
            self.cpu.need_resched = true;
        }
    }

    pub fn has_sleepers(&self) -> bool {
        self.slots
            .iter()
            .any(|task| task.state == TaskState::Sleeping)
    }

    /// Hands every child of `parent` to `heir`. Returns whether one of them
    /// is already a zombie.
    pub fn reparent(&mut self, parent: Pid, heir: Option<Pid>) -> bool {
        let mut zombie = false;
        for task in self.slots.iter_mut() {
            if task.state != TaskState::Unused && task.parent == Some(parent) {
                task.parent = heir;
                zombie |= task.state == TaskState::Zombie;
            }
        }
        zombie
    }
}
