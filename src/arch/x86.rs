//! Bare-metal x86_64 binding.
//!
//! Contexts are kernel stacks; a switch pushes the callee-saved registers,
//! swaps `rsp` and pops them again, like xv6's `swtch`. The timer ISR of the
//! platform calls [`timer_interrupt`] once the kernel has been installed.

use alloc::boxed::Box;
use alloc::vec::Vec;
use conquer_once::spin::OnceCell;
use x86_64::instructions::interrupts;

use super::{Arch, ContextEntry, Irq};
use crate::error::{TaskError, TaskResult};
use crate::Kernel;

const KERNEL_STACK_SIZE: usize = 16 * 1024;

static KERNEL: OnceCell<&'static Kernel<X86>> = OnceCell::uninit();

core::arch::global_asm!(
    ".global good_os_switch_stack",
    "good_os_switch_stack:",
    "push rbp",
    "push rbx",
    "push r12",
    "push r13",
    "push r14",
    "push r15",
    "mov [rdi], rsp",
    "mov rsp, rsi",
    "pop r15",
    "pop r14",
    "pop r13",
    "pop r12",
    "pop rbx",
    "pop rbp",
    "ret",
    "",
    ".global good_os_context_start",
    "good_os_context_start:",
    "mov rdi, r12",
    "call {trampoline}",
    "ud2",
    trampoline = sym context_trampoline,
);

extern "C" {
    fn good_os_switch_stack(save_rsp: *mut u64, load_rsp: u64);
    fn good_os_context_start();
}

extern "C" fn context_trampoline(entry: *mut ContextEntry) -> ! {
    let entry = unsafe { Box::from_raw(entry) };
    entry();
    loop {
        interrupts::disable();
        x86_64::instructions::hlt();
    }
}

pub struct X86Context {
    rsp: u64,
    _stack: Option<Vec<u8>>,
}

pub struct X86;

impl Arch for X86 {
    type Context = X86Context;

    fn scheduler_context(&self) -> X86Context {
        X86Context {
            rsp: 0,
            _stack: None,
        }
    }

    fn new_context(&self, entry: ContextEntry) -> TaskResult<X86Context> {
        let mut stack = Vec::new();
        stack
            .try_reserve_exact(KERNEL_STACK_SIZE)
            .map_err(|_| TaskError::TableFull)?;
        stack.resize(KERNEL_STACK_SIZE, 0u8);
        let top = (stack.as_mut_ptr() as u64 + KERNEL_STACK_SIZE as u64) & !0xf;
        let entry = Box::into_raw(Box::new(entry)) as u64;

        // Initial frame popped by `good_os_switch_stack`: r15, r14, r13, r12,
        // rbx, rbp, then the return address. Two padding slots keep `rsp`
        // 16-byte aligned at the `call` in `good_os_context_start`.
        let frame: [u64; 9] = [
            0,
            0,
            0,
            entry,
            0,
            0,
            good_os_context_start as usize as u64,
            0,
            0,
        ];
        let rsp = top - (frame.len() * 8) as u64;
        unsafe {
            core::ptr::copy_nonoverlapping(frame.as_ptr(), rsp as *mut u64, frame.len());
        }

        Ok(X86Context {
            rsp,
            _stack: Some(stack),
        })
    }

    unsafe fn switch(&self, from: *mut X86Context, to: *const X86Context) {
        good_os_switch_stack(&mut (*from).rsp, (*to).rsp);
    }

    unsafe fn exit_to(&self, from: *mut X86Context, to: *const X86Context) -> ! {
        // The stack we are on goes away with the context once it is reaped.
        good_os_switch_stack(&mut (*from).rsp, (*to).rsp);
        loop {
            interrupts::disable();
            x86_64::instructions::hlt();
        }
    }

    fn without_interrupts<R>(&self, f: impl FnOnce() -> R) -> R {
        interrupts::without_interrupts(f)
    }

    fn enable_interrupts(&self) {
        interrupts::enable();
    }

    fn disable_interrupts(&self) {
        interrupts::disable();
    }

    fn wait_for_interrupt(&self) -> Option<Irq> {
        interrupts::enable_and_hlt();
        Some(Irq::External)
    }
}

/// Makes `kernel` the target of [`timer_interrupt`].
pub fn install(kernel: &'static Kernel<X86>) {
    if KERNEL.try_init_once(|| kernel).is_err() {
        log::warn!("Tasking kernel already installed");
    }
}

/// Entry for the platform's timer ISR, on the interrupted task's stack.
pub fn timer_interrupt() {
    if let Ok(kernel) = KERNEL.try_get() {
        kernel.timer_interrupt();
    }
}
