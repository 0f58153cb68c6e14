mod common;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use common::{kernel, Trace};
use good_os_tasking::{Halt, KernelConfig, Pid};

/// A busy task ticks the clock itself while a more urgent task sleeps for
/// two ticks. Returns the interleaving.
fn busy_with_sleeper(quantum: u64) -> Vec<&'static str> {
    let kernel = kernel(KernelConfig::default().with_quantum_ticks(quantum));
    let trace = Trace::new();

    let b = trace.clone();
    kernel
        .spawn_kernel_task("urgent", Some(1), move || {
            let _ = kernel.sleep_ticks(2);
            b.push("b");
            0
        })
        .unwrap();
    let a = trace.clone();
    kernel
        .spawn_kernel_task("busy", Some(5), move || {
            for _ in 0..4 {
                a.push("a");
                kernel.timer_interrupt();
            }
            0
        })
        .unwrap();

    assert_eq!(kernel.run(), Halt::Quiescent);
    trace.take()
}

#[test]
fn expired_quantum_lets_a_woken_task_in() {
    assert_eq!(busy_with_sleeper(1), ["a", "a", "b", "a", "a"]);
}

#[test]
fn longer_quantum_delays_preemption() {
    assert_eq!(busy_with_sleeper(3), ["a", "a", "a", "b", "a"]);
}

#[test]
fn killed_task_exits_at_the_next_tick() {
    let kernel = kernel(KernelConfig::default());
    let victim = Arc::new(AtomicU64::new(0));
    let rounds = Trace::new();

    let target = victim.clone();
    kernel
        .spawn_kernel_task("killer", Some(1), move || {
            let _ = kernel.sleep_ticks(2);
            let _ = kernel.kill(Pid(target.load(Ordering::Acquire)));
            0
        })
        .unwrap();
    let r = rounds.clone();
    let pid = kernel
        .spawn_kernel_task("victim", Some(1), move || {
            for round in 0..10 {
                r.push(round);
                kernel.timer_interrupt();
            }
            0
        })
        .unwrap();
    victim.store(pid.0, Ordering::Release);

    assert_eq!(kernel.run(), Halt::Quiescent);
    assert_eq!(rounds.take(), [0, 1, 2]);
    assert!(kernel.task_info(pid).unwrap().killed);
    assert_eq!(kernel.reap_detached(pid), Some(-1));
}

#[test]
fn ticks_from_outside_any_task_only_count() {
    let kernel = kernel(KernelConfig::default());
    kernel.timer_interrupt();
    assert_eq!(kernel.advance(), 2);
    assert_eq!(kernel.uptime(), 2);
}
