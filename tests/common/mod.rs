#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use good_os_tasking::task::ProgramLoader;
use good_os_tasking::{Hosted, Kernel, KernelConfig};

pub fn kernel(config: KernelConfig) -> &'static Kernel<Hosted> {
    kernel_on(Hosted::new(), config)
}

pub fn kernel_on(arch: Hosted, config: KernelConfig) -> &'static Kernel<Hosted> {
    good_os_tasking::console::init_hosted(log::LevelFilter::Warn);
    Box::leak(Box::new(Kernel::new(arch, config)))
}

pub fn kernel_with_loader(
    config: KernelConfig,
    loader: impl ProgramLoader + 'static,
) -> &'static Kernel<Hosted> {
    good_os_tasking::console::init_hosted(log::LevelFilter::Warn);
    Box::leak(Box::new(Kernel::with_loader(Hosted::new(), config, loader)))
}

/// Shared log written by task bodies and checked once the scheduler is done.
#[derive(Clone)]
pub struct Trace<T>(Arc<Mutex<Vec<T>>>);

impl<T: Clone> Trace<T> {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn push(&self, item: T) {
        self.0.lock().unwrap().push(item);
    }

    pub fn take(&self) -> Vec<T> {
        self.0.lock().unwrap().clone()
    }
}
