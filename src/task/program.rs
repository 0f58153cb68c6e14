//! The exec hook: turning a program name into a runnable image.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use spin::RwLock;

use super::resource::AddressSpace;
use crate::error::LoadError;

/// Body of a task. Its return value becomes the exit status.
pub type TaskBody = Box<dyn FnOnce() -> i32 + Send + 'static>;

/// A loaded image, ready to replace the caller's.
pub struct Program {
    pub space: AddressSpace,
    pub entry: TaskBody,
}

pub trait ProgramLoader: Send + Sync {
    fn load(&self, path: &str, args: &[&str]) -> Result<Program, LoadError>;
}

/// Loader for kernels that cannot exec anything.
pub struct NoPrograms;

impl ProgramLoader for NoPrograms {
    fn load(&self, _path: &str, _args: &[&str]) -> Result<Program, LoadError> {
        Err(LoadError::NotFound)
    }
}

pub type ProgramMain = fn(Vec<String>) -> i32;

struct ProgramImage {
    main: ProgramMain,
    image_size: usize,
}

/// Programs linked into the kernel, looked up by name.
#[derive(Default)]
pub struct ProgramRegistry {
    programs: RwLock<BTreeMap<String, ProgramImage>>,
}

impl ProgramRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `main` under `name`. An `image_size` of zero marks the image
    /// as corrupt, so loading it fails.
    pub fn register(&self, name: &str, image_size: usize, main: ProgramMain) {
        self.programs
            .write()
            .insert(name.to_string(), ProgramImage { main, image_size });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.programs.read().contains_key(name)
    }
}

impl ProgramLoader for ProgramRegistry {
    fn load(&self, path: &str, args: &[&str]) -> Result<Program, LoadError> {
        let programs = self.programs.read();
        let image = programs.get(path).ok_or(LoadError::NotFound)?;
        if image.image_size == 0 {
            return Err(LoadError::InvalidImage);
        }

        let main = image.main;
        let argv: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        Ok(Program {
            space: AddressSpace::new(image.image_size),
            entry: Box::new(move || main(argv)),
        })
    }
}
