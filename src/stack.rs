/// Execution stacks for cloned stages
use crate::types::{ContainerError, Result, EXIT_ALLOC_FAILED};

/// Contiguous buffer used as the call stack of a cloned process.
///
/// The stack grows downward from [`ExecutionStack::top`]; `nix::sched::clone`
/// takes the whole slice and starts the child there. The buffer stays owned
/// by the caller of `clone` until the child has been waited on.
pub struct ExecutionStack {
    buffer: Vec<u8>,
}

impl ExecutionStack {
    /// Allocate a zeroed stack of `capacity` bytes
    pub fn try_allocate(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ContainerError::Config(
                "Stack capacity must be greater than zero".to_string(),
            ));
        }

        let mut buffer = Vec::new();
        buffer.try_reserve_exact(capacity).map_err(|e| {
            ContainerError::Process(format!("Unable to allocate {} byte stack: {}", capacity, e))
        })?;
        buffer.resize(capacity, 0);

        Ok(Self { buffer })
    }

    /// Allocate a stack or terminate the program.
    ///
    /// A stage cannot be spawned without a stack, so there is nothing to recover to.
    pub fn allocate(capacity: usize) -> Self {
        match Self::try_allocate(capacity) {
            Ok(stack) => stack,
            Err(e) => {
                log::error!("{}", e);
                eprintln!("Unable to allocate memory: {}", e);
                std::process::exit(EXIT_ALLOC_FAILED);
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Highest address of the buffer, where a downward-growing stack starts
    pub fn top(&self) -> *const u8 {
        self.buffer.as_ptr_range().end
    }

    /// The whole buffer, in the form `nix::sched::clone` takes it
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buffer
    }
}
