//! Thread management and CPU affinity
//!
//! Every processor gets a dedicated OS thread. Threads are named
//! `<prefix>-<n>` and can be pinned to CPU cores handed out round-robin
//! from a configured list.

use crate::disruptor::{DisruptorError, Result};
use core_affinity::CoreId;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Naming and pinning policy for the threads of one pipeline
#[derive(Debug, Clone)]
pub struct ThreadContext {
    name_prefix: String,
    cores: Vec<CoreId>,
    next_core: usize,
    id: usize,
}

impl ThreadContext {
    /// Unpinned threads named `processor-<n>`
    pub fn new() -> Self {
        Self::with_name_prefix("processor")
    }

    /// Unpinned threads named `<prefix>-<n>`
    pub fn with_name_prefix<S: Into<String>>(prefix: S) -> Self {
        Self {
            name_prefix: prefix.into(),
            cores: Vec::new(),
            next_core: 0,
            id: 0,
        }
    }

    /// Pin spawned threads to `core_ids`, round-robin
    ///
    /// # Errors
    /// `Config` if any id is not a core of this machine
    pub fn pin_at_cores(mut self, core_ids: &[usize]) -> Result<Self> {
        self.cores = core_ids
            .iter()
            .map(|&id| validate_core_id(id))
            .collect::<Result<Vec<_>>>()?;
        self.next_core = 0;
        Ok(self)
    }

    /// Prefix used for thread names
    pub fn name_prefix(&self) -> &str {
        &self.name_prefix
    }

    pub(crate) fn next_name(&mut self) -> String {
        self.id += 1;
        format!("{}-{}", self.name_prefix, self.id)
    }

    fn next_affinity(&mut self) -> Option<CoreId> {
        if self.cores.is_empty() {
            return None;
        }
        let core = self.cores[self.next_core % self.cores.len()];
        self.next_core += 1;
        Some(core)
    }

    /// Spawn `f` on a new thread named and pinned by this context
    ///
    /// # Errors
    /// `ThreadSpawn` if the OS refuses the thread
    pub fn spawn<F>(&mut self, f: F) -> Result<ManagedThread>
    where
        F: FnOnce() + Send + 'static,
    {
        let builder = ThreadBuilder {
            name: Some(self.next_name()),
            affinity: self.next_affinity(),
        };
        Ok(builder.spawn(f)?)
    }
}

impl Default for ThreadContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A spawned thread that is joined when dropped
pub struct ManagedThread {
    join_handle: Option<JoinHandle<()>>,
    thread_name: String,
}

impl ManagedThread {
    fn new(join_handle: JoinHandle<()>, thread_name: String) -> Self {
        Self {
            join_handle: Some(join_handle),
            thread_name,
        }
    }

    /// The thread's name
    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Wait for the thread to finish
    ///
    /// # Errors
    /// The panic payload if the thread panicked
    pub fn join(mut self) -> thread::Result<()> {
        match self.join_handle.take() {
            Some(handle) => handle.join(),
            None => Ok(()),
        }
    }

    /// Whether the thread has not finished yet
    pub fn is_running(&self) -> bool {
        self.join_handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ManagedThread {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            if handle.join().is_err() {
                warn!(thread = %self.thread_name, "managed thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for ManagedThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedThread")
            .field("thread_name", &self.thread_name)
            .field("running", &self.is_running())
            .finish()
    }
}

/// One-off thread builder with naming and CPU affinity
#[derive(Debug, Default)]
pub struct ThreadBuilder {
    name: Option<String>,
    affinity: Option<CoreId>,
}

impl ThreadBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the thread to `core_id`
    ///
    /// # Errors
    /// `Config` if the core does not exist
    pub fn pin_at_core(mut self, core_id: usize) -> Result<Self> {
        self.affinity = Some(validate_core_id(core_id)?);
        Ok(self)
    }

    pub fn thread_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Spawn `f` with the configured name and affinity
    pub fn spawn<F>(self, f: F) -> std::io::Result<ManagedThread>
    where
        F: FnOnce() + Send + 'static,
    {
        let thread_name = self.name.unwrap_or_else(|| "processor".to_string());
        let affinity = self.affinity;
        let name = thread_name.clone();

        let join_handle = thread::Builder::new().name(thread_name.clone()).spawn(move || {
            set_affinity_if_defined(affinity, &name);
            f();
        })?;

        Ok(ManagedThread::new(join_handle, thread_name))
    }
}

fn validate_core_id(core_id: usize) -> Result<CoreId> {
    let available_cores = get_available_cores();
    if available_cores.contains(&core_id) {
        Ok(CoreId { id: core_id })
    } else {
        Err(DisruptorError::Config(format!(
            "CPU core {core_id} is not available, available cores: {available_cores:?}"
        )))
    }
}

fn set_affinity_if_defined(affinity: Option<CoreId>, thread_name: &str) {
    if let Some(core_id) = affinity {
        if core_affinity::set_for_current(core_id) {
            debug!(thread = thread_name, core = core_id.id, "pinned thread to core");
        } else {
            warn!(thread = thread_name, core = core_id.id, "could not pin thread to core");
        }
    }
}

/// CPU core ids this process may pin to
pub fn get_available_cores() -> Vec<usize> {
    core_affinity::get_core_ids()
        .unwrap_or_default()
        .iter()
        .map(|core| core.id)
        .collect()
}
