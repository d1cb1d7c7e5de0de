//! Level-based executor pools.
//!
//! A fixed map of plan depth to a dedicated multi-thread runtime. Plans
//! and synchronous tools at depth `d` submit to pool `d`, so a deeply
//! recursive plan cannot starve shallower plans sharing one queue.
//! Depths beyond the configured maximum fall back to the deepest pool.

use std::io;
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;

pub struct LevelPools {
    runtimes: Vec<Runtime>,
}

impl LevelPools {
    /// Build `levels` pools with `threads_per_level` workers each.
    pub fn new(levels: usize, threads_per_level: usize) -> io::Result<Self> {
        let levels = levels.max(1);
        let threads = threads_per_level.max(1);
        let mut runtimes = Vec::with_capacity(levels);
        for level in 0..levels {
            let runtime = Builder::new_multi_thread()
                .worker_threads(threads)
                .thread_name(format!("plan-depth-{level}"))
                .enable_all()
                .build()?;
            runtimes.push(runtime);
        }
        Ok(Self { runtimes })
    }

    pub fn levels(&self) -> usize {
        self.runtimes.len()
    }

    /// Handle for the pool at `depth`, clamped to the deepest pool.
    pub fn handle(&self, depth: usize) -> &tokio::runtime::Handle {
        let index = depth.min(self.runtimes.len() - 1);
        self.runtimes[index].handle()
    }

    /// Spawn a future on the pool for `depth`.
    pub fn spawn<F>(&self, depth: usize, future: F) -> JoinHandle<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle(depth).spawn(future)
    }

    /// Run a blocking closure on the pool for `depth`.
    pub fn spawn_blocking<F, R>(&self, depth: usize, f: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.handle(depth).spawn_blocking(f)
    }
}

impl Drop for LevelPools {
    fn drop(&mut self) {
        // shutdown_background is safe even when dropped inside another
        // runtime's async context.
        for runtime in self.runtimes.drain(..) {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for LevelPools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LevelPools")
            .field("levels", &self.runtimes.len())
            .finish()
    }
}
