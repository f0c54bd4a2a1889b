use std::cell::RefCell;
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::thread::available_parallelism;

use compio::dispatcher::{Dispatcher, DispatcherBuilder};
use snafu::ResultExt;
use tracing::debug;

use crate::node::error::CanceledSnafu;
use crate::node::{NodeError, Operation};

/// Upper bound on blocking pool workers
const MAX_WORKER_THREADS: usize = 4;

thread_local! {
    static POOL: RefCell<Option<Rc<Dispatcher>>> = const { RefCell::new(None) };
}

/// Returns the blocking pool of the current runtime thread, creating it on
/// first use.
fn pool() -> io::Result<Rc<Dispatcher>> {
    POOL.with(|slot| {
        let mut slot = slot.borrow_mut();
        if let Some(dispatcher) = slot.as_ref() {
            return Ok(dispatcher.clone());
        }

        let workers_num = determine_worker_count();
        debug!("Starting blocking pool with {} worker threads", workers_num);
        let dispatcher = Rc::new(
            DispatcherBuilder::new()
                .worker_threads(workers_num)
                .build()?,
        );
        *slot = Some(dispatcher.clone());
        Ok(dispatcher)
    })
}

fn determine_worker_count() -> NonZeroUsize {
    available_parallelism()
        .map(|n| n.get().min(MAX_WORKER_THREADS))
        .ok()
        .and_then(NonZeroUsize::new)
        .unwrap_or(NonZeroUsize::MIN)
}

/// Runs a synchronous filesystem call on a worker thread and maps its error
/// onto `path`.
pub(crate) async fn run_blocking<R, F>(
    path: &Path,
    operation: Operation,
    call: F,
) -> Result<R, NodeError>
where
    R: Send + 'static,
    F: FnOnce(PathBuf) -> io::Result<R> + Send + 'static,
{
    let dispatcher = pool().map_err(|e| NodeError::DispatchError {
        path: path.to_path_buf(),
        operation,
        error: e.to_string(),
    })?;

    let owned_path = path.to_path_buf();
    let receiver = dispatcher
        .dispatch(move || async move { call(owned_path) })
        .map_err(|e| NodeError::DispatchError {
            path: path.to_path_buf(),
            operation,
            error: e.to_string(),
        })?;

    receiver
        .await
        .context(CanceledSnafu {
            path: path.to_path_buf(),
            operation,
        })?
        .map_err(|e| NodeError::from_io(path, operation, e))
}
