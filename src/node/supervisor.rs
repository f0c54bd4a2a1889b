//! Watch supervision for a single node.
//!
//! OS change notifications are treated as one-shot edge triggers: the first
//! notification tears the registration down, the node re-stats its path and
//! only then registers a fresh watch. A node whose watch cannot be
//! re-established gets a grace period to come back before it is disposed.
//!
//! Every node on a thread shares one OS watcher. Its notifications are routed
//! by path to the registrations watching that path or its parent directory.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::mem;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use compio::runtime::spawn;
use derive_more::Display;
use futures::StreamExt;
use futures::future::{AbortHandle, Abortable};
use futures_channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use notify::event::{AccessKind, AccessMode};
use notify::{Event, EventKind as FsEventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, trace, warn};

use crate::ext::BestEffortPathExt;
use crate::node::handle::NodeInner;
use crate::node::{NodeError, NodeEvent, NodeHandle};

thread_local! {
    static LIVE_WATCHES: Cell<usize> = const { Cell::new(0) };
    static SHARED_WATCHER: RefCell<Option<SharedWatcher>> = const { RefCell::new(None) };
    static NEXT_ROUTE: Cell<u64> = const { Cell::new(0) };
}

/// Number of OS watch registrations currently alive on this thread.
pub fn live_watch_count() -> usize {
    LIVE_WATCHES.with(Cell::get)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum WatchState {
    #[display("idle")]
    Idle,
    #[display("watching")]
    Watching,
    #[display("disposed")]
    Disposed,
}

type Notification = Result<Event, Rc<notify::Error>>;

struct Route {
    id: u64,
    sender: UnboundedSender<Notification>,
}

struct SharedWatcher {
    watcher: RecommendedWatcher,
    /// Closed once the routing task is gone, e.g. with its runtime.
    feed: UnboundedSender<notify::Result<Event>>,
    routes: HashMap<PathBuf, Vec<Route>>,
}

impl SharedWatcher {
    fn start() -> notify::Result<Self> {
        let (feed, receiver) = mpsc::unbounded();
        let callback_feed = feed.clone();
        let watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            if let Ok(event) = &result {
                if is_plain_access(&event.kind) {
                    return;
                }
            }
            let _ = callback_feed.unbounded_send(result);
        })?;
        spawn(route_notifications(receiver)).detach();
        debug!("Started the shared filesystem watcher");

        Ok(Self {
            watcher,
            feed,
            routes: HashMap::new(),
        })
    }

    /// Senders of every route interested in a notification about `paths`.
    /// A notification without paths goes to everyone.
    fn targets(&self, paths: &[PathBuf]) -> Vec<UnboundedSender<Notification>> {
        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        let mut collect = |routes: &Vec<Route>| {
            for route in routes {
                if seen.insert(route.id) {
                    targets.push(route.sender.clone());
                }
            }
        };

        if paths.is_empty() {
            for routes in self.routes.values() {
                collect(routes);
            }
        } else {
            for path in paths {
                for key in std::iter::once(path.as_path()).chain(path.parent()) {
                    if let Some(routes) = self.routes.get(key) {
                        collect(routes);
                    }
                }
            }
        }
        targets
    }
}

/// Watches `path` with the thread's shared watcher, starting it if needed,
/// and routes the path's notifications to `sender`.
fn acquire_route(path: &Path, sender: UnboundedSender<Notification>) -> notify::Result<u64> {
    SHARED_WATCHER.with(|cell| {
        let mut slot = cell.borrow_mut();
        let shared = match slot.take() {
            Some(shared) if !shared.feed.is_closed() => shared,
            _ => SharedWatcher::start()?,
        };
        let shared = slot.insert(shared);

        // Re-adding a watched path is harmless and picks up a replaced inode.
        shared.watcher.watch(path, RecursiveMode::NonRecursive)?;
        let id = NEXT_ROUTE.with(|next| {
            next.set(next.get() + 1);
            next.get()
        });
        shared
            .routes
            .entry(path.to_path_buf())
            .or_default()
            .push(Route { id, sender });
        Ok(id)
    })
}

/// Drops a route. The OS watch goes with the last route on its path.
fn release_route(path: &Path, id: u64) {
    let _ = SHARED_WATCHER.try_with(|cell| {
        let mut slot = cell.borrow_mut();
        let Some(shared) = slot.as_mut() else {
            return;
        };
        let Some(routes) = shared.routes.get_mut(path) else {
            return;
        };
        routes.retain(|route| route.id != id);
        if routes.is_empty() {
            shared.routes.remove(path);
            if let Err(error) = shared.watcher.unwatch(path) {
                // The OS drops watches on deleted paths by itself.
                trace!("Unwatching {}: {error}", path.display());
            }
        }
    });
}

async fn route_notifications(mut receiver: UnboundedReceiver<notify::Result<Event>>) {
    while let Some(result) = receiver.next().await {
        let notification: Notification = result.map_err(Rc::new);
        let paths = match &notification {
            Ok(event) => &event.paths,
            Err(error) => &error.paths,
        };
        let targets = SHARED_WATCHER.with(|cell| {
            cell.borrow()
                .as_ref()
                .map(|shared| shared.targets(paths))
                .unwrap_or_default()
        });
        for sender in targets {
            let _ = sender.unbounded_send(notification.clone());
        }
    }
}

/// One route on the shared watcher plus the loop consuming its notifications.
struct Registration {
    path: PathBuf,
    route: u64,
    generation: u64,
    notification_loop: AbortHandle,
}

impl Registration {
    fn new(path: PathBuf, route: u64, generation: u64, notification_loop: AbortHandle) -> Self {
        LIVE_WATCHES.with(|count| count.set(count.get() + 1));
        Self {
            path,
            route,
            generation,
            notification_loop,
        }
    }

    /// Drops the watch and stops its loop.
    fn cancel(self) {
        self.notification_loop.abort();
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        release_route(&self.path, self.route);
        LIVE_WATCHES.with(|count| count.set(count.get().saturating_sub(1)));
    }
}

#[derive(Default)]
enum Slot {
    #[default]
    Idle,
    Watching(Registration),
    /// A notification unregistered the watch and its re-stat is in flight.
    Rearming,
    Disposed,
}

#[derive(Default)]
pub(crate) struct Supervisor {
    slot: Slot,
    generation: u64,
    persistent: bool,
    grace_timer: Option<AbortHandle>,
    /// Bumped by every start, stop and dispose. A grace check whose re-stat
    /// is overtaken by one of them leaves the node alone.
    grace_check: u64,
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if let Some(timer) = self.grace_timer.take() {
            timer.abort();
        }
        if let Slot::Watching(registration) = mem::take(&mut self.slot) {
            registration.cancel();
        }
    }
}

/// Reference a notification loop keeps on its node.
enum LoopRef {
    Strong(NodeHandle),
    Weak(Weak<NodeInner>),
}

impl LoopRef {
    fn upgrade(&self) -> Option<NodeHandle> {
        match self {
            LoopRef::Strong(handle) => Some(handle.clone()),
            LoopRef::Weak(weak) => weak.upgrade().map(NodeHandle::from_inner),
        }
    }
}

impl NodeHandle {
    pub fn watch_state(&self) -> WatchState {
        match self.supervisor().borrow().slot {
            Slot::Watching(_) => WatchState::Watching,
            Slot::Disposed => WatchState::Disposed,
            Slot::Idle | Slot::Rearming => WatchState::Idle,
        }
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self.supervisor().borrow().slot, Slot::Disposed)
    }

    /// True while a grace-period disposal is pending.
    pub fn is_grace_timer_armed(&self) -> bool {
        self.supervisor().borrow().grace_timer.is_some()
    }

    /// Registers an OS watch on the node's path.
    ///
    /// No-op when already watching or disposed. When the registration fails
    /// the node emits `missing` and arms its grace timer. A persistent watch
    /// keeps the node alive until it is stopped.
    pub fn start_watch(&self, persistent: bool) {
        if matches!(
            self.supervisor().borrow().slot,
            Slot::Watching(_) | Slot::Disposed
        ) {
            return;
        }

        self.supervisor().borrow_mut().grace_check += 1;

        let (sender, receiver) = mpsc::unbounded();
        let route = match acquire_route(self.path(), sender) {
            Ok(route) => route,
            Err(source) => {
                {
                    let mut supervisor = self.supervisor().borrow_mut();
                    supervisor.persistent = persistent;
                    if matches!(supervisor.slot, Slot::Rearming) {
                        supervisor.slot = Slot::Idle;
                    }
                }
                warn!(
                    "Failed to watch {}: {source}",
                    self.path().best_effort_path_display()
                );
                self.emit(NodeEvent::Missing(Rc::new(
                    NodeError::WatchRegistrationError {
                        path: self.path().to_path_buf(),
                        source,
                    },
                )));
                self.arm_grace_timer();
                return;
            }
        };

        let pending_timer = {
            let mut supervisor = self.supervisor().borrow_mut();
            supervisor.generation += 1;
            let generation = supervisor.generation;

            let node = if persistent {
                LoopRef::Strong(self.clone())
            } else {
                LoopRef::Weak(self.downgrade())
            };
            let (abort_handle, abort_registration) = AbortHandle::new_pair();
            spawn(Abortable::new(
                notification_loop(node, receiver, generation),
                abort_registration,
            ))
            .detach();

            supervisor.slot = Slot::Watching(Registration::new(
                self.path().to_path_buf(),
                route,
                generation,
                abort_handle,
            ));
            supervisor.persistent = persistent;
            supervisor.grace_timer.take()
        };
        if let Some(timer) = pending_timer {
            timer.abort();
        }

        debug!(
            "Watching {} (generation {})",
            self.path().display(),
            self.supervisor().borrow().generation
        );
    }

    /// Releases the OS watch and cancels a pending grace timer. Idempotent.
    pub fn stop_watch(&self) {
        let (registration, timer) = {
            let mut supervisor = self.supervisor().borrow_mut();
            supervisor.grace_check += 1;
            let registration = match mem::take(&mut supervisor.slot) {
                Slot::Watching(registration) => Some(registration),
                Slot::Disposed => {
                    supervisor.slot = Slot::Disposed;
                    None
                }
                Slot::Idle | Slot::Rearming => None,
            };
            (registration, supervisor.grace_timer.take())
        };

        if let Some(registration) = registration {
            debug!("Stopped watching {}", self.path().display());
            registration.cancel();
        }
        if let Some(timer) = timer {
            timer.abort();
        }
    }

    /// Detaches the node from its parent, drops every subscriber and stops
    /// the watch. The node stays disposed for good. Idempotent.
    pub fn dispose(&self) {
        if self.is_disposed() {
            return;
        }

        self.remove();
        self.clear_listeners();
        self.stop_watch();
        self.supervisor().borrow_mut().slot = Slot::Disposed;
        info!("Disposed node {}", self.path().best_effort_path_display());
    }

    /// Takes the registration of `generation` down ahead of its re-stat.
    /// Returns false when that registration is no longer the current one.
    fn unregister_for_rearm(&self, generation: u64) -> bool {
        let previous = {
            let mut supervisor = self.supervisor().borrow_mut();
            match &supervisor.slot {
                Slot::Watching(registration) if registration.generation == generation => {}
                _ => return false,
            }
            mem::replace(&mut supervisor.slot, Slot::Rearming)
        };
        // The loop calling this keeps running; only the OS watch goes away.
        drop(previous);
        true
    }

    /// Re-checks the path after a notification and re-arms the watch unless
    /// the path is gone or someone else took over the watch meanwhile.
    async fn recheck_after_notification(&self) {
        let result = self.stat(true).await;
        if self.is_disposed() {
            return;
        }

        let (rearm, persistent) = {
            let mut supervisor = self.supervisor().borrow_mut();
            let rearm = matches!(supervisor.slot, Slot::Rearming);
            if rearm {
                supervisor.slot = Slot::Idle;
            }
            (rearm, supervisor.persistent)
        };

        match result {
            Ok(_) => {
                if rearm {
                    self.start_watch(persistent);
                }
            }
            Err(error) if error.is_not_found() => {
                debug!("{} is gone, not re-arming its watch", self.path().display());
                self.emit(NodeEvent::Missing(Rc::new(error)));
                if rearm {
                    self.arm_grace_timer();
                }
            }
            Err(error) => {
                self.emit(NodeEvent::Error(Rc::new(error)));
                if rearm {
                    self.start_watch(persistent);
                }
            }
        }
    }

    fn arm_grace_timer(&self) {
        {
            let supervisor = self.supervisor().borrow();
            if supervisor.grace_timer.is_some() || matches!(supervisor.slot, Slot::Disposed) {
                return;
            }
        }

        let grace_period = self.config().grace_period;
        let node = self.downgrade();
        let (abort_handle, abort_registration) = AbortHandle::new_pair();
        spawn(Abortable::new(
            async move {
                compio::time::sleep(grace_period).await;
                if let Some(node) = node.upgrade().map(NodeHandle::from_inner) {
                    node.on_grace_period_expired().await;
                }
            },
            abort_registration,
        ))
        .detach();

        self.supervisor().borrow_mut().grace_timer = Some(abort_handle);
        debug!(
            "Armed {:?} grace timer for {}",
            grace_period,
            self.path().display()
        );
    }

    async fn on_grace_period_expired(&self) {
        let (persistent, check) = {
            let mut supervisor = self.supervisor().borrow_mut();
            // Forget the handle so nothing aborts this task mid-check.
            supervisor.grace_timer = None;
            if matches!(supervisor.slot, Slot::Disposed) {
                return;
            }
            (supervisor.persistent, supervisor.grace_check)
        };

        let result = self.stat(true).await;
        if self.supervisor().borrow().grace_check != check || self.is_disposed() {
            debug!(
                "Grace check for {} was overtaken, leaving the node as is",
                self.path().display()
            );
            return;
        }

        match result {
            Ok(_) => {
                info!(
                    "{} came back within its grace period",
                    self.path().best_effort_path_display()
                );
                self.start_watch(persistent);
            }
            Err(error) => {
                debug!("Grace period over for {}: {error}", self.path().display());
                self.dispose();
            }
        }
    }
}

/// Opens, reads and read-only closes say nothing about content or existence.
fn is_plain_access(kind: &FsEventKind) -> bool {
    matches!(kind, FsEventKind::Access(access) if *access != AccessKind::Close(AccessMode::Write))
}

async fn notification_loop(
    node: LoopRef,
    mut receiver: UnboundedReceiver<Notification>,
    generation: u64,
) {
    let Some(notification) = receiver.next().await else {
        return;
    };
    let Some(handle) = node.upgrade() else {
        return;
    };
    match &notification {
        Ok(event) => trace!("{:?} on {}", event.kind, handle.path().display()),
        Err(error) => debug!("Watch error on {}: {error}", handle.path().display()),
    }

    if handle.unregister_for_rearm(generation) {
        handle.recheck_after_notification().await;
    }
}
