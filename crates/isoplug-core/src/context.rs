//! Execution contexts and remote-proxy references.
//!
//! An isolated context is a dedicated thread that owns the plugin objects
//! created in it; callers hand it jobs and block on the answer. The shared
//! context runs jobs inline on the calling thread.

use std::{
    any::Any,
    collections::{hash_map::Entry, HashMap},
    fmt,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, RwLock,
    },
    thread::{self, JoinHandle, ThreadId},
    time::{Duration, Instant},
};

use anyhow::anyhow;
use isoplug_plugin_sdk::{Constructor, Plugin, Settings};
use tokio::sync::{mpsc, oneshot};

use crate::{
    error::ContextError,
    loader::{LoadedLibrary, LoaderError},
    resolver::ResolvedType,
};

pub type ObjectId = u64;

const JOB_QUEUE_DEPTH: usize = 64;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

type Job = Box<dyn FnOnce(&mut Objects) + Send>;

/// Plugin objects owned by one context, plus the libraries their code lives
/// in. Field order matters: objects drop before the libraries are unmapped.
#[derive(Default)]
pub struct Objects {
    next: ObjectId,
    map: HashMap<ObjectId, Box<dyn Plugin>>,
    libraries: HashMap<PathBuf, LoadedLibrary>,
}

impl Objects {
    pub fn insert(&mut self, plugin: Box<dyn Plugin>) -> ObjectId {
        self.next += 1;
        self.map.insert(self.next, plugin);
        self.next
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut (dyn Plugin + 'static)> {
        self.map.get_mut(&id).map(|plugin| plugin.as_mut())
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<Box<dyn Plugin>> {
        self.map.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The library at `path`, mapped into this context on first use.
    pub fn library(
        &mut self,
        path: &Path,
        entry: Option<&str>,
    ) -> Result<&LoadedLibrary, LoaderError> {
        match self.libraries.entry(path.to_path_buf()) {
            Entry::Occupied(slot) => Ok(slot.into_mut()),
            Entry::Vacant(slot) => Ok(slot.insert(LoadedLibrary::open(path, entry)?)),
        }
    }

    pub fn library_count(&self) -> usize {
        self.libraries.len()
    }
}

/// What to build: a qualified type name and the library declaring it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeTarget {
    pub library: PathBuf,
    pub type_name: String,
    pub entry: Option<String>,
}

impl TypeTarget {
    /// A type with no backing library, served by linked-in constructors.
    pub fn named(type_name: impl Into<String>) -> Self {
        Self {
            library: PathBuf::new(),
            type_name: type_name.into(),
            entry: None,
        }
    }
}

impl From<&ResolvedType> for TypeTarget {
    fn from(ty: &ResolvedType) -> Self {
        Self {
            library: ty.library.clone(),
            type_name: ty.full_name.clone(),
            entry: ty.entry.clone(),
        }
    }
}

/// Builds plugin objects inside the context that will own them.
pub trait Instantiator: Send + Sync {
    fn instantiate(
        &self,
        target: &TypeTarget,
        settings: Settings,
        objects: &mut Objects,
    ) -> anyhow::Result<Box<dyn Plugin>>;
}

/// Instantiator backed by constructors registered at link time.
#[derive(Default)]
pub struct FactoryRegistry {
    constructors: RwLock<HashMap<String, Constructor>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, type_name: impl Into<String>, constructor: Constructor) -> &Self {
        self.constructors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(type_name.into(), constructor);
        self
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(type_name)
    }
}

impl Instantiator for FactoryRegistry {
    fn instantiate(
        &self,
        target: &TypeTarget,
        settings: Settings,
        _objects: &mut Objects,
    ) -> anyhow::Result<Box<dyn Plugin>> {
        let constructor = self
            .constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&target.type_name)
            .copied()
            .ok_or_else(|| ContextError::UnknownType(target.type_name.clone()))?;
        constructor(settings)
    }
}

/// Lease durations read from plugin settings. `None` means infinite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeasePolicy {
    pub initial: Option<Duration>,
    pub renew_on_call: Option<Duration>,
}

impl LeasePolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        let non_zero = |d: Duration| !d.is_zero();
        Self {
            initial: settings.duration("initial_lease").filter(|d| non_zero(*d)),
            renew_on_call: settings.duration("renew_on_call").filter(|d| non_zero(*d)),
        }
    }

    pub fn is_infinite(&self) -> bool {
        self.initial.is_none()
    }
}

#[derive(Debug)]
pub struct Lease {
    policy: LeasePolicy,
    expires: Mutex<Option<Instant>>,
}

impl Lease {
    pub fn new(policy: LeasePolicy) -> Self {
        Self {
            policy,
            expires: Mutex::new(policy.initial.map(|d| Instant::now() + d)),
        }
    }

    pub fn policy(&self) -> LeasePolicy {
        self.policy
    }

    /// False once the lease has run out; otherwise extends it by the
    /// renew-on-call increment.
    pub fn renew(&self) -> bool {
        let mut expires = self.expires.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(at) = *expires else {
            return true;
        };
        let now = Instant::now();
        if now >= at {
            return false;
        }
        if let Some(renew) = self.policy.renew_on_call {
            *expires = Some(at.max(now + renew));
        }
        true
    }
}

enum Kind {
    Shared(Mutex<Objects>),
    Isolated {
        sender: Mutex<Option<mpsc::Sender<Job>>>,
        worker: Mutex<Option<JoinHandle<()>>>,
        thread: ThreadId,
    },
}

struct Inner {
    id: u64,
    name: String,
    root: PathBuf,
    unloaded: AtomicBool,
    live_objects: AtomicUsize,
    kind: Kind,
}

/// Handle to an execution context; clones refer to the same context.
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<Inner>,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("shared", &self.is_shared())
            .field("unloaded", &self.is_unloaded())
            .finish()
    }
}

impl ExecutionContext {
    /// The caller's own context.
    pub fn shared(name: impl Into<String>) -> Self {
        Self::with_kind(name.into(), PathBuf::new(), Kind::Shared(Mutex::default()))
    }

    /// Starts a new context thread rooted at `root`.
    pub fn isolated(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self, ContextError> {
        let name = name.into();
        let (sender, mut receiver) = mpsc::channel::<Job>(JOB_QUEUE_DEPTH);
        let worker = thread::Builder::new()
            .name(format!("isoplug-ctx-{name}"))
            .spawn(move || {
                let mut objects = Objects::default();
                while let Some(job) = receiver.blocking_recv() {
                    job(&mut objects);
                }
                tracing::debug!(objects = objects.len(), "execution context stopped");
            })
            .map_err(|source| ContextError::Spawn {
                name: name.clone(),
                source,
            })?;
        let thread = worker.thread().id();
        let context = Self::with_kind(
            name,
            root.as_ref().to_path_buf(),
            Kind::Isolated {
                sender: Mutex::new(Some(sender)),
                worker: Mutex::new(Some(worker)),
                thread,
            },
        );
        tracing::debug!(context = context.id(), name = context.name(), "execution context started");
        Ok(context)
    }

    fn with_kind(name: String, root: PathBuf, kind: Kind) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
                name,
                root,
                unloaded: AtomicBool::new(false),
                live_objects: AtomicUsize::new(0),
                kind,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn is_shared(&self) -> bool {
        matches!(self.inner.kind, Kind::Shared(_))
    }

    pub fn is_unloaded(&self) -> bool {
        self.inner.unloaded.load(Ordering::Acquire)
    }

    /// Runs `job` against this context's objects and waits for its result.
    ///
    /// Panics raised by the job are returned as errors.
    pub fn run<R, F>(&self, job: F) -> anyhow::Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Objects) -> anyhow::Result<R> + Send + 'static,
    {
        match &self.inner.kind {
            Kind::Shared(objects) => {
                let mut objects = objects.lock().unwrap_or_else(PoisonError::into_inner);
                guarded(|| job(&mut objects))
            }
            Kind::Isolated { sender, thread, .. } => {
                if thread::current().id() == *thread {
                    return Err(ContextError::Reentrant(self.inner.name.clone()).into());
                }
                let sender = lock(sender)
                    .clone()
                    .ok_or_else(|| self.severed())?;
                let (reply, answer) = oneshot::channel();
                let boxed: Job = Box::new(move |objects: &mut Objects| {
                    let _ = reply.send(guarded(|| job(objects)));
                });
                sender.blocking_send(boxed).map_err(|_| self.severed())?;
                answer.blocking_recv().map_err(|_| self.severed())?
            }
        }
    }

    fn severed(&self) -> ContextError {
        ContextError::Severed(format!("context {}", self.inner.name))
    }

    /// Instantiates `target` inside this context and returns a proxy to it.
    ///
    /// `init` runs on the new object before the proxy is handed out.
    pub fn create_instance<F>(
        &self,
        instantiator: Arc<dyn Instantiator>,
        target: TypeTarget,
        settings: Settings,
        lease: LeasePolicy,
        init: F,
    ) -> anyhow::Result<RemoteRef>
    where
        F: FnOnce(&mut dyn Plugin) + Send + 'static,
    {
        let type_name: Arc<str> = Arc::from(target.type_name.as_str());
        let object = self.run(move |objects| {
            let mut plugin = instantiator.instantiate(&target, settings, objects)?;
            init(plugin.as_mut());
            Ok(objects.insert(plugin))
        })?;
        self.inner.live_objects.fetch_add(1, Ordering::AcqRel);
        Ok(RemoteRef {
            context: self.clone(),
            object,
            lease: Arc::new(Lease::new(lease)),
            type_name,
        })
    }

    /// Drops one object; false if it was already gone.
    pub fn disconnect(&self, object: ObjectId) -> bool {
        let removed = self
            .run(move |objects| Ok(objects.remove(object).is_some()))
            .unwrap_or(false);
        if removed {
            self.inner.live_objects.fetch_sub(1, Ordering::AcqRel);
        }
        removed
    }

    /// Objects created here and not yet disconnected. Does not enter the
    /// context, so it is safe to call from plugin code.
    pub fn object_count(&self) -> usize {
        if self.is_unloaded() {
            return 0;
        }
        self.inner.live_objects.load(Ordering::Acquire)
    }

    /// Tears the context down once the jobs already queued have run.
    /// Unloading twice is a no-op.
    pub fn unload(&self) -> Result<(), ContextError> {
        let Kind::Isolated {
            sender,
            worker,
            thread,
        } = &self.inner.kind
        else {
            return Err(ContextError::CannotUnloadShared);
        };
        let Some(sender) = lock(sender).take() else {
            return Ok(());
        };
        self.inner.unloaded.store(true, Ordering::Release);
        drop(sender);
        if thread::current().id() != *thread {
            if let Some(worker) = lock(worker).take() {
                if worker.join().is_err() {
                    tracing::warn!(
                        context = self.inner.id,
                        "context thread panicked during teardown"
                    );
                }
            }
        }
        tracing::info!(
            context = self.inner.id,
            name = %self.inner.name,
            "execution context unloaded"
        );
        Ok(())
    }

    /// One line per context for domain-info answers.
    pub fn describe(&self) -> String {
        let kind = if self.is_shared() { "shared" } else { "isolated" };
        let state = if self.is_unloaded() { "unloaded" } else { "active" };
        format!(
            "context #{} `{}` ({kind}, {state}), root {}, {} object(s)",
            self.inner.id,
            self.inner.name,
            self.inner.root.display(),
            self.object_count()
        )
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn guarded<R>(job: impl FnOnce() -> anyhow::Result<R>) -> anyhow::Result<R> {
    panic::catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|payload| {
        Err(anyhow!("plugin panicked: {}", panic_message(payload.as_ref())))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Indirection to a plugin object owned by some context, with a lease.
#[derive(Clone)]
pub struct RemoteRef {
    context: ExecutionContext,
    object: ObjectId,
    lease: Arc<Lease>,
    type_name: Arc<str>,
}

impl fmt::Debug for RemoteRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteRef")
            .field("context", &self.context.id())
            .field("object", &self.object)
            .field("type_name", &self.type_name)
            .finish()
    }
}

impl RemoteRef {
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn object_id(&self) -> ObjectId {
        self.object
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Calls into the referenced object on its context.
    ///
    /// Fails with [`ContextError::Severed`] when the context is gone, the
    /// object was disconnected or the lease ran out.
    pub fn call<R, F>(&self, f: F) -> anyhow::Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn Plugin) -> anyhow::Result<R> + Send + 'static,
    {
        if !self.lease.renew() {
            tracing::debug!(ty = %self.type_name, "lease expired");
            self.context.disconnect(self.object);
            return Err(ContextError::Severed(self.type_name.to_string()).into());
        }
        let object = self.object;
        let type_name = Arc::clone(&self.type_name);
        self.context.run(move |objects| match objects.get_mut(object) {
            Some(plugin) => f(plugin),
            None => Err(ContextError::Severed(type_name.to_string()).into()),
        })
    }

    pub fn disconnect(&self) -> bool {
        self.context.disconnect(self.object)
    }
}
