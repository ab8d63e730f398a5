//! Named, reference-counted service registry.
//!
//! Services that unrelated modules need to find (GUI, storage, notification)
//! live here under a string key. The first opener constructs the service,
//! later openers share it, and the last closer destroys it. The registry only
//! manages lifetime; services synchronise their own internals.
//!
//! A [`Registry`] is normally constructed once and handed to application entry
//! points. Where global access cannot be avoided, [`global`] is the single
//! static table.

use core::any::Any;
use core::fmt;
use core::ops::Deref;
use std::collections::HashMap;
use std::thread::{self, ThreadId};
use std::time::Instant;

use crate::check;
use crate::error::{Error, Result};
use crate::port::Timeout;
use crate::sync::{Arc, Condvar, Mutex, MutexGuard};

type Object = Arc<dyn Any + Send + Sync>;
type Constructor = Arc<dyn Fn() -> Object + Send + Sync>;

/// Registry sizing.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegistryConfig {
    /// Maximum number of live records.
    pub capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { capacity: 32 }
    }
}

impl RegistryConfig {
    pub fn builder() -> RegistryConfigBuilder {
        RegistryConfigBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegistryConfigBuilder {
    config: RegistryConfig,
}

impl RegistryConfigBuilder {
    /// Sets the maximum number of live records.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    pub fn build(self) -> RegistryConfig {
        self.config
    }
}

enum Slot {
    /// The first opener is running the constructor outside the table lock.
    Constructing(ThreadId),
    Ready(Object),
}

struct Entry {
    slot: Slot,
    holders: usize,
    /// Published through [`Registry::create`]; survives zero holders until
    /// [`Registry::destroy`].
    pinned: bool,
}

#[derive(Default)]
struct Table {
    entries: HashMap<&'static str, Entry>,
    constructors: HashMap<&'static str, Constructor>,
}

pub struct Registry {
    table: Mutex<Table>,
    ready: Condvar,
    config: RegistryConfig,
}

static GLOBAL: spin::Once<Registry> = spin::Once::new();

/// The process-wide registry, created with the default configuration on first
/// use.
pub fn global() -> &'static Registry {
    GLOBAL.call_once(|| Registry::new(RegistryConfig::default()))
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            table: Mutex::new(Table::default()),
            ready: Condvar::new(),
            config,
        }
    }

    /// Opens `name`, constructing it with `ctor` if no live entry exists.
    ///
    /// `ctor` runs without the registry lock held; concurrent openers of the
    /// same name wait for it to finish. `ctor` must not open `name` itself.
    #[track_caller]
    pub fn open<T, F>(&self, name: &'static str, ctor: F) -> Record<'_, T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        match self.try_open(name, ctor) {
            Ok(record) => record,
            Err(err) => check::crash(&format!("cannot open record `{name}`: {err}")),
        }
    }

    /// Like [`open`](Self::open), but reports a full table as [`Error::Full`].
    pub fn try_open<T, F>(&self, name: &'static str, ctor: F) -> Result<Record<'_, T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let object = self.open_object(name, || Arc::new(ctor()) as Object)?;
        Ok(Record::new(self, name, downcast(name, object)))
    }

    /// Stores a constructor for [`open_registered`](Self::open_registered).
    pub fn register<T, F>(&self, name: &'static str, ctor: F)
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let ctor: Constructor = Arc::new(move || Arc::new(ctor()) as Object);
        self.table.lock().constructors.insert(name, ctor);
    }

    /// Opens `name` with the constructor stored by [`register`](Self::register).
    ///
    /// Opening a name that has neither a live entry nor a constructor is
    /// fatal.
    #[track_caller]
    pub fn open_registered<T>(&self, name: &'static str) -> Record<'_, T>
    where
        T: Any + Send + Sync,
    {
        let ctor = self.table.lock().constructors.get(name).cloned();
        let object = self.open_object(name, || match ctor {
            Some(ctor) => ctor(),
            None => check::crash(&format!("record `{name}` has no constructor")),
        });
        match object {
            Ok(object) => Record::new(self, name, downcast(name, object)),
            Err(err) => check::crash(&format!("cannot open record `{name}`: {err}")),
        }
    }

    /// Publishes an already built service under `name`.
    ///
    /// The entry stays alive with zero holders until [`destroy`](Self::destroy).
    /// Creating a name that already exists is fatal.
    pub fn create<T>(&self, name: &'static str, object: Arc<T>) -> Result<()>
    where
        T: Any + Send + Sync,
    {
        let mut table = self.table.lock();
        check!(
            !table.entries.contains_key(name),
            "record `{name}` already exists"
        );
        self.ensure_room(&table, name)?;
        table.entries.insert(
            name,
            Entry {
                slot: Slot::Ready(object),
                holders: 0,
                pinned: true,
            },
        );
        self.ready.notify_all();
        log::debug!(target: "record", "created `{name}`");
        Ok(())
    }

    /// Removes a record nobody holds. Returns `false` while it is still open
    /// or when it does not exist.
    pub fn destroy(&self, name: &str) -> bool {
        let mut table = self.table.lock();
        let removable = matches!(
            table.entries.get(name),
            Some(Entry { slot: Slot::Ready(_), holders: 0, .. })
        );
        if !removable {
            return false;
        }
        let removed = table.entries.remove(name);
        drop(table);
        drop(removed);
        log::debug!(target: "record", "destroyed `{name}`");
        true
    }

    /// Closes one reference to `name`; the last close destroys the service.
    ///
    /// Closing a name that is not open is fatal.
    #[track_caller]
    pub fn close(&self, name: &str) {
        if self.try_close(name).is_err() {
            check::crash(&format!("record `{name}` closed more times than opened"));
        }
    }

    /// Non-fatal form of [`close`](Self::close).
    pub fn try_close(&self, name: &str) -> Result<()> {
        let mut table = self.table.lock();
        let entry = match table.entries.get_mut(name) {
            Some(entry) if entry.holders > 0 && matches!(entry.slot, Slot::Ready(_)) => entry,
            _ => return Err(Error::NotOpen),
        };
        entry.holders -= 1;
        if entry.holders == 0 && !entry.pinned {
            let removed = table.entries.remove(name);
            drop(table);
            // The service destructor runs without the table lock.
            drop(removed);
            log::debug!(target: "record", "last holder closed `{name}`");
        }
        Ok(())
    }

    /// Whether `name` currently has a live, constructed entry.
    pub fn exists(&self, name: &str) -> bool {
        matches!(
            self.table.lock().entries.get(name),
            Some(Entry { slot: Slot::Ready(_), .. })
        )
    }

    /// Number of open references to `name`.
    pub fn holders(&self, name: &str) -> usize {
        self.table
            .lock()
            .entries
            .get(name)
            .map_or(0, |entry| entry.holders)
    }

    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blocks until `name` exists. Used by startup code that depends on a
    /// service another task publishes.
    pub fn wait_for(&self, name: &str, timeout: Timeout) -> Result<()> {
        let deadline = match timeout {
            Timeout::After(limit) => Some(Instant::now() + limit),
            _ => None,
        };
        let mut table = self.table.lock();
        loop {
            if matches!(table.entries.get(name), Some(Entry { slot: Slot::Ready(_), .. })) {
                return Ok(());
            }
            match (timeout, deadline) {
                (Timeout::Immediate, _) => return Err(Error::Timeout),
                (_, Some(deadline)) => {
                    if self.ready.wait_until(&mut table, deadline).timed_out()
                        && !matches!(
                            table.entries.get(name),
                            Some(Entry { slot: Slot::Ready(_), .. })
                        )
                    {
                        log::warn!(target: "record", "timed out waiting for `{name}`");
                        return Err(Error::Timeout);
                    }
                }
                _ => self.ready.wait(&mut table),
            }
        }
    }

    fn ensure_room(&self, table: &MutexGuard<'_, Table>, name: &str) -> Result<()> {
        if table.entries.len() >= self.config.capacity {
            log::warn!(
                target: "record",
                "no room for `{name}`: {} records live",
                table.entries.len()
            );
            return Err(Error::Full);
        }
        Ok(())
    }

    fn open_object<F>(&self, name: &'static str, make: F) -> Result<Object>
    where
        F: FnOnce() -> Object,
    {
        let me = thread::current().id();
        let mut table = self.table.lock();
        loop {
            match table.entries.get_mut(name) {
                Some(Entry { slot: Slot::Ready(object), holders, .. }) => {
                    *holders += 1;
                    return Ok(Arc::clone(object));
                }
                Some(Entry { slot: Slot::Constructing(builder), .. }) => {
                    check!(
                        *builder != me,
                        "record `{name}` opened again from its own constructor"
                    );
                    self.ready.wait(&mut table);
                }
                None => break,
            }
        }

        self.ensure_room(&table, name)?;
        table.entries.insert(
            name,
            Entry {
                slot: Slot::Constructing(me),
                holders: 1,
                pinned: false,
            },
        );
        drop(table);

        let constructing = Construction {
            registry: self,
            name,
        };
        let object = make();
        core::mem::forget(constructing);

        let mut table = self.table.lock();
        if let Some(entry) = table.entries.get_mut(name) {
            entry.slot = Slot::Ready(Arc::clone(&object));
        }
        self.ready.notify_all();
        log::debug!(target: "record", "constructed `{name}`");
        Ok(object)
    }
}

/// Frees a `Constructing` entry when its constructor unwinds, so waiters
/// retry instead of blocking forever.
struct Construction<'r> {
    registry: &'r Registry,
    name: &'static str,
}

impl Drop for Construction<'_> {
    fn drop(&mut self) {
        self.registry.table.lock().entries.remove(self.name);
        self.registry.ready.notify_all();
        log::warn!(target: "record", "constructor of `{}` panicked", self.name);
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.lock();
        let mut names: Vec<_> = table.entries.keys().copied().collect();
        names.sort_unstable();
        f.debug_struct("Registry")
            .field("records", &names)
            .field("capacity", &self.config.capacity)
            .finish()
    }
}

#[track_caller]
fn downcast<T: Any + Send + Sync>(name: &str, object: Object) -> Arc<T> {
    match object.downcast::<T>() {
        Ok(object) => object,
        Err(_) => check::crash(&format!(
            "record `{name}` does not hold a `{}`",
            core::any::type_name::<T>()
        )),
    }
}

/// One open reference to a service. Dropping it closes the reference.
pub struct Record<'r, T> {
    registry: &'r Registry,
    name: &'static str,
    object: Arc<T>,
    detached: bool,
}

impl<'r, T> Record<'r, T> {
    fn new(registry: &'r Registry, name: &'static str, object: Arc<T>) -> Self {
        Self {
            registry,
            name,
            object,
            detached: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Detaches the handle without closing. The caller now owns the reference
    /// and must give it back with [`Registry::close`].
    pub fn forget(mut self) -> Arc<T> {
        self.detached = true;
        Arc::clone(&self.object)
    }

    /// Closes the reference. Equivalent to dropping the handle.
    pub fn close(self) {}
}

impl<T> Deref for Record<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.object
    }
}

impl<T> Drop for Record<'_, T> {
    fn drop(&mut self) {
        if !self.detached {
            self.registry.close(self.name);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Record<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("name", &self.name)
            .field("object", &self.object)
            .finish()
    }
}
