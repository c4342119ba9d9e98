use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};
use std::thread::{self, ThreadId};

use crate::descriptor::TypeDescriptor;
use crate::error::CodecError;
use crate::reflect::Reflect;

/// Memoizing cache of type descriptors, one per Rust type.
///
/// Lookups take a read lock. A miss builds the descriptor without holding
/// any lock (building recurses into field types), then inserts it; when two
/// threads race on the same type the first insert wins and both observe the
/// same `Arc`.
///
/// Entries are never removed.
#[derive(Debug, Default)]
pub struct Registry {
    descriptors: RwLock<HashMap<TypeId, Arc<TypeDescriptor>>>,
    building: Mutex<HashSet<(TypeId, ThreadId)>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used by the typed codec functions.
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::new)
    }

    /// Returns the descriptor of `T`, building and caching it on first use.
    pub fn descriptor<T: Reflect>(&self) -> Result<Arc<TypeDescriptor>, CodecError> {
        let id = TypeId::of::<T>();
        if let Some(found) = self.lookup(id) {
            return Ok(found);
        }

        let built = {
            let _guard = BuildGuard::enter(&self.building, id, std::any::type_name::<T>())?;
            Arc::new(T::describe(self)?)
        };

        let mut descriptors = self
            .descriptors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let winner = descriptors.entry(id).or_insert_with(|| {
            log::debug!("registered descriptor {}", built.name());
            Arc::clone(&built)
        });
        Ok(Arc::clone(winner))
    }

    pub fn contains<T: Reflect>(&self) -> bool {
        self.lookup(TypeId::of::<T>()).is_some()
    }

    pub fn len(&self) -> usize {
        self.descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, id: TypeId) -> Option<Arc<TypeDescriptor>> {
        self.descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }
}

/// Marks a type as being built by the current thread; re-entry means the
/// type contains itself.
struct BuildGuard<'a> {
    building: &'a Mutex<HashSet<(TypeId, ThreadId)>>,
    key: (TypeId, ThreadId),
}

impl<'a> BuildGuard<'a> {
    fn enter(
        building: &'a Mutex<HashSet<(TypeId, ThreadId)>>,
        id: TypeId,
        type_name: &str,
    ) -> Result<Self, CodecError> {
        let key = (id, thread::current().id());
        let inserted = building
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key);
        if !inserted {
            return Err(CodecError::contract(format!(
                "recursive type {type_name} cannot be described"
            )));
        }
        Ok(BuildGuard { building, key })
    }
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        self.building
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}
