//! Per-connection property bag.
//!
//! Values are stored as `Arc<dyn Any + Send + Sync>` under string keys so
//! handlers can attach session data (a user id, an auth token) to a connection
//! and read it back with a typed accessor.

use std::{
    any::Any,
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

#[derive(Default)]
pub(crate) struct PropertyBag {
    values: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl PropertyBag {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<dyn Any + Send + Sync>>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set<T>(&self, key: impl Into<String>, value: T)
    where
        T: Send + Sync + 'static,
    {
        self.lock().insert(key.into(), Arc::new(value));
    }

    /// `None` when the key is absent or holds a value of another type.
    pub(crate) fn get<T>(&self, key: &str) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        let value = self.lock().get(key).map(Arc::clone)?;
        value.downcast::<T>().ok()
    }

    pub(crate) fn remove(&self, key: &str) -> bool { self.lock().remove(key).is_some() }
}
