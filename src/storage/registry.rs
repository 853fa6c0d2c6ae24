//! Registry storage: the shared list of registered instances.

use crate::model::Instance;

use super::{Result, Store};

impl Store {
    /// Snapshot of all registered instances. Missing document means no one
    /// has ever registered.
    ///
    /// Guard-free: the registry is only ever replaced by atomic rename, so
    /// a reader sees a complete old or new document.
    pub fn load_registry(&self) -> Result<Vec<Instance>> {
        Ok(self.read_doc(&self.registry_path())?.unwrap_or_default())
    }

    /// Runs `f` over the registry inside the exclusive guard and persists
    /// the modified list. The guard holds for the whole read-modify-write
    /// window, so concurrent registrations and sweeps serialize.
    pub fn with_registry<T>(&self, f: impl FnOnce(&mut Vec<Instance>) -> T) -> Result<T> {
        let path = self.registry_path();
        let _guard = self.guard(&path)?;
        let mut instances = self.load_registry()?;
        let out = f(&mut instances);
        self.write_doc(&path, &instances)?;
        Ok(out)
    }
}
