//! Lifecycle-managed uniqueid generator.

use crate::errors::*;
use crate::id::UniqueId;
use crate::primitive::{IdPrimitive, UuidPrimitive};
use crate::state::{
    EntryBackedStore, EntryStateStore, FileStateStore, StateLocation, StateStore, ThreadMode,
};
use dirsrv_types::Dn;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{error, info};

const LOG_TARGET: &str = "uniqueid_generator";

/// Generator lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    Uninitialized,
    Initialized,
    Cleaned,
}

/// Wraps an [`IdPrimitive`] with input validation, lifecycle tracking and
/// the formatted variants of each operation.
pub struct UniqueIdGenerator<P: IdPrimitive = UuidPrimitive> {
    primitive: P,
    state: RwLock<GeneratorState>,
    entry_store: RwLock<Option<Arc<dyn EntryStateStore>>>,
}

impl UniqueIdGenerator<UuidPrimitive> {
    pub fn new() -> Self {
        Self::with_primitive(UuidPrimitive::new())
    }
}

impl Default for UniqueIdGenerator<UuidPrimitive> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: IdPrimitive> UniqueIdGenerator<P> {
    pub fn with_primitive(primitive: P) -> Self {
        Self {
            primitive,
            state: RwLock::new(GeneratorState::Uninitialized),
            entry_store: RwLock::new(None),
        }
    }

    /// Register the store used when state lives in a directory entry.
    pub fn set_entry_store(&self, store: Arc<dyn EntryStateStore>) {
        *self.entry_store.write() = Some(store);
    }

    pub fn state(&self) -> GeneratorState {
        *self.state.read()
    }

    /// Initialize from the two optional configuration values.
    ///
    /// Fails with [`UniqueIdError::ConfigurationConflict`] when both or
    /// neither are given. An empty directory path selects the current
    /// directory.
    pub fn initialize_from_parts(
        &self,
        directory: Option<&str>,
        entry: Option<Dn>,
        multi_threaded: bool,
    ) -> Result<()> {
        let location = StateLocation::from_parts(directory, entry).map_err(|e| {
            error!(target: LOG_TARGET, "invalid uniqueid state location");
            e
        })?;
        self.initialize(location, ThreadMode::from_flag(multi_threaded))
    }

    pub fn initialize(&self, location: StateLocation, mode: ThreadMode) -> Result<()> {
        let mut state = self.state.write();
        if *state == GeneratorState::Initialized {
            return Err(UniqueIdError::system("generator already initialized"));
        }

        let store = self.open_store(&location)?;
        let described = store.describe();
        self.primitive.init(store, mode).map_err(|e| {
            error!(target: LOG_TARGET, "generator initialization failed: {e}");
            e.into_system()
        })?;

        *state = GeneratorState::Initialized;
        info!(target: LOG_TARGET, "uniqueid generator initialized ({described}, {mode:?})");
        Ok(())
    }

    fn open_store(&self, location: &StateLocation) -> Result<Box<dyn StateStore>> {
        match location {
            StateLocation::Directory(dir) => match FileStateStore::open(dir) {
                Ok(store) => Ok(Box::new(store)),
                Err(e) if e.is_bad_data() => {
                    error!(target: LOG_TARGET, "invalid uniqueid state location: {e}");
                    Err(e)
                }
                Err(e) => {
                    error!(target: LOG_TARGET, "generator initialization failed: {e}");
                    Err(e)
                }
            },
            StateLocation::Entry(dn) => {
                let entries = self.entry_store.read().clone().ok_or_else(|| {
                    error!(target: LOG_TARGET, "no entry store registered for {dn}");
                    UniqueIdError::system(format!("no entry store registered for {dn}"))
                })?;
                Ok(Box::new(EntryBackedStore::new(dn.clone(), entries)))
            }
        }
    }

    /// Release the clock state. A no-op unless the generator is initialized.
    pub fn cleanup(&self) {
        let mut state = self.state.write();
        if *state == GeneratorState::Initialized {
            self.primitive.cleanup();
            *state = GeneratorState::Cleaned;
        }
    }

    /// Produce a new identifier. Never repeats while the persisted clock
    /// state is intact.
    pub fn generate(&self) -> Result<UniqueId> {
        let state = self.state.read();
        if *state != GeneratorState::Initialized {
            error!(target: LOG_TARGET, "generate called while generator is {:?}", *state);
            return Err(UniqueIdError::system("generator is not initialized"));
        }

        self.primitive.create().map_err(|e| {
            error!(target: LOG_TARGET, "id generation failed: {e}");
            e.into_system()
        })
    }

    pub fn generate_formatted(&self) -> Result<String> {
        self.generate().map(|id| id.format())
    }

    /// Derive an identifier from `name` within the namespace `base`.
    ///
    /// Pure: the same inputs give the same id on every server and every run.
    /// Does not require the generator to be initialized.
    pub fn derive_from_name(&self, base: &UniqueId, name: &[u8]) -> Result<UniqueId> {
        if name.is_empty() {
            error!(target: LOG_TARGET, "name-based derivation called with an empty name");
            return Err(UniqueIdError::bad_data("name must not be empty"));
        }
        Ok(self.primitive.create_from_name(base, name))
    }

    /// Text variant of [`Self::derive_from_name`]. A missing base means
    /// [`UniqueId::NIL`].
    pub fn derive_from_name_formatted(&self, base: Option<&str>, name: &[u8]) -> Result<String> {
        let base = match base {
            Some(text) => UniqueId::parse(text)?,
            None => UniqueId::NIL,
        };
        self.derive_from_name(&base, name).map(|id| id.format())
    }

    pub fn format(&self, id: &UniqueId) -> String {
        id.format()
    }

    pub fn parse(&self, text: &str) -> Result<UniqueId> {
        UniqueId::parse(text)
    }
}

static GLOBAL: Lazy<UniqueIdGenerator> = Lazy::new(UniqueIdGenerator::new);

/// Process-wide generator shared by entry creation and replication.
pub fn global() -> &'static UniqueIdGenerator {
    &GLOBAL
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryEntryStore;
    use tempfile::tempdir;

    #[test]
    fn lifecycle_transitions() {
        let dir = tempdir().unwrap();
        let generator = UniqueIdGenerator::new();
        assert_eq!(generator.state(), GeneratorState::Uninitialized);

        generator.cleanup();
        assert_eq!(generator.state(), GeneratorState::Uninitialized);

        generator
            .initialize(
                StateLocation::Directory(dir.path().to_path_buf()),
                ThreadMode::SingleThreaded,
            )
            .unwrap();
        assert_eq!(generator.state(), GeneratorState::Initialized);

        generator.cleanup();
        generator.cleanup();
        assert_eq!(generator.state(), GeneratorState::Cleaned);
    }

    #[test]
    fn double_initialize_is_rejected() {
        let dir = tempdir().unwrap();
        let generator = UniqueIdGenerator::new();
        let location = StateLocation::Directory(dir.path().to_path_buf());
        generator
            .initialize(location.clone(), ThreadMode::MultiThreaded)
            .unwrap();
        let err = generator
            .initialize(location, ThreadMode::MultiThreaded)
            .unwrap_err();
        assert!(err.is_system_error());
        assert_eq!(generator.state(), GeneratorState::Initialized);
    }

    #[test]
    fn entry_location_needs_a_registered_store() {
        let generator = UniqueIdGenerator::new();
        let dn = Dn::parse("cn=uniqueid generator,cn=config").unwrap();
        let err = generator
            .initialize(StateLocation::Entry(dn.clone()), ThreadMode::SingleThreaded)
            .unwrap_err();
        assert!(err.is_system_error());
        assert_eq!(generator.state(), GeneratorState::Uninitialized);

        let entries = Arc::new(MemoryEntryStore::new());
        generator.set_entry_store(entries.clone());
        generator
            .initialize(StateLocation::Entry(dn.clone()), ThreadMode::SingleThreaded)
            .unwrap();
        assert!(entries.contains(&dn));
        assert_eq!(generator.generate().unwrap().version(), 1);
    }

    #[test]
    fn global_generator_is_shared() {
        assert!(std::ptr::eq(global(), global()));
        let id = global().derive_from_name(&UniqueId::NIL, b"cn=x").unwrap();
        assert_eq!(id.version(), 5);
    }
}
