//! Per-service-type configuration and its one-time commit.
//!
//! A [`Config`] starts as a mutable [`ConfigDraft`]. Committing validates the
//! draft, compiles it into a [`DispatchTable`], runs the aspects' commit hooks
//! and publishes the table. After that every declaration call fails with
//! [`ConfigError::Committed`].
//!
//! Commits are guarded by a re-entrant lock with a double-checked flag, so
//! concurrent first use compiles exactly once. Nested commit attempts on the
//! same thread (an aspect hook or nested service that uses the type being
//! committed) never rebuild: they get the table being committed. They are
//! counted per commit and aborted past `Settings::max_implicit_commits`.

pub mod draft;
pub mod settings;
pub mod table;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, ReentrantMutex};
use servitor_core::ServiceId;

use crate::class::ServiceClass;
use crate::error::Error;

pub use draft::ConfigDraft;
pub use settings::Settings;
pub use table::DispatchTable;

/// Errors from the configuration lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("config of {owner} is committed")]
    Committed { owner: ServiceId },
    #[error("too many implicit commits of {owner} (limit {limit})")]
    TooManyImplicitCommits { owner: ServiceId, limit: usize },
    #[error("commit of {owner} did not complete")]
    Incomplete { owner: ServiceId },
}

/// Clears the in-progress table when a commit attempt ends.
struct PendingGuard<'a>(&'a Mutex<Option<Arc<DispatchTable>>>);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.lock().take();
    }
}

/// Declaration state and commit machinery of one service type.
pub struct Config {
    owner: ServiceId,
    settings: Settings,
    draft: Mutex<ConfigDraft>,
    committed: AtomicBool,
    commit_lock: ReentrantMutex<()>,
    nested_commits: AtomicUsize,
    compilations: AtomicUsize,
    pending: Mutex<Option<Arc<DispatchTable>>>,
    table: OnceLock<Arc<DispatchTable>>,
}

impl Config {
    pub(crate) fn new(settings: Settings, draft: ConfigDraft) -> Self {
        Self {
            owner: draft.owner.clone(),
            settings,
            draft: Mutex::new(draft),
            committed: AtomicBool::new(false),
            commit_lock: ReentrantMutex::new(()),
            nested_commits: AtomicUsize::new(0),
            compilations: AtomicUsize::new(0),
            pending: Mutex::new(None),
            table: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn owner(&self) -> &ServiceId {
        &self.owner
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.committed.load(Ordering::Acquire)
    }

    /// Number of dispatch tables compiled for this type, including attempts
    /// whose commit hooks failed afterwards.
    #[must_use]
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::Acquire)
    }

    /// Committed dispatch table, if any.
    #[must_use]
    pub fn table(&self) -> Option<&Arc<DispatchTable>> {
        if self.is_committed() {
            self.table.get()
        } else {
            None
        }
    }

    fn committed_error(&self) -> Error {
        ConfigError::Committed {
            owner: self.owner.clone(),
        }
        .into()
    }

    /// Applies a declaration to the draft.
    pub(crate) fn edit<R>(&self, f: impl FnOnce(&mut ConfigDraft) -> Result<R, Error>) -> Result<R, Error> {
        if self.is_committed() {
            return Err(self.committed_error());
        }
        let mut draft = self.draft.lock();
        if draft.sealed {
            return Err(self.committed_error());
        }
        f(&mut draft)
    }

    /// Reads the draft, committed or not.
    pub(crate) fn inspect<R>(&self, f: impl FnOnce(&ConfigDraft) -> R) -> R {
        f(&self.draft.lock())
    }

    /// Commits the configuration. Returns `false` if it was already committed
    /// or a commit of this type is in progress on the current thread.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::TooManyImplicitCommits` when commit hooks
    /// re-enter the commit path too often, and any validation error or commit
    /// hook error. A failed commit leaves the draft editable.
    pub(crate) fn commit(&self, class: &ServiceClass) -> Result<bool, Error> {
        if self.is_committed() {
            return Ok(false);
        }
        let _lock = self.commit_lock.lock();
        if self.is_committed() {
            return Ok(false);
        }
        if self.pending.lock().is_some() {
            self.count_nested()?;
            return Ok(false);
        }

        self.nested_commits.store(0, Ordering::Release);
        let snapshot = {
            let mut draft = self.draft.lock();
            draft.sealed = true;
            draft.clone()
        };
        match self.compile(&snapshot, class) {
            Ok(()) => Ok(true),
            Err(err) => {
                self.draft.lock().sealed = false;
                tracing::debug!(service = %self.owner, error = %err, "commit failed");
                Err(err)
            }
        }
    }

    fn count_nested(&self) -> Result<(), Error> {
        let nested = self.nested_commits.fetch_add(1, Ordering::AcqRel) + 1;
        if nested > self.settings.max_implicit_commits {
            tracing::error!(service = %self.owner, nested, "runaway commit detected");
            return Err(ConfigError::TooManyImplicitCommits {
                owner: self.owner.clone(),
                limit: self.settings.max_implicit_commits,
            }
            .into());
        }
        Ok(())
    }

    fn compile(&self, snapshot: &ConfigDraft, class: &ServiceClass) -> Result<(), Error> {
        let table = Arc::new(DispatchTable::build(snapshot)?);
        self.compilations.fetch_add(1, Ordering::AcqRel);

        // Hooks that use the type get the table being committed.
        *self.pending.lock() = Some(table.clone());
        let _pending = PendingGuard(&self.pending);
        for aspect in &snapshot.aspects {
            aspect.on_commit(class)?;
        }

        let chains = table.slots().count();
        let steps = table.steps().len();
        let _ = self.table.set(table);
        self.committed.store(true, Ordering::Release);
        tracing::debug!(service = %self.owner, chains, steps, "service committed");
        Ok(())
    }

    /// Commits on first use and returns the dispatch table. While a commit
    /// runs its hooks, the same thread gets the table being committed.
    ///
    /// # Errors
    ///
    /// Any error [`Config::commit`] can return.
    pub(crate) fn ensure_committed(&self, class: &ServiceClass) -> Result<Arc<DispatchTable>, Error> {
        if let Some(table) = self.table() {
            return Ok(table.clone());
        }
        self.commit(class)?;
        if let Some(table) = self.table() {
            return Ok(table.clone());
        }
        let _lock = self.commit_lock.lock();
        self.pending.lock().clone().ok_or_else(|| {
            ConfigError::Incomplete {
                owner: self.owner.clone(),
            }
            .into()
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("owner", &self.owner)
            .field("settings", &self.settings)
            .field("committed", &self.is_committed())
            .field("compilations", &self.compilations())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepSpec;

    #[test]
    fn table_is_hidden_until_committed() {
        let class = ServiceClass::new("Quote");
        let config = class.config();
        assert!(config.table().is_none());
        assert_eq!(config.compilations(), 0);

        assert!(config.commit(&class).unwrap());
        let table = config.table().unwrap();
        assert_eq!(table.owner(), class.id());
        assert_eq!(table.aspects(), ["essential".to_string()]);
        assert!(!config.commit(&class).unwrap());
        assert_eq!(config.compilations(), 1);
    }

    #[test]
    fn edits_fail_once_committed() {
        let class = ServiceClass::new("Quote");
        class.commit().unwrap();
        let err = class.config().edit(|_draft| Ok(())).unwrap_err();
        assert_eq!(err.to_string(), "config of Quote is committed");
        // The draft stays readable.
        assert_eq!(class.config().inspect(|draft| draft.aspect_names().len()), 1);
    }

    #[test]
    fn failed_commit_unseals_the_draft() {
        let class = ServiceClass::new("Quote");
        class.step(StepSpec::method("price")).unwrap();
        assert!(class.commit().is_err());
        assert!(!class.config().inspect(|draft| draft.sealed));

        class
            .define_method("price", |organizer, _args| Ok(organizer.success(servitor_core::Data::new())?.into()))
            .unwrap();
        assert!(class.commit().unwrap());
        assert_eq!(class.table().unwrap().steps().len(), 1);
    }

    #[test]
    fn readers_are_generated_at_commit() {
        let class = ServiceClass::new("Quote");
        class
            .step(StepSpec::literal(servitor_core::data! { "net" => 10 }).output("net"))
            .unwrap();
        let table = class.table().unwrap();
        assert_eq!(table.reader("net"), Some(0));
        assert_eq!(table.reader("gross"), None);
    }
}
