//! Ordered, editable list of middleware for one slot.

use std::fmt;
use std::sync::Arc;

use super::{Middleware, MiddlewareError, Mode, Slot};

/// One entry of a [`MiddlewareStack`].
#[derive(Clone)]
pub struct StackEntry {
    pub middleware: Arc<dyn Middleware>,
    pub mode: Mode,
}

impl StackEntry {
    #[must_use]
    pub fn name(&self) -> &str {
        self.middleware.name()
    }
}

impl fmt::Debug for StackEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackEntry")
            .field("name", &self.name())
            .field("mode", &self.mode)
            .finish()
    }
}

/// Middleware declared for a slot, outermost first.
///
/// Edit operations address entries by [`Middleware::name`]; names are unique
/// within a stack. Every operation returns `&mut Self` so edits chain with `?`:
///
/// ```ignore
/// stack.append(Audit)?.insert_before("audit", Timing)?;
/// ```
#[derive(Debug, Clone)]
pub struct MiddlewareStack {
    slot: Slot,
    entries: Vec<StackEntry>,
}

impl MiddlewareStack {
    #[must_use]
    pub fn new(slot: Slot) -> Self {
        Self {
            slot,
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn slot(&self) -> &Slot {
        &self.slot
    }

    #[must_use]
    pub fn entries(&self) -> &[StackEntry] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Entry names, outermost first.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(StackEntry::name).collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name() == name)
    }

    fn require(&self, name: &str) -> Result<usize, MiddlewareError> {
        self.position(name).ok_or_else(|| MiddlewareError::NotFound {
            slot: self.slot.clone(),
            name: name.to_string(),
        })
    }

    fn entry(&self, middleware: Arc<dyn Middleware>, mode: Mode) -> Result<StackEntry, MiddlewareError> {
        if self.contains(middleware.name()) {
            return Err(MiddlewareError::Duplicate {
                slot: self.slot.clone(),
                name: middleware.name().to_string(),
            });
        }
        Ok(StackEntry { middleware, mode })
    }

    fn insert_at(&mut self, index: usize, middleware: Arc<dyn Middleware>, mode: Mode) -> Result<&mut Self, MiddlewareError> {
        let entry = self.entry(middleware, mode)?;
        self.entries.insert(index, entry);
        Ok(self)
    }

    /// Adds a layer innermost.
    ///
    /// # Errors
    ///
    /// Returns `MiddlewareError::Duplicate` if the name is already present.
    pub fn append<M: Middleware>(&mut self, middleware: M) -> Result<&mut Self, MiddlewareError> {
        self.append_arc(Arc::new(middleware))
    }

    /// [`MiddlewareStack::append`] for a shared middleware.
    ///
    /// # Errors
    ///
    /// Returns `MiddlewareError::Duplicate` if the name is already present.
    pub fn append_arc(&mut self, middleware: Arc<dyn Middleware>) -> Result<&mut Self, MiddlewareError> {
        let end = self.entries.len();
        self.insert_at(end, middleware, Mode::Wrap)
    }

    /// Adds a layer outermost.
    ///
    /// # Errors
    ///
    /// Returns `MiddlewareError::Duplicate` if the name is already present.
    pub fn prepend<M: Middleware>(&mut self, middleware: M) -> Result<&mut Self, MiddlewareError> {
        self.insert_at(0, Arc::new(middleware), Mode::Wrap)
    }

    /// Adds a layer directly outside of `anchor`.
    ///
    /// # Errors
    ///
    /// Returns `MiddlewareError::NotFound` for an unknown anchor and
    /// `MiddlewareError::Duplicate` if the name is already present.
    pub fn insert_before<M: Middleware>(&mut self, anchor: &str, middleware: M) -> Result<&mut Self, MiddlewareError> {
        let index = self.require(anchor)?;
        self.insert_at(index, Arc::new(middleware), Mode::Wrap)
    }

    /// Adds a layer directly inside of `anchor`.
    ///
    /// # Errors
    ///
    /// Returns `MiddlewareError::NotFound` for an unknown anchor and
    /// `MiddlewareError::Duplicate` if the name is already present.
    pub fn insert_after<M: Middleware>(&mut self, anchor: &str, middleware: M) -> Result<&mut Self, MiddlewareError> {
        let index = self.require(anchor)?;
        self.insert_at(index + 1, Arc::new(middleware), Mode::Wrap)
    }

    /// Removes the named layer.
    ///
    /// # Errors
    ///
    /// Returns `MiddlewareError::NotFound` if no layer has that name.
    pub fn delete(&mut self, name: &str) -> Result<&mut Self, MiddlewareError> {
        let index = self.require(name)?;
        self.entries.remove(index);
        Ok(self)
    }

    /// Swaps the named layer for another one, keeping its position and mode.
    ///
    /// # Errors
    ///
    /// Returns `MiddlewareError::NotFound` if no layer has that name and
    /// `MiddlewareError::Duplicate` if the replacement's name is used by a
    /// different layer.
    pub fn replace<M: Middleware>(&mut self, name: &str, middleware: M) -> Result<&mut Self, MiddlewareError> {
        let index = self.require(name)?;
        if middleware.name() != name && self.contains(middleware.name()) {
            return Err(MiddlewareError::Duplicate {
                slot: self.slot.clone(),
                name: middleware.name().to_string(),
            });
        }
        self.entries[index].middleware = Arc::new(middleware);
        Ok(self)
    }

    /// Adds an observe-mode layer outermost, so it sees every call even when
    /// an inner layer short-circuits.
    ///
    /// # Errors
    ///
    /// Returns `MiddlewareError::Duplicate` if the name is already present.
    pub fn observe<M: Middleware>(&mut self, middleware: M) -> Result<&mut Self, MiddlewareError> {
        self.insert_at(0, Arc::new(middleware), Mode::Observe)
    }

    /// Appends without the uniqueness check; used by aspects that install
    /// into freshly created stacks.
    pub(crate) fn push(&mut self, middleware: Arc<dyn Middleware>, mode: Mode) {
        self.entries.push(StackEntry { middleware, mode });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{Args, Output};
    use crate::error::Error;
    use crate::middleware::{Env, Next};

    struct Named(&'static str);

    impl Middleware for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn call(&self, env: &Env<'_>, args: Args, next: Next<'_>) -> Result<Output, Error> {
            next.run(env, args)
        }
    }

    fn stack() -> MiddlewareStack {
        MiddlewareStack::new(Slot::instance("result"))
    }

    #[test]
    fn edit_operations_keep_order() {
        let mut stack = stack();
        stack
            .append(Named("b"))
            .unwrap()
            .prepend(Named("a"))
            .unwrap()
            .append(Named("d"))
            .unwrap()
            .insert_after("b", Named("c"))
            .unwrap()
            .insert_before("a", Named("start"))
            .unwrap();
        assert_eq!(stack.names(), vec!["start", "a", "b", "c", "d"]);

        stack.delete("start").unwrap().replace("c", Named("c2")).unwrap();
        assert_eq!(stack.names(), vec!["a", "b", "c2", "d"]);
    }

    #[test]
    fn observe_marks_mode() {
        let mut stack = stack();
        stack.append(Named("wrap")).unwrap().observe(Named("watch")).unwrap();
        let modes: Vec<Mode> = stack.entries().iter().map(|e| e.mode).collect();
        assert_eq!(stack.names(), vec!["watch", "wrap"]);
        assert_eq!(modes, vec![Mode::Observe, Mode::Wrap]);
    }

    #[test]
    fn replace_keeps_mode() {
        let mut stack = stack();
        stack.observe(Named("watch")).unwrap();
        stack.replace("watch", Named("watch2")).unwrap();
        assert_eq!(stack.entries()[0].mode, Mode::Observe);
    }

    #[test]
    fn unknown_anchor_is_rejected() {
        let mut stack = stack();
        let err = stack.insert_before("missing", Named("x")).unwrap_err();
        assert_eq!(
            err,
            MiddlewareError::NotFound {
                slot: Slot::instance("result"),
                name: "missing".to_string()
            }
        );
        assert!(stack.delete("missing").is_err());
        assert!(stack.is_empty());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut stack = stack();
        stack.append(Named("a")).unwrap().append(Named("b")).unwrap();
        assert!(matches!(
            stack.prepend(Named("a")),
            Err(MiddlewareError::Duplicate { .. })
        ));
        assert!(matches!(
            stack.replace("a", Named("b")),
            Err(MiddlewareError::Duplicate { .. })
        ));
        assert_eq!(stack.len(), 2);
    }
}
