//! Compiled, immutable method chains.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use servitor_core::ServiceId;

use super::{Env, Mode, Slot, StackEntry};
use crate::args::{Args, Output};
use crate::error::Error;

/// Un-intercepted implementation of a method: the innermost call of a chain.
pub type MethodFn = Arc<dyn Fn(&Env<'_>, Args) -> Result<Output, Error> + Send + Sync>;

/// Layers plus terminal for one slot, built once at commit.
pub struct CompiledChain {
    owner: ServiceId,
    slot: Slot,
    layers: Vec<StackEntry>,
    terminal: Option<MethodFn>,
}

impl CompiledChain {
    pub(crate) fn new(owner: ServiceId, slot: Slot, layers: Vec<StackEntry>, terminal: Option<MethodFn>) -> Self {
        Self {
            owner,
            slot,
            layers,
            terminal,
        }
    }

    #[must_use]
    pub fn slot(&self) -> &Slot {
        &self.slot
    }

    /// Layer names, outermost first.
    #[must_use]
    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(StackEntry::name).collect()
    }

    #[must_use]
    pub fn has_terminal(&self) -> bool {
        self.terminal.is_some()
    }

    /// Runs the whole chain.
    ///
    /// # Errors
    ///
    /// Returns `Error::MethodNotDefined` when the call reaches a missing
    /// terminal, or whatever a layer or the terminal fails with.
    pub fn call(&self, env: &Env<'_>, args: Args) -> Result<Output, Error> {
        Next::start(self).run(env, args)
    }

    fn dispatch(&self, position: usize, env: &Env<'_>, args: Args) -> Result<Output, Error> {
        let Some(entry) = self.layers.get(position) else {
            return match &self.terminal {
                Some(terminal) => terminal(env, args),
                None => Err(Error::MethodNotDefined {
                    owner: self.owner.clone(),
                    slot: self.slot.clone(),
                }),
            };
        };

        match entry.mode {
            Mode::Wrap => entry.middleware.call(env, args, Next::at(self, position + 1)),
            Mode::Observe => {
                let tap = RefCell::new(None);
                let retry = args.clone();
                let tapped = Next::tapped(self, position + 1, &tap, args.clone());
                let observed = entry.middleware.call(env, args, tapped);
                if let Err(err) = &observed {
                    tracing::debug!(
                        slot = %self.slot,
                        middleware = entry.name(),
                        error = %err,
                        "observer failed; outcome passes through"
                    );
                }
                match tap.into_inner() {
                    Some(outcome) => outcome,
                    None => Next::at(self, position + 1).run(env, retry),
                }
            }
        }
    }
}

impl fmt::Debug for CompiledChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledChain")
            .field("slot", &self.slot)
            .field("layers", &self.layer_names())
            .field("terminal", &self.terminal.is_some())
            .finish()
    }
}

/// Continuation for the rest of a chain.
///
/// Taken by value, so a layer can run the rest of the chain at most once.
pub struct Next<'c> {
    chain: &'c CompiledChain,
    position: usize,
    tap: Option<&'c RefCell<Option<Result<Output, Error>>>>,
    pinned: Option<Args>,
}

impl<'c> Next<'c> {
    fn start(chain: &'c CompiledChain) -> Self {
        Self::at(chain, 0)
    }

    fn at(chain: &'c CompiledChain, position: usize) -> Self {
        Self {
            chain,
            position,
            tap: None,
            pinned: None,
        }
    }

    fn tapped(
        chain: &'c CompiledChain,
        position: usize,
        tap: &'c RefCell<Option<Result<Output, Error>>>,
        args: Args,
    ) -> Self {
        Self {
            chain,
            position,
            tap: Some(tap),
            pinned: Some(args),
        }
    }

    /// Runs the remaining layers and the terminal.
    ///
    /// Behind an observer the arguments are pinned to the ones the observer
    /// received; whatever it passes here is ignored.
    ///
    /// # Errors
    ///
    /// Whatever the rest of the chain fails with.
    pub fn run(self, env: &Env<'_>, args: Args) -> Result<Output, Error> {
        let args = self.pinned.unwrap_or(args);
        let outcome = self.chain.dispatch(self.position, env, args);
        if let Some(tap) = self.tap {
            *tap.borrow_mut() = Some(outcome.clone());
        }
        outcome
    }

    /// Slot of the chain this continuation belongs to.
    #[must_use]
    pub fn slot(&self) -> &Slot {
        &self.chain.slot
    }
}
