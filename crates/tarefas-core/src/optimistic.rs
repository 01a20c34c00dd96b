//! Snapshot, apply, then commit or revert.
//!
//! A mutation runs against the UI-facing state before its request resolves.
//! If the request fails the captured snapshot is written back and a single
//! notification is raised. Operations on the same entity are not serialized:
//! when two race, whichever resolves last decides the final state.

use std::future::Future;

use tracing::{debug, instrument, warn};

use crate::error::Result;
use crate::notify::{SharedNotifier, report_failure};

/// The change applied ahead of server confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change<E> {
    Replace(E),
    Remove(Vec<String>),
}

/// A store whose entities of type `E` can be changed optimistically.
pub trait OptimisticTarget<E> {
    type Snapshot;

    /// Records the current state of everything `change` touches. Fails with
    /// `NotFound` when an entity is absent.
    fn capture(&self, change: &Change<E>) -> Result<Self::Snapshot>;

    fn apply(&self, change: &Change<E>);

    /// Overwrites the optimistic value with the server's copy.
    fn confirm(&self, authoritative: E);

    /// Restores the captured state. Touches nothing else, so unrelated
    /// in-flight operations keep their own optimistic values.
    fn revert(&self, snapshot: Self::Snapshot);
}

#[derive(Clone)]
pub struct Coordinator {
    notifier: SharedNotifier,
}

impl Coordinator {
    pub fn new(notifier: SharedNotifier) -> Self {
        Self { notifier }
    }

    /// Runs `request` with `change` already visible through `target`.
    ///
    /// `request` must not report its own failure; this is the single place
    /// that notifies. `Ok(None)` from the request keeps the optimistic state.
    #[instrument(skip_all, fields(failure = failure_message))]
    pub async fn run<E, T, Fut>(
        &self,
        target: &T,
        change: Change<E>,
        request: Fut,
        failure_message: &str,
    ) -> Result<Option<E>>
    where
        E: Clone,
        T: OptimisticTarget<E>,
        Fut: Future<Output = Result<Option<E>>>,
    {
        let snapshot = target.capture(&change)?;
        target.apply(&change);
        debug!("optimistic change applied");

        match request.await {
            Ok(Some(authoritative)) => {
                target.confirm(authoritative.clone());
                debug!("optimistic change confirmed by server copy");
                Ok(Some(authoritative))
            }
            Ok(None) => {
                debug!("optimistic change kept");
                Ok(None)
            }
            Err(err) => {
                target.revert(snapshot);
                warn!(error = %err, "optimistic change reverted");
                report_failure(self.notifier.as_ref(), failure_message, &err);
                Err(err)
            }
        }
    }
}
