// Unit of work: stage transient records, then commit them in one transaction

use crate::db::store::{ChangeSet, Persisted, Staged, Store};
use crate::errors::DatabaseError;
use crate::models::{
    Engagement, NewEngagement, NewWidget, NewWidgetDocument, Widget, WidgetDocument,
};
use crate::telemetry;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::instrument;

static NEXT_BATCH: AtomicU64 = AtomicU64::new(1);

fn next_batch() -> u64 {
    NEXT_BATCH.fetch_add(1, Ordering::Relaxed)
}

/// A transient record type that a session can stage
pub trait Stageable: Into<Staged> {
    /// The persisted counterpart produced by commit
    type Record;

    fn select(persisted: &Persisted) -> Option<&Self::Record>;
}

impl Stageable for NewEngagement {
    type Record = Engagement;

    fn select(persisted: &Persisted) -> Option<&Engagement> {
        match persisted {
            Persisted::Engagement(engagement) => Some(engagement),
            _ => None,
        }
    }
}

impl Stageable for NewWidget {
    type Record = Widget;

    fn select(persisted: &Persisted) -> Option<&Widget> {
        match persisted {
            Persisted::Widget(widget) => Some(widget),
            _ => None,
        }
    }
}

impl Stageable for NewWidgetDocument {
    type Record = WidgetDocument;

    fn select(persisted: &Persisted) -> Option<&WidgetDocument> {
        match persisted {
            Persisted::WidgetDocument(document) => Some(document),
            _ => None,
        }
    }
}

/// Handle returned by [`Session::add`], redeemed against the matching [`Committed`]
pub struct Ticket<N> {
    batch: u64,
    index: usize,
    _record: PhantomData<fn() -> N>,
}

impl<N> Clone for Ticket<N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<N> Copy for Ticket<N> {}

impl<N> fmt::Debug for Ticket<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticket")
            .field("batch", &self.batch)
            .field("index", &self.index)
            .finish()
    }
}

/// Records made durable by one commit, in the order they were added
#[derive(Debug, Clone)]
pub struct Committed {
    batch: u64,
    records: Vec<Persisted>,
}

impl Committed {
    /// The persisted record for a ticket from the same batch
    pub fn get<N: Stageable>(&self, ticket: &Ticket<N>) -> Option<&N::Record> {
        if ticket.batch != self.batch {
            return None;
        }
        self.records.get(ticket.index).and_then(N::select)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Transactional unit of work over a [`Store`].
///
/// Staged records are written by [`Session::commit`] all together or not at
/// all. Work that is never committed is discarded on [`Session::rollback`] or
/// when the session is dropped.
pub struct Session {
    store: Arc<dyn Store>,
    batch: u64,
    pending: ChangeSet,
}

impl Session {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            batch: next_batch(),
            pending: ChangeSet::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Stage a transient record for the next commit
    pub fn add<N: Stageable>(&mut self, record: N) -> Ticket<N> {
        let index = self.pending.push(record);
        Ticket {
            batch: self.batch,
            index,
            _record: PhantomData,
        }
    }

    /// Number of records staged since the last commit or rollback
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Persist every staged record, assigning generated ids.
    ///
    /// On failure nothing is written and the staged records are discarded.
    #[instrument(skip(self), fields(batch = self.batch, records = self.pending.len()))]
    pub async fn commit(&mut self) -> Result<Committed, DatabaseError> {
        let batch = self.batch;
        let changes = std::mem::take(&mut self.pending);
        self.batch = next_batch();

        let size = changes.len();
        let result = match changes.validate() {
            Ok(()) => self.store.apply(changes).await,
            Err(e) => Err(e.into()),
        };

        let records = match result {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, records = size, "Commit rejected");
                telemetry::record_commit_failure(failure_reason(&e));
                return Err(e);
            }
        };

        telemetry::record_batch_size(size);
        for record in &records {
            telemetry::record_committed(record.kind(), 1);
        }
        tracing::info!(records = records.len(), "Session committed");

        Ok(Committed { batch, records })
    }

    /// Discard staged records, returning how many were dropped
    pub fn rollback(&mut self) -> usize {
        let discarded = std::mem::take(&mut self.pending).len();
        self.batch = next_batch();
        if discarded > 0 {
            tracing::debug!(discarded = discarded, "Session rolled back");
        }
        discarded
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            tracing::warn!(
                discarded = self.pending.len(),
                "Session dropped with uncommitted records"
            );
        }
    }
}

fn failure_reason(err: &DatabaseError) -> &'static str {
    match err {
        DatabaseError::ForeignKeyViolation(_) => "foreign_key_violation",
        DatabaseError::NotNullViolation(_) => "not_null_violation",
        DatabaseError::DuplicateKey(_) => "duplicate_key",
        DatabaseError::TransactionFailed(_) => "transaction_failed",
        DatabaseError::Validation(_) => "validation",
        _ => "query_failed",
    }
}
