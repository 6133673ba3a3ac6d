// Storage backends for engagement, widget and widget document records

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::errors::{DatabaseError, ValidationError};
use crate::models::{
    Engagement, NewEngagement, NewWidget, NewWidgetDocument, Widget, WidgetDocument,
    WidgetDocumentChanges,
};
use async_trait::async_trait;

/// A transient record waiting to be committed
#[derive(Debug, Clone, PartialEq)]
pub enum Staged {
    Engagement(NewEngagement),
    Widget(NewWidget),
    WidgetDocument(NewWidgetDocument),
}

impl Staged {
    pub fn kind(&self) -> &'static str {
        match self {
            Staged::Engagement(_) => "engagement",
            Staged::Widget(_) => "widget",
            Staged::WidgetDocument(_) => "widget_document",
        }
    }

    /// Check required columns that can still be unset on a transient record
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Staged::WidgetDocument(doc) if doc.widget_id.is_none() => {
                Err(ValidationError::MissingField("widget_id".to_string()))
            }
            _ => Ok(()),
        }
    }
}

impl From<NewEngagement> for Staged {
    fn from(record: NewEngagement) -> Self {
        Staged::Engagement(record)
    }
}

impl From<NewWidget> for Staged {
    fn from(record: NewWidget) -> Self {
        Staged::Widget(record)
    }
}

impl From<NewWidgetDocument> for Staged {
    fn from(record: NewWidgetDocument) -> Self {
        Staged::WidgetDocument(record)
    }
}

/// A record after commit, carrying its generated id
#[derive(Debug, Clone, PartialEq)]
pub enum Persisted {
    Engagement(Engagement),
    Widget(Widget),
    WidgetDocument(WidgetDocument),
}

impl Persisted {
    pub fn id(&self) -> i32 {
        match self {
            Persisted::Engagement(e) => e.id,
            Persisted::Widget(w) => w.id,
            Persisted::WidgetDocument(d) => d.id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Persisted::Engagement(_) => "engagement",
            Persisted::Widget(_) => "widget",
            Persisted::WidgetDocument(_) => "widget_document",
        }
    }
}

/// Ordered batch of staged records applied in a single transaction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    records: Vec<Staged>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, returning its position in the batch
    pub fn push(&mut self, record: impl Into<Staged>) -> usize {
        self.records.push(record.into());
        self.records.len() - 1
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Staged> {
        self.records.iter()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.records.iter().try_for_each(Staged::validate)
    }
}

impl IntoIterator for ChangeSet {
    type Item = Staged;
    type IntoIter = std::vec::IntoIter<Staged>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

/// Backend holding the records.
///
/// `apply` is atomic: every staged record is persisted, in order, or none is.
/// Lookups that match nothing return `None` or an empty `Vec`.
#[async_trait]
pub trait Store: Send + Sync {
    async fn apply(&self, changes: ChangeSet) -> Result<Vec<Persisted>, DatabaseError>;

    async fn find_engagement(&self, id: i32) -> Result<Option<Engagement>, DatabaseError>;

    async fn find_widget(&self, id: i32) -> Result<Option<Widget>, DatabaseError>;

    async fn find_widget_document(&self, id: i32)
        -> Result<Option<WidgetDocument>, DatabaseError>;

    /// All documents of one widget ordered by `sort_index`, then `id`
    async fn find_widget_documents_by_widget_id(
        &self,
        widget_id: i32,
    ) -> Result<Vec<WidgetDocument>, DatabaseError>;

    /// Apply the set fields; `NotFound` for a missing document takes precedence
    /// over a dangling or nested `parent_document_id`
    async fn update_widget_document(
        &self,
        id: i32,
        changes: &WidgetDocumentChanges,
    ) -> Result<WidgetDocument, DatabaseError>;

    /// Delete a document and, for folders, every document nested under it
    async fn delete_widget_document(&self, id: i32) -> Result<(), DatabaseError>;

    /// Set `sort_index` to 1..=N following `ordered_ids`; all ids must belong to the widget
    async fn reorder_widget_documents(
        &self,
        widget_id: i32,
        ordered_ids: &[i32],
    ) -> Result<(), DatabaseError>;

    async fn health_check(&self) -> Result<(), DatabaseError>;

    /// Release backend resources during shutdown
    async fn close(&self) {}
}
