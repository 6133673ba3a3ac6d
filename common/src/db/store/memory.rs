// In-memory store enforcing the same constraints as the PostgreSQL schema

use super::{ChangeSet, Persisted, Staged, Store};
use crate::errors::{DatabaseError, ValidationError};
use crate::models::{
    Engagement, NewEngagement, NewWidget, NewWidgetDocument, Widget, WidgetDocument,
    WidgetDocumentChanges,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;
use tracing::instrument;

#[derive(Debug, Clone, Default)]
struct Tables {
    engagements: BTreeMap<i32, Engagement>,
    widgets: BTreeMap<i32, Widget>,
    documents: BTreeMap<i32, WidgetDocument>,
    engagement_seq: i32,
    widget_seq: i32,
    document_seq: i32,
}

impl Tables {
    fn insert_engagement(&mut self, record: NewEngagement, now: DateTime<Utc>) -> Engagement {
        self.engagement_seq += 1;
        let engagement = Engagement {
            id: self.engagement_seq,
            name: record.name,
            description: record.description,
            created_date: now,
            updated_date: now,
            updated_by: record.created_by.clone(),
            created_by: record.created_by,
        };
        self.engagements.insert(engagement.id, engagement.clone());
        engagement
    }

    fn insert_widget(
        &mut self,
        record: NewWidget,
        now: DateTime<Utc>,
    ) -> Result<Widget, DatabaseError> {
        if !self.engagements.contains_key(&record.engagement_id) {
            return Err(DatabaseError::ForeignKeyViolation(format!(
                "widget.engagement_id {} does not reference an engagement",
                record.engagement_id
            )));
        }

        self.widget_seq += 1;
        let widget = Widget {
            id: self.widget_seq,
            widget_type: record.widget_type,
            engagement_id: record.engagement_id,
            title: record.title,
            sort_index: record.sort_index,
            created_date: now,
            updated_date: now,
            updated_by: record.created_by.clone(),
            created_by: record.created_by,
        };
        self.widgets.insert(widget.id, widget.clone());
        Ok(widget)
    }

    fn insert_document(
        &mut self,
        record: NewWidgetDocument,
        now: DateTime<Utc>,
    ) -> Result<WidgetDocument, DatabaseError> {
        let widget_id = record.widget_id.ok_or_else(|| {
            DatabaseError::NotNullViolation(
                "null value in column widget_id of widget_documents".to_string(),
            )
        })?;
        if !self.widgets.contains_key(&widget_id) {
            return Err(DatabaseError::ForeignKeyViolation(format!(
                "widget_documents.widget_id {} does not reference a widget",
                widget_id
            )));
        }
        self.check_parent(record.parent_document_id)?;

        self.document_seq += 1;
        let document = WidgetDocument {
            id: self.document_seq,
            title: record.title,
            doc_type: record.doc_type,
            parent_document_id: record.parent_document_id,
            url: record.url,
            sort_index: record.sort_index,
            widget_id,
            created_date: now,
            updated_date: now,
            updated_by: record.created_by.clone(),
            created_by: record.created_by,
        };
        self.documents.insert(document.id, document.clone());
        Ok(document)
    }

    fn check_parent(&self, parent_document_id: Option<i32>) -> Result<(), DatabaseError> {
        match parent_document_id {
            Some(parent) if !self.documents.contains_key(&parent) => {
                Err(DatabaseError::ForeignKeyViolation(format!(
                    "widget_documents.parent_document_id {} does not reference a document",
                    parent
                )))
            }
            _ => Ok(()),
        }
    }

    /// Reject a parent that is `id` itself or already nested beneath it
    fn check_nesting(&self, id: i32, parent: i32) -> Result<(), DatabaseError> {
        let mut visited = HashSet::new();
        let mut ancestor = Some(parent);
        while let Some(current) = ancestor {
            if current == id {
                return Err(ValidationError::InvalidFieldValue {
                    field: "parent_document_id".to_string(),
                    reason: format!("document {} is nested beneath document {}", parent, id),
                }
                .into());
            }
            if !visited.insert(current) {
                break;
            }
            ancestor = self
                .documents
                .get(&current)
                .and_then(|doc| doc.parent_document_id);
        }
        Ok(())
    }

    /// Ids of a document and everything nested beneath it
    fn subtree(&self, root: i32) -> Vec<i32> {
        let mut visited = HashSet::from([root]);
        let mut ids = vec![root];
        let mut cursor = 0;
        while cursor < ids.len() {
            let parent = ids[cursor];
            for doc in self.documents.values() {
                if doc.parent_document_id == Some(parent) && visited.insert(doc.id) {
                    ids.push(doc.id);
                }
            }
            cursor += 1;
        }
        ids
    }
}

/// Store keeping records in process memory.
///
/// Each store is isolated, so tests can create one per case instead of sharing
/// a database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    #[instrument(skip(self, changes), fields(records = changes.len()))]
    async fn apply(&self, changes: ChangeSet) -> Result<Vec<Persisted>, DatabaseError> {
        let mut tables = self.tables.write().await;

        // Work on a copy so a failing record leaves the committed tables untouched
        let mut scratch = tables.clone();
        let now = Utc::now();
        let mut persisted = Vec::with_capacity(changes.len());
        for staged in changes {
            let record = match staged {
                Staged::Engagement(record) => {
                    Persisted::Engagement(scratch.insert_engagement(record, now))
                }
                Staged::Widget(record) => Persisted::Widget(scratch.insert_widget(record, now)?),
                Staged::WidgetDocument(record) => {
                    Persisted::WidgetDocument(scratch.insert_document(record, now)?)
                }
            };
            persisted.push(record);
        }

        *tables = scratch;
        tracing::debug!(count = persisted.len(), "Change set committed");
        Ok(persisted)
    }

    async fn find_engagement(&self, id: i32) -> Result<Option<Engagement>, DatabaseError> {
        Ok(self.tables.read().await.engagements.get(&id).cloned())
    }

    async fn find_widget(&self, id: i32) -> Result<Option<Widget>, DatabaseError> {
        Ok(self.tables.read().await.widgets.get(&id).cloned())
    }

    async fn find_widget_document(
        &self,
        id: i32,
    ) -> Result<Option<WidgetDocument>, DatabaseError> {
        Ok(self.tables.read().await.documents.get(&id).cloned())
    }

    #[instrument(skip(self))]
    async fn find_widget_documents_by_widget_id(
        &self,
        widget_id: i32,
    ) -> Result<Vec<WidgetDocument>, DatabaseError> {
        let tables = self.tables.read().await;
        let mut documents: Vec<WidgetDocument> = tables
            .documents
            .values()
            .filter(|doc| doc.widget_id == widget_id)
            .cloned()
            .collect();
        documents.sort_by_key(|doc| (doc.sort_index, doc.id));

        tracing::debug!(widget_id = widget_id, count = documents.len(), "Found widget documents");
        Ok(documents)
    }

    #[instrument(skip(self, changes))]
    async fn update_widget_document(
        &self,
        id: i32,
        changes: &WidgetDocumentChanges,
    ) -> Result<WidgetDocument, DatabaseError> {
        let mut tables = self.tables.write().await;
        if !tables.documents.contains_key(&id) {
            return Err(DatabaseError::NotFound(format!(
                "Widget document not found: {}",
                id
            )));
        }
        if let Some(parent) = changes.parent_document_id {
            tables.check_parent(Some(parent))?;
            tables.check_nesting(id, parent)?;
        }

        let document = tables
            .documents
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("Widget document not found: {}", id)))?;

        if let Some(title) = &changes.title {
            document.title = title.clone();
        }
        if let Some(url) = &changes.url {
            document.url = Some(url.clone());
        }
        if let Some(sort_index) = changes.sort_index {
            document.sort_index = sort_index;
        }
        if let Some(parent) = changes.parent_document_id {
            document.parent_document_id = Some(parent);
        }
        if let Some(updated_by) = &changes.updated_by {
            document.updated_by = Some(updated_by.clone());
        }
        document.updated_date = Utc::now();

        Ok(document.clone())
    }

    #[instrument(skip(self))]
    async fn delete_widget_document(&self, id: i32) -> Result<(), DatabaseError> {
        let mut tables = self.tables.write().await;
        if !tables.documents.contains_key(&id) {
            return Err(DatabaseError::NotFound(format!(
                "Widget document not found: {}",
                id
            )));
        }

        for doc_id in tables.subtree(id) {
            tables.documents.remove(&doc_id);
        }
        Ok(())
    }

    #[instrument(skip(self, ordered_ids), fields(count = ordered_ids.len()))]
    async fn reorder_widget_documents(
        &self,
        widget_id: i32,
        ordered_ids: &[i32],
    ) -> Result<(), DatabaseError> {
        let mut tables = self.tables.write().await;

        if let Some(missing) = ordered_ids.iter().find(|id| {
            tables
                .documents
                .get(*id)
                .map_or(true, |doc| doc.widget_id != widget_id)
        }) {
            return Err(DatabaseError::NotFound(format!(
                "Widget document {} not found for widget {}",
                missing, widget_id
            )));
        }

        let now = Utc::now();
        for (position, id) in ordered_ids.iter().enumerate() {
            if let Some(document) = tables.documents.get_mut(id) {
                document.sort_index = position as i32 + 1;
                document.updated_date = now;
            }
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WidgetType;

    async fn seed_widget(store: &MemoryStore) -> Widget {
        let mut changes = ChangeSet::new();
        changes.push(NewEngagement::new("Transit plan"));
        let engagement_id = store.apply(changes).await.unwrap()[0].id();

        let mut changes = ChangeSet::new();
        changes.push(NewWidget::new(WidgetType::Documents, engagement_id));
        match store.apply(changes).await.unwrap().remove(0) {
            Persisted::Widget(widget) => widget,
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_apply_assigns_serial_ids() {
        let store = MemoryStore::new();
        let widget = seed_widget(&store).await;

        let mut changes = ChangeSet::new();
        changes.push(NewWidgetDocument::new("A").with_widget_id(widget.id));
        changes.push(NewWidgetDocument::new("B").with_widget_id(widget.id));
        let ids: Vec<i32> = store
            .apply(changes)
            .await
            .unwrap()
            .iter()
            .map(Persisted::id)
            .collect();

        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_failed_apply_leaves_tables_unchanged() {
        let store = MemoryStore::new();
        let widget = seed_widget(&store).await;

        let mut changes = ChangeSet::new();
        changes.push(NewWidgetDocument::new("kept out").with_widget_id(widget.id));
        changes.push(NewWidgetDocument::new("dangling").with_widget_id(widget.id + 100));
        let err = store.apply(changes).await.unwrap_err();

        assert!(matches!(err, DatabaseError::ForeignKeyViolation(_)));
        assert!(store
            .find_widget_documents_by_widget_id(widget.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_widget_requires_existing_engagement() {
        let store = MemoryStore::new();
        let mut changes = ChangeSet::new();
        changes.push(NewWidget::new(WidgetType::Documents, 42));
        let err = store.apply(changes).await.unwrap_err();
        assert!(matches!(err, DatabaseError::ForeignKeyViolation(_)));
    }

    #[tokio::test]
    async fn test_delete_folder_removes_nested_documents() {
        let store = MemoryStore::new();
        let widget = seed_widget(&store).await;

        let mut changes = ChangeSet::new();
        changes.push(
            NewWidgetDocument::new("Reports")
                .with_type(crate::models::DocumentType::Folder)
                .with_widget_id(widget.id),
        );
        let folder_id = store.apply(changes).await.unwrap()[0].id();

        let mut changes = ChangeSet::new();
        changes.push(
            NewWidgetDocument::new("Q1")
                .with_parent(folder_id)
                .with_widget_id(widget.id),
        );
        changes.push(NewWidgetDocument::new("Loose").with_widget_id(widget.id));
        store.apply(changes).await.unwrap();

        store.delete_widget_document(folder_id).await.unwrap();

        let remaining = store
            .find_widget_documents_by_widget_id(widget.id)
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].title, "Loose");
    }

    #[tokio::test]
    async fn test_dangling_parent_fails_apply() {
        let store = MemoryStore::new();
        let widget = seed_widget(&store).await;

        let mut changes = ChangeSet::new();
        changes.push(
            NewWidgetDocument::new("Stray")
                .with_parent(404)
                .with_widget_id(widget.id),
        );
        let err = store.apply(changes).await.unwrap_err();

        assert!(matches!(err, DatabaseError::ForeignKeyViolation(_)));
        assert!(store
            .find_widget_documents_by_widget_id(widget.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_update_to_dangling_parent_is_rejected() {
        let store = MemoryStore::new();
        let widget = seed_widget(&store).await;

        let mut changes = ChangeSet::new();
        changes.push(NewWidgetDocument::new("Agenda").with_widget_id(widget.id));
        let id = store.apply(changes).await.unwrap()[0].id();

        let changes = WidgetDocumentChanges {
            parent_document_id: Some(404),
            ..Default::default()
        };
        let err = store.update_widget_document(id, &changes).await.unwrap_err();
        assert!(matches!(err, DatabaseError::ForeignKeyViolation(_)));

        let doc = store.find_widget_document(id).await.unwrap().unwrap();
        assert_eq!(doc.parent_document_id, None);
    }

    #[tokio::test]
    async fn test_update_missing_document_wins_over_dangling_parent() {
        let store = MemoryStore::new();
        let changes = WidgetDocumentChanges {
            parent_document_id: Some(405),
            ..Default::default()
        };
        let err = store.update_widget_document(404, &changes).await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_rejects_parent_cycle() {
        let store = MemoryStore::new();
        let widget = seed_widget(&store).await;

        let mut changes = ChangeSet::new();
        changes.push(NewWidgetDocument::new("A").with_widget_id(widget.id));
        changes.push(NewWidgetDocument::new("B").with_widget_id(widget.id));
        let ids: Vec<i32> = store
            .apply(changes)
            .await
            .unwrap()
            .iter()
            .map(Persisted::id)
            .collect();
        let (a, b) = (ids[0], ids[1]);

        let under_b = WidgetDocumentChanges {
            parent_document_id: Some(b),
            ..Default::default()
        };
        store.update_widget_document(a, &under_b).await.unwrap();

        let under_a = WidgetDocumentChanges {
            parent_document_id: Some(a),
            ..Default::default()
        };
        let err = store.update_widget_document(b, &under_a).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Validation(_)));

        let doc = store.find_widget_document(b).await.unwrap().unwrap();
        assert_eq!(doc.parent_document_id, None);

        // Deleting B takes the nested A with it
        store.delete_widget_document(b).await.unwrap();
        assert!(store
            .find_widget_documents_by_widget_id(widget.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_subtree_terminates_on_parent_cycle() {
        let mut tables = Tables::default();
        let now = Utc::now();
        let engagement = tables.insert_engagement(NewEngagement::new("Loop"), now);
        let widget = tables
            .insert_widget(NewWidget::new(WidgetType::Documents, engagement.id), now)
            .unwrap();
        let a = tables
            .insert_document(NewWidgetDocument::new("A").with_widget_id(widget.id), now)
            .unwrap();
        let b = tables
            .insert_document(
                NewWidgetDocument::new("B")
                    .with_parent(a.id)
                    .with_widget_id(widget.id),
                now,
            )
            .unwrap();

        // Rows written before the nesting check existed may already loop
        if let Some(doc) = tables.documents.get_mut(&a.id) {
            doc.parent_document_id = Some(b.id);
        }

        let mut ids = tables.subtree(a.id);
        ids.sort_unstable();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn test_reorder_rejects_foreign_document() {
        let store = MemoryStore::new();
        let first = seed_widget(&store).await;
        let second = seed_widget(&store).await;

        let mut changes = ChangeSet::new();
        changes.push(NewWidgetDocument::new("A").with_widget_id(first.id));
        changes.push(NewWidgetDocument::new("B").with_widget_id(second.id));
        let ids: Vec<i32> = store
            .apply(changes)
            .await
            .unwrap()
            .iter()
            .map(Persisted::id)
            .collect();

        let err = store
            .reorder_widget_documents(first.id, &ids)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound(_)));

        // Nothing was renumbered
        let doc = store.find_widget_document(ids[0]).await.unwrap().unwrap();
        assert_eq!(doc.sort_index, 1);
    }
}
