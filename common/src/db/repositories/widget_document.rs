// Widget document repository

use crate::db::store::Store;
use crate::errors::{DatabaseError, ValidationError};
use crate::models::{WidgetDocument, WidgetDocumentChanges};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::instrument;

/// Repository for widget document queries and edits
#[derive(Clone)]
pub struct WidgetDocumentRepository {
    store: Arc<dyn Store>,
}

impl WidgetDocumentRepository {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Find all documents attached to a widget, ordered by `sort_index`.
    ///
    /// A widget without documents yields an empty list.
    #[instrument(skip(self))]
    pub async fn get_all_by_widget_id(
        &self,
        widget_id: i32,
    ) -> Result<Vec<WidgetDocument>, DatabaseError> {
        self.store.find_widget_documents_by_widget_id(widget_id).await
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: i32) -> Result<Option<WidgetDocument>, DatabaseError> {
        self.store.find_widget_document(id).await
    }

    /// Apply the set fields of `changes` to a document
    #[instrument(skip(self, changes))]
    pub async fn update(
        &self,
        id: i32,
        changes: &WidgetDocumentChanges,
    ) -> Result<WidgetDocument, DatabaseError> {
        if changes.parent_document_id == Some(id) {
            return Err(ValidationError::InvalidFieldValue {
                field: "parent_document_id".to_string(),
                reason: "a document cannot be its own parent".to_string(),
            }
            .into());
        }

        let document = self.store.update_widget_document(id, changes).await?;
        tracing::info!(document_id = id, widget_id = document.widget_id, "Widget document updated");
        Ok(document)
    }

    /// Delete a document; a folder takes its nested documents with it
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i32) -> Result<(), DatabaseError> {
        self.store.delete_widget_document(id).await?;
        tracing::info!(document_id = id, "Widget document deleted");
        Ok(())
    }

    /// Renumber a widget's documents so they list in the order of `ordered_ids`.
    ///
    /// `ordered_ids` must name every document of the widget exactly once, so
    /// the resulting `sort_index` values are 1..=N without gaps or repeats.
    #[instrument(skip(self, ordered_ids))]
    pub async fn sort_documents(
        &self,
        widget_id: i32,
        ordered_ids: &[i32],
    ) -> Result<Vec<WidgetDocument>, DatabaseError> {
        let mut seen = HashSet::with_capacity(ordered_ids.len());
        if let Some(duplicate) = ordered_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(ValidationError::InvalidFieldValue {
                field: "ordered_ids".to_string(),
                reason: format!("document {} listed more than once", duplicate),
            }
            .into());
        }

        let current: HashSet<i32> = self
            .get_all_by_widget_id(widget_id)
            .await?
            .iter()
            .map(|doc| doc.id)
            .collect();
        if seen != current {
            return Err(ValidationError::InvalidFieldValue {
                field: "ordered_ids".to_string(),
                reason: format!(
                    "expected all {} documents of widget {}, got {}",
                    current.len(),
                    widget_id,
                    ordered_ids.len()
                ),
            }
            .into());
        }

        self.store
            .reorder_widget_documents(widget_id, ordered_ids)
            .await?;
        self.get_all_by_widget_id(widget_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::session::Session;
    use crate::db::store::MemoryStore;
    use crate::models::{NewEngagement, NewWidget, NewWidgetDocument, WidgetType};

    async fn setup() -> (WidgetDocumentRepository, Session, i32) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let mut session = Session::new(store.clone());

        let engagement = session.add(NewEngagement::new("Library renewal"));
        let engagement_id = session.commit().await.unwrap().get(&engagement).unwrap().id;
        let widget = session.add(NewWidget::new(WidgetType::Documents, engagement_id));
        let widget_id = session.commit().await.unwrap().get(&widget).unwrap().id;

        (WidgetDocumentRepository::new(store), session, widget_id)
    }

    #[tokio::test]
    async fn test_get_all_orders_by_sort_index() {
        let (repo, mut session, widget_id) = setup().await;
        session.add(NewWidgetDocument::new("Third").with_sort_index(3).with_widget_id(widget_id));
        session.add(NewWidgetDocument::new("First").with_sort_index(1).with_widget_id(widget_id));
        session.add(NewWidgetDocument::new("Second").with_sort_index(2).with_widget_id(widget_id));
        session.commit().await.unwrap();

        let titles: Vec<String> = repo
            .get_all_by_widget_id(widget_id)
            .await
            .unwrap()
            .into_iter()
            .map(|doc| doc.title)
            .collect();
        assert_eq!(titles, vec!["First", "Second", "Third"]);
    }

    #[tokio::test]
    async fn test_update_changes_only_given_fields() {
        let (repo, mut session, widget_id) = setup().await;
        let ticket = session.add(
            NewWidgetDocument::new("Draft")
                .with_url("https://example.com/draft.pdf")
                .with_widget_id(widget_id),
        );
        let created = session.commit().await.unwrap().get(&ticket).unwrap().clone();

        let updated = repo
            .update(
                created.id,
                &WidgetDocumentChanges {
                    title: Some("Final".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.title, "Final");
        assert_eq!(updated.url, created.url);
        assert!(updated.updated_date >= created.updated_date);
    }

    #[tokio::test]
    async fn test_update_missing_document_is_not_found() {
        let (repo, _session, _) = setup().await;
        let err = repo
            .update(404, &WidgetDocumentChanges::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_rejects_self_parent() {
        let (repo, _session, _) = setup().await;
        let changes = WidgetDocumentChanges {
            parent_document_id: Some(5),
            ..Default::default()
        };
        let err = repo.update(5, &changes).await.unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::Validation(ValidationError::InvalidFieldValue { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_then_find_returns_none() {
        let (repo, mut session, widget_id) = setup().await;
        let ticket = session.add(NewWidgetDocument::new("Obsolete").with_widget_id(widget_id));
        let id = session.commit().await.unwrap().get(&ticket).unwrap().id;

        repo.delete(id).await.unwrap();
        assert!(repo.find_by_id(id).await.unwrap().is_none());
        assert!(matches!(repo.delete(id).await, Err(DatabaseError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_sort_documents_follows_given_order() {
        let (repo, mut session, widget_id) = setup().await;
        let a = session.add(NewWidgetDocument::new("A").with_widget_id(widget_id));
        let b = session.add(NewWidgetDocument::new("B").with_widget_id(widget_id));
        let committed = session.commit().await.unwrap();
        let (a_id, b_id) = (committed.get(&a).unwrap().id, committed.get(&b).unwrap().id);

        let sorted = repo.sort_documents(widget_id, &[b_id, a_id]).await.unwrap();

        assert_eq!(sorted[0].id, b_id);
        assert_eq!(sorted[0].sort_index, 1);
        assert_eq!(sorted[1].id, a_id);
        assert_eq!(sorted[1].sort_index, 2);
    }

    #[tokio::test]
    async fn test_sort_documents_rejects_duplicates() {
        let (repo, _session, widget_id) = setup().await;
        let err = repo.sort_documents(widget_id, &[1, 1]).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Validation(_)));
    }

    #[tokio::test]
    async fn test_sort_documents_requires_every_document() {
        let (repo, mut session, widget_id) = setup().await;
        let a = session.add(NewWidgetDocument::new("A").with_sort_index(1).with_widget_id(widget_id));
        let b = session.add(NewWidgetDocument::new("B").with_sort_index(2).with_widget_id(widget_id));
        let c = session.add(NewWidgetDocument::new("C").with_sort_index(3).with_widget_id(widget_id));
        let committed = session.commit().await.unwrap();
        let ids: Vec<i32> = [committed.get(&a), committed.get(&b), committed.get(&c)]
            .into_iter()
            .map(|doc| doc.unwrap().id)
            .collect();

        let err = repo
            .sort_documents(widget_id, &[ids[2], ids[0]])
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Validation(_)));

        let indexes: Vec<i32> = repo
            .get_all_by_widget_id(widget_id)
            .await
            .unwrap()
            .iter()
            .map(|doc| doc.sort_index)
            .collect();
        assert_eq!(indexes, vec![1, 2, 3]);
    }
}
