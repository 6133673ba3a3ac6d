// PostgreSQL store backed by sqlx

use super::{ChangeSet, Persisted, Staged, Store};
use crate::db::DbPool;
use crate::errors::{DatabaseError, ValidationError};
use crate::models::{
    Engagement, NewEngagement, NewWidget, NewWidgetDocument, Widget, WidgetDocument,
    WidgetDocumentChanges,
};
use async_trait::async_trait;
use sqlx::PgConnection;
use tracing::instrument;

/// Store persisting records in PostgreSQL
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

async fn insert_engagement(
    conn: &mut PgConnection,
    record: &NewEngagement,
) -> Result<Engagement, DatabaseError> {
    let engagement = sqlx::query_as::<_, Engagement>(
        r#"
        INSERT INTO engagement (name, description, created_by, updated_by)
        VALUES ($1, $2, $3, $3)
        RETURNING id, name, description, created_date, updated_date, created_by, updated_by
        "#,
    )
    .bind(&record.name)
    .bind(&record.description)
    .bind(&record.created_by)
    .fetch_one(conn)
    .await?;

    Ok(engagement)
}

async fn insert_widget(
    conn: &mut PgConnection,
    record: &NewWidget,
) -> Result<Widget, DatabaseError> {
    let widget = sqlx::query_as::<_, Widget>(
        r#"
        INSERT INTO widget (widget_type_id, engagement_id, title, sort_index, created_by, updated_by)
        VALUES ($1, $2, $3, $4, $5, $5)
        RETURNING id, widget_type_id, engagement_id, title, sort_index,
                  created_date, updated_date, created_by, updated_by
        "#,
    )
    .bind(record.widget_type.id())
    .bind(record.engagement_id)
    .bind(&record.title)
    .bind(record.sort_index)
    .bind(&record.created_by)
    .fetch_one(conn)
    .await?;

    Ok(widget)
}

async fn insert_widget_document(
    conn: &mut PgConnection,
    record: &NewWidgetDocument,
) -> Result<WidgetDocument, DatabaseError> {
    // A NULL widget_id is rejected by the column constraint
    let document = sqlx::query_as::<_, WidgetDocument>(
        r#"
        INSERT INTO widget_documents (
            title, type, parent_document_id, url, sort_index, widget_id,
            created_by, updated_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
        RETURNING id, title, type, parent_document_id, url, sort_index, widget_id,
                  created_date, updated_date, created_by, updated_by
        "#,
    )
    .bind(&record.title)
    .bind(record.doc_type.to_string())
    .bind(record.parent_document_id)
    .bind(&record.url)
    .bind(record.sort_index)
    .bind(record.widget_id)
    .bind(&record.created_by)
    .fetch_one(conn)
    .await?;

    Ok(document)
}

#[async_trait]
impl Store for PgStore {
    #[instrument(skip(self, changes), fields(records = changes.len()))]
    async fn apply(&self, changes: ChangeSet) -> Result<Vec<Persisted>, DatabaseError> {
        let mut tx = self.pool.pool().begin().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to begin transaction");
            DatabaseError::TransactionFailed(e.to_string())
        })?;

        // Dropping the transaction on an early return rolls it back
        let mut persisted = Vec::with_capacity(changes.len());
        for staged in changes {
            let record = match staged {
                Staged::Engagement(record) => {
                    Persisted::Engagement(insert_engagement(&mut *tx, &record).await?)
                }
                Staged::Widget(record) => Persisted::Widget(insert_widget(&mut *tx, &record).await?),
                Staged::WidgetDocument(record) => {
                    Persisted::WidgetDocument(insert_widget_document(&mut *tx, &record).await?)
                }
            };
            persisted.push(record);
        }

        tx.commit().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to commit transaction");
            DatabaseError::TransactionFailed(e.to_string())
        })?;

        tracing::debug!(count = persisted.len(), "Change set committed");
        Ok(persisted)
    }

    #[instrument(skip(self))]
    async fn find_engagement(&self, id: i32) -> Result<Option<Engagement>, DatabaseError> {
        let engagement = sqlx::query_as::<_, Engagement>(
            r#"
            SELECT id, name, description, created_date, updated_date, created_by, updated_by
            FROM engagement
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(engagement)
    }

    #[instrument(skip(self))]
    async fn find_widget(&self, id: i32) -> Result<Option<Widget>, DatabaseError> {
        let widget = sqlx::query_as::<_, Widget>(
            r#"
            SELECT id, widget_type_id, engagement_id, title, sort_index,
                   created_date, updated_date, created_by, updated_by
            FROM widget
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(widget)
    }

    #[instrument(skip(self))]
    async fn find_widget_document(
        &self,
        id: i32,
    ) -> Result<Option<WidgetDocument>, DatabaseError> {
        let document = sqlx::query_as::<_, WidgetDocument>(
            r#"
            SELECT id, title, type, parent_document_id, url, sort_index, widget_id,
                   created_date, updated_date, created_by, updated_by
            FROM widget_documents
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(document)
    }

    #[instrument(skip(self))]
    async fn find_widget_documents_by_widget_id(
        &self,
        widget_id: i32,
    ) -> Result<Vec<WidgetDocument>, DatabaseError> {
        let documents = sqlx::query_as::<_, WidgetDocument>(
            r#"
            SELECT id, title, type, parent_document_id, url, sort_index, widget_id,
                   created_date, updated_date, created_by, updated_by
            FROM widget_documents
            WHERE widget_id = $1
            ORDER BY sort_index ASC, id ASC
            "#,
        )
        .bind(widget_id)
        .fetch_all(self.pool.pool())
        .await?;

        tracing::debug!(widget_id = widget_id, count = documents.len(), "Found widget documents");
        Ok(documents)
    }

    #[instrument(skip(self, changes))]
    async fn update_widget_document(
        &self,
        id: i32,
        changes: &WidgetDocumentChanges,
    ) -> Result<WidgetDocument, DatabaseError> {
        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        let exists: Option<i32> =
            sqlx::query_scalar("SELECT id FROM widget_documents WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Err(DatabaseError::NotFound(format!(
                "Widget document not found: {}",
                id
            )));
        }

        if let Some(parent) = changes.parent_document_id {
            // UNION drops repeated rows, so the walk ends even on looping data
            let nested: bool = sqlx::query_scalar(
                r#"
                WITH RECURSIVE ancestors AS (
                    SELECT id, parent_document_id FROM widget_documents WHERE id = $1
                    UNION
                    SELECT d.id, d.parent_document_id
                    FROM widget_documents d
                    JOIN ancestors a ON d.id = a.parent_document_id
                )
                SELECT EXISTS (SELECT 1 FROM ancestors WHERE id = $2)
                "#,
            )
            .bind(parent)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

            if nested {
                return Err(ValidationError::InvalidFieldValue {
                    field: "parent_document_id".to_string(),
                    reason: format!("document {} is nested beneath document {}", parent, id),
                }
                .into());
            }
        }

        // A dangling parent is rejected by the foreign key
        let document = sqlx::query_as::<_, WidgetDocument>(
            r#"
            UPDATE widget_documents
            SET title = COALESCE($2, title),
                url = COALESCE($3, url),
                sort_index = COALESCE($4, sort_index),
                parent_document_id = COALESCE($5, parent_document_id),
                updated_by = COALESCE($6, updated_by),
                updated_date = NOW()
            WHERE id = $1
            RETURNING id, title, type, parent_document_id, url, sort_index, widget_id,
                      created_date, updated_date, created_by, updated_by
            "#,
        )
        .bind(id)
        .bind(&changes.title)
        .bind(&changes.url)
        .bind(changes.sort_index)
        .bind(changes.parent_document_id)
        .bind(&changes.updated_by)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit()
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;
        Ok(document)
    }

    #[instrument(skip(self))]
    async fn delete_widget_document(&self, id: i32) -> Result<(), DatabaseError> {
        // Nested documents go with their folder through ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM widget_documents WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "Widget document not found: {}",
                id
            )));
        }

        Ok(())
    }

    #[instrument(skip(self, ordered_ids), fields(count = ordered_ids.len()))]
    async fn reorder_widget_documents(
        &self,
        widget_id: i32,
        ordered_ids: &[i32],
    ) -> Result<(), DatabaseError> {
        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        for (position, id) in ordered_ids.iter().enumerate() {
            let result = sqlx::query(
                r#"
                UPDATE widget_documents
                SET sort_index = $1, updated_date = NOW()
                WHERE id = $2 AND widget_id = $3
                "#,
            )
            .bind(position as i32 + 1)
            .bind(*id)
            .bind(widget_id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(DatabaseError::NotFound(format!(
                    "Widget document {} not found for widget {}",
                    id, widget_id
                )));
            }
        }

        tx.commit()
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), DatabaseError> {
        self.pool.health_check().await
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
