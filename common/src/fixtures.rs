// Test factories and fixture data
//
// Compiled for unit tests and for dependents enabling the `test-utils` feature.

use crate::db::{Session, Store};
use crate::errors::DatabaseError;
use crate::models::{Engagement, NewEngagement, NewWidget, Widget, WidgetType};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};
use std::sync::Arc;

/// Field mappings for constructing widget documents
pub struct TestWidgetDocumentInfo;

impl TestWidgetDocumentInfo {
    pub fn document1() -> Value {
        json!({
            "title": "Policy Brief",
            "type": "file",
            "url": "https://www.example.com/documents/policy-brief.pdf",
            "sort_index": 1
        })
    }

    pub fn document2() -> Value {
        json!({
            "title": "Meeting Minutes",
            "type": "file",
            "url": "https://www.example.com/documents/meeting-minutes.pdf",
            "sort_index": 2
        })
    }
}

/// Overrides applied by [`factory_widget_model`]; unset fields get defaults
#[derive(Debug, Clone, Default)]
pub struct WidgetFields {
    pub widget_type: Option<WidgetType>,
    pub engagement_id: Option<i32>,
    pub title: Option<String>,
    pub sort_index: Option<i32>,
}

/// Widget override sets
pub struct TestWidgetInfo;

impl TestWidgetInfo {
    pub fn widget2() -> WidgetFields {
        WidgetFields {
            widget_type: Some(WidgetType::Documents),
            engagement_id: None,
            title: Some("Documents".to_string()),
            sort_index: Some(2),
        }
    }
}

/// Random alphanumeric text for fake fixture values
pub fn fake_word(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// A fresh store for one test
pub fn memory_store() -> Arc<dyn Store> {
    Arc::new(crate::db::MemoryStore::new())
}

/// Persist an engagement with generated name and description
pub async fn factory_engagement_model(store: &Arc<dyn Store>) -> Result<Engagement, DatabaseError> {
    let mut session = Session::new(store.clone());
    let number: u32 = rand::thread_rng().gen_range(1..100_000);
    let ticket = session.add(
        NewEngagement::new(format!("Engagement {}", number))
            .with_description(format!("Consultation on {}", fake_word(12))),
    );

    let committed = session.commit().await?;
    committed
        .get(&ticket)
        .cloned()
        .ok_or_else(|| DatabaseError::QueryFailed("engagement missing from commit".to_string()))
}

/// Persist a widget, creating a parent engagement when none is given
pub async fn factory_widget_model(
    store: &Arc<dyn Store>,
    fields: WidgetFields,
) -> Result<Widget, DatabaseError> {
    let engagement_id = match fields.engagement_id {
        Some(id) => id,
        None => factory_engagement_model(store).await?.id,
    };

    let mut record = NewWidget::new(
        fields.widget_type.unwrap_or(WidgetType::Documents),
        engagement_id,
    );
    record.title = fields.title;
    if let Some(sort_index) = fields.sort_index {
        record.sort_index = sort_index;
    }

    let mut session = Session::new(store.clone());
    let ticket = session.add(record);
    let committed = session.commit().await?;
    committed
        .get(&ticket)
        .cloned()
        .ok_or_else(|| DatabaseError::QueryFailed("widget missing from commit".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewWidgetDocument;

    #[tokio::test]
    async fn test_factory_widget_model_honours_engagement_override() {
        let store = memory_store();
        let engagement = factory_engagement_model(&store).await.unwrap();

        let mut fields = TestWidgetInfo::widget2();
        fields.engagement_id = Some(engagement.id);
        let widget = factory_widget_model(&store, fields).await.unwrap();

        assert_eq!(widget.engagement_id, engagement.id);
        assert_eq!(widget.widget_type, WidgetType::Documents);
        assert_eq!(widget.sort_index, 2);
    }

    #[tokio::test]
    async fn test_factory_widget_model_rejects_unknown_engagement() {
        let store = memory_store();
        let fields = WidgetFields {
            engagement_id: Some(999),
            ..Default::default()
        };
        let err = factory_widget_model(&store, fields).await.unwrap_err();
        assert!(matches!(err, DatabaseError::ForeignKeyViolation(_)));
    }

    #[test]
    fn test_document_fixtures_build_valid_records() {
        let first = NewWidgetDocument::from_fields(TestWidgetDocumentInfo::document1()).unwrap();
        let second = NewWidgetDocument::from_fields(TestWidgetDocumentInfo::document2()).unwrap();
        assert_ne!(first.title, second.title);
    }

    #[test]
    fn test_fake_word_length() {
        assert_eq!(fake_word(8).len(), 8);
    }
}
