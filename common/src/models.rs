use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

use crate::errors::ValidationError;

// ============================================================================
// Engagement Models
// ============================================================================

/// Engagement is the top-level public consultation that owns widgets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Engagement {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
}

/// An engagement that has not been committed yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewEngagement {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl NewEngagement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            created_by: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

// ============================================================================
// Widget Models
// ============================================================================

/// WidgetType identifies the kind of content block a widget renders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetType {
    WhoIsListening,
    Documents,
    Subscribe,
    Events,
    Map,
    Video,
}

impl WidgetType {
    /// Numeric id stored in the `widget_type_id` column
    pub fn id(self) -> i32 {
        match self {
            WidgetType::WhoIsListening => 1,
            WidgetType::Documents => 2,
            WidgetType::Subscribe => 3,
            WidgetType::Events => 4,
            WidgetType::Map => 5,
            WidgetType::Video => 6,
        }
    }
}

impl TryFrom<i32> for WidgetType {
    type Error = String;

    fn try_from(id: i32) -> Result<Self, Self::Error> {
        match id {
            1 => Ok(WidgetType::WhoIsListening),
            2 => Ok(WidgetType::Documents),
            3 => Ok(WidgetType::Subscribe),
            4 => Ok(WidgetType::Events),
            5 => Ok(WidgetType::Map),
            6 => Ok(WidgetType::Video),
            _ => Err(format!("Invalid widget type id: {}", id)),
        }
    }
}

/// Widget is a content block belonging to an engagement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Widget {
    pub id: i32,
    #[sqlx(rename = "widget_type_id", try_from = "i32")]
    pub widget_type: WidgetType,
    pub engagement_id: i32,
    pub title: Option<String>,
    pub sort_index: i32,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
}

/// A widget that has not been committed yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewWidget {
    pub widget_type: WidgetType,
    pub engagement_id: i32,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_sort_index")]
    pub sort_index: i32,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl NewWidget {
    pub fn new(widget_type: WidgetType, engagement_id: i32) -> Self {
        Self {
            widget_type,
            engagement_id,
            title: None,
            sort_index: default_sort_index(),
            created_by: None,
        }
    }
}

// ============================================================================
// WidgetDocument Models
// ============================================================================

/// DocumentType distinguishes a downloadable file from a folder grouping files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    #[default]
    File,
    Folder,
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentType::File => write!(f, "file"),
            DocumentType::Folder => write!(f, "folder"),
        }
    }
}

impl FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(DocumentType::File),
            "folder" => Ok(DocumentType::Folder),
            _ => Err(format!("Invalid document type: {}", s)),
        }
    }
}

impl TryFrom<String> for DocumentType {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_str(&s)
    }
}

/// WidgetDocument is a persisted document attached to a widget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WidgetDocument {
    pub id: i32,
    pub title: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type", try_from = "String")]
    pub doc_type: DocumentType,
    pub parent_document_id: Option<i32>,
    pub url: Option<String>,
    pub sort_index: i32,
    pub widget_id: i32,
    pub created_date: DateTime<Utc>,
    pub updated_date: DateTime<Utc>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
}

/// A widget document that has not been committed yet.
///
/// `widget_id` may be assigned at any point before the owning session commits;
/// committing without it fails with a not-null violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewWidgetDocument {
    pub title: String,
    #[serde(rename = "type", default)]
    pub doc_type: DocumentType,
    #[serde(default)]
    pub parent_document_id: Option<i32>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_sort_index")]
    pub sort_index: i32,
    #[serde(default)]
    pub widget_id: Option<i32>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl NewWidgetDocument {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            doc_type: DocumentType::File,
            parent_document_id: None,
            url: None,
            sort_index: default_sort_index(),
            widget_id: None,
            created_by: None,
        }
    }

    /// Build a document from a mapping of field names to values.
    ///
    /// Unknown fields and a missing `title` are rejected instead of being
    /// silently ignored.
    pub fn from_fields(fields: serde_json::Value) -> Result<Self, ValidationError> {
        let map = fields
            .as_object()
            .ok_or_else(|| ValidationError::InvalidJson("expected an object of fields".into()))?;

        if !map.contains_key("title") {
            return Err(ValidationError::MissingField("title".to_string()));
        }
        if let Some(unknown) = map.keys().find(|key| !DOCUMENT_FIELDS.contains(&key.as_str())) {
            return Err(ValidationError::UnknownField(unknown.clone()));
        }

        Ok(serde_json::from_value(fields)?)
    }

    pub fn set_widget_id(&mut self, widget_id: i32) {
        self.widget_id = Some(widget_id);
    }

    pub fn with_widget_id(mut self, widget_id: i32) -> Self {
        self.widget_id = Some(widget_id);
        self
    }

    pub fn with_type(mut self, doc_type: DocumentType) -> Self {
        self.doc_type = doc_type;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_parent(mut self, parent_document_id: i32) -> Self {
        self.parent_document_id = Some(parent_document_id);
        self
    }

    pub fn with_sort_index(mut self, sort_index: i32) -> Self {
        self.sort_index = sort_index;
        self
    }
}

const DOCUMENT_FIELDS: &[&str] = &[
    "title",
    "type",
    "parent_document_id",
    "url",
    "sort_index",
    "widget_id",
    "created_by",
];

/// Editable fields of a persisted widget document; `None` leaves a field as is
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WidgetDocumentChanges {
    pub title: Option<String>,
    pub url: Option<String>,
    pub sort_index: Option<i32>,
    pub parent_document_id: Option<i32>,
    pub updated_by: Option<String>,
}

fn default_sort_index() -> i32 {
    1
}
