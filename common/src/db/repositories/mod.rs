// Repository layer for database operations

pub mod widget_document;

pub use widget_document::WidgetDocumentRepository;
