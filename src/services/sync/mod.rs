pub mod error;
pub mod export_engine;
pub mod field_mapper;
pub mod import_engine;
pub mod normalize;
pub mod strategies;

pub use error::{ExportError, ImportError};
pub use export_engine::{ExportEngine, ExportOutcome};
pub use field_mapper::FieldMapper;
pub use import_engine::{
    rollback_run, sync_status, EntityImportResult, ImportEngine, PreviewReport, RollbackReport,
    SyncStatus,
};
pub use strategies::{strategy_for, EntityImportStrategy, ImportContext};
