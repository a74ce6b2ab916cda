//! Recorder capability layer.
//!
//! The ingestion engine only ever talks to the recording backend through the
//! [`Recorder`] / [`RecorderStream`] traits defined here: create a stream per
//! session, optionally direct it to a file, emit static properties and
//! columnar batches along named timelines, and disconnect. The production
//! backend is rerun ([`RerunRecorder`]); [`MemoryRecorder`] keeps every call
//! in memory and backs the test suites.
//!
//! Streams returned by a recorder are independent of each other; callers are
//! responsible for serializing writes to a single stream.

mod column;
mod memory;
mod rerun;

pub use column::{
    ComponentColumn, DepthDatatype, MeshGeometry, PixelLayout, Primitive, StaticProperty,
    TimeColumn, Timeline,
};
pub use memory::{MemoryRecorder, MemoryStream, StreamCall};
pub use rerun::RerunRecorder;

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error(
        "column length mismatch on `{entity_path}`: {times} time rows, \
         component with {rows} rows"
    )]
    ColumnLengthMismatch {
        entity_path: String,
        times: usize,
        rows: usize,
    },
    #[error("recorder sink error: {0}")]
    Sink(String),
}

/// Factory for per-session recording streams.
pub trait Recorder: Send + Sync {
    /// Open a fresh stream keyed by `session_id`, independent of any other
    /// stream and of the global recording.
    fn new_stream(&self, session_id: &str) -> Result<Box<dyn RecorderStream>, RecorderError>;

    /// Flush and release whatever global state the backend holds. Streams
    /// handed out by [`Recorder::new_stream`] are not affected.
    fn disconnect_all(&self);
}

/// One session's recording stream.
pub trait RecorderStream: Send + Sync {
    /// All subsequent writes are additionally persisted to `path`.
    fn direct_to_file(&self, path: &std::path::Path) -> Result<(), RecorderError>;

    /// Log a time-independent property of `entity_path`.
    fn log_static(&self, entity_path: &str, prop: StaticProperty) -> Result<(), RecorderError>;

    /// Bulk-append component columns along one or more time columns. Every
    /// component must carry exactly as many rows as each time column.
    fn send_columns(
        &self,
        entity_path: &str,
        times: Vec<TimeColumn>,
        components: Vec<ComponentColumn>,
    ) -> Result<(), RecorderError>;

    /// Move the time cursor used by subsequent [`RecorderStream::log`] calls.
    fn set_time(&self, timeline: Timeline, seconds: f64);

    /// Single write at the current time cursor.
    fn log(&self, entity_path: &str, primitive: Primitive) -> Result<(), RecorderError>;

    /// Flush and release the stream.
    fn disconnect(&self);
}
