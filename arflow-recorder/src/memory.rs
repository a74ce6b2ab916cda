//! In-memory recorder.
//!
//! Records every adapter call into an inspectable store. This is what the
//! test suites run against, and doubles as a buffered backend when no viewer
//! or file sink is wanted.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::column::check_lengths;
use crate::{
    ComponentColumn, Primitive, Recorder, RecorderError, RecorderStream, StaticProperty,
    TimeColumn, Timeline,
};

/// One recorded adapter call.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamCall {
    Static {
        entity_path: String,
        prop: StaticProperty,
    },
    Columns {
        entity_path: String,
        times: Vec<TimeColumn>,
        components: Vec<ComponentColumn>,
    },
    SetTime {
        timeline: Timeline,
        seconds: f64,
    },
    Log {
        entity_path: String,
        primitive: Primitive,
    },
}

#[derive(Default)]
pub struct MemoryStream {
    session_id: String,
    calls: Mutex<Vec<StreamCall>>,
    file: Mutex<Option<PathBuf>>,
    disconnected: AtomicBool,
}

impl MemoryStream {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn calls(&self) -> Vec<StreamCall> {
        self.calls.lock().clone()
    }

    /// Calls targeting `entity_path`, in emission order.
    pub fn calls_for(&self, entity_path: &str) -> Vec<StreamCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| match c {
                StreamCall::Static { entity_path: p, .. }
                | StreamCall::Columns { entity_path: p, .. }
                | StreamCall::Log { entity_path: p, .. } => p == entity_path,
                StreamCall::SetTime { .. } => false,
            })
            .cloned()
            .collect()
    }

    pub fn file_path(&self) -> Option<PathBuf> {
        self.file.lock().clone()
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

impl RecorderStream for Arc<MemoryStream> {
    fn direct_to_file(&self, path: &std::path::Path) -> Result<(), RecorderError> {
        *self.file.lock() = Some(path.to_owned());
        Ok(())
    }

    fn log_static(&self, entity_path: &str, prop: StaticProperty) -> Result<(), RecorderError> {
        self.calls.lock().push(StreamCall::Static {
            entity_path: entity_path.to_owned(),
            prop,
        });
        Ok(())
    }

    fn send_columns(
        &self,
        entity_path: &str,
        times: Vec<TimeColumn>,
        components: Vec<ComponentColumn>,
    ) -> Result<(), RecorderError> {
        check_lengths(entity_path, &times, &components)?;
        self.calls.lock().push(StreamCall::Columns {
            entity_path: entity_path.to_owned(),
            times,
            components,
        });
        Ok(())
    }

    fn set_time(&self, timeline: Timeline, seconds: f64) {
        self.calls.lock().push(StreamCall::SetTime { timeline, seconds });
    }

    fn log(&self, entity_path: &str, primitive: Primitive) -> Result<(), RecorderError> {
        self.calls.lock().push(StreamCall::Log {
            entity_path: entity_path.to_owned(),
            primitive,
        });
        Ok(())
    }

    fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }
}

/// Recorder handing out [`MemoryStream`]s, retrievable afterwards by session
/// id for inspection.
#[derive(Default)]
pub struct MemoryRecorder {
    streams: Mutex<HashMap<String, Arc<MemoryStream>>>,
    global_disconnected: AtomicBool,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream(&self, session_id: &str) -> Option<Arc<MemoryStream>> {
        self.streams.lock().get(session_id).cloned()
    }

    pub fn stream_count(&self) -> usize {
        self.streams.lock().len()
    }

    pub fn is_disconnected(&self) -> bool {
        self.global_disconnected.load(Ordering::SeqCst)
    }
}

impl Recorder for MemoryRecorder {
    fn new_stream(&self, session_id: &str) -> Result<Box<dyn RecorderStream>, RecorderError> {
        let stream = Arc::new(MemoryStream {
            session_id: session_id.to_owned(),
            ..Default::default()
        });
        self.streams
            .lock()
            .insert(session_id.to_owned(), Arc::clone(&stream));
        Ok(Box::new(stream))
    }

    fn disconnect_all(&self) {
        self.global_disconnected.store(true, Ordering::SeqCst);
    }
}
