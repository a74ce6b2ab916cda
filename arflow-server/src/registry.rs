//! Process-wide session registry.
//!
//! The registry exclusively owns every [`SessionStream`]. Handlers acquire a
//! handle under the registry lock and release the lock before issuing
//! recorder writes; the per-stream mutex serializes concurrent writers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use arflow_proto::v1::{Device, Session, SessionMetadata, SessionUuid};
use arflow_recorder::Recorder;

use crate::error::SessionError;
use crate::session_stream::SessionStream;

pub struct SessionRegistry {
    recorder: Arc<dyn Recorder>,
    save_dir: Option<PathBuf>,
    sessions: RwLock<HashMap<String, Arc<SessionStream>>>,
}

impl SessionRegistry {
    pub fn new(recorder: Arc<dyn Recorder>, save_dir: Option<PathBuf>) -> Self {
        Self {
            recorder,
            save_dir,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Mint a new session with `device` as its first participant, backed by
    /// a fresh recorder stream. In archival mode the stream is directed to
    /// `<save_dir>/<session_id>.rrd`, unless the metadata overrides the
    /// path.
    pub fn create(
        &self,
        metadata: SessionMetadata,
        device: Device,
    ) -> Result<Arc<SessionStream>, SessionError> {
        let session_id = Uuid::new_v4().to_string();
        let stream = self.recorder.new_stream(&session_id)?;

        if let Some(dir) = &self.save_dir {
            let save_path = if metadata.save_path.is_empty() {
                dir.join(format!("{session_id}.rrd"))
            } else {
                PathBuf::from(&metadata.save_path)
            };
            stream.direct_to_file(&save_path)?;
            tracing::info!("session data path: {}", save_path.display());
        }

        let session = Session {
            id: Some(SessionUuid {
                value: session_id.clone(),
            }),
            metadata: Some(metadata),
            devices: vec![device],
        };
        let stream = Arc::new(SessionStream::new(session, stream));
        self.sessions
            .write()
            .insert(session_id.clone(), Arc::clone(&stream));
        tracing::info!("created new session {session_id}");
        Ok(stream)
    }

    pub fn get(&self, session_id: &str) -> Result<Arc<SessionStream>, SessionError> {
        self.sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::SessionNotFound(session_id.to_owned()))
    }

    /// Snapshot of every live session descriptor.
    pub fn list(&self) -> Vec<Session> {
        let streams: Vec<Arc<SessionStream>> = self.sessions.read().values().cloned().collect();
        streams.iter().map(|s| s.session()).collect()
    }

    /// Pop the session and disconnect its stream before returning.
    pub fn delete(&self, session_id: &str) -> Result<Arc<SessionStream>, SessionError> {
        let stream = self
            .sessions
            .write()
            .remove(session_id)
            .ok_or_else(|| SessionError::SessionNotFound(session_id.to_owned()))?;
        stream.disconnect();
        tracing::info!("deleted session {session_id}");
        Ok(stream)
    }

    pub fn join(
        &self,
        session_id: &str,
        device: &Device,
    ) -> Result<Arc<SessionStream>, SessionError> {
        let stream = self.get(session_id)?;
        stream.add_device(device)?;
        tracing::info!("device {} joined session {session_id}", device.uid);
        Ok(stream)
    }

    pub fn leave(
        &self,
        session_id: &str,
        device: &Device,
    ) -> Result<Arc<SessionStream>, SessionError> {
        let stream = self.get(session_id)?;
        stream.remove_device(device)?;
        tracing::info!("device {} left session {session_id}", device.uid);
        Ok(stream)
    }

    /// Disconnect every live stream, then release the recorder's global
    /// state. Called once, on server drain.
    pub fn shutdown(&self) {
        let streams: Vec<(String, Arc<SessionStream>)> =
            self.sessions.write().drain().collect();
        for (session_id, stream) in streams {
            stream.disconnect();
            tracing::debug!("disconnected session {session_id}");
        }
        self.recorder.disconnect_all();
        tracing::debug!("all session streams disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arflow_recorder::MemoryRecorder;

    fn device(uid: &str) -> Device {
        Device {
            model: "m".into(),
            name: "n".into(),
            r#type: 1,
            uid: uid.into(),
        }
    }

    fn registry() -> (Arc<MemoryRecorder>, SessionRegistry) {
        let recorder = Arc::new(MemoryRecorder::new());
        let registry = SessionRegistry::new(Arc::clone(&recorder), None);
        (recorder, registry)
    }

    #[test]
    fn create_then_get_then_delete() {
        let (_, registry) = registry();
        let stream = registry
            .create(SessionMetadata::default(), device("a"))
            .unwrap();
        let id = stream.session_id();
        assert_eq!(id.len(), 36);

        assert_eq!(registry.get(&id).unwrap().session_id(), id);
        assert_eq!(registry.list().len(), 1);

        registry.delete(&id).unwrap();
        assert!(matches!(
            registry.get(&id),
            Err(SessionError::SessionNotFound(_))
        ));
        assert!(matches!(
            registry.delete(&id),
            Err(SessionError::SessionNotFound(_))
        ));
    }

    #[test]
    fn delete_disconnects_the_stream_before_returning() {
        let (recorder, registry) = registry();
        let stream = registry
            .create(SessionMetadata::default(), device("a"))
            .unwrap();
        let id = stream.session_id();
        assert!(!recorder.stream(&id).unwrap().is_disconnected());
        registry.delete(&id).unwrap();
        assert!(recorder.stream(&id).unwrap().is_disconnected());
    }

    #[test]
    fn join_rejects_duplicates_and_leave_restores() {
        let (_, registry) = registry();
        let stream = registry
            .create(SessionMetadata::default(), device("a"))
            .unwrap();
        let id = stream.session_id();

        registry.join(&id, &device("b")).unwrap();
        assert!(matches!(
            registry.join(&id, &device("b")),
            Err(SessionError::DeviceAlreadyInSession)
        ));
        assert_eq!(registry.get(&id).unwrap().session().devices.len(), 2);

        registry.leave(&id, &device("b")).unwrap();
        assert_eq!(
            registry.get(&id).unwrap().session().devices,
            vec![device("a")]
        );
        assert!(matches!(
            registry.leave(&id, &device("b")),
            Err(SessionError::DeviceNotInSession)
        ));
    }

    #[test]
    fn archival_mode_directs_to_save_dir() {
        let recorder = Arc::new(MemoryRecorder::new());
        let dir = tempfile::tempdir().unwrap();
        let registry =
            SessionRegistry::new(Arc::clone(&recorder), Some(dir.path().to_owned()));

        let stream = registry
            .create(SessionMetadata::default(), device("a"))
            .unwrap();
        let id = stream.session_id();
        assert_eq!(
            recorder.stream(&id).unwrap().file_path().unwrap(),
            dir.path().join(format!("{id}.rrd"))
        );

        let metadata = SessionMetadata {
            name: String::new(),
            save_path: "/tmp/custom.rrd".into(),
        };
        let stream = registry.create(metadata, device("a")).unwrap();
        let id = stream.session_id();
        assert_eq!(
            recorder.stream(&id).unwrap().file_path().unwrap(),
            PathBuf::from("/tmp/custom.rrd")
        );
    }

    #[test]
    fn shutdown_disconnects_everything() {
        let (recorder, registry) = registry();
        let a = registry
            .create(SessionMetadata::default(), device("a"))
            .unwrap()
            .session_id();
        let b = registry
            .create(SessionMetadata::default(), device("b"))
            .unwrap()
            .session_id();
        registry.shutdown();
        assert!(recorder.stream(&a).unwrap().is_disconnected());
        assert!(recorder.stream(&b).unwrap().is_disconnected());
        assert!(recorder.is_disconnected());
        assert!(registry.list().is_empty());
    }
}
