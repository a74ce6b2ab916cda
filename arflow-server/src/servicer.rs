//! The gRPC service implementation.
//!
//! One servicer instance serves every RPC. It validates the operating mode
//! at construction, routes save-frame requests through the session
//! registry, and invokes the user hooks after each successful recorder
//! write.

use std::path::PathBuf;
use std::sync::Arc;

use tonic::{Request, Response, Status};

use arflow_proto::v1::ar_flow_service_server::ArFlowService;
use arflow_proto::v1::ar_frame::Data;
use arflow_proto::v1::{
    ArFrame, AudioFrame, ColorFrame, CreateSessionRequest, CreateSessionResponse,
    DeleteSessionRequest, DeleteSessionResponse, DepthFrame, Device, GetSessionRequest,
    GetSessionResponse, GyroscopeFrame, JoinSessionRequest, JoinSessionResponse,
    LeaveSessionRequest, LeaveSessionResponse, ListSessionsRequest, ListSessionsResponse,
    MeshDetectionFrame, PlaneDetectionFrame, PointCloudDetectionFrame, SaveArFramesRequest,
    SaveArFramesResponse, SaveSynchronizedArFrameRequest, SaveSynchronizedArFrameResponse,
    SessionUuid, TransformFrame,
};
use arflow_recorder::Recorder;

use crate::error::SessionError;
use crate::hooks::{NoopHooks, SessionHooks};
use crate::registry::SessionRegistry;
use crate::session_stream::SessionStream;

#[derive(Clone)]
pub struct ArFlowServicer {
    inner: Arc<Inner>,
}

struct Inner {
    registry: SessionRegistry,
    hooks: Box<dyn SessionHooks>,
}

impl ArFlowServicer {
    /// Exactly one of the two operating modes must be selected: spawn the
    /// viewer (live) or save to a directory (archival).
    pub fn new(
        recorder: Arc<dyn Recorder>,
        spawn_viewer: bool,
        save_dir: Option<PathBuf>,
    ) -> Result<Self, SessionError> {
        Self::with_hooks(recorder, spawn_viewer, save_dir, NoopHooks)
    }

    pub fn with_hooks(
        recorder: Arc<dyn Recorder>,
        spawn_viewer: bool,
        save_dir: Option<PathBuf>,
        hooks: impl SessionHooks + 'static,
    ) -> Result<Self, SessionError> {
        if spawn_viewer == save_dir.is_some() {
            return Err(SessionError::ModeConflict);
        }
        Ok(Self {
            inner: Arc::new(Inner {
                registry: SessionRegistry::new(recorder, save_dir),
                hooks: Box::new(hooks),
            }),
        })
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    /// Disconnect every session stream and the recorder's global state.
    /// Called once after the serve loop drains.
    pub fn on_program_exit(&self) {
        tracing::debug!("closing all session streams");
        self.inner.registry.shutdown();
    }

    fn hooks(&self) -> &dyn SessionHooks {
        self.inner.hooks.as_ref()
    }

    fn save_transforms(
        &self,
        stream: &SessionStream,
        frames: &[TransformFrame],
        device: &Device,
    ) -> Result<(), SessionError> {
        stream.save_transform_frames(frames, device)?;
        self.hooks()
            .on_save_transform_frames(frames, stream, device)
            .map_err(SessionError::Hook)
    }

    fn save_colors(
        &self,
        stream: &SessionStream,
        frames: &[ColorFrame],
        device: &Device,
    ) -> Result<(), SessionError> {
        stream.save_color_frames(frames, device)?;
        self.hooks()
            .on_save_color_frames(frames, stream, device)
            .map_err(SessionError::Hook)
    }

    fn save_depths(
        &self,
        stream: &SessionStream,
        frames: &[DepthFrame],
        device: &Device,
    ) -> Result<(), SessionError> {
        stream.save_depth_frames(frames, device)?;
        self.hooks()
            .on_save_depth_frames(frames, stream, device)
            .map_err(SessionError::Hook)
    }

    fn save_gyroscopes(
        &self,
        stream: &SessionStream,
        frames: &[GyroscopeFrame],
        device: &Device,
    ) -> Result<(), SessionError> {
        stream.save_gyroscope_frames(frames, device)?;
        self.hooks()
            .on_save_gyroscope_frames(frames, stream, device)
            .map_err(SessionError::Hook)
    }

    fn save_audio(
        &self,
        stream: &SessionStream,
        frames: &[AudioFrame],
        device: &Device,
    ) -> Result<(), SessionError> {
        stream.save_audio_frames(frames, device)?;
        self.hooks()
            .on_save_audio_frames(frames, stream, device)
            .map_err(SessionError::Hook)
    }

    fn save_planes(
        &self,
        stream: &SessionStream,
        frames: &[PlaneDetectionFrame],
        device: &Device,
    ) -> Result<(), SessionError> {
        stream.save_plane_detection_frames(frames, device)?;
        self.hooks()
            .on_save_plane_detection_frames(frames, stream, device)
            .map_err(SessionError::Hook)
    }

    fn save_point_clouds(
        &self,
        stream: &SessionStream,
        frames: &[PointCloudDetectionFrame],
        device: &Device,
    ) -> Result<(), SessionError> {
        stream.save_point_cloud_detection_frames(frames, device)?;
        self.hooks()
            .on_save_point_cloud_detection_frames(frames, stream, device)
            .map_err(SessionError::Hook)
    }

    fn save_meshes(
        &self,
        stream: &SessionStream,
        frames: &[MeshDetectionFrame],
        device: &Device,
    ) -> Result<(), SessionError> {
        stream.save_mesh_detection_frames(frames, device)?;
        self.hooks()
            .on_save_mesh_detection_frames(frames, stream, device)
            .map_err(SessionError::Hook)
    }
}

fn session_id(id: Option<&SessionUuid>) -> String {
    id.map(|s| s.value.clone()).unwrap_or_default()
}

/// The eight frame lists of one request, partitioned by payload tag.
#[derive(Default)]
struct Partitioned {
    transforms: Vec<TransformFrame>,
    colors: Vec<ColorFrame>,
    depths: Vec<DepthFrame>,
    gyroscopes: Vec<GyroscopeFrame>,
    audio: Vec<AudioFrame>,
    planes: Vec<PlaneDetectionFrame>,
    point_clouds: Vec<PointCloudDetectionFrame>,
    meshes: Vec<MeshDetectionFrame>,
}

fn partition(frames: &[ArFrame]) -> Partitioned {
    let mut out = Partitioned::default();
    for frame in frames {
        match &frame.data {
            Some(Data::TransformFrame(f)) => out.transforms.push(f.clone()),
            Some(Data::ColorFrame(f)) => out.colors.push(f.clone()),
            Some(Data::DepthFrame(f)) => out.depths.push(f.clone()),
            Some(Data::GyroscopeFrame(f)) => out.gyroscopes.push(f.clone()),
            Some(Data::AudioFrame(f)) => out.audio.push(f.clone()),
            Some(Data::PlaneDetectionFrame(f)) => out.planes.push(f.clone()),
            Some(Data::PointCloudDetectionFrame(f)) => out.point_clouds.push(f.clone()),
            Some(Data::MeshDetectionFrame(f)) => out.meshes.push(f.clone()),
            None => tracing::warn!("skipping frame with unknown payload tag"),
        }
    }
    out
}

#[tonic::async_trait]
impl ArFlowService for ArFlowServicer {
    async fn create_session(
        &self,
        request: Request<CreateSessionRequest>,
    ) -> Result<Response<CreateSessionResponse>, Status> {
        let req = request.into_inner();
        let device = req.device.unwrap_or_default();
        let stream = self
            .inner
            .registry
            .create(req.session_metadata.unwrap_or_default(), device.clone())?;
        self.hooks()
            .on_create_session(&stream, &device)
            .map_err(SessionError::Hook)?;
        Ok(Response::new(CreateSessionResponse {
            session: Some(stream.session()),
        }))
    }

    async fn delete_session(
        &self,
        request: Request<DeleteSessionRequest>,
    ) -> Result<Response<DeleteSessionResponse>, Status> {
        let req = request.into_inner();
        let stream = self
            .inner
            .registry
            .delete(&session_id(req.session_id.as_ref()))?;
        self.hooks()
            .on_delete_session(&stream)
            .map_err(SessionError::Hook)?;
        Ok(Response::new(DeleteSessionResponse {}))
    }

    async fn get_session(
        &self,
        request: Request<GetSessionRequest>,
    ) -> Result<Response<GetSessionResponse>, Status> {
        let req = request.into_inner();
        let stream = self
            .inner
            .registry
            .get(&session_id(req.session_id.as_ref()))?;
        tracing::info!("retrieved session {}", stream.session_id());
        Ok(Response::new(GetSessionResponse {
            session: Some(stream.session()),
        }))
    }

    async fn list_sessions(
        &self,
        _request: Request<ListSessionsRequest>,
    ) -> Result<Response<ListSessionsResponse>, Status> {
        let sessions = self.inner.registry.list();
        tracing::info!("listed {} current sessions", sessions.len());
        Ok(Response::new(ListSessionsResponse { sessions }))
    }

    async fn join_session(
        &self,
        request: Request<JoinSessionRequest>,
    ) -> Result<Response<JoinSessionResponse>, Status> {
        let req = request.into_inner();
        let device = req.device.unwrap_or_default();
        let stream = self
            .inner
            .registry
            .join(&session_id(req.session_id.as_ref()), &device)?;
        self.hooks()
            .on_join_session(&stream, &device)
            .map_err(SessionError::Hook)?;
        Ok(Response::new(JoinSessionResponse {
            session: Some(stream.session()),
        }))
    }

    async fn leave_session(
        &self,
        request: Request<LeaveSessionRequest>,
    ) -> Result<Response<LeaveSessionResponse>, Status> {
        let req = request.into_inner();
        let device = req.device.unwrap_or_default();
        let stream = self
            .inner
            .registry
            .leave(&session_id(req.session_id.as_ref()), &device)?;
        self.hooks()
            .on_leave_session(&stream, &device)
            .map_err(SessionError::Hook)?;
        Ok(Response::new(LeaveSessionResponse {}))
    }

    async fn save_ar_frames(
        &self,
        request: Request<SaveArFramesRequest>,
    ) -> Result<Response<SaveArFramesResponse>, Status> {
        let req = request.into_inner();
        if req.frames.is_empty() {
            return Err(SessionError::EmptyFrameBatch.into());
        }
        let id = session_id(req.session_id.as_ref());
        let stream = self.inner.registry.get(&id)?;
        let device = req.device.unwrap_or_default();
        if !stream.contains_device(&device) {
            return Err(SessionError::NotAMember.into());
        }

        let parts = partition(&req.frames);
        if !parts.transforms.is_empty() {
            self.save_transforms(&stream, &parts.transforms, &device)?;
        }
        if !parts.colors.is_empty() {
            self.save_colors(&stream, &parts.colors, &device)?;
        }
        if !parts.depths.is_empty() {
            self.save_depths(&stream, &parts.depths, &device)?;
        }
        if !parts.gyroscopes.is_empty() {
            self.save_gyroscopes(&stream, &parts.gyroscopes, &device)?;
        }
        if !parts.audio.is_empty() {
            self.save_audio(&stream, &parts.audio, &device)?;
        }
        if !parts.planes.is_empty() {
            self.save_planes(&stream, &parts.planes, &device)?;
        }
        if !parts.point_clouds.is_empty() {
            self.save_point_clouds(&stream, &parts.point_clouds, &device)?;
        }
        if !parts.meshes.is_empty() {
            self.save_meshes(&stream, &parts.meshes, &device)?;
        }

        tracing::debug!("saved AR frames of device {} to session {id}", device.uid);
        self.hooks()
            .on_save_ar_frames(&req.frames, &stream, &device)
            .map_err(SessionError::Hook)?;
        Ok(Response::new(SaveArFramesResponse {}))
    }

    async fn save_synchronized_ar_frame(
        &self,
        request: Request<SaveSynchronizedArFrameRequest>,
    ) -> Result<Response<SaveSynchronizedArFrameResponse>, Status> {
        let req = request.into_inner();
        let id = session_id(req.session_id.as_ref());
        let stream = self.inner.registry.get(&id)?;
        let device = req.device.unwrap_or_default();
        if !stream.contains_device(&device) {
            return Err(SessionError::NotAMember.into());
        }

        let frame = req.frame.unwrap_or_default();
        if let Some(f) = frame.transform_frame {
            self.save_transforms(&stream, &[f], &device)?;
        }
        if let Some(f) = frame.depth_frame {
            self.save_depths(&stream, &[f], &device)?;
        }
        if let Some(f) = frame.color_frame {
            self.save_colors(&stream, &[f], &device)?;
        }
        if let Some(f) = frame.gyroscope_frame {
            self.save_gyroscopes(&stream, &[f], &device)?;
        }
        if let Some(f) = frame.audio_frame {
            self.save_audio(&stream, &[f], &device)?;
        }
        if let Some(f) = frame.plane_detection_frame {
            self.save_planes(&stream, &[f], &device)?;
        }
        if let Some(f) = frame.point_cloud_detection_frame {
            self.save_point_clouds(&stream, &[f], &device)?;
        }
        if let Some(f) = frame.mesh_detection_frame {
            self.save_meshes(&stream, &[f], &device)?;
        }

        tracing::info!(
            "saved synchronized AR frame of device {} to session {id}",
            device.uid
        );
        Ok(Response::new(SaveSynchronizedArFrameResponse {}))
    }
}
