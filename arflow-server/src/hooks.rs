//! User hooks.
//!
//! Every lifecycle transition and every save pathway exposes a hook, called
//! synchronously after the recorder write succeeds. Implementations get the
//! session's stream so they can run their own post-processing; a hook error
//! is reported as `Internal` to the caller and never unwinds the server.

use arflow_proto::v1::{
    ArFrame, AudioFrame, ColorFrame, DepthFrame, Device, GyroscopeFrame, MeshDetectionFrame,
    PlaneDetectionFrame, PointCloudDetectionFrame, TransformFrame,
};

use crate::session_stream::SessionStream;

#[allow(unused_variables)]
pub trait SessionHooks: Send + Sync {
    fn on_create_session(&self, stream: &SessionStream, device: &Device) -> eyre::Result<()> {
        Ok(())
    }

    fn on_delete_session(&self, stream: &SessionStream) -> eyre::Result<()> {
        Ok(())
    }

    fn on_join_session(&self, stream: &SessionStream, device: &Device) -> eyre::Result<()> {
        Ok(())
    }

    fn on_leave_session(&self, stream: &SessionStream, device: &Device) -> eyre::Result<()> {
        Ok(())
    }

    /// Called once per save RPC with the full, unpartitioned frame list.
    fn on_save_ar_frames(
        &self,
        frames: &[ArFrame],
        stream: &SessionStream,
        device: &Device,
    ) -> eyre::Result<()> {
        Ok(())
    }

    fn on_save_transform_frames(
        &self,
        frames: &[TransformFrame],
        stream: &SessionStream,
        device: &Device,
    ) -> eyre::Result<()> {
        Ok(())
    }

    fn on_save_color_frames(
        &self,
        frames: &[ColorFrame],
        stream: &SessionStream,
        device: &Device,
    ) -> eyre::Result<()> {
        Ok(())
    }

    fn on_save_depth_frames(
        &self,
        frames: &[DepthFrame],
        stream: &SessionStream,
        device: &Device,
    ) -> eyre::Result<()> {
        Ok(())
    }

    fn on_save_gyroscope_frames(
        &self,
        frames: &[GyroscopeFrame],
        stream: &SessionStream,
        device: &Device,
    ) -> eyre::Result<()> {
        Ok(())
    }

    fn on_save_audio_frames(
        &self,
        frames: &[AudioFrame],
        stream: &SessionStream,
        device: &Device,
    ) -> eyre::Result<()> {
        Ok(())
    }

    fn on_save_plane_detection_frames(
        &self,
        frames: &[PlaneDetectionFrame],
        stream: &SessionStream,
        device: &Device,
    ) -> eyre::Result<()> {
        Ok(())
    }

    fn on_save_point_cloud_detection_frames(
        &self,
        frames: &[PointCloudDetectionFrame],
        stream: &SessionStream,
        device: &Device,
    ) -> eyre::Result<()> {
        Ok(())
    }

    fn on_save_mesh_detection_frames(
        &self,
        frames: &[MeshDetectionFrame],
        stream: &SessionStream,
        device: &Device,
    ) -> eyre::Result<()> {
        Ok(())
    }
}

/// The default: every hook is a no-op.
pub struct NoopHooks;

impl SessionHooks for NoopHooks {}

impl<T: SessionHooks + ?Sized> SessionHooks for std::sync::Arc<T> {
    fn on_create_session(&self, stream: &SessionStream, device: &Device) -> eyre::Result<()> {
        (**self).on_create_session(stream, device)
    }

    fn on_delete_session(&self, stream: &SessionStream) -> eyre::Result<()> {
        (**self).on_delete_session(stream)
    }

    fn on_join_session(&self, stream: &SessionStream, device: &Device) -> eyre::Result<()> {
        (**self).on_join_session(stream, device)
    }

    fn on_leave_session(&self, stream: &SessionStream, device: &Device) -> eyre::Result<()> {
        (**self).on_leave_session(stream, device)
    }

    fn on_save_ar_frames(
        &self,
        frames: &[ArFrame],
        stream: &SessionStream,
        device: &Device,
    ) -> eyre::Result<()> {
        (**self).on_save_ar_frames(frames, stream, device)
    }

    fn on_save_transform_frames(
        &self,
        frames: &[TransformFrame],
        stream: &SessionStream,
        device: &Device,
    ) -> eyre::Result<()> {
        (**self).on_save_transform_frames(frames, stream, device)
    }

    fn on_save_color_frames(
        &self,
        frames: &[ColorFrame],
        stream: &SessionStream,
        device: &Device,
    ) -> eyre::Result<()> {
        (**self).on_save_color_frames(frames, stream, device)
    }

    fn on_save_depth_frames(
        &self,
        frames: &[DepthFrame],
        stream: &SessionStream,
        device: &Device,
    ) -> eyre::Result<()> {
        (**self).on_save_depth_frames(frames, stream, device)
    }

    fn on_save_gyroscope_frames(
        &self,
        frames: &[GyroscopeFrame],
        stream: &SessionStream,
        device: &Device,
    ) -> eyre::Result<()> {
        (**self).on_save_gyroscope_frames(frames, stream, device)
    }

    fn on_save_audio_frames(
        &self,
        frames: &[AudioFrame],
        stream: &SessionStream,
        device: &Device,
    ) -> eyre::Result<()> {
        (**self).on_save_audio_frames(frames, stream, device)
    }

    fn on_save_plane_detection_frames(
        &self,
        frames: &[PlaneDetectionFrame],
        stream: &SessionStream,
        device: &Device,
    ) -> eyre::Result<()> {
        (**self).on_save_plane_detection_frames(frames, stream, device)
    }

    fn on_save_point_cloud_detection_frames(
        &self,
        frames: &[PointCloudDetectionFrame],
        stream: &SessionStream,
        device: &Device,
    ) -> eyre::Result<()> {
        (**self).on_save_point_cloud_detection_frames(frames, stream, device)
    }

    fn on_save_mesh_detection_frames(
        &self,
        frames: &[MeshDetectionFrame],
        stream: &SessionStream,
        device: &Device,
    ) -> eyre::Result<()> {
        (**self).on_save_mesh_detection_frames(frames, stream, device)
    }
}
