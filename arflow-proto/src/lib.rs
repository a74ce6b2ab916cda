//! Wire types for the ARFlow ingestion service.
//!
//! The `arflow.v1` protobuf package is compiled by `tonic-build` at build
//! time; this crate re-exports the generated types together with a few
//! helpers that the server needs in every save path.

pub mod v1 {
    tonic::include_proto!("arflow.v1");
}

use v1::ar_frame;

/// The eight frame families carried by [`v1::ArFrame`]'s tagged payload.
///
/// The discriminant names double as entity-path segments in the recording,
/// so they must stay in sync with the `oneof` field names on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameFamily {
    Transform,
    Color,
    Depth,
    Gyroscope,
    Audio,
    PlaneDetection,
    PointCloudDetection,
    MeshDetection,
}

impl FrameFamily {
    pub const ALL: [FrameFamily; 8] = [
        FrameFamily::Transform,
        FrameFamily::Color,
        FrameFamily::Depth,
        FrameFamily::Gyroscope,
        FrameFamily::Audio,
        FrameFamily::PlaneDetection,
        FrameFamily::PointCloudDetection,
        FrameFamily::MeshDetection,
    ];

    /// Entity-path segment used when recording this family.
    pub fn segment(self) -> &'static str {
        match self {
            FrameFamily::Transform => "transform_frame",
            FrameFamily::Color => "color_frame",
            FrameFamily::Depth => "depth_frame",
            FrameFamily::Gyroscope => "gyroscope_frame",
            FrameFamily::Audio => "audio_frame",
            FrameFamily::PlaneDetection => "plane_detection_frame",
            FrameFamily::PointCloudDetection => "point_cloud_detection_frame",
            FrameFamily::MeshDetection => "mesh_detection_frame",
        }
    }
}

impl std::fmt::Display for FrameFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.segment())
    }
}

impl ar_frame::Data {
    pub fn family(&self) -> FrameFamily {
        match self {
            ar_frame::Data::TransformFrame(_) => FrameFamily::Transform,
            ar_frame::Data::ColorFrame(_) => FrameFamily::Color,
            ar_frame::Data::DepthFrame(_) => FrameFamily::Depth,
            ar_frame::Data::GyroscopeFrame(_) => FrameFamily::Gyroscope,
            ar_frame::Data::AudioFrame(_) => FrameFamily::Audio,
            ar_frame::Data::PlaneDetectionFrame(_) => FrameFamily::PlaneDetection,
            ar_frame::Data::PointCloudDetectionFrame(_) => FrameFamily::PointCloudDetection,
            ar_frame::Data::MeshDetectionFrame(_) => FrameFamily::MeshDetection,
        }
    }
}

/// Seconds on the device clock; `0.0` when the frame carried no timestamp.
pub fn device_time_secs(ts: Option<&prost_types::Timestamp>) -> f64 {
    ts.map(|t| t.seconds as f64 + f64::from(t.nanos) / 1e9)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_time_combines_seconds_and_nanos() {
        let ts = prost_types::Timestamp {
            seconds: 3,
            nanos: 500_000_000,
        };
        assert_eq!(device_time_secs(Some(&ts)), 3.5);
        assert_eq!(device_time_secs(None), 0.0);
    }

    #[test]
    fn family_segments_match_oneof_field_names() {
        let frame = ar_frame::Data::TransformFrame(v1::TransformFrame::default());
        assert_eq!(frame.family().segment(), "transform_frame");
        assert_eq!(FrameFamily::ALL.len(), 8);
    }
}
