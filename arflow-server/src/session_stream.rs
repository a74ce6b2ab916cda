//! Per-session recording stream.
//!
//! All devices in a session share one stream. The stream owns the entity
//! path convention, the grouping of heterogeneous frame batches into
//! format-homogeneous sub-batches, and the emission of time-column records
//! along the `device_timestamp` / `image_timestamp` axes.
//!
//! A single mutex guards the session descriptor and the recorder handle for
//! the whole duration of a save operation, so column batches from
//! concurrent RPCs never interleave on the same entity path.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use arflow_proto::v1::ar_trackable::TrackingState;
use arflow_proto::v1::xr_cpu_image::Format;
use arflow_proto::v1::{
    mesh_detection_frame, plane_detection_frame, point_cloud_detection_frame, AudioFrame,
    ColorFrame, DepthFrame, Device, GyroscopeFrame, MeshDetectionFrame, PlaneDetectionFrame,
    PointCloudDetectionFrame, Session, TransformFrame, Vector3,
};
use arflow_proto::{device_time_secs, FrameFamily};
use arflow_recorder::{
    ComponentColumn, DepthDatatype, PixelLayout, Primitive, RecorderStream, StaticProperty,
    TimeColumn, Timeline,
};

use crate::error::SessionError;
use crate::{decode, paths};

const GREEN: [u8; 3] = [0, 255, 0];
const RED: [u8; 3] = [255, 0, 0];
const BLUE: [u8; 3] = [0, 0, 255];
const YELLOW: [u8; 3] = [255, 255, 0];

pub struct SessionStream {
    inner: Mutex<Inner>,
}

struct Inner {
    session: Session,
    stream: Box<dyn RecorderStream>,
}

impl SessionStream {
    pub(crate) fn new(session: Session, stream: Box<dyn RecorderStream>) -> Self {
        Self {
            inner: Mutex::new(Inner { session, stream }),
        }
    }

    /// Snapshot of the session descriptor.
    pub fn session(&self) -> Session {
        self.inner.lock().session.clone()
    }

    pub fn session_id(&self) -> String {
        self.inner
            .lock()
            .session
            .id
            .as_ref()
            .map(|id| id.value.clone())
            .unwrap_or_default()
    }

    pub fn contains_device(&self, device: &Device) -> bool {
        self.inner.lock().session.devices.contains(device)
    }

    pub(crate) fn add_device(&self, device: &Device) -> Result<Session, SessionError> {
        let mut inner = self.inner.lock();
        if inner.session.devices.contains(device) {
            return Err(SessionError::DeviceAlreadyInSession);
        }
        inner.session.devices.push(device.clone());
        Ok(inner.session.clone())
    }

    pub(crate) fn remove_device(&self, device: &Device) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        let pos = inner
            .session
            .devices
            .iter()
            .position(|d| d == device)
            .ok_or(SessionError::DeviceNotInSession)?;
        inner.session.devices.remove(pos);
        Ok(())
    }

    /// Flush and release the recorder stream. The registry calls this
    /// exactly once, when the session is deleted or the server drains.
    pub(crate) fn disconnect(&self) {
        self.inner.lock().stream.disconnect();
    }

    pub fn save_transform_frames(
        &self,
        frames: &[TransformFrame],
        device: &Device,
    ) -> Result<(), SessionError> {
        if frames.is_empty() {
            tracing::warn!("no transform frames to save");
            return Ok(());
        }
        let inner = self.inner.lock();
        let entity_path = paths::family_path(&inner.session, device, FrameFamily::Transform);

        let mut times = Vec::with_capacity(frames.len());
        let mut rotations = Vec::with_capacity(frames.len());
        let mut translations = Vec::with_capacity(frames.len());
        for frame in frames {
            let Some(pose) = decode::pose_from_wire(&frame.data) else {
                continue;
            };
            times.push(device_time_secs(frame.device_timestamp.as_ref()));
            rotations.push(decode::rotation_row_major(&pose));
            translations.push(decode::translation(&pose));
        }
        if times.is_empty() {
            return Ok(());
        }
        inner.stream.send_columns(
            &entity_path,
            vec![TimeColumn::new(Timeline::Device, times)],
            vec![
                ComponentColumn::TransformMat3x3(rotations),
                ComponentColumn::TransformTranslation(translations),
            ],
        )?;
        Ok(())
    }

    pub fn save_color_frames(
        &self,
        frames: &[ColorFrame],
        device: &Device,
    ) -> Result<(), SessionError> {
        if frames.is_empty() {
            tracing::warn!("no color frames to save");
            return Ok(());
        }
        let inner = self.inner.lock();
        let base = paths::family_path(&inner.session, device, FrameFamily::Color);

        // Group by (format, width, height) so every column batch is
        // format-homogeneous and can share one static image format.
        let mut groups: BTreeMap<(i32, i32, i32), Vec<&ColorFrame>> = BTreeMap::new();
        for frame in frames {
            let Some(image) = frame.image.as_ref() else {
                tracing::warn!("skipping color frame without image");
                continue;
            };
            let dims = image.dimensions.clone().unwrap_or_default();
            groups
                .entry((image.format, dims.x, dims.y))
                .or_default()
                .push(frame);
        }

        for ((format, width, height), group) in groups {
            let layout = match Format::try_from(format) {
                Ok(Format::AndroidYuv420888) => PixelLayout::YuvI420Limited,
                Ok(Format::IosNv12FullRange) => PixelLayout::Nv12,
                _ => {
                    tracing::warn!("unsupported color frame format: {format}");
                    continue;
                }
            };

            let mut device_times = Vec::with_capacity(group.len());
            let mut image_times = Vec::with_capacity(group.len());
            let mut projections = Vec::with_capacity(group.len());
            let mut buffers = Vec::with_capacity(group.len());
            for frame in &group {
                let Some(image) = frame.image.as_ref() else {
                    continue;
                };
                let buffer = match layout {
                    PixelLayout::YuvI420Limited => decode::i420_from_android_yuv(image),
                    PixelLayout::Nv12 => decode::nv12_buffer(image),
                };
                let Some(buffer) = buffer else {
                    continue;
                };
                let intrinsics = frame.intrinsics.clone().unwrap_or_default();
                let f = intrinsics.focal_length.unwrap_or_default();
                let c = intrinsics.principal_point.unwrap_or_default();
                projections.push([f.x, 0.0, c.x, 0.0, f.y, c.y, 0.0, 0.0, 1.0]);
                device_times.push(device_time_secs(frame.device_timestamp.as_ref()));
                image_times.push(image.timestamp);
                buffers.push(buffer);
            }
            if buffers.is_empty() {
                continue;
            }

            let entity_path = format!("{base}/{width}x{height}");
            inner.stream.log_static(
                &entity_path,
                StaticProperty::ColorImageFormat {
                    width: width.max(0) as u32,
                    height: height.max(0) as u32,
                    layout,
                },
            )?;

            let resolution = group[0]
                .intrinsics
                .as_ref()
                .and_then(|i| i.resolution.clone())
                .unwrap_or_default();
            let intrinsics_path =
                format!("{base}/{}x{}/intrinsics", resolution.x, resolution.y);
            inner.stream.send_columns(
                &intrinsics_path,
                vec![TimeColumn::new(Timeline::Device, device_times.clone())],
                vec![ComponentColumn::PinholeProjection(projections)],
            )?;

            inner.stream.send_columns(
                &entity_path,
                vec![
                    TimeColumn::new(Timeline::Device, device_times),
                    TimeColumn::new(Timeline::Image, image_times),
                ],
                vec![ComponentColumn::ColorImageBuffer(buffers)],
            )?;
        }
        Ok(())
    }

    pub fn save_depth_frames(
        &self,
        frames: &[DepthFrame],
        device: &Device,
    ) -> Result<(), SessionError> {
        if frames.is_empty() {
            tracing::warn!("no depth frames to save");
            return Ok(());
        }
        let inner = self.inner.lock();
        let base = paths::family_path(&inner.session, device, FrameFamily::Depth);

        let mut groups: BTreeMap<(i32, i32, i32, bool), Vec<&DepthFrame>> = BTreeMap::new();
        for frame in frames {
            let Some(image) = frame.image.as_ref() else {
                tracing::warn!("skipping depth frame without image");
                continue;
            };
            let dims = image.dimensions.clone().unwrap_or_default();
            groups
                .entry((
                    image.format,
                    dims.x,
                    dims.y,
                    frame.environment_depth_temporal_smoothing_enabled,
                ))
                .or_default()
                .push(frame);
        }

        for ((format, width, height, smoothed), group) in groups {
            let datatype = match Format::try_from(format) {
                Ok(Format::DepthFloat32) => DepthDatatype::F32,
                Ok(Format::DepthUint16) => DepthDatatype::U16,
                _ => {
                    tracing::warn!("unsupported depth frame format: {format}");
                    continue;
                }
            };

            let mut device_times = Vec::with_capacity(group.len());
            let mut image_times = Vec::with_capacity(group.len());
            let mut buffers = Vec::with_capacity(group.len());
            for frame in &group {
                let Some(image) = frame.image.as_ref() else {
                    continue;
                };
                let Some(plane) = decode::depth_plane(image, datatype) else {
                    continue;
                };
                device_times.push(device_time_secs(frame.device_timestamp.as_ref()));
                image_times.push(image.timestamp);
                buffers.push(plane.to_vec());
            }
            if buffers.is_empty() {
                continue;
            }

            let entity_path = format!(
                "{base}/{width}x{height}/{}",
                if smoothed { "smoothed" } else { "raw" }
            );
            inner.stream.log_static(
                &entity_path,
                StaticProperty::DepthImageFormat {
                    width: width.max(0) as u32,
                    height: height.max(0) as u32,
                    datatype,
                    meter: 1.0,
                },
            )?;
            inner.stream.send_columns(
                &entity_path,
                vec![
                    TimeColumn::new(Timeline::Device, device_times),
                    TimeColumn::new(Timeline::Image, image_times),
                ],
                vec![ComponentColumn::DepthImageBuffer(buffers)],
            )?;
        }
        Ok(())
    }

    pub fn save_gyroscope_frames(
        &self,
        frames: &[GyroscopeFrame],
        device: &Device,
    ) -> Result<(), SessionError> {
        if frames.is_empty() {
            tracing::warn!("no gyroscope frames to save");
            return Ok(());
        }
        let inner = self.inner.lock();
        let base = paths::family_path(&inner.session, device, FrameFamily::Gyroscope);
        let times: Vec<f64> = frames
            .iter()
            .map(|f| device_time_secs(f.device_timestamp.as_ref()))
            .collect();

        let attitude_path = format!("{base}/attitude");
        inner
            .stream
            .log_static(&attitude_path, StaticProperty::BoxHalfSize([0.5, 0.5, 0.5]))?;
        let quats = frames
            .iter()
            .map(|f| {
                let q = f.attitude.clone().unwrap_or_default();
                [q.x, q.y, q.z, q.w]
            })
            .collect();
        inner.stream.send_columns(
            &attitude_path,
            vec![TimeColumn::new(Timeline::Device, times.clone())],
            vec![ComponentColumn::BoxQuaternion(quats)],
        )?;

        type VectorField = fn(&GyroscopeFrame) -> Option<&Vector3>;
        let arrows: [(&str, [u8; 3], VectorField); 3] = [
            ("rotation_rate", GREEN, |f| f.rotation_rate.as_ref()),
            ("gravity", BLUE, |f| f.gravity.as_ref()),
            ("acceleration", YELLOW, |f| f.acceleration.as_ref()),
        ];
        for (segment, color, field) in arrows {
            let path = format!("{base}/{segment}");
            inner
                .stream
                .log_static(&path, StaticProperty::ArrowColor(color))?;
            let vectors = frames.iter().map(|f| vec3(field(f))).collect();
            inner.stream.send_columns(
                &path,
                vec![TimeColumn::new(Timeline::Device, times.clone())],
                vec![ComponentColumn::ArrowVector(vectors)],
            )?;
        }
        Ok(())
    }

    pub fn save_audio_frames(
        &self,
        frames: &[AudioFrame],
        device: &Device,
    ) -> Result<(), SessionError> {
        if frames.is_empty() {
            tracing::warn!("no audio frames to save");
            return Ok(());
        }
        let inner = self.inner.lock();
        let entity_path = paths::family_path(&inner.session, device, FrameFamily::Audio);

        let times: Vec<f64> = frames
            .iter()
            .map(|f| device_time_secs(f.device_timestamp.as_ref()))
            .collect();
        let frame_lengths: Vec<usize> = frames.iter().map(|f| f.data.len()).collect();
        let samples: Vec<f64> = frames
            .iter()
            .flat_map(|f| f.data.iter().map(|s| f64::from(*s)))
            .collect();

        inner.stream.send_columns(
            &entity_path,
            vec![TimeColumn::new(Timeline::Device, times)],
            vec![ComponentColumn::Scalars {
                samples,
                frame_lengths,
            }],
        )?;
        Ok(())
    }

    pub fn save_plane_detection_frames(
        &self,
        frames: &[PlaneDetectionFrame],
        device: &Device,
    ) -> Result<(), SessionError> {
        use plane_detection_frame::State;

        if frames.is_empty() {
            tracing::warn!("no plane detection frames to save");
            return Ok(());
        }
        let inner = self.inner.lock();
        let base = paths::family_path(&inner.session, device, FrameFamily::PlaneDetection);

        // A plane counts as positively changed when it appears, or when it
        // updates with a boundary worth drawing.
        let mut per_trackable: BTreeMap<(u64, u64), Vec<&PlaneDetectionFrame>> = BTreeMap::new();
        for frame in frames {
            let positive = matches!(frame.state(), State::Added)
                || (matches!(frame.state(), State::Updated)
                    && frame
                        .plane
                        .as_ref()
                        .is_some_and(|p| !p.boundary.is_empty()));
            if !positive {
                continue;
            }
            let Some(id) = frame
                .plane
                .as_ref()
                .and_then(|p| p.trackable.as_ref())
                .and_then(|t| t.trackable_id.as_ref())
            else {
                tracing::warn!("skipping plane frame without trackable id");
                continue;
            };
            per_trackable
                .entry((id.sub_id_1, id.sub_id_2))
                .or_default()
                .push(frame);
        }

        for ((sub_id_1, sub_id_2), rows) in per_trackable {
            let path = format!("{base}/{}", paths::trackable_part(sub_id_1, sub_id_2));
            let mut times = Vec::with_capacity(rows.len());
            let mut strips = Vec::with_capacity(rows.len());
            let mut colors = Vec::with_capacity(rows.len());
            let mut labels = Vec::with_capacity(rows.len());
            for frame in rows {
                let Some(plane) = frame.plane.as_ref() else {
                    continue;
                };
                let points = decode::boundary_3d(
                    &plane.boundary,
                    &plane.normal.clone().unwrap_or_default(),
                    &plane.center.clone().unwrap_or_default(),
                );
                if points.is_empty() {
                    continue;
                }
                let state = plane
                    .trackable
                    .as_ref()
                    .map(|t| t.tracking_state())
                    .unwrap_or(TrackingState::Unspecified);
                times.push(device_time_secs(frame.device_timestamp.as_ref()));
                strips.push(points);
                colors.push(if state == TrackingState::Tracking {
                    GREEN
                } else {
                    RED
                });
                labels.push(state.as_str_name().to_owned());
            }
            if times.is_empty() {
                continue;
            }
            inner.stream.send_columns(
                &path,
                vec![TimeColumn::new(Timeline::Device, times)],
                vec![
                    ComponentColumn::LineStrip(strips),
                    ComponentColumn::StripColor(colors),
                    ComponentColumn::StripLabel(labels),
                ],
            )?;
        }

        let mut removals: BTreeMap<(u64, u64), Vec<f64>> = BTreeMap::new();
        for frame in frames {
            if frame.state() != State::Removed {
                continue;
            }
            let Some(id) = frame
                .plane
                .as_ref()
                .and_then(|p| p.trackable.as_ref())
                .and_then(|t| t.trackable_id.as_ref())
            else {
                tracing::warn!("skipping removed plane without trackable id");
                continue;
            };
            removals
                .entry((id.sub_id_1, id.sub_id_2))
                .or_default()
                .push(device_time_secs(frame.device_timestamp.as_ref()));
        }
        for ((sub_id_1, sub_id_2), times) in removals {
            let path = format!("{base}/{}", paths::trackable_part(sub_id_1, sub_id_2));
            let flags = vec![true; times.len()];
            inner.stream.send_columns(
                &path,
                vec![TimeColumn::new(Timeline::Device, times)],
                vec![ComponentColumn::ClearRecursive(flags)],
            )?;
        }
        Ok(())
    }

    pub fn save_point_cloud_detection_frames(
        &self,
        frames: &[PointCloudDetectionFrame],
        device: &Device,
    ) -> Result<(), SessionError> {
        use point_cloud_detection_frame::State;

        if frames.is_empty() {
            tracing::warn!("no point cloud detection frames to save");
            return Ok(());
        }
        let inner = self.inner.lock();
        let base = paths::family_path(&inner.session, device, FrameFamily::PointCloudDetection);

        let mut per_trackable: BTreeMap<(u64, u64), Vec<&PointCloudDetectionFrame>> =
            BTreeMap::new();
        for frame in frames {
            if !matches!(frame.state(), State::Added | State::Updated) {
                continue;
            }
            let Some(id) = frame
                .point_cloud
                .as_ref()
                .and_then(|c| c.trackable.as_ref())
                .and_then(|t| t.trackable_id.as_ref())
            else {
                tracing::warn!("skipping point cloud frame without trackable id");
                continue;
            };
            per_trackable
                .entry((id.sub_id_1, id.sub_id_2))
                .or_default()
                .push(frame);
        }

        for ((sub_id_1, sub_id_2), rows) in per_trackable {
            let path = format!("{base}/{}", paths::trackable_part(sub_id_1, sub_id_2));
            let times: Vec<f64> = rows
                .iter()
                .map(|f| device_time_secs(f.device_timestamp.as_ref()))
                .collect();
            let mut colors = Vec::with_capacity(rows.len());
            let mut labels = Vec::with_capacity(rows.len());
            let mut positions = Vec::new();
            let mut row_lengths = Vec::with_capacity(rows.len());
            for frame in &rows {
                let Some(cloud) = frame.point_cloud.as_ref() else {
                    continue;
                };
                let state = cloud
                    .trackable
                    .as_ref()
                    .map(|t| t.tracking_state())
                    .unwrap_or(TrackingState::Unspecified);
                colors.push(if state == TrackingState::Tracking {
                    GREEN
                } else {
                    RED
                });
                labels.push(state.as_str_name().to_owned());
                row_lengths.push(cloud.positions.len());
                positions.extend(cloud.positions.iter().map(|p| [p.x, p.y, p.z]));
            }

            // cloud granularity, then per-point granularity; each point row
            // inherits its cloud's timestamp through the partitioning
            inner.stream.send_columns(
                &path,
                vec![TimeColumn::new(Timeline::Device, times.clone())],
                vec![
                    ComponentColumn::PointColor(colors),
                    ComponentColumn::PointLabel(labels),
                ],
            )?;
            inner.stream.send_columns(
                &path,
                vec![TimeColumn::new(Timeline::Device, times)],
                vec![ComponentColumn::PointPositions {
                    positions,
                    row_lengths,
                }],
            )?;
        }

        for frame in frames {
            if frame.state() != State::Removed {
                continue;
            }
            let Some(id) = frame
                .point_cloud
                .as_ref()
                .and_then(|c| c.trackable.as_ref())
                .and_then(|t| t.trackable_id.as_ref())
            else {
                tracing::warn!("skipping removed point cloud without trackable id");
                continue;
            };
            let path = format!("{base}/{}", paths::trackable_part(id.sub_id_1, id.sub_id_2));
            inner
                .stream
                .set_time(Timeline::Device, device_time_secs(frame.device_timestamp.as_ref()));
            inner.stream.log(&path, Primitive::ClearRecursive)?;
        }
        Ok(())
    }

    pub fn save_mesh_detection_frames(
        &self,
        frames: &[MeshDetectionFrame],
        device: &Device,
    ) -> Result<(), SessionError> {
        use mesh_detection_frame::State;

        if frames.is_empty() {
            tracing::warn!("no mesh detection frames to save");
            return Ok(());
        }
        let inner = self.inner.lock();
        let base = paths::family_path(&inner.session, device, FrameFamily::MeshDetection);

        // Mesh primitives carry variable vertex and face counts, so positive
        // frames are logged one at a time at the device-time cursor.
        for frame in frames {
            if !matches!(frame.state(), State::Added | State::Updated) {
                continue;
            }
            let Some(filter) = frame.mesh_filter.as_ref() else {
                tracing::warn!("skipping mesh frame without mesh filter");
                continue;
            };
            inner
                .stream
                .set_time(Timeline::Device, device_time_secs(frame.device_timestamp.as_ref()));
            let mesh_path = paths::join(&base, &filter.instance_id.to_string());
            let sub_meshes = filter
                .mesh
                .as_ref()
                .map(|m| m.sub_meshes.as_slice())
                .unwrap_or_default();
            for (index, sub_mesh) in sub_meshes.iter().enumerate() {
                let Some(geometry) = decode::decode_sub_mesh(&sub_mesh.data) else {
                    continue;
                };
                inner
                    .stream
                    .log(&format!("{mesh_path}/{index}"), Primitive::Mesh(geometry))?;
            }
        }

        let mut removals: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
        for frame in frames {
            if frame.state() != State::Removed {
                continue;
            }
            let Some(filter) = frame.mesh_filter.as_ref() else {
                tracing::warn!("skipping removed mesh without mesh filter");
                continue;
            };
            removals
                .entry(filter.instance_id)
                .or_default()
                .push(device_time_secs(frame.device_timestamp.as_ref()));
        }
        for (instance_id, times) in removals {
            let path = paths::join(&base, &instance_id.to_string());
            let flags = vec![true; times.len()];
            inner.stream.send_columns(
                &path,
                vec![TimeColumn::new(Timeline::Device, times)],
                vec![ComponentColumn::ClearRecursive(flags)],
            )?;
        }
        Ok(())
    }
}

fn vec3(v: Option<&Vector3>) -> [f32; 3] {
    v.map(|v| [v.x, v.y, v.z]).unwrap_or_default()
}
