//! rerun-backed recorder.
//!
//! Maps the typed column model onto `re_sdk` 0.31: static properties become
//! partial archetype updates logged statically, columns become
//! `send_columns` batches along timestamp time columns, and single writes go
//! through the stream's time cursor.

use re_sdk::log::TimeColumn as RrTimeColumn;
use re_sdk::{RecordingStream, RecordingStreamBuilder};
use re_sdk_types::{archetypes, components, datatypes};

use crate::column::check_lengths;
use crate::{
    ComponentColumn, DepthDatatype, PixelLayout, Primitive, Recorder, RecorderError,
    RecorderStream, StaticProperty, TimeColumn, Timeline,
};

/// Recorder over the rerun SDK. In live mode every new stream spawns (or
/// reuses) a viewer process; otherwise streams buffer until directed to a
/// file.
pub struct RerunRecorder {
    application_id: String,
    spawn_viewer: bool,
}

impl RerunRecorder {
    pub fn new(application_id: impl Into<String>, spawn_viewer: bool) -> Self {
        Self {
            application_id: application_id.into(),
            spawn_viewer,
        }
    }
}

impl Recorder for RerunRecorder {
    fn new_stream(&self, session_id: &str) -> Result<Box<dyn RecorderStream>, RecorderError> {
        let builder = RecordingStreamBuilder::new(self.application_id.as_str())
            .recording_id(session_id);
        let rec = if self.spawn_viewer {
            builder.spawn()
        } else {
            builder.buffered()
        }
        .map_err(sink)?;
        Ok(Box::new(RerunStream { rec }))
    }

    fn disconnect_all(&self) {
        // No process-global recording exists; every stream is owned by its
        // session and released through `RecorderStream::disconnect`.
    }
}

struct RerunStream {
    rec: RecordingStream,
}

impl RecorderStream for RerunStream {
    fn direct_to_file(&self, path: &std::path::Path) -> Result<(), RecorderError> {
        self.rec.save(path.to_path_buf()).map_err(sink)
    }

    fn log_static(&self, entity_path: &str, prop: StaticProperty) -> Result<(), RecorderError> {
        match prop {
            StaticProperty::ColorImageFormat {
                width,
                height,
                layout,
            } => {
                let pixel_format = match layout {
                    PixelLayout::YuvI420Limited => datatypes::PixelFormat::Y_U_V12_LimitedRange,
                    PixelLayout::Nv12 => datatypes::PixelFormat::NV12,
                };
                let format =
                    components::ImageFormat::from_pixel_format([width, height], pixel_format);
                self.rec
                    .log_static(
                        entity_path,
                        &archetypes::Image::update_fields().with_format(format),
                    )
                    .map_err(sink)
            }
            StaticProperty::DepthImageFormat {
                width,
                height,
                datatype,
                meter,
            } => {
                let channel_datatype = match datatype {
                    DepthDatatype::F32 => datatypes::ChannelDatatype::F32,
                    DepthDatatype::U16 => datatypes::ChannelDatatype::U16,
                };
                let format = components::ImageFormat::depth([width, height], channel_datatype);
                self.rec
                    .log_static(
                        entity_path,
                        &archetypes::DepthImage::update_fields()
                            .with_format(format)
                            .with_meter(meter),
                    )
                    .map_err(sink)
            }
            StaticProperty::BoxHalfSize(half_size) => self
                .rec
                .log_static(
                    entity_path,
                    &archetypes::Boxes3D::update_fields().with_half_sizes([half_size]),
                )
                .map_err(sink),
            StaticProperty::ArrowColor([r, g, b]) => self
                .rec
                .log_static(
                    entity_path,
                    &archetypes::Arrows3D::update_fields()
                        .with_colors([components::Color::from_rgb(r, g, b)]),
                )
                .map_err(sink),
        }
    }

    fn send_columns(
        &self,
        entity_path: &str,
        times: Vec<TimeColumn>,
        components: Vec<ComponentColumn>,
    ) -> Result<(), RecorderError> {
        check_lengths(entity_path, &times, &components)?;

        let indexes: Vec<RrTimeColumn> = times
            .into_iter()
            .map(|t| RrTimeColumn::new_timestamp_secs_since_epoch(t.timeline.name(), t.seconds))
            .collect();

        let mut columns = Vec::new();
        for component in components {
            match component {
                ComponentColumn::TransformMat3x3(mats) => columns.extend(
                    archetypes::Transform3D::update_fields()
                        .with_many_mat3x3(mats.into_iter().map(column_major))
                        .columns_of_unit_batches()
                        .map_err(sink)?,
                ),
                ComponentColumn::TransformTranslation(translations) => columns.extend(
                    archetypes::Transform3D::update_fields()
                        .with_many_translation(translations)
                        .columns_of_unit_batches()
                        .map_err(sink)?,
                ),
                ComponentColumn::PinholeProjection(mats) => columns.extend(
                    archetypes::Pinhole::update_fields()
                        .with_many_image_from_camera(
                            mats.into_iter().map(column_major).collect::<Vec<_>>(),
                        )
                        .columns_of_unit_batches()
                        .map_err(sink)?,
                ),
                ComponentColumn::ColorImageBuffer(buffers) => columns.extend(
                    archetypes::Image::update_fields()
                        .with_many_buffer(
                            buffers
                                .into_iter()
                                .map(|b| components::ImageBuffer(b.into())),
                        )
                        .columns_of_unit_batches()
                        .map_err(sink)?,
                ),
                ComponentColumn::DepthImageBuffer(buffers) => columns.extend(
                    archetypes::DepthImage::update_fields()
                        .with_many_buffer(
                            buffers
                                .into_iter()
                                .map(|b| components::ImageBuffer(b.into())),
                        )
                        .columns_of_unit_batches()
                        .map_err(sink)?,
                ),
                ComponentColumn::BoxQuaternion(quats) => columns.extend(
                    archetypes::Boxes3D::update_fields()
                        .with_quaternions(quats.into_iter().map(|q| {
                            components::RotationQuat(datatypes::Quaternion::from_xyzw(q))
                        }))
                        .columns_of_unit_batches()
                        .map_err(sink)?,
                ),
                ComponentColumn::ArrowVector(vectors) => columns.extend(
                    archetypes::Arrows3D::update_fields()
                        .with_vectors(vectors)
                        .columns_of_unit_batches()
                        .map_err(sink)?,
                ),
                ComponentColumn::Scalars {
                    samples,
                    frame_lengths,
                } => columns.extend(
                    archetypes::Scalars::new(samples)
                        .columns(frame_lengths)
                        .map_err(sink)?,
                ),
                ComponentColumn::LineStrip(strips) => columns.extend(
                    archetypes::LineStrips3D::new(strips)
                        .columns_of_unit_batches()
                        .map_err(sink)?,
                ),
                ComponentColumn::StripColor(colors) => columns.extend(
                    archetypes::LineStrips3D::update_fields()
                        .with_colors(rgb(colors))
                        .columns_of_unit_batches()
                        .map_err(sink)?,
                ),
                ComponentColumn::StripLabel(labels) => columns.extend(
                    archetypes::LineStrips3D::update_fields()
                        .with_labels(labels)
                        .columns_of_unit_batches()
                        .map_err(sink)?,
                ),
                ComponentColumn::PointPositions {
                    positions,
                    row_lengths,
                } => columns.extend(
                    archetypes::Points3D::new(positions)
                        .columns(row_lengths)
                        .map_err(sink)?,
                ),
                ComponentColumn::PointColor(colors) => columns.extend(
                    archetypes::Points3D::update_fields()
                        .with_colors(rgb(colors))
                        .columns_of_unit_batches()
                        .map_err(sink)?,
                ),
                ComponentColumn::PointLabel(labels) => columns.extend(
                    archetypes::Points3D::update_fields()
                        .with_labels(labels)
                        .columns_of_unit_batches()
                        .map_err(sink)?,
                ),
                ComponentColumn::ClearRecursive(flags) => columns.extend(
                    archetypes::Clear::update_fields()
                        .with_many_is_recursive(flags)
                        .columns_of_unit_batches()
                        .map_err(sink)?,
                ),
            }
        }

        self.rec
            .send_columns(entity_path, indexes, columns)
            .map_err(sink)
    }

    fn set_time(&self, timeline: Timeline, seconds: f64) {
        self.rec
            .set_timestamp_secs_since_epoch(timeline.name(), seconds);
    }

    fn log(&self, entity_path: &str, primitive: Primitive) -> Result<(), RecorderError> {
        match primitive {
            Primitive::Mesh(mesh) => {
                let mut arch = archetypes::Mesh3D::new(mesh.positions)
                    .with_triangle_indices(mesh.triangle_indices);
                if let Some(normals) = mesh.normals {
                    arch = arch.with_vertex_normals(normals);
                }
                if let Some(colors) = mesh.colors {
                    arch = arch.with_vertex_colors(
                        colors
                            .into_iter()
                            .map(|[r, g, b, a]| components::Color::from_unmultiplied_rgba(r, g, b, a)),
                    );
                }
                if let Some(texcoords) = mesh.texcoords {
                    arch = arch.with_vertex_texcoords(texcoords);
                }
                self.rec.log(entity_path, &arch).map_err(sink)
            }
            Primitive::ClearRecursive => self
                .rec
                .log(entity_path, &archetypes::Clear::recursive())
                .map_err(sink),
        }
    }

    fn disconnect(&self) {
        self.rec.disconnect();
    }
}

/// Wire matrices are row-major, rerun matrix components are column-major.
fn column_major(m: [f32; 9]) -> [f32; 9] {
    [m[0], m[3], m[6], m[1], m[4], m[7], m[2], m[5], m[8]]
}

fn rgb(colors: Vec<[u8; 3]>) -> impl Iterator<Item = components::Color> {
    colors
        .into_iter()
        .map(|[r, g, b]| components::Color::from_rgb(r, g, b))
}

fn sink<E: std::fmt::Display>(err: E) -> RecorderError {
    RecorderError::Sink(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_major_transposes_into_column_major() {
        let m = column_major([1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        // first stored column holds the first elements of each wire row
        assert_eq!(&m[..3], &[1.0, 4.0, 7.0]);
        assert_eq!(m[3], 2.0);
    }
}
