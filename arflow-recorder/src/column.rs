//! Typed data model shared by every recorder backend.

use crate::RecorderError;

/// The two time axes every session stream indexes by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeline {
    /// Seconds on the device's motion clock.
    Device,
    /// Seconds on the camera capture pipeline clock.
    Image,
}

impl Timeline {
    pub fn name(self) -> &'static str {
        match self {
            Timeline::Device => "device_timestamp",
            Timeline::Image => "image_timestamp",
        }
    }
}

/// A column of seconds along one named timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeColumn {
    pub timeline: Timeline,
    pub seconds: Vec<f64>,
}

impl TimeColumn {
    pub fn new(timeline: Timeline, seconds: Vec<f64>) -> Self {
        Self { timeline, seconds }
    }
}

/// One batched component, matrices row-major.
///
/// A column carries one entry per time row except where a partitioning is
/// explicit (`Scalars`, `PointPositions`): there the partition lengths define
/// the rows and the flat payload is split accordingly.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentColumn {
    TransformMat3x3(Vec<[f32; 9]>),
    TransformTranslation(Vec<[f32; 3]>),
    PinholeProjection(Vec<[f32; 9]>),
    ColorImageBuffer(Vec<Vec<u8>>),
    DepthImageBuffer(Vec<Vec<u8>>),
    /// xyzw attitude quaternions.
    BoxQuaternion(Vec<[f32; 4]>),
    ArrowVector(Vec<[f32; 3]>),
    Scalars {
        samples: Vec<f64>,
        frame_lengths: Vec<usize>,
    },
    LineStrip(Vec<Vec<[f32; 3]>>),
    StripColor(Vec<[u8; 3]>),
    StripLabel(Vec<String>),
    PointPositions {
        positions: Vec<[f32; 3]>,
        row_lengths: Vec<usize>,
    },
    PointColor(Vec<[u8; 3]>),
    PointLabel(Vec<String>),
    /// Per-row recursive tombstones: each `true` clears the entity path and
    /// everything under it from that row's time on.
    ClearRecursive(Vec<bool>),
}

impl ComponentColumn {
    /// Number of time rows this column spans.
    pub fn row_count(&self) -> usize {
        match self {
            ComponentColumn::TransformMat3x3(v) => v.len(),
            ComponentColumn::TransformTranslation(v) => v.len(),
            ComponentColumn::PinholeProjection(v) => v.len(),
            ComponentColumn::ColorImageBuffer(v) => v.len(),
            ComponentColumn::DepthImageBuffer(v) => v.len(),
            ComponentColumn::BoxQuaternion(v) => v.len(),
            ComponentColumn::ArrowVector(v) => v.len(),
            ComponentColumn::Scalars { frame_lengths, .. } => frame_lengths.len(),
            ComponentColumn::LineStrip(v) => v.len(),
            ComponentColumn::StripColor(v) => v.len(),
            ComponentColumn::StripLabel(v) => v.len(),
            ComponentColumn::PointPositions { row_lengths, .. } => row_lengths.len(),
            ComponentColumn::PointColor(v) => v.len(),
            ComponentColumn::PointLabel(v) => v.len(),
            ComponentColumn::ClearRecursive(v) => v.len(),
        }
    }
}

/// Time-independent entity properties.
#[derive(Debug, Clone, PartialEq)]
pub enum StaticProperty {
    ColorImageFormat {
        width: u32,
        height: u32,
        layout: PixelLayout,
    },
    DepthImageFormat {
        width: u32,
        height: u32,
        datatype: DepthDatatype,
        meter: f32,
    },
    BoxHalfSize([f32; 3]),
    ArrowColor([u8; 3]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// Planar Y + quarter-resolution U and V, limited range.
    YuvI420Limited,
    /// Biplanar Y + interleaved CbCr, full range.
    Nv12,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthDatatype {
    F32,
    U16,
}

/// Single time-stamped writes that do not batch into columns.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Mesh(MeshGeometry),
    /// Recursively clear the entity path from the current time on.
    ClearRecursive,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshGeometry {
    pub positions: Vec<[f32; 3]>,
    pub triangle_indices: Vec<[u32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub colors: Option<Vec<[u8; 4]>>,
    pub texcoords: Option<Vec<[f32; 2]>>,
}

/// Every component batch must span exactly as many rows as each time column.
pub(crate) fn check_lengths(
    entity_path: &str,
    times: &[TimeColumn],
    components: &[ComponentColumn],
) -> Result<(), RecorderError> {
    let Some(rows) = times.first().map(|t| t.seconds.len()) else {
        return Ok(());
    };
    for t in times {
        if t.seconds.len() != rows {
            return Err(RecorderError::ColumnLengthMismatch {
                entity_path: entity_path.to_owned(),
                times: rows,
                rows: t.seconds.len(),
            });
        }
    }
    for c in components {
        if c.row_count() != rows {
            return Err(RecorderError::ColumnLengthMismatch {
                entity_path: entity_path.to_owned(),
                times: rows,
                rows: c.row_count(),
            });
        }
    }
    Ok(())
}
