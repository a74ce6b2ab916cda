//! Pure frame decoders.
//!
//! Every function here is a straight transform from wire bytes to a typed
//! record. Anomalies that represent a single bad frame return `None` after a
//! warning so the enclosing batch can continue.

use arflow_recorder::{DepthDatatype, MeshGeometry};
use arflow_proto::v1::{Vector2, Vector3, XrCpuImage};
use nalgebra::{Matrix4, Vector3 as Vec3};

/// Normalize an Android `YUV_420_888` capture into a contiguous, stride-free
/// I420 buffer of length `w*h + 2*(w/2)*(h/2)`.
///
/// The Y plane is copied row-by-row, taking the first `w` bytes of every
/// `row_stride`. The chroma planes are walked with their row and pixel
/// strides across `w/2` columns of `h/2` rows; Android delivers them with an
/// off-by-one trailing byte (the last row is one padding byte short or
/// long depending on capture path), so missing trailing bytes read as zero
/// and surplus ones are ignored.
pub fn i420_from_android_yuv(image: &XrCpuImage) -> Option<Vec<u8>> {
    if image.planes.len() != 3 {
        tracing::warn!(
            "skipping bad image: expected 3 planes, got {}",
            image.planes.len()
        );
        return None;
    }

    let dims = image.dimensions.as_ref()?;
    let (width, height) = (dims.x.max(0) as usize, dims.y.max(0) as usize);
    let (uv_width, uv_height) = (width / 2, height / 2);

    let mut out = Vec::with_capacity(width * height + 2 * uv_width * uv_height);

    let y = &image.planes[0];
    let y_stride = y.row_stride.max(0) as usize;
    if height > 0 && (height - 1) * y_stride + width > y.data.len() {
        tracing::warn!(
            "skipping bad image: Y plane holds {} bytes, need {}",
            y.data.len(),
            (height - 1) * y_stride + width
        );
        return None;
    }
    for row in 0..height {
        let start = row * y_stride;
        out.extend_from_slice(&y.data[start..start + width]);
    }

    for plane in &image.planes[1..] {
        let row_stride = plane.row_stride.max(0) as usize;
        let pixel_stride = plane.pixel_stride.max(1) as usize;
        for row in 0..uv_height {
            for col in 0..uv_width {
                let idx = row * row_stride + col * pixel_stride;
                out.push(plane.data.get(idx).copied().unwrap_or(0));
            }
        }
    }

    Some(out)
}

/// Concatenate an iOS biplanar NV12 capture (full-resolution Y plane
/// followed by half-resolution interleaved CbCr) into one buffer.
pub fn nv12_buffer(image: &XrCpuImage) -> Option<Vec<u8>> {
    if image.planes.len() != 2 {
        tracing::warn!(
            "skipping bad image: expected 2 planes, got {}",
            image.planes.len()
        );
        return None;
    }
    let dims = image.dimensions.as_ref()?;
    let (width, height) = (dims.x.max(0) as usize, dims.y.max(0) as usize);
    let expected = width * height + width * (height / 2);
    let total: usize = image.planes.iter().map(|p| p.data.len()).sum();
    if total < expected {
        tracing::warn!("skipping bad image: NV12 planes hold {total} bytes, need {expected}");
        return None;
    }
    let mut out = Vec::with_capacity(expected);
    out.extend_from_slice(&image.planes[0].data[..width * height]);
    out.extend_from_slice(&image.planes[1].data[..width * (height / 2)]);
    Some(out)
}

/// Validate a single-plane depth capture and pass its bytes through
/// unmodified. No unit conversion happens at this layer.
pub fn depth_plane<'a>(image: &'a XrCpuImage, datatype: DepthDatatype) -> Option<&'a [u8]> {
    let Some(plane) = image.planes.first() else {
        tracing::warn!("skipping bad depth image: no planes");
        return None;
    };
    let dims = image.dimensions.as_ref()?;
    let bytes_per = match datatype {
        DepthDatatype::F32 => 4,
        DepthDatatype::U16 => 2,
    };
    let expected = dims.x.max(0) as usize * dims.y.max(0) as usize * bytes_per;
    if plane.data.len() != expected {
        tracing::warn!(
            "skipping bad depth image: plane holds {} bytes, expected {expected}",
            plane.data.len()
        );
        return None;
    }
    Some(&plane.data)
}

/// The fixed client-to-recorder handedness change.
fn y_flip() -> Matrix4<f32> {
    Matrix4::from_diagonal(&nalgebra::Vector4::new(1.0, -1.0, 1.0, 1.0))
}

/// Decode 12 little-endian f32 (a row-major 3x4 pose) into a 4x4 matrix in
/// the recorder's Y-up frame.
pub fn pose_from_wire(data: &[u8]) -> Option<Matrix4<f32>> {
    if data.len() != 48 {
        tracing::warn!(
            "skipping bad transform: expected 48 bytes, got {}",
            data.len()
        );
        return None;
    }
    let mut values = [0.0f32; 12];
    for (i, chunk) in data.chunks_exact(4).enumerate() {
        values[i] = f32::from_le_bytes(chunk.try_into().ok()?);
    }
    let mut m = Matrix4::identity();
    for row in 0..3 {
        for col in 0..4 {
            m[(row, col)] = values[row * 4 + col];
        }
    }
    Some(y_flip() * m)
}

/// Top-left 3x3 of a pose, row-major.
pub fn rotation_row_major(m: &Matrix4<f32>) -> [f32; 9] {
    [
        m[(0, 0)],
        m[(0, 1)],
        m[(0, 2)],
        m[(1, 0)],
        m[(1, 1)],
        m[(1, 2)],
        m[(2, 0)],
        m[(2, 1)],
        m[(2, 2)],
    ]
}

/// Translation column of a pose.
pub fn translation(m: &Matrix4<f32>) -> [f32; 3] {
    [m[(0, 3)], m[(1, 3)], m[(2, 3)]]
}

/// Lift a plane's 2D boundary polygon into world space and close the loop.
///
/// Builds an orthonormal in-plane basis from the normal, maps every `(s, t)`
/// to `center + s*u + t*v`, and appends the first point again so line strips
/// render closed. Empty boundaries and degenerate normals produce an empty
/// result.
pub fn boundary_3d(boundary: &[Vector2], normal: &Vector3, center: &Vector3) -> Vec<[f32; 3]> {
    if boundary.is_empty() {
        tracing::warn!("skipping plane with no boundary points");
        return Vec::new();
    }
    let n = Vec3::new(normal.x, normal.y, normal.z);
    if n.norm() == 0.0 {
        tracing::warn!("skipping plane with zero normal");
        return Vec::new();
    }
    let n = n.normalize();
    let x_axis = Vec3::new(1.0, 0.0, 0.0);
    let arbitrary = if (n - x_axis).norm() < 1e-6 {
        Vec3::new(0.0, 1.0, 0.0)
    } else {
        x_axis
    };
    let u = n.cross(&arbitrary).normalize();
    let v = n.cross(&u);
    let c = Vec3::new(center.x, center.y, center.z);

    let lift = |p: &Vector2| {
        let world = c + p.x * u + p.y * v;
        [world.x, world.y, world.z]
    };

    let mut points: Vec<[f32; 3]> = boundary.iter().map(lift).collect();
    points.push(lift(&boundary[0]));
    points
}

/// Decode one compact binary glTF (GLB) sub-mesh chunk into the arrays the
/// recorder's mesh primitive wants.
pub fn decode_sub_mesh(data: &[u8]) -> Option<MeshGeometry> {
    let (document, buffers, _images) = match gltf::import_slice(data) {
        Ok(parts) => parts,
        Err(err) => {
            tracing::warn!("skipping undecodable sub-mesh: {err}");
            return None;
        }
    };
    let primitive = document.meshes().next()?.primitives().next()?;
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|b| &b.0[..]));

    let positions: Vec<[f32; 3]> = reader.read_positions()?.collect();
    let triangle_indices: Vec<[u32; 3]> = match reader.read_indices() {
        Some(indices) => {
            let flat: Vec<u32> = indices.into_u32().collect();
            flat.chunks_exact(3)
                .map(|t| [t[0], t[1], t[2]])
                .collect()
        }
        None => {
            tracing::warn!("skipping sub-mesh without triangle indices");
            return None;
        }
    };
    let normals = reader.read_normals().map(|n| n.collect());
    let colors = reader.read_colors(0).map(|c| c.into_rgba_u8().collect());
    let texcoords = reader
        .read_tex_coords(0)
        .map(|t| t.into_f32().collect());

    Some(MeshGeometry {
        positions,
        triangle_indices,
        normals,
        colors,
        texcoords,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arflow_proto::v1::Vector2Int;
    use arflow_proto::v1::xr_cpu_image::Plane;

    fn image(w: i32, h: i32, planes: Vec<Plane>) -> XrCpuImage {
        XrCpuImage {
            dimensions: Some(Vector2Int { x: w, y: h }),
            format: 1,
            timestamp: 0.0,
            planes,
        }
    }

    #[test]
    fn i420_normalizes_strided_planes() {
        // 4x4 Y, strided 2x2 chroma with a trailing platform pad byte.
        let y: Vec<u8> = (0..16).collect();
        let u = vec![100, 101, 102, 103, 0xFF];
        let v = vec![200, 201, 202, 203, 0xFF];
        let img = image(
            4,
            4,
            vec![
                Plane {
                    data: y.clone(),
                    row_stride: 4,
                    pixel_stride: 1,
                },
                Plane {
                    data: u,
                    row_stride: 2,
                    pixel_stride: 1,
                },
                Plane {
                    data: v,
                    row_stride: 2,
                    pixel_stride: 1,
                },
            ],
        );
        let out = i420_from_android_yuv(&img).unwrap();
        assert_eq!(out.len(), 16 + 4 + 4);
        assert_eq!(&out[..16], &y[..]);
        assert_eq!(&out[16..20], &[100, 101, 102, 103]);
        assert_eq!(&out[20..], &[200, 201, 202, 203]);
    }

    #[test]
    fn i420_handles_interleaved_chroma_and_missing_trailing_byte() {
        // pixel_stride 2 with the Android off-by-one: the last chroma sample
        // of the final row is absent on the wire and must read as zero.
        let y: Vec<u8> = vec![9; 16];
        let u = vec![1, 0, 2, 0, 3, 0]; // rows at 0/4, samples at 0,2,4,6: byte 6 missing
        let v = vec![5, 0, 6, 0, 7, 0, 8];
        let img = image(
            4,
            4,
            vec![
                Plane {
                    data: y,
                    row_stride: 4,
                    pixel_stride: 1,
                },
                Plane {
                    data: u,
                    row_stride: 4,
                    pixel_stride: 2,
                },
                Plane {
                    data: v,
                    row_stride: 4,
                    pixel_stride: 2,
                },
            ],
        );
        let out = i420_from_android_yuv(&img).unwrap();
        assert_eq!(out.len(), 16 + 4 + 4);
        assert_eq!(&out[16..20], &[1, 2, 3, 0]);
        assert_eq!(&out[20..], &[5, 6, 7, 8]);
    }

    #[test]
    fn i420_output_length_is_stride_independent() {
        for (w, h, y_stride, uv_stride, px_stride) in
            [(4i32, 4i32, 8, 4, 1), (6, 4, 6, 6, 2), (8, 8, 16, 8, 2)]
        {
            let (w_u, h_u) = (w as usize, h as usize);
            let y = vec![0u8; h_u * y_stride];
            let uv = vec![0u8; (h_u / 2) * uv_stride + px_stride * (w_u / 2)];
            let img = image(
                w,
                h,
                vec![
                    Plane {
                        data: y,
                        row_stride: y_stride as i32,
                        pixel_stride: 1,
                    },
                    Plane {
                        data: uv.clone(),
                        row_stride: uv_stride as i32,
                        pixel_stride: px_stride as i32,
                    },
                    Plane {
                        data: uv,
                        row_stride: uv_stride as i32,
                        pixel_stride: px_stride as i32,
                    },
                ],
            );
            let out = i420_from_android_yuv(&img).unwrap();
            assert_eq!(out.len(), w_u * h_u + 2 * (w_u / 2) * (h_u / 2));
        }
    }

    #[test]
    fn wrong_plane_count_is_skipped() {
        let img = image(4, 4, vec![]);
        assert!(i420_from_android_yuv(&img).is_none());
    }

    #[test]
    fn depth_bytes_pass_through_unmodified() {
        let data: Vec<u8> = (0..32).collect();
        let img = image(
            4,
            2,
            vec![Plane {
                data: data.clone(),
                row_stride: 16,
                pixel_stride: 4,
            }],
        );
        assert_eq!(depth_plane(&img, DepthDatatype::F32).unwrap(), &data[..]);
        // 4x2 u16 needs 16 bytes, not 32
        assert!(depth_plane(&img, DepthDatatype::U16).is_none());
    }

    #[test]
    fn pose_round_trips_modulo_y_flip() {
        #[rustfmt::skip]
        let pose: [f32; 12] = [
            0.0, -1.0, 0.0, 2.5,
            1.0,  0.0, 0.0, -3.0,
            0.0,  0.0, 1.0, 0.25,
        ];
        let wire: Vec<u8> = pose.iter().flat_map(|v| v.to_le_bytes()).collect();
        let m = pose_from_wire(&wire).unwrap();

        // applying the flip twice yields the wire pose again
        let unflipped = y_flip() * m;
        for row in 0..3 {
            for col in 0..4 {
                assert_eq!(unflipped[(row, col)], pose[row * 4 + col]);
            }
        }
        assert_eq!(translation(&m), [2.5, 3.0, 0.25]);
        assert_eq!(rotation_row_major(&m)[3], -1.0);

        assert!(pose_from_wire(&wire[..40]).is_none());
    }

    #[test]
    fn boundary_closes_the_loop() {
        let boundary = vec![
            Vector2 { x: 1.0, y: 0.0 },
            Vector2 { x: 0.0, y: 1.0 },
            Vector2 { x: -1.0, y: 0.0 },
        ];
        let normal = Vector3 {
            x: 0.0,
            y: 1.0,
            z: 0.0,
        };
        let center = Vector3 {
            x: 0.0,
            y: 2.0,
            z: 0.0,
        };
        let points = boundary_3d(&boundary, &normal, &center);
        assert_eq!(points.len(), boundary.len() + 1);
        assert_eq!(points[0], *points.last().unwrap());
        // all lifted points stay on the plane y == 2
        for p in &points {
            assert!((p[1] - 2.0).abs() < 1e-6);
        }

        assert!(boundary_3d(&[], &normal, &center).is_empty());
        let degenerate = Vector3 {
            x: 0.0,
            y: 0.0,
            z: 0.0,
        };
        assert!(boundary_3d(&boundary, &degenerate, &center).is_empty());
    }

    #[test]
    fn boundary_handles_normal_parallel_to_x() {
        let boundary = vec![Vector2 { x: 1.0, y: 1.0 }];
        let normal = Vector3 {
            x: 1.0,
            y: 0.0,
            z: 0.0,
        };
        let center = Vector3 {
            x: 5.0,
            y: 0.0,
            z: 0.0,
        };
        let points = boundary_3d(&boundary, &normal, &center);
        assert_eq!(points.len(), 2);
        // in-plane basis must be orthogonal to the normal: x stays put
        assert!((points[0][0] - 5.0).abs() < 1e-6);
    }

    #[test]
    fn garbage_sub_mesh_is_skipped() {
        assert!(decode_sub_mesh(b"not a glb").is_none());
    }
}
