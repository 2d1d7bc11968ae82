//! Builtin meshes
//!
//! All shapes are expressed in the unit frame [-1, 1]² with texture
//! coordinates whose origin is the top-left corner (y = -1).

use std::f32::consts::TAU;

use crate::gpu::{MeshData, Topology, Vertex};

const CIRCLE_SEGMENTS: u32 = 72;

fn uv_of(x: f32, y: f32) -> [f32; 2] {
    [(x + 1.0) * 0.5, (y + 1.0) * 0.5]
}

fn vertex(x: f32, y: f32, z: f32) -> Vertex {
    Vertex::new([x, y, z], uv_of(x, y))
}

/// Textured unit quad.
pub fn quad() -> MeshData {
    MeshData::sequential(
        vec![
            vertex(-1.0, -1.0, 0.0),
            vertex(1.0, -1.0, 0.0),
            vertex(-1.0, 1.0, 0.0),
            vertex(1.0, 1.0, 0.0),
        ],
        Topology::TriangleStrip,
    )
}

/// Closed outline of the unit square.
pub fn square_outline() -> MeshData {
    line_loop(&[(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)])
}

/// Closed outline of the unit circle.
pub fn circle_outline() -> MeshData {
    let points: Vec<(f32, f32)> = (0..CIRCLE_SEGMENTS)
        .map(|i| {
            let a = TAU * i as f32 / CIRCLE_SEGMENTS as f32;
            (a.cos(), a.sin())
        })
        .collect();
    line_loop(&points)
}

/// Filled unit disk, textured like the quad it is inscribed in.
pub fn disk() -> MeshData {
    let mut vertices = vec![vertex(0.0, 0.0, 0.0)];
    vertices.extend((0..CIRCLE_SEGMENTS).map(|i| {
        let a = TAU * i as f32 / CIRCLE_SEGMENTS as f32;
        vertex(a.cos(), a.sin(), 0.0)
    }));
    let indices = (0..CIRCLE_SEGMENTS)
        .flat_map(|i| [0, i + 1, (i + 1) % CIRCLE_SEGMENTS + 1])
        .collect();
    MeshData {
        vertices,
        indices,
        topology: Topology::TriangleList,
    }
}

/// Polyline through `points`.
pub fn line_strip(points: &[glam::Vec3]) -> MeshData {
    MeshData::sequential(
        points.iter().map(|p| vertex(p.x, p.y, p.z)).collect(),
        Topology::LineStrip,
    )
}

/// Point set.
pub fn points(points: &[glam::Vec3]) -> MeshData {
    MeshData::sequential(
        points.iter().map(|p| vertex(p.x, p.y, p.z)).collect(),
        Topology::PointList,
    )
}

fn line_loop(points: &[(f32, f32)]) -> MeshData {
    let mut vertices: Vec<Vertex> = points.iter().map(|&(x, y)| vertex(x, y, 0.0)).collect();
    if let Some(first) = vertices.first().copied() {
        vertices.push(first);
    }
    MeshData::sequential(vertices, Topology::LineStrip)
}

fn segments(lines: &[((f32, f32), (f32, f32))]) -> MeshData {
    let vertices = lines
        .iter()
        .flat_map(|&((x0, y0), (x1, y1))| [vertex(x0, y0, 0.0), vertex(x1, y1, 0.0)])
        .collect();
    MeshData::sequential(vertices, Topology::LineList)
}

/// Receding guide lines drawn behind the layer view.
fn perspective_layer() -> MeshData {
    segments(&[
        ((-1.0, -1.0), (-0.4, -0.6)),
        ((1.0, -1.0), (1.6, -0.6)),
        ((-1.0, 1.0), (-0.4, 1.4)),
        ((1.0, 1.0), (1.6, 1.4)),
        ((-0.4, -0.6), (1.6, -0.6)),
        ((-0.4, -0.6), (-0.4, 1.4)),
    ])
}

/// Framed mountain, marks still-image sources.
fn icon_image() -> MeshData {
    segments(&[
        ((-1.0, -1.0), (1.0, -1.0)),
        ((1.0, -1.0), (1.0, 1.0)),
        ((1.0, 1.0), (-1.0, 1.0)),
        ((-1.0, 1.0), (-1.0, -1.0)),
        ((-1.0, 1.0), (-0.2, 0.0)),
        ((-0.2, 0.0), (0.3, 0.5)),
        ((0.3, 0.5), (0.6, 0.2)),
        ((0.6, 0.2), (1.0, 1.0)),
    ])
}

/// Play triangle, marks video sources.
fn icon_video() -> MeshData {
    line_loop(&[(-0.7, -1.0), (1.0, 0.0), (-0.7, 1.0)])
}

/// Two overlapping squares, marks clone sources.
fn icon_clone() -> MeshData {
    segments(&[
        ((-1.0, -1.0), (0.4, -1.0)),
        ((0.4, -1.0), (0.4, 0.4)),
        ((0.4, 0.4), (-1.0, 0.4)),
        ((-1.0, 0.4), (-1.0, -1.0)),
        ((-0.4, 0.4), (-0.4, 1.0)),
        ((-0.4, 1.0), (1.0, 1.0)),
        ((1.0, 1.0), (1.0, -0.4)),
        ((1.0, -0.4), (0.4, -0.4)),
    ])
}

/// Screen with a stand, marks render sources.
fn icon_render() -> MeshData {
    segments(&[
        ((-1.0, -1.0), (1.0, -1.0)),
        ((1.0, -1.0), (1.0, 0.5)),
        ((1.0, 0.5), (-1.0, 0.5)),
        ((-1.0, 0.5), (-1.0, -1.0)),
        ((0.0, 0.5), (0.0, 1.0)),
        ((-0.5, 1.0), (0.5, 1.0)),
    ])
}

/// Names accepted by [`builtin_mesh`].
pub const BUILTIN_MESHES: [&str; 8] = [
    "disk",
    "circle",
    "square",
    "perspective_layer",
    "icon_image",
    "icon_video",
    "icon_clone",
    "icon_render",
];

/// Builtin mesh by name.
pub fn builtin_mesh(name: &str) -> Option<MeshData> {
    let mesh = match name {
        "disk" => disk(),
        "circle" => circle_outline(),
        "square" => square_outline(),
        "perspective_layer" => perspective_layer(),
        "icon_image" => icon_image(),
        "icon_video" => icon_video(),
        "icon_clone" => icon_clone(),
        "icon_render" => icon_render(),
        _ => return None,
    };
    Some(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_uv_origin_top_left() {
        let mesh = quad();
        assert_eq!(mesh.vertices[0].position, [-1.0, -1.0, 0.0]);
        assert_eq!(mesh.vertices[0].uv, [0.0, 0.0]);
        assert_eq!(mesh.vertices[3].uv, [1.0, 1.0]);
    }

    #[test]
    fn test_outlines_are_closed() {
        for mesh in [square_outline(), circle_outline(), icon_video()] {
            assert_eq!(mesh.vertices.first(), mesh.vertices.last());
        }
    }

    #[test]
    fn test_disk_indices_in_range() {
        let mesh = disk();
        assert_eq!(mesh.indices.len() % 3, 0);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
    }

    #[test]
    fn test_builtin_meshes_resolve() {
        for name in BUILTIN_MESHES {
            let mesh = builtin_mesh(name).unwrap();
            assert!(!mesh.vertices.is_empty());
            if mesh.topology == Topology::LineList {
                assert_eq!(mesh.vertices.len() % 2, 0);
            }
        }
        assert!(builtin_mesh("teapot").is_none());
    }
}
