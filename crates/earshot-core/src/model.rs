//! Binary glTF model loading via the `gltf` crate.
//!
//! Flattens every mesh primitive reachable from the default scene into one
//! vertex list in model space, with node transforms already applied.

use crate::assets::AssetError;
use glam::{Mat4, Vec3};

/// Flattened triangle geometry of a loaded model.
#[derive(Debug, Clone)]
pub struct ModelAsset {
    pub vertices: Vec<Vec3>,
    pub indices: Vec<u32>,
    pub bounds_min: Vec3,
    pub bounds_max: Vec3,
}

impl ModelAsset {
    /// Parse a GLB (or embedded-buffer glTF) byte blob.
    pub fn from_glb(bytes: &[u8]) -> Result<Self, AssetError> {
        let (document, buffers, _images) = gltf::import_slice(bytes)?;

        let scene = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .ok_or(AssetError::EmptyModel)?;

        let mut vertices = Vec::new();
        let mut indices = Vec::new();
        for node in scene.nodes() {
            collect_node(&node, Mat4::IDENTITY, &buffers, &mut vertices, &mut indices);
        }

        if vertices.is_empty() {
            return Err(AssetError::EmptyModel);
        }

        tracing::debug!(
            vertices = vertices.len(),
            triangles = indices.len() / 3,
            "parsed glTF model"
        );

        Ok(Self::from_mesh(vertices, indices))
    }

    pub fn from_mesh(vertices: Vec<Vec3>, indices: Vec<u32>) -> Self {
        let (bounds_min, bounds_max) = vertices.iter().fold(
            (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
            |(lo, hi), v| (lo.min(*v), hi.max(*v)),
        );
        Self {
            vertices,
            indices,
            bounds_min,
            bounds_max,
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.bounds_min + self.bounds_max) * 0.5
    }
}

fn collect_node(
    node: &gltf::Node,
    parent: Mat4,
    buffers: &[gltf::buffer::Data],
    vertices: &mut Vec<Vec3>,
    indices: &mut Vec<u32>,
) {
    let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());

    if let Some(mesh) = node.mesh() {
        for primitive in mesh.primitives() {
            let reader =
                primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| d.0.as_slice()));
            let Some(positions) = reader.read_positions() else {
                continue;
            };
            let base = vertices.len() as u32;
            vertices.extend(positions.map(|p| world.transform_point3(Vec3::from(p))));
            if let Some(read) = reader.read_indices() {
                indices.extend(read.into_u32().map(|i| base + i));
            }
        }
    }

    for child in node.children() {
        collect_node(&child, world, buffers, vertices, indices);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a GLB holding a single triangle under a node translated by +1 on x.
    pub(crate) fn triangle_glb() -> Vec<u8> {
        let json = r#"{"asset":{"version":"2.0"},"scene":0,"scenes":[{"nodes":[0]}],"nodes":[{"mesh":0,"translation":[1.0,0.0,0.0]}],"meshes":[{"primitives":[{"attributes":{"POSITION":0}}]}],"accessors":[{"bufferView":0,"componentType":5126,"count":3,"type":"VEC3","min":[0.0,0.0,0.0],"max":[1.0,1.0,0.0]}],"bufferViews":[{"buffer":0,"byteOffset":0,"byteLength":36}],"buffers":[{"byteLength":36}]}"#;
        let mut json_chunk = json.as_bytes().to_vec();
        while json_chunk.len() % 4 != 0 {
            json_chunk.push(b' ');
        }

        let mut bin_chunk = Vec::with_capacity(36);
        for v in [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0] {
            bin_chunk.extend_from_slice(&v.to_le_bytes());
        }

        let total = 12 + 8 + json_chunk.len() + 8 + bin_chunk.len();
        let mut glb = Vec::with_capacity(total);
        glb.extend_from_slice(b"glTF");
        glb.extend_from_slice(&2u32.to_le_bytes());
        glb.extend_from_slice(&(total as u32).to_le_bytes());
        glb.extend_from_slice(&(json_chunk.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"JSON");
        glb.extend_from_slice(&json_chunk);
        glb.extend_from_slice(&(bin_chunk.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"BIN\0");
        glb.extend_from_slice(&bin_chunk);
        glb
    }

    #[test]
    fn test_from_glb_applies_node_transform() {
        let model = ModelAsset::from_glb(&triangle_glb()).unwrap();
        assert_eq!(model.vertices.len(), 3);
        assert_eq!(model.vertices[0], Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(model.bounds_min, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(model.bounds_max, Vec3::new(2.0, 1.0, 0.0));
    }

    #[test]
    fn test_from_glb_rejects_garbage() {
        assert!(ModelAsset::from_glb(b"definitely not a model").is_err());
    }

    #[test]
    fn test_center() {
        let model = ModelAsset::from_mesh(
            vec![Vec3::new(-1.0, 0.0, 2.0), Vec3::new(3.0, 4.0, 2.0)],
            vec![],
        );
        assert_eq!(model.center(), Vec3::new(1.0, 2.0, 2.0));
    }
}
