//! Scene graph: overlay nodes, their transforms, material and lighting.
//!
//! Nodes are only ever appended. A [`NodeId`] handed out by [`Scene::add`]
//! stays valid for the lifetime of the scene.

use crate::model::ModelAsset;
use crate::text::TextMesh;
use glam::{EulerRot, Mat4, Quat, Vec3};
use std::sync::Arc;

/// Which overlay a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlayKind {
    LeftEar,
    RightEar,
    TextLabel,
}

impl OverlayKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeftEar => "left_ear",
            Self::RightEar => "right_ear",
            Self::TextLabel => "text_label",
        }
    }
}

/// Position, Euler rotation (radians, XYZ order) and scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn matrix(&self) -> Mat4 {
        let rotation = Quat::from_euler(EulerRot::XYZ, self.rotation.x, self.rotation.y, self.rotation.z);
        Mat4::from_scale_rotation_translation(self.scale, rotation, self.position)
    }
}

/// Physically-based material parameters. Colors are `0xRRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub color: u32,
    pub metalness: f32,
    pub roughness: f32,
    pub reflectivity: f32,
    pub clearcoat: f32,
    pub clearcoat_roughness: f32,
    pub emissive: u32,
    pub emissive_intensity: f32,
}

impl Material {
    /// Polished silver shared by all overlay objects.
    pub const fn shiny_metal() -> Self {
        Self {
            color: 0xC0C0C0,
            metalness: 1.0,
            roughness: 0.2,
            reflectivity: 3.0,
            clearcoat: 1.0,
            clearcoat_roughness: 0.1,
            emissive: 0xFFFFFF,
            emissive_intensity: 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Light {
    Ambient { color: u32, intensity: f32 },
    /// Light travelling along `-direction`, i.e. positioned toward `direction`.
    Directional { color: u32, intensity: f32, direction: Vec3 },
}

#[derive(Debug, Clone)]
pub enum Geometry {
    Model(Arc<ModelAsset>),
    Text(Arc<TextMesh>),
}

#[derive(Debug, Clone)]
pub struct SceneNode {
    pub kind: OverlayKind,
    pub geometry: Geometry,
    pub material: Material,
    pub transform: Transform,
}

/// Stable handle to a node in a [`Scene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Default)]
pub struct Scene {
    lights: Vec<Light>,
    nodes: Vec<SceneNode>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// White ambient fill plus one white key light from (1, 1, 1).
    pub fn with_default_lighting() -> Self {
        let mut scene = Self::new();
        scene.add_light(Light::Ambient {
            color: 0xFFFFFF,
            intensity: 1.0,
        });
        scene.add_light(Light::Directional {
            color: 0xFFFFFF,
            intensity: 1.0,
            direction: Vec3::ONE.normalize(),
        });
        scene
    }

    pub fn add_light(&mut self, light: Light) {
        self.lights.push(light);
    }

    pub fn add(&mut self, node: SceneNode) -> NodeId {
        tracing::info!(kind = node.kind.as_str(), "overlay added to scene");
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id.0)
    }

    pub fn nodes(&self) -> &[SceneNode] {
        &self.nodes
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    /// Count of nodes of the given kind.
    pub fn count(&self, kind: OverlayKind) -> usize {
        self.nodes.iter().filter(|n| n.kind == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker_node() -> SceneNode {
        SceneNode {
            kind: OverlayKind::TextLabel,
            geometry: Geometry::Model(Arc::new(ModelAsset::from_mesh(vec![Vec3::ZERO], vec![]))),
            material: Material::shiny_metal(),
            transform: Transform::default(),
        }
    }

    #[test]
    fn test_node_ids_are_stable() {
        let mut scene = Scene::with_default_lighting();
        let a = scene.add(marker_node());
        let b = scene.add(marker_node());
        assert_ne!(a, b);
        scene.node_mut(a).unwrap().transform.position = Vec3::X;
        assert_eq!(scene.node(a).unwrap().transform.position, Vec3::X);
        assert_eq!(scene.node(b).unwrap().transform.position, Vec3::ZERO);
        assert_eq!(scene.count(OverlayKind::TextLabel), 2);
        assert_eq!(scene.lights().len(), 2);
    }

    #[test]
    fn test_transform_matrix() {
        let t = Transform {
            position: Vec3::new(1.0, 2.0, -3.0),
            rotation: Vec3::new(std::f32::consts::FRAC_PI_2, 0.0, 0.0),
            scale: Vec3::splat(0.5),
        };
        let p = t.matrix().transform_point3(Vec3::Y);
        // +Y rotated a quarter turn about X lands on +Z, then scaled and moved
        assert!((p - Vec3::new(1.0, 2.0, -2.5)).length() < 1e-5, "{p:?}");
    }
}
