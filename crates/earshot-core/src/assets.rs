//! Overlay readiness tracking.
//!
//! Each overlay object lives in a [`Slot`] that leaves `Unloaded` exactly
//! once: to `Loaded` when its asset arrives (the node is added to the scene
//! at that moment) or to `Failed` when loading gave up. Consumers only ever
//! touch nodes whose slot is `Loaded`.

use crate::model::ModelAsset;
use crate::scene::{Geometry, Material, NodeId, OverlayKind, Scene, SceneNode, Transform};
use crate::text::TextMesh;
use glam::Vec3;
use std::sync::Arc;
use thiserror::Error;

/// Uniform scale applied to both ear clones.
pub const EAR_SCALE: f32 = 0.3;
/// Where the label sits until the first face is tracked.
pub const LABEL_START: Vec3 = Vec3::new(0.0, 1.0, -3.0);

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("failed to read asset: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid glTF: {0}")]
    Gltf(#[from] gltf::Error),
    #[error("model contains no geometry")]
    EmptyModel,
    #[error("font: {0}")]
    Font(String),
    #[error("asset task failed: {0}")]
    Task(String),
}

/// Readiness state of one overlay object.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot<T> {
    Unloaded,
    Loaded(T),
    /// Loading gave up; the object never appears.
    Failed(String),
}

impl<T> Slot<T> {
    pub fn get(&self) -> Option<&T> {
        match self {
            Self::Loaded(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    pub fn is_unloaded(&self) -> bool {
        matches!(self, Self::Unloaded)
    }
}

/// Completion of one asynchronous load path.
#[derive(Debug)]
pub enum AssetEvent {
    /// The shared ear model; both ears are cloned from it.
    EarModel(Result<ModelAsset, AssetError>),
    Label(Result<TextMesh, AssetError>),
}

/// Readiness of the three overlay objects.
#[derive(Debug)]
pub struct OverlayAssets {
    left_ear: Slot<NodeId>,
    right_ear: Slot<NodeId>,
    label: Slot<NodeId>,
}

impl Default for OverlayAssets {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlayAssets {
    pub fn new() -> Self {
        Self {
            left_ear: Slot::Unloaded,
            right_ear: Slot::Unloaded,
            label: Slot::Unloaded,
        }
    }

    pub fn slot(&self, kind: OverlayKind) -> &Slot<NodeId> {
        match kind {
            OverlayKind::LeftEar => &self.left_ear,
            OverlayKind::RightEar => &self.right_ear,
            OverlayKind::TextLabel => &self.label,
        }
    }

    /// Both ear nodes, only when both are loaded.
    pub fn ears(&self) -> Option<(NodeId, NodeId)> {
        Some((*self.left_ear.get()?, *self.right_ear.get()?))
    }

    pub fn label(&self) -> Option<NodeId> {
        self.label.get().copied()
    }

    /// True once no slot is still waiting on a load.
    pub fn settled(&self) -> bool {
        !self.left_ear.is_unloaded() && !self.right_ear.is_unloaded() && !self.label.is_unloaded()
    }

    /// Resolve the slots a completed load feeds, adding nodes to `scene`.
    ///
    /// Returns false when the slots were already resolved; the event is
    /// then dropped without touching the scene.
    pub fn apply(&mut self, event: AssetEvent, scene: &mut Scene) -> bool {
        match event {
            AssetEvent::EarModel(result) => {
                if !self.left_ear.is_unloaded() || !self.right_ear.is_unloaded() {
                    tracing::warn!("duplicate ear model completion ignored");
                    return false;
                }
                match result {
                    Ok(model) => {
                        let model = Arc::new(model);
                        self.left_ear = Slot::Loaded(scene.add(ear_node(OverlayKind::LeftEar, &model)));
                        self.right_ear =
                            Slot::Loaded(scene.add(ear_node(OverlayKind::RightEar, &model)));
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "ear model failed to load; ears disabled");
                        self.left_ear = Slot::Failed(err.to_string());
                        self.right_ear = Slot::Failed(err.to_string());
                    }
                }
            }
            AssetEvent::Label(result) => {
                if !self.label.is_unloaded() {
                    tracing::warn!("duplicate label completion ignored");
                    return false;
                }
                self.label = match result {
                    Ok(mesh) => Slot::Loaded(scene.add(SceneNode {
                        kind: OverlayKind::TextLabel,
                        geometry: Geometry::Text(Arc::new(mesh)),
                        material: Material::shiny_metal(),
                        transform: Transform {
                            position: LABEL_START,
                            ..Transform::default()
                        },
                    })),
                    Err(err) => {
                        tracing::error!(error = %err, "label failed to load; label disabled");
                        Slot::Failed(err.to_string())
                    }
                };
            }
        }
        true
    }
}

fn ear_node(kind: OverlayKind, model: &Arc<ModelAsset>) -> SceneNode {
    SceneNode {
        kind,
        geometry: Geometry::Model(Arc::clone(model)),
        material: Material::shiny_metal(),
        transform: Transform {
            scale: Vec3::splat(EAR_SCALE),
            ..Transform::default()
        },
    }
}

#[cfg(test)]
pub(crate) fn test_model() -> ModelAsset {
    ModelAsset::from_mesh(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![0, 1, 2])
}

#[cfg(test)]
pub(crate) fn test_label() -> TextMesh {
    TextMesh {
        text: "hi".into(),
        mask: crate::text::CoverageMask::new(8, 4),
        size: crate::text::GLYPH_SIZE,
        depth: crate::text::EXTRUDE_DEPTH,
    }
}
