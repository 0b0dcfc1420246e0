//! Per-tick overlay placement.
//!
//! Position follows tracking and is skipped on frames without a face, so
//! the last placement persists. The ear spin is decorative and runs every
//! tick regardless of tracking.

use crate::assets::OverlayAssets;
use crate::landmarks::Anchors;
use crate::scene::{NodeId, Scene};
use crate::types::DisplaySize;
use glam::Vec3;

/// Horizontal distance of each ear from its anchor, in virtual units.
pub const EAR_X_OFFSET: f32 = 1.2;
/// Horizontal shift of the label from the forehead anchor.
pub const LABEL_X_OFFSET: f32 = -1.0;
/// Depth of the overlay plane.
pub const OVERLAY_Z: f32 = -3.0;
/// Per-tick rotation about x, radians.
pub const LEFT_EAR_SPIN: f32 = -0.01;
pub const RIGHT_EAR_SPIN: f32 = 0.03;

/// What one placement pass wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Placement {
    pub ears_positioned: bool,
    pub label_positioned: bool,
    pub ears_spun: bool,
}

/// Apply one tick of placement to the loaded overlay nodes.
///
/// Unloaded (or failed) objects are skipped silently.
pub fn place(
    anchors: Option<&Anchors>,
    size: DisplaySize,
    assets: &OverlayAssets,
    scene: &mut Scene,
) -> Placement {
    let mut placement = Placement::default();
    let normalized = anchors.map(|a| a.normalized(size));
    let ears = assets.ears();

    if let Some(n) = &normalized {
        if let Some((left, right)) = ears {
            set_position(scene, left, Vec3::new(n.left_ear.x + EAR_X_OFFSET, -n.left_ear.y, OVERLAY_Z));
            set_position(scene, right, Vec3::new(n.right_ear.x - EAR_X_OFFSET, -n.right_ear.y, OVERLAY_Z));
            placement.ears_positioned = true;
        }
        if let Some(label) = assets.label() {
            // label keeps the pixel-space y direction
            set_position(scene, label, Vec3::new(n.forehead.x + LABEL_X_OFFSET, n.forehead.y, OVERLAY_Z));
            placement.label_positioned = true;
        }
    }

    if let Some((left, right)) = ears {
        spin(scene, left, LEFT_EAR_SPIN);
        spin(scene, right, RIGHT_EAR_SPIN);
        placement.ears_spun = true;
    }

    placement
}

fn set_position(scene: &mut Scene, id: NodeId, position: Vec3) {
    if let Some(node) = scene.node_mut(id) {
        node.transform.position = position;
    }
}

fn spin(scene: &mut Scene, id: NodeId, delta: f32) {
    if let Some(node) = scene.node_mut(id) {
        node.transform.rotation.x += delta;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{test_label, test_model, AssetEvent, LABEL_START};
    use crate::normalize::normalize;
    use crate::scene::Transform;
    use crate::types::LandmarkPoint;

    const SIZE: DisplaySize = DisplaySize::new(1280, 720);

    fn anchors() -> Anchors {
        Anchors {
            left_ear: LandmarkPoint::new(500.0, 300.0),
            right_ear: LandmarkPoint::new(780.0, 310.0),
            forehead: LandmarkPoint::new(640.0, 250.0),
        }
    }

    fn loaded(ears: bool, label: bool) -> (OverlayAssets, Scene) {
        let mut scene = Scene::with_default_lighting();
        let mut assets = OverlayAssets::new();
        if ears {
            assets.apply(AssetEvent::EarModel(Ok(test_model())), &mut scene);
        }
        if label {
            assets.apply(AssetEvent::Label(Ok(test_label())), &mut scene);
        }
        (assets, scene)
    }

    fn transform(scene: &Scene, id: NodeId) -> Transform {
        scene.node(id).unwrap().transform
    }

    #[test]
    fn test_ears_follow_anchors_exactly() {
        let (assets, mut scene) = loaded(true, false);
        let a = anchors();
        let placement = place(Some(&a), SIZE, &assets, &mut scene);
        assert!(placement.ears_positioned && placement.ears_spun);

        let (left, right) = assets.ears().unwrap();
        assert_eq!(
            transform(&scene, left).position,
            Vec3::new(
                normalize(a.left_ear.x, SIZE.width as f32) + 1.2,
                -normalize(a.left_ear.y, SIZE.height as f32),
                -3.0
            )
        );
        assert_eq!(
            transform(&scene, right).position,
            Vec3::new(
                normalize(a.right_ear.x, SIZE.width as f32) - 1.2,
                -normalize(a.right_ear.y, SIZE.height as f32),
                -3.0
            )
        );
    }

    #[test]
    fn test_label_follows_forehead() {
        let (assets, mut scene) = loaded(false, true);
        let a = anchors();
        let placement = place(Some(&a), SIZE, &assets, &mut scene);
        assert!(placement.label_positioned);
        assert!(!placement.ears_positioned && !placement.ears_spun);
        assert_eq!(
            transform(&scene, assets.label().unwrap()).position,
            Vec3::new(
                normalize(a.forehead.x, SIZE.width as f32) - 1.0,
                normalize(a.forehead.y, SIZE.height as f32),
                -3.0
            )
        );
    }

    #[test]
    fn test_no_face_keeps_positions_and_spins() {
        let (assets, mut scene) = loaded(true, true);
        place(Some(&anchors()), SIZE, &assets, &mut scene);
        let (left, right) = assets.ears().unwrap();
        let label = assets.label().unwrap();
        let before = (transform(&scene, left), transform(&scene, right), transform(&scene, label));

        let placement = place(None, SIZE, &assets, &mut scene);
        assert_eq!(placement, Placement { ears_positioned: false, label_positioned: false, ears_spun: true });

        let (l, r, t) = (transform(&scene, left), transform(&scene, right), transform(&scene, label));
        assert_eq!(l.position, before.0.position);
        assert_eq!(r.position, before.1.position);
        assert_eq!(t, before.2);
        assert_eq!(l.rotation.x, before.0.rotation.x + LEFT_EAR_SPIN);
        assert_eq!(r.rotation.x, before.1.rotation.x + RIGHT_EAR_SPIN);
        assert_eq!(l.rotation.y, 0.0);
    }

    #[test]
    fn test_unloaded_label_untouched() {
        let (assets, mut scene) = loaded(true, false);
        place(Some(&anchors()), SIZE, &assets, &mut scene);
        place(None, SIZE, &assets, &mut scene);
        assert_eq!(assets.label(), None);
        assert_eq!(scene.nodes().len(), 2);
    }

    #[test]
    fn test_nothing_loaded_is_noop() {
        let (assets, mut scene) = loaded(false, false);
        assert_eq!(place(Some(&anchors()), SIZE, &assets, &mut scene), Placement::default());
        assert!(scene.nodes().is_empty());
    }

    #[test]
    fn test_label_start_survives_faceless_ticks() {
        let (assets, mut scene) = loaded(true, true);
        for _ in 0..5 {
            place(None, SIZE, &assets, &mut scene);
        }
        assert_eq!(transform(&scene, assets.label().unwrap()).position, LABEL_START);
        let (left, _) = assets.ears().unwrap();
        assert!((transform(&scene, left).rotation.x - 5.0 * LEFT_EAR_SPIN).abs() < 1e-6);
    }

    #[test]
    fn test_zero_viewport_propagates_nan() {
        let (assets, mut scene) = loaded(true, false);
        place(Some(&anchors()), DisplaySize::new(0, 0), &assets, &mut scene);
        let (left, _) = assets.ears().unwrap();
        assert!(!transform(&scene, left).position.x.is_finite());
    }
}
