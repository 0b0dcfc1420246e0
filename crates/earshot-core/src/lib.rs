//! earshot-core: face landmark tracking and overlay placement.
//!
//! Turns per-frame face detections into transforms for two ear models and a
//! text label, and holds the scene, camera and viewport state a renderer
//! draws from. Detection runs through ONNX Runtime (SCRFD boxes plus a
//! 68-point landmark regressor).

pub mod assets;
pub mod camera;
pub mod landmarks;
mod landmarker;
pub mod model;
pub mod normalize;
pub mod placement;
pub mod render;
pub mod scene;
mod scrfd;
pub mod text;
pub mod tracker;
pub mod types;
pub mod viewport;

pub use assets::{AssetError, AssetEvent, OverlayAssets, Slot};
pub use camera::PerspectiveCamera;
pub use landmarks::{extract_anchors, resize_results, Anchors};
pub use normalize::{normalize, NormalizedPoint};
pub use placement::{place, Placement};
pub use render::{OverlayCanvas, RenderError, Renderer};
pub use scene::{OverlayKind, Scene};
pub use tracker::{DetectorError, FaceTracker, TrackerModels};
pub use types::{Detection, DisplaySize, FaceBox, FaceLandmarks, LandmarkPoint};
pub use viewport::{Viewport, ViewportSource};
