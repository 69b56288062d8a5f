//! Scene file loading shared by the binary and tests.

pub mod scene;

pub use scene::{MobilityConfig, Scene, SceneLoadError, load_scene, parse_scene};
