//! Umbra Core - scene description, loaders and navigation math
//!
//! Everything here is GPU-free: the loaders turn scene files into a
//! [`SceneInfo`] value, and the renderer builds its GPU state from that value.

pub mod bounds;
pub mod camera;
pub mod description;
pub mod error;
pub mod loader;

pub use bounds::BBox;
pub use camera::Camera;
pub use description::{
    CameraInfo, Instance, LightInfo, LightKind, Node, Polygon, PolymeshInfo, SceneInfo,
};
pub use error::{Error, Result};
