mod camera;
pub use camera::*;
