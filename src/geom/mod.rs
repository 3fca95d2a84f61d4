mod aabb;
pub use aabb::*;

mod geometry_generator;
pub use geometry_generator::*;

mod model;
pub use model::*;
