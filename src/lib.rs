//! A frames-in-flight renderer for a procedurally generated terrain with animated water.
//!
//! The CPU records up to `frame_count` frames ahead of the GPU. Every piece of per-frame data
//! lives in a ring of frame slots guarded by a monotonically increasing fence, and the terrain
//! can be regenerated at runtime without tearing down the renderer.

pub mod gameplay;
pub mod geom;
pub mod gpu;
pub mod renderer;
pub mod terrain;
pub mod util;
pub mod vkn;
pub mod waves;
