//! The frame loop and everything it owns: per-frame resources, the render item registry, scene
//! assets, pass recording and the terrain swap.

mod constants;
pub use constants::*;

mod upload_buffer;
pub use upload_buffer::*;

mod frame_resources;
pub use frame_resources::*;

mod render_item;
pub use render_item::*;

mod scene_assets;
pub use scene_assets::*;

mod scene;
pub(crate) use scene::*;

mod draw_passes;
pub(crate) use draw_passes::*;

mod terrain_swap;
pub(crate) use terrain_swap::*;

mod desc;
pub use desc::*;

#[allow(clippy::module_inception)]
mod renderer;
pub use renderer::*;
