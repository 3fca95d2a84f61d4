use anyhow::Result;
use glam::Vec3;
use re_terra::{
    gameplay::Camera,
    gpu::{CompletionMode, Gpu, HeadlessGpu},
    renderer::{Renderer, RendererDesc, RendererError},
    terrain::TerrainDesc,
    util::{ClockSource, FrameClock, FRAME_TIMINGS},
    vkn::{VulkanContextDesc, VulkanGpu},
};
use std::{path::PathBuf, time::Duration};

const FRAME_COUNT: u64 = 600;
const REGENERATE_EVERY: u64 = 150;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let desc = RendererDesc {
        skull_model: Some(PathBuf::from("assets/models/skull.txt")),
        fence_timeout: Some(Duration::from_secs(5)),
        ..Default::default()
    };

    match VulkanGpu::new(&VulkanContextDesc::default()) {
        Ok(gpu) => run(gpu, desc),
        Err(err) => {
            log::warn!("vulkan unavailable ({}), falling back to the headless gpu", err);
            run(HeadlessGpu::new(CompletionMode::OnDemand), desc)
        }
    }
}

fn run<G: Gpu>(gpu: G, desc: RendererDesc) -> Result<()> {
    let [width, height] = desc.render_target_size;
    let mut renderer = Renderer::new(gpu, desc)?;
    let mut camera = Camera::default();
    camera.set_aspect_ratio(width as f32 / height as f32);
    let mut clock = FrameClock::new(ClockSource::Fixed(Duration::from_secs_f64(1.0 / 60.0)));

    for frame in 1..=FRAME_COUNT {
        let dt = clock.tick();
        camera.orbit(Vec3::ZERO, 120.0, 60.0, clock.total_time() * 0.2);

        if frame % REGENERATE_EVERY == 0 {
            renderer.request_terrain_regeneration(TerrainDesc {
                seed: (frame / REGENERATE_EVERY) as u32,
                ..renderer.terrain_desc().clone()
            });
        }

        match renderer.advance_frame(dt, &camera) {
            Ok(()) => {}
            // the previous terrain is still in place, so the session can go on
            Err(RendererError::Terrain(err)) => {
                log::error!("frame {} skipped: {}", frame, err);
                continue;
            }
            Err(err) => return Err(err.into()),
        }
        renderer.submit_frame()?;
    }

    log::info!(
        "rendered {} frames on {}",
        renderer.submission_count(),
        renderer.gpu().name()
    );
    if let Ok(timings) = FRAME_TIMINGS.lock() {
        log::info!("frame stage timings\n{}", timings.table());
    }
    Ok(())
}
