use anyhow::Context;
use clap::Parser;
use imgui::Condition;
use tracing_subscriber::EnvFilter;
use winit::dpi::PhysicalSize;

use pinch_drag::camera::Camera;
use pinch_drag::config::Config;
use pinch_drag::detection::HandTracker;
use pinch_drag::session::Session;
use pinch_drag::window::{self, AutoRenderer, Flow, Ui};
use pinch_drag::*;

const WINDOW_TITLE: &str = "Image";
const WINDOW_MARGIN: u32 = 48;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    quiet_opencv_logs()?;
    let config = Config::parse();
    tracing::debug!(?config, "starting");

    let mut camera = Camera::open_first(config.probe_count, config.width, config.height)
        .context("could not open a camera")?;
    let mut detector = HandTracker::load(
        &config.palm_model,
        &config.landmark_model,
        config.detection_confidence,
    )
    .context("could not load the hand tracking models")?;
    let mut session = Session::from_config(&config);
    let mut feed = image::Image::default();

    let size = PhysicalSize::new(
        config.width.max(1) as u32 + WINDOW_MARGIN,
        config.height.max(1) as u32 + WINDOW_MARGIN,
    );
    window::create(WINDOW_TITLE, size, |ui: &mut Ui, renderer: &mut AutoRenderer| -> Result<Flow> {
        let Some(frame) = camera.read()? else {
            tracing::info!(index = camera.index, "camera stopped delivering frames");
            return Ok(Flow::Exit);
        };
        feed.mat = session.step(&frame, &mut detector)?;

        let content = feed.mat.size()?;
        let image = feed.make(renderer)?;
        ui.window(WINDOW_TITLE)
            .position([0., 0.], Condition::FirstUseEver)
            .content_size(content.to_array())
            .build(|| {
                image.build(ui);
            });
        Ok(Flow::Continue)
    })?;

    tracing::info!("closed");
    Ok(())
}
