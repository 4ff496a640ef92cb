use anyhow::{bail, Result};
use emotion_detection_svc::config::parameter;
use emotion_detection_svc::config::settings::{Camera, SETTINGS};
use emotion_detection_svc::logger::logger::setup_logger;
use emotion_detection_svc::pipeline::emotion_pipeline::emotion_pipeline::EmotionPipeline;
use emotion_detection_svc::pipeline::utils::draw::annotate_frame;
use log::{error, info, warn};
use opencv::core::Mat;
use opencv::prelude::*;
use opencv::{highgui, videoio};

const QUIT_KEY: i32 = 'q' as i32;

fn main() {
    parameter::init();
    setup_logger(SETTINGS.logger.as_ref());

    let emotion_pipeline = match EmotionPipeline::load(&SETTINGS.model) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("failed to load emotion detection models: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&emotion_pipeline, &SETTINGS.camera) {
        error!("live emotion detection stopped: {e:?}");
        std::process::exit(1);
    }
}

fn run(emotion_pipeline: &EmotionPipeline, camera: &Camera) -> Result<()> {
    let mut cam = videoio::VideoCapture::new(camera.device_index, videoio::CAP_ANY)?;
    if !cam.is_opened()? {
        bail!("unable to open camera {}", camera.device_index);
    }
    highgui::named_window(&camera.window_name, highgui::WINDOW_AUTOSIZE)?;
    info!("streaming from camera {}, press q to quit", camera.device_index);

    let mut frame = Mat::default();
    let result = loop {
        match cam.read(&mut frame) {
            Ok(true) if !frame.empty() => {}
            Ok(_) => {
                error!("Failed to capture frame");
                break Ok(());
            }
            Err(e) => {
                error!("Failed to capture frame: {e}");
                break Ok(());
            }
        }

        match emotion_pipeline.detect(&frame) {
            Ok(detections) => {
                if let Err(e) = annotate_frame(&mut frame, &detections) {
                    warn!("failed to annotate frame: {e}");
                }
            }
            Err(e) => warn!("detection error: {e}"),
        }

        if let Err(e) = highgui::imshow(&camera.window_name, &frame) {
            break Err(e.into());
        }
        match highgui::wait_key(1) {
            Ok(key) if key & 0xFF == QUIT_KEY => break Ok(()),
            Ok(_) => {}
            Err(e) => break Err(e.into()),
        }
    };

    cam.release()?;
    highgui::destroy_all_windows()?;
    info!("camera released");
    result
}
