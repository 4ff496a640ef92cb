use anyhow::{Error, Result};
use opencv::core::{Mat, Point, Rect, Scalar};
use opencv::imgproc::{put_text, rectangle, FONT_HERSHEY_SIMPLEX, LINE_8};
use crate::pipeline::emotion_pipeline::emotion_pipeline::EmotionDetection;

const BOX_COLOR: (f64, f64, f64) = (255.0, 0.0, 0.0);
const THICKNESS: i32 = 2;
const FONT_SCALE: f64 = 0.7;
const LABEL_OFFSET: i32 = 10;

pub fn label(detection: &EmotionDetection) -> String {
    format!("{} ({:.2})", detection.emotion.as_str(), detection.confidence)
}

/// Draws every detection's box and label onto a BGR frame.
pub fn annotate_frame(frame: &mut Mat, detections: &[EmotionDetection]) -> Result<(), Error> {
    let color = Scalar::new(BOX_COLOR.0, BOX_COLOR.1, BOX_COLOR.2, 0.0);

    for detection in detections {
        let bbox = &detection.bounding_box;
        let rect = Rect::new(bbox.x, bbox.y, bbox.width, bbox.height);

        rectangle(frame, rect, color, THICKNESS, LINE_8, 0)?;
        put_text(
            frame,
            &label(detection),
            Point::new(bbox.x, bbox.y - LABEL_OFFSET),
            FONT_HERSHEY_SIMPLEX,
            FONT_SCALE,
            color,
            THICKNESS,
            LINE_8,
            false,
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use opencv::core::{Vec3b, CV_8UC3};
    use opencv::prelude::*;
    use crate::pipeline::emotion_pipeline::emotion_pipeline::BoundingBox;
    use crate::pipeline::model_config::config::Emotion;
    use super::*;

    fn detection() -> EmotionDetection {
        EmotionDetection {
            emotion: Emotion::Sad,
            confidence: 0.8765,
            bounding_box: BoundingBox { x: 20, y: 30, width: 40, height: 40 },
        }
    }

    #[test]
    fn test_label() {
        assert_eq!(label(&detection()), "sad (0.88)");
    }

    #[test]
    fn test_annotate_frame_draws_box() {
        let mut frame = Mat::new_rows_cols_with_default(100, 100, CV_8UC3, Scalar::all(0.0)).unwrap();
        annotate_frame(&mut frame, &[detection()]).unwrap();

        let corner = *frame.at_2d::<Vec3b>(30, 20).unwrap();
        assert_eq!(corner[0], 255);
        assert_eq!(corner[2], 0);

        let centre = *frame.at_2d::<Vec3b>(50, 40).unwrap();
        assert_eq!(centre[0], 0);
    }

    #[test]
    fn test_annotate_frame_without_detections() {
        let mut frame = Mat::new_rows_cols_with_default(10, 10, CV_8UC3, Scalar::all(0.0)).unwrap();
        annotate_frame(&mut frame, &[]).unwrap();
        assert!(frame.data_bytes().unwrap().iter().all(|&b| b == 0));
    }
}
