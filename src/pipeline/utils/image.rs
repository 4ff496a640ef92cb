use anyhow::{Error, Result};
use opencv::core::{Mat, Rect, Vector};
use opencv::imgcodecs::{imdecode, IMREAD_COLOR};
use opencv::imgproc::{cvt_color_def, COLOR_BGR2GRAY, COLOR_BGRA2GRAY};
use opencv::prelude::*;

/// Decodes an encoded image (PNG, JPEG, ...) into a 3-channel BGR `Mat`.
pub fn byte_data_to_opencv(im_bytes: &[u8]) -> Result<Mat, Error> {
    if im_bytes.is_empty() {
        return Err(Error::msg("image buffer is empty"))
    }

    let buffer = Vector::<u8>::from_slice(im_bytes);
    let image = match imdecode(&buffer, IMREAD_COLOR) {
        Ok(image) => image,
        Err(e) => return Err(Error::from(e)),
    };

    // imdecode signals undecodable input with an empty Mat
    if image.empty() {
        return Err(Error::msg("buffer does not contain a decodable image"))
    }

    Ok(image)
}

pub fn to_grayscale(image: &Mat) -> Result<Mat, Error> {
    let code = match image.channels() {
        1 => return Ok(image.try_clone()?),
        4 => COLOR_BGRA2GRAY,
        _ => COLOR_BGR2GRAY,
    };

    let mut gray = Mat::default();
    match cvt_color_def(image, &mut gray, code) {
        Ok(_) => {}
        Err(e) => return Err(Error::from(e)),
    };
    Ok(gray)
}

/// Copies the `rect` region out of `image` into its own continuous `Mat`.
pub fn crop(image: &Mat, rect: Rect) -> Result<Mat, Error> {
    let roi = Mat::roi(image, rect)?;
    Ok(roi.try_clone()?)
}

#[cfg(test)]
mod tests {
    use opencv::core::{Scalar, CV_8UC3};
    use opencv::imgcodecs::imencode;
    use super::*;

    fn encoded_png(rows: i32, cols: i32) -> Vec<u8> {
        let image = Mat::new_rows_cols_with_default(rows, cols, CV_8UC3, Scalar::new(30.0, 60.0, 90.0, 0.0)).unwrap();
        let mut buffer = Vector::<u8>::new();
        imencode(".png", &image, &mut buffer, &Vector::new()).unwrap();
        buffer.to_vec()
    }

    #[test]
    fn test_byte_data_to_opencv() {
        let image = byte_data_to_opencv(&encoded_png(10, 20)).unwrap();
        assert_eq!(image.rows(), 10);
        assert_eq!(image.cols(), 20);
        assert_eq!(image.channels(), 3);
    }

    #[test]
    fn test_byte_data_to_opencv_rejects_garbage() {
        assert!(byte_data_to_opencv(b"this is not an image").is_err());
        assert!(byte_data_to_opencv(&[]).is_err());
    }

    #[test]
    fn test_to_grayscale_and_crop() {
        let image = byte_data_to_opencv(&encoded_png(10, 10)).unwrap();
        let gray = to_grayscale(&image).unwrap();
        assert_eq!(gray.channels(), 1);

        let face = crop(&gray, Rect::new(2, 3, 4, 5)).unwrap();
        assert_eq!((face.cols(), face.rows()), (4, 5));
        assert!(face.is_continuous());
    }
}
