//! Webcam capture and preview window backed by OpenCV.

use std::time::Duration;

use mindbeat_core::{Display, FrameSource, MindbeatError, Overlay, Region, Result, VideoFrame};
use opencv::{
    core::{Mat, Point, Rect, Scalar, Vector},
    highgui, imgcodecs, imgproc,
    prelude::*,
    videoio::{VideoCapture, CAP_ANY},
};

pub(crate) fn cv_error(err: opencv::Error) -> MindbeatError {
    MindbeatError::device(err.to_string())
}

/// One BGR frame straight from the camera.
pub struct CameraFrame(Mat);

impl CameraFrame {
    /// JPEG-encodes `region` of the frame.
    pub fn encode_region(&self, region: Region) -> Result<Vec<u8>> {
        if region.is_empty() {
            return Err(MindbeatError::classifier("frame too small to classify"));
        }

        let rect = Rect::new(
            region.x as i32,
            region.y as i32,
            region.width as i32,
            region.height as i32,
        );
        let crop = Mat::roi(&self.0, rect)
            .and_then(|roi| roi.try_clone())
            .map_err(cv_error)?;

        let mut encoded = Vector::<u8>::new();
        let written = imgcodecs::imencode(".jpg", &crop, &mut encoded, &Vector::new())
            .map_err(cv_error)?;
        if !written {
            return Err(MindbeatError::classifier("could not encode frame"));
        }
        Ok(encoded.to_vec())
    }
}

impl VideoFrame for CameraFrame {
    fn width(&self) -> u32 {
        self.0.cols().max(0) as u32
    }

    fn height(&self) -> u32 {
        self.0.rows().max(0) as u32
    }
}

/// Open video capture device. Released on drop.
pub struct Camera {
    capture: VideoCapture,
    index: i32,
}

impl Camera {
    pub fn open(index: i32) -> Result<Self> {
        let capture = VideoCapture::new(index, CAP_ANY).map_err(cv_error)?;
        if !capture.is_opened().map_err(cv_error)? {
            return Err(MindbeatError::device(format!("camera {index} failed to open")));
        }
        tracing::info!(index, "camera opened");
        Ok(Self { capture, index })
    }
}

impl FrameSource for Camera {
    type Frame = CameraFrame;

    fn next_frame(&mut self) -> Result<CameraFrame> {
        let mut frame = Mat::default();
        let grabbed = self.capture.read(&mut frame).map_err(cv_error)?;
        if !grabbed || frame.empty() {
            return Err(MindbeatError::device(format!(
                "camera {} returned no frame",
                self.index
            )));
        }
        Ok(CameraFrame(frame))
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        if let Err(err) = self.capture.release() {
            tracing::warn!(error = %err, "failed to release camera");
        }
        tracing::debug!(index = self.index, "camera released");
    }
}

/// HighGUI window that shows frames and reads the keyboard.
pub struct Window {
    title: String,
}

impl Window {
    pub fn open(title: &str) -> Result<Self> {
        highgui::named_window(title, highgui::WINDOW_AUTOSIZE).map_err(cv_error)?;
        Ok(Self {
            title: title.to_string(),
        })
    }
}

impl Display<CameraFrame> for Window {
    fn render(&mut self, frame: &mut CameraFrame, overlay: &Overlay) -> Result<()> {
        let (blue, green, red) = overlay.color;
        imgproc::put_text(
            &mut frame.0,
            &overlay.text,
            Point::new(overlay.origin.0, overlay.origin.1),
            imgproc::FONT_HERSHEY_SIMPLEX,
            overlay.scale,
            Scalar::new(blue as f64, green as f64, red as f64, 0.0),
            overlay.thickness,
            imgproc::LINE_8,
            false,
        )
        .map_err(cv_error)?;
        highgui::imshow(&self.title, &frame.0).map_err(cv_error)
    }

    fn poll_key(&mut self, timeout: Duration) -> Result<Option<i32>> {
        // wait_key(0) would block forever.
        let millis = timeout.as_millis().clamp(1, i32::MAX as u128) as i32;
        let key = highgui::wait_key(millis).map_err(cv_error)?;
        Ok((key >= 0).then_some(key))
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        if let Err(err) = highgui::destroy_all_windows() {
            tracing::warn!(error = %err, "failed to close preview window");
        }
    }
}
