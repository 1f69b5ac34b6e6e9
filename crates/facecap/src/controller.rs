//! Presentation-side dispatch of capture outcomes.

use crate::error::{CaptureError, ErrorKind};
use crate::pipeline::FinalImage;
use crate::session::FaceCaptureSession;

/// Callbacks the presentation layer implements.
pub trait CaptureListener: Send + Sync {
    /// Ownership of the image passes to the listener.
    fn on_image_captured(&self, image: FinalImage);
    fn on_capture_error(&self, kind: ErrorKind, message: &str);
    fn on_permission_denied(&self);
    fn on_back_pressed(&self) {}
    /// Transient prompt shown when the face left the frame at capture time.
    fn on_no_face_prompt(&self) {}
}

/// Camera access permission, as reported by the host platform.
pub trait CameraPermission {
    fn is_granted(&self) -> bool;
    /// Ask the user for access. Returns whether access is granted afterwards.
    fn request(&mut self) -> bool;
}

/// Drives a [`FaceCaptureSession`] on behalf of a screen and routes the
/// outcome to a [`CaptureListener`].
pub struct FaceCaptureController<L: CaptureListener> {
    session: FaceCaptureSession,
    listener: L,
}

impl<L: CaptureListener> FaceCaptureController<L> {
    pub fn new(session: FaceCaptureSession, listener: L) -> Self {
        Self { session, listener }
    }

    pub fn session(&self) -> &FaceCaptureSession {
        &self.session
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    /// Request camera access if needed. Calls `on_permission_denied` and
    /// returns false if access is still missing.
    pub fn ensure_permission(&self, permission: &mut dyn CameraPermission) -> bool {
        if permission.is_granted() || permission.request() {
            return true;
        }
        tracing::info!("camera permission denied");
        self.listener.on_permission_denied();
        false
    }

    /// Capture if the gate allows it. Returns true when an image was
    /// delivered to the listener.
    ///
    /// On success the session is shut down before the image is handed over.
    pub async fn capture(&self) -> bool {
        if !self.session.can_capture() {
            tracing::debug!("capture requested without a detected face; ignored");
            return false;
        }
        match self.session.capture().await {
            Ok(image) => {
                self.session.shutdown();
                self.listener.on_image_captured(image);
                true
            }
            Err(CaptureError::NoFaceAtCapture) => {
                self.listener.on_no_face_prompt();
                false
            }
            Err(CaptureError::Busy) => false,
            Err(e) => {
                tracing::error!(error = %e, "capture failed");
                self.listener.on_capture_error(e.kind(), &e.user_message());
                false
            }
        }
    }

    /// Leave the screen: release the camera and notify the listener.
    pub fn back(&self) {
        self.session.shutdown();
        self.listener.on_back_pressed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineOptions;
    use facecap_core::{BoundingBox, DetectorError, FaceDetector};
    use facecap_hw::{CameraError, FrameSource, PixelFormat, Plane, RawFrame};
    use image::DynamicImage;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Captured(u32, u32),
        Error(ErrorKind, String),
        Denied,
        Back,
        NoFace,
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Event>>);

    impl Recorder {
        fn events(&self) -> Vec<Event> {
            self.0.lock().unwrap().clone()
        }
    }

    impl CaptureListener for Recorder {
        fn on_image_captured(&self, image: FinalImage) {
            self.0.lock().unwrap().push(Event::Captured(image.width(), image.height()));
        }
        fn on_capture_error(&self, kind: ErrorKind, message: &str) {
            self.0.lock().unwrap().push(Event::Error(kind, message.to_string()));
        }
        fn on_permission_denied(&self) {
            self.0.lock().unwrap().push(Event::Denied);
        }
        fn on_back_pressed(&self) {
            self.0.lock().unwrap().push(Event::Back);
        }
        fn on_no_face_prompt(&self) {
            self.0.lock().unwrap().push(Event::NoFace);
        }
    }

    /// Face in every preview frame; `still_face` decides the still.
    struct PreviewOnly {
        still_face: Arc<AtomicBool>,
    }

    impl FaceDetector for PreviewOnly {
        fn detect(&mut self, image: &DynamicImage) -> Result<Vec<BoundingBox>, DetectorError> {
            // Stills are twice the preview width in these tests.
            if image.width() > 32 && !self.still_face.load(Ordering::SeqCst) {
                return Ok(Vec::new());
            }
            Ok(vec![BoundingBox {
                x: 2.0,
                y: 2.0,
                width: 10.0,
                height: 10.0,
                confidence: 0.9,
            }])
        }
    }

    struct Source {
        still: Result<(), ()>,
    }

    fn grey(width: u32, height: u32) -> RawFrame {
        let data = vec![50u8; (width * height) as usize];
        RawFrame::new(width, height, PixelFormat::Grey, vec![Plane::packed(data, width as usize)])
    }

    impl FrameSource for Source {
        fn next_preview(&mut self) -> Result<RawFrame, CameraError> {
            std::thread::sleep(Duration::from_millis(5));
            Ok(grey(32, 24))
        }
        fn capture_still(&mut self) -> Result<RawFrame, CameraError> {
            match self.still {
                Ok(()) => Ok(grey(64, 48)),
                Err(()) => Err(CameraError::CaptureFailed("sensor timeout".into())),
            }
        }
        fn shutdown(&mut self) {}
    }

    async fn controller(
        still_face: bool,
        still: Result<(), ()>,
    ) -> FaceCaptureController<Recorder> {
        let detector = PreviewOnly {
            still_face: Arc::new(AtomicBool::new(still_face)),
        };
        let session = FaceCaptureSession::new(Box::new(detector), PipelineOptions::default());
        session.bind(Box::new(Source { still })).unwrap();
        let mut rx = session.subscribe();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.face_detected))
            .await
            .unwrap()
            .unwrap();
        FaceCaptureController::new(session, Recorder::default())
    }

    #[tokio::test]
    async fn test_successful_capture_delivers_and_shuts_down() {
        let c = controller(true, Ok(())).await;
        assert!(c.capture().await);
        // Box (2,2)-(12,12) padded by 2 on each side.
        assert_eq!(c.listener().events(), vec![Event::Captured(14, 14)]);
        assert!(c.session().is_shut_down());
    }

    #[tokio::test]
    async fn test_no_face_routes_to_prompt() {
        let c = controller(false, Ok(())).await;
        assert!(!c.capture().await);
        assert_eq!(c.listener().events(), vec![Event::NoFace]);
        assert!(!c.session().is_shut_down());
        assert!(!c.session().is_detection_paused());
    }

    #[tokio::test]
    async fn test_platform_failure_reports_message() {
        let c = controller(true, Err(())).await;
        assert!(!c.capture().await);
        assert_eq!(
            c.listener().events(),
            vec![Event::Error(
                ErrorKind::PlatformCaptureFailure,
                "Failed to capture image: capture failed: sensor timeout".into()
            )]
        );
    }

    #[tokio::test]
    async fn test_capture_without_face_is_ignored() {
        let detector = PreviewOnly { still_face: Arc::new(AtomicBool::new(true)) };
        let session = FaceCaptureSession::new(Box::new(detector), PipelineOptions::default());
        let c = FaceCaptureController::new(session, Recorder::default());
        assert!(!c.capture().await);
        assert!(c.listener().events().is_empty());
    }

    struct Permission {
        granted: bool,
        grant_on_request: bool,
        requests: usize,
    }

    impl CameraPermission for Permission {
        fn is_granted(&self) -> bool {
            self.granted
        }
        fn request(&mut self) -> bool {
            self.requests += 1;
            self.granted = self.grant_on_request;
            self.granted
        }
    }

    #[tokio::test]
    async fn test_permission_flow() {
        let detector = PreviewOnly { still_face: Arc::new(AtomicBool::new(true)) };
        let session = FaceCaptureSession::new(Box::new(detector), PipelineOptions::default());
        let c = FaceCaptureController::new(session, Recorder::default());

        let mut granted = Permission {
            granted: true,
            grant_on_request: false,
            requests: 0,
        };
        assert!(c.ensure_permission(&mut granted));
        assert_eq!(granted.requests, 0);

        let mut prompt = Permission {
            granted: false,
            grant_on_request: true,
            requests: 0,
        };
        assert!(c.ensure_permission(&mut prompt));
        assert_eq!(prompt.requests, 1);

        let mut denied = Permission {
            granted: false,
            grant_on_request: false,
            requests: 0,
        };
        assert!(!c.ensure_permission(&mut denied));
        assert_eq!(c.listener().events(), vec![Event::Denied]);

        c.back();
        assert_eq!(c.listener().events(), vec![Event::Denied, Event::Back]);
        assert!(c.session().is_shut_down());
    }
}
