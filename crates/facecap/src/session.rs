//! The capture session: the surface a presentation layer drives.

use crate::engine::{self, CameraHandle, CaptureSlot, VisionHandle};
use crate::error::CaptureError;
use crate::gate::{CaptureGate, GateState};
use crate::pipeline::{FinalImage, PipelineOptions};
use facecap_core::{Detection, FaceDetector};
use facecap_hw::{FrameSource, RawFrame};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use tokio::sync::watch;

/// Live face capture over one detector and (once bound) one frame source.
///
/// Dropping the session shuts it down.
pub struct FaceCaptureSession {
    gate: Arc<CaptureGate>,
    vision: VisionHandle,
    camera: Mutex<Option<CameraHandle>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    /// Held by a [`CaptureSlot`] from the start of a capture until the
    /// vision thread is done with its still.
    capturing: Arc<AtomicBool>,
    shut_down: AtomicBool,
}

/// Resumes the gate when a capture resolves, including when its future is
/// dropped early.
struct ResumeOnDrop<'a>(&'a CaptureGate);

impl Drop for ResumeOnDrop<'_> {
    fn drop(&mut self) {
        self.0.resume();
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FaceCaptureSession {
    /// Start the vision thread. Frames are only analyzed once a source is
    /// bound with [`bind`](Self::bind) or handed in through [`analyze`](Self::analyze).
    pub fn new(detector: Box<dyn FaceDetector>, options: PipelineOptions) -> Self {
        let gate = Arc::new(CaptureGate::new());
        let (vision, thread) = engine::spawn_vision(detector, gate.clone(), options);
        Self {
            gate,
            vision,
            camera: Mutex::new(None),
            threads: Mutex::new(vec![thread]),
            capturing: Arc::new(AtomicBool::new(false)),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Start pumping preview frames from `source`. Replaces any previously
    /// bound source.
    pub fn bind(&self, source: Box<dyn FrameSource>) -> Result<(), CaptureError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(CaptureError::NotInitialized);
        }
        let (camera, thread) = engine::spawn_camera(source, self.vision.clone());
        if let Some(previous) = lock(&self.camera).replace(camera) {
            tracing::info!("replacing bound frame source");
            previous.shutdown();
        }
        lock(&self.threads).push(thread);
        Ok(())
    }

    pub fn is_bound(&self) -> bool {
        lock(&self.camera).is_some()
    }

    pub fn is_face_detected(&self) -> bool {
        self.gate.is_face_detected()
    }

    /// Watch the gate state.
    pub fn subscribe(&self) -> watch::Receiver<GateState> {
        self.gate.subscribe()
    }

    /// True when a face is present and no capture is running.
    pub fn can_capture(&self) -> bool {
        !self.shut_down.load(Ordering::Acquire)
            && !self.capturing.load(Ordering::Acquire)
            && self.gate.is_face_detected()
    }

    pub fn pause_detection(&self) {
        self.gate.pause();
    }

    pub fn resume_detection(&self) {
        self.gate.resume();
    }

    pub fn is_detection_paused(&self) -> bool {
        self.gate.is_paused()
    }

    /// Analyze one frame supplied by the caller.
    ///
    /// Returns `None` if an analysis is already running (the frame is
    /// dropped) or the session is shut down.
    pub async fn analyze(&self, frame: RawFrame) -> Option<Detection> {
        if self.shut_down.load(Ordering::Acquire) {
            return None;
        }
        self.vision.analyze(frame).await
    }

    /// Capture a still, verify the face on it, and post-process it.
    ///
    /// Detection is paused for the duration and resumed however the capture
    /// ends. A call made while another capture is running fails with
    /// [`CaptureError::Busy`]; a capture whose future was dropped keeps
    /// counting as running until the vision thread has finished with it.
    pub async fn capture(&self) -> Result<FinalImage, CaptureError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(CaptureError::NotInitialized);
        }
        let camera = lock(&self.camera)
            .clone()
            .ok_or(CaptureError::NotInitialized)?;

        let Some(slot) = CaptureSlot::acquire(&self.capturing) else {
            tracing::debug!("capture rejected; another capture is in flight");
            return Err(CaptureError::Busy);
        };
        let _resume = ResumeOnDrop(&self.gate);

        self.gate.pause();
        let live = self.gate.live_bounds();
        tracing::info!(live = live.is_some(), "capture started");

        let frame = camera.capture_still().await?;
        let result = self.vision.capture(frame, live, slot).await;
        if let Err(e) = &result {
            tracing::info!(error = %e, "capture failed");
        }
        result
    }

    /// Stop both threads and release the frame source. Safe to call more
    /// than once.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(camera) = lock(&self.camera).take() {
            camera.shutdown();
        }
        self.vision.shutdown();

        let threads: Vec<_> = lock(&self.threads).drain(..).collect();
        for thread in threads {
            if thread.join().is_err() {
                tracing::warn!("worker thread panicked");
            }
        }
        self.gate.reset();
        tracing::info!("capture session shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl Drop for FaceCaptureSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use facecap_core::{BoundingBox, DetectorError, FaceRect};
    use facecap_hw::{CameraError, PixelFormat, Plane};
    use image::DynamicImage;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Reports one fixed face while `present` is set.
    struct Toggle {
        present: Arc<AtomicBool>,
        face: BoundingBox,
    }

    impl FaceDetector for Toggle {
        fn detect(&mut self, _image: &DynamicImage) -> Result<Vec<BoundingBox>, DetectorError> {
            if self.present.load(Ordering::SeqCst) {
                Ok(vec![self.face.clone()])
            } else {
                Ok(Vec::new())
            }
        }
    }

    /// Reports a face after a fixed delay.
    struct Slow(Duration);

    impl FaceDetector for Slow {
        fn detect(&mut self, _image: &DynamicImage) -> Result<Vec<BoundingBox>, DetectorError> {
            std::thread::sleep(self.0);
            Ok(vec![face_box()])
        }
    }

    fn face_box() -> BoundingBox {
        BoundingBox {
            x: 100.0,
            y: 100.0,
            width: 200.0,
            height: 200.0,
            confidence: 0.9,
        }
    }

    fn detector(present: bool) -> (Box<dyn FaceDetector>, Arc<AtomicBool>) {
        let flag = Arc::new(AtomicBool::new(present));
        let toggle = Toggle {
            present: flag.clone(),
            face: face_box(),
        };
        (Box::new(toggle), flag)
    }

    #[derive(Clone, Default)]
    struct Counters {
        produced: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
        shutdowns: Arc<AtomicUsize>,
    }

    struct FakeSource {
        width: u32,
        height: u32,
        rotation: i32,
        still_delay: Duration,
        counters: Counters,
    }

    impl FakeSource {
        fn new(width: u32, height: u32, counters: &Counters) -> Self {
            Self {
                width,
                height,
                rotation: 0,
                still_delay: Duration::ZERO,
                counters: counters.clone(),
            }
        }

        fn frame(&self) -> RawFrame {
            self.counters.produced.fetch_add(1, Ordering::SeqCst);
            let released = self.counters.released.clone();
            let data = vec![100u8; (self.width * self.height) as usize];
            RawFrame::new(
                self.width,
                self.height,
                PixelFormat::Grey,
                vec![Plane::packed(data, self.width as usize)],
            )
            .with_rotation(self.rotation)
            .on_release(move || {
                released.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    impl FrameSource for FakeSource {
        fn next_preview(&mut self) -> Result<RawFrame, CameraError> {
            std::thread::sleep(Duration::from_millis(5));
            Ok(self.frame())
        }

        fn capture_still(&mut self) -> Result<RawFrame, CameraError> {
            std::thread::sleep(self.still_delay);
            Ok(self.frame())
        }

        fn shutdown(&mut self) {
            self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn grey(width: u32, height: u32) -> RawFrame {
        RawFrame::new(
            width,
            height,
            PixelFormat::Grey,
            vec![Plane::packed(vec![0; (width * height) as usize], width as usize)],
        )
    }

    #[tokio::test]
    async fn test_paused_detection_ignores_results() {
        let (det, _) = detector(true);
        let session = FaceCaptureSession::new(det, PipelineOptions::default());

        session.pause_detection();
        for _ in 0..5 {
            let detection = session.analyze(grey(640, 480)).await.unwrap();
            assert!(detection.present);
        }
        assert!(!session.is_face_detected());

        session.resume_detection();
        session.analyze(grey(640, 480)).await.unwrap();
        assert!(session.is_face_detected());
        assert!(session.can_capture());
    }

    #[tokio::test]
    async fn test_analysis_is_single_flight() {
        let (det, _) = detector(true);
        let session = FaceCaptureSession::new(det, PipelineOptions::default());
        let (first, second) = tokio::join!(
            session.analyze(grey(640, 480)),
            session.analyze(grey(640, 480))
        );
        assert!(first.is_some());
        assert!(second.is_none());

        // The slot frees once the result is delivered.
        assert!(session.analyze(grey(640, 480)).await.is_some());
    }

    #[tokio::test]
    async fn test_capture_before_bind_is_not_initialized() {
        let (det, _) = detector(true);
        let session = FaceCaptureSession::new(det, PipelineOptions::default());
        let err = session.capture().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotInitialized);
    }

    #[tokio::test]
    async fn test_capture_rotated_still() {
        let (det, _) = detector(true);
        let counters = Counters::default();
        let mut source = FakeSource::new(640, 480, &counters);
        source.rotation = 90;

        let session = FaceCaptureSession::new(det, PipelineOptions::default());
        session.bind(Box::new(source)).unwrap();

        let image = session.capture().await.unwrap();
        assert_eq!((image.width(), image.height()), (280, 280));
        assert_eq!(image.face, Some(FaceRect::new(60, 60, 340, 340)));
        assert!(!session.is_detection_paused());
    }

    #[tokio::test]
    async fn test_no_face_at_capture_resumes_gate() {
        let (det, _) = detector(false);
        let counters = Counters::default();
        let session = FaceCaptureSession::new(det, PipelineOptions::default());
        session.bind(Box::new(FakeSource::new(64, 48, &counters))).unwrap();

        let err = session.capture().await.unwrap_err();
        assert!(matches!(err, CaptureError::NoFaceAtCapture));
        assert!(!session.is_detection_paused());
        assert!(!session.can_capture());
    }

    #[tokio::test]
    async fn test_second_capture_is_rejected() {
        let (det, _) = detector(true);
        let counters = Counters::default();
        let mut source = FakeSource::new(640, 480, &counters);
        source.still_delay = Duration::from_millis(50);

        let session = FaceCaptureSession::new(det, PipelineOptions::default());
        session.bind(Box::new(source)).unwrap();

        let (first, second) = tokio::join!(session.capture(), session.capture());
        assert!(first.is_ok());
        assert!(matches!(second, Err(CaptureError::Busy)));

        // A later capture is accepted again.
        assert!(session.capture().await.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_and_releases_frames() {
        let (det, _) = detector(true);
        let counters = Counters::default();
        let session = FaceCaptureSession::new(det, PipelineOptions::default());
        session.bind(Box::new(FakeSource::new(64, 48, &counters))).unwrap();

        session.capture().await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        session.shutdown();
        session.shutdown();

        assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 1);
        assert!(counters.produced.load(Ordering::SeqCst) > 1);
        assert_eq!(
            counters.produced.load(Ordering::SeqCst),
            counters.released.load(Ordering::SeqCst)
        );
        assert!(!session.is_face_detected());
        assert!(matches!(session.capture().await, Err(CaptureError::NotInitialized)));
        assert!(session.bind(Box::new(FakeSource::new(8, 8, &counters))).is_err());
    }

    #[tokio::test]
    async fn test_live_analysis_updates_observers() {
        let (det, present) = detector(false);
        let counters = Counters::default();
        let session = FaceCaptureSession::new(det, PipelineOptions::default());
        let mut rx = session.subscribe();
        session.bind(Box::new(FakeSource::new(640, 480, &counters))).unwrap();

        present.store(true, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.face_detected))
            .await
            .unwrap()
            .unwrap();
        assert!(session.is_face_detected());

        present.store(false, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| !s.face_detected))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_after_abandoned_captures() {
        let counters = Counters::default();
        let session = Arc::new(FaceCaptureSession::new(
            Box::new(Slow(Duration::from_millis(300))),
            PipelineOptions::default(),
        ));
        session.bind(Box::new(FakeSource::new(64, 48, &counters))).unwrap();

        for _ in 0..6 {
            let attempt = tokio::time::timeout(Duration::from_millis(30), session.capture()).await;
            assert!(!matches!(attempt, Ok(Ok(_))));
        }
        // The first abandoned still is still on the vision thread.
        assert!(matches!(session.capture().await, Err(CaptureError::Busy)));
        assert!(!session.is_detection_paused());

        let closing = session.clone();
        let joined = tokio::time::timeout(
            Duration::from_secs(5),
            tokio::task::spawn_blocking(move || closing.shutdown()),
        )
        .await;
        assert!(joined.is_ok(), "shutdown did not finish");

        assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(
            counters.produced.load(Ordering::SeqCst),
            counters.released.load(Ordering::SeqCst)
        );
        assert!(matches!(session.capture().await, Err(CaptureError::NotInitialized)));
    }
}
