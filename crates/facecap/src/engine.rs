//! Worker threads behind a capture session.
//!
//! The vision thread owns the detector and processes one request at a time:
//! live analyses (single-flight, results applied to the gate) and capture
//! post-processing. The camera thread owns the frame source, pumps preview
//! frames into the vision thread and serves still requests in between.

use crate::error::CaptureError;
use crate::gate::{CaptureGate, LiveBounds};
use crate::pipeline::{self, FinalImage, PipelineOptions};
use facecap_core::{Detection, FaceDetector};
use facecap_hw::{CameraError, FrameSource, RawFrame};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::oneshot;

/// Pause between retries after the frame source reports an error.
const RETRY_DELAY: Duration = Duration::from_millis(100);

enum VisionRequest {
    Analyze {
        frame: RawFrame,
        reply: Option<oneshot::Sender<Detection>>,
    },
    Capture {
        frame: RawFrame,
        live: Option<LiveBounds>,
        slot: CaptureSlot,
        reply: oneshot::Sender<Result<FinalImage, CaptureError>>,
    },
    Shutdown,
}

/// Exclusive claim on the single capture slot.
///
/// Travels with the capture request, so the slot stays taken until the
/// vision thread has finished with the still, even if the caller gave up.
pub struct CaptureSlot {
    busy: Arc<AtomicBool>,
}

impl CaptureSlot {
    /// Claim the slot, or `None` if a capture is already running.
    pub fn acquire(busy: &Arc<AtomicBool>) -> Option<Self> {
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { busy: busy.clone() })
    }
}

impl Drop for CaptureSlot {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Clone-safe handle to the vision thread.
#[derive(Clone)]
pub struct VisionHandle {
    tx: mpsc::Sender<VisionRequest>,
    in_flight: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
}

impl VisionHandle {
    /// Claim the single analysis slot.
    fn begin(&self) -> bool {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Analyze a frame and wait for its result.
    ///
    /// Returns `None` without waiting if an analysis is already in flight;
    /// the frame is dropped, not queued.
    pub async fn analyze(&self, frame: RawFrame) -> Option<Detection> {
        if !self.begin() {
            tracing::trace!(seq = frame.sequence, "analysis busy; frame dropped");
            return None;
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = VisionRequest::Analyze {
            frame,
            reply: Some(reply_tx),
        };
        if self.tx.try_send(request).is_err() {
            self.in_flight.store(false, Ordering::Release);
            return None;
        }
        reply_rx.await.ok()
    }

    /// Fire-and-forget analysis. Returns false if the frame was dropped.
    pub fn submit(&self, frame: RawFrame) -> bool {
        if !self.begin() {
            return false;
        }
        let request = VisionRequest::Analyze { frame, reply: None };
        if self.tx.try_send(request).is_err() {
            self.in_flight.store(false, Ordering::Release);
            return false;
        }
        true
    }

    /// Post-process a captured still. `slot` is released once the vision
    /// thread is done with the request.
    pub async fn capture(
        &self,
        frame: RawFrame,
        live: Option<LiveBounds>,
        slot: CaptureSlot,
    ) -> Result<FinalImage, CaptureError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(VisionRequest::Capture {
                frame,
                live,
                slot,
                reply: reply_tx,
            })
            .await
            .map_err(|_| CaptureError::NotInitialized)?;
        reply_rx.await.map_err(|_| CaptureError::NotInitialized)?
    }

    /// Make the thread exit after the request it is working on. Requests
    /// still queued are dropped unprocessed.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::Release);
        // A full queue already guarantees a wakeup that sees the flag.
        if let Err(TrySendError::Full(_)) = self.tx.try_send(VisionRequest::Shutdown) {
            tracing::debug!("vision queue full; thread will stop at its next request");
        }
    }
}

/// Spawn the vision thread.
pub fn spawn_vision(
    mut detector: Box<dyn FaceDetector>,
    gate: Arc<CaptureGate>,
    options: PipelineOptions,
) -> (VisionHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<VisionRequest>(4);
    let in_flight = Arc::new(AtomicBool::new(false));
    let stop = Arc::new(AtomicBool::new(false));
    let handle = VisionHandle {
        tx,
        in_flight: in_flight.clone(),
        stop: stop.clone(),
    };

    let thread = std::thread::Builder::new()
        .name("facecap-vision".into())
        .spawn(move || {
            tracing::info!("vision thread started");
            while let Some(req) = rx.blocking_recv() {
                if stop.load(Ordering::Acquire) {
                    break;
                }
                match req {
                    VisionRequest::Analyze { frame, reply } => {
                        let detection =
                            pipeline::analyze_frame(detector.as_mut(), frame, &options);
                        gate.apply(&detection);
                        in_flight.store(false, Ordering::Release);
                        if let Some(reply) = reply {
                            let _ = reply.send(detection);
                        }
                    }
                    VisionRequest::Capture {
                        frame,
                        live,
                        slot,
                        reply,
                    } => {
                        let result =
                            pipeline::process_capture(detector.as_mut(), frame, live, &options);
                        drop(slot);
                        if reply.send(result).is_err() {
                            tracing::debug!("capture caller went away; result discarded");
                        }
                    }
                    VisionRequest::Shutdown => break,
                }
            }
            tracing::info!("vision thread exiting");
        })
        .expect("failed to spawn vision thread");

    (handle, thread)
}

enum CameraRequest {
    Still {
        reply: oneshot::Sender<Result<RawFrame, CameraError>>,
    },
}

/// Clone-safe handle to the camera thread.
#[derive(Clone)]
pub struct CameraHandle {
    tx: mpsc::Sender<CameraRequest>,
    stop: Arc<AtomicBool>,
}

impl CameraHandle {
    /// Take one still from the frame source.
    pub async fn capture_still(&self) -> Result<RawFrame, CaptureError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CameraRequest::Still { reply: reply_tx })
            .await
            .map_err(|_| CaptureError::NotInitialized)?;
        let frame = reply_rx.await.map_err(|_| CaptureError::NotInitialized)??;
        Ok(frame)
    }

    /// Stop pumping frames and release the source.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::Release);
    }
}

/// Spawn the camera thread.
///
/// Preview frames go to `vision` for analysis; any that arrive while an
/// analysis is in flight are dropped on the spot.
pub fn spawn_camera(
    mut source: Box<dyn FrameSource>,
    vision: VisionHandle,
) -> (CameraHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<CameraRequest>(2);
    let stop = Arc::new(AtomicBool::new(false));
    let handle = CameraHandle {
        tx,
        stop: stop.clone(),
    };

    let thread = std::thread::Builder::new()
        .name("facecap-camera".into())
        .spawn(move || {
            tracing::info!("camera thread started");
            let mut failing = false;
            let mut dropped: u64 = 0;
            while !stop.load(Ordering::Acquire) {
                match rx.try_recv() {
                    Ok(CameraRequest::Still { reply }) => {
                        let _ = reply.send(source.capture_still());
                        continue;
                    }
                    Err(TryRecvError::Disconnected) => break,
                    Err(TryRecvError::Empty) => {}
                }

                match source.next_preview() {
                    Ok(frame) => {
                        failing = false;
                        if !vision.submit(frame) {
                            dropped += 1;
                        }
                    }
                    Err(CameraError::Closed) => break,
                    Err(e) => {
                        if !failing {
                            tracing::warn!(error = %e, "preview frame failed; retrying");
                            failing = true;
                        }
                        std::thread::sleep(RETRY_DELAY);
                    }
                }
            }
            source.shutdown();
            tracing::info!(dropped, "camera thread exiting");
        })
        .expect("failed to spawn camera thread");

    (handle, thread)
}
