//! Capture gate: the observable face-presence state and its pause switch.

use facecap_core::{Detection, FaceRect};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// Latest applied detection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GateState {
    pub face_detected: bool,
    /// Padded face bounds from the last positive detection.
    pub bounds: Option<FaceRect>,
    /// Size of the image `bounds` refers to.
    pub image_size: Option<(u32, u32)>,
}

/// Padded live bounds plus the size of the image they were measured on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveBounds {
    pub bounds: FaceRect,
    pub image_size: (u32, u32),
}

impl LiveBounds {
    /// Map the bounds onto an image of `width` x `height`.
    pub fn scaled_to(&self, width: u32, height: u32) -> FaceRect {
        let (w, h) = self.image_size;
        if w == 0 || h == 0 {
            return self.bounds;
        }
        self.bounds
            .scaled(width as f32 / w as f32, height as f32 / h as f32)
    }
}

/// Holds the current detection and a paused flag.
///
/// Written only by the analysis worker; any number of observers subscribe
/// through [`CaptureGate::subscribe`]. While paused, incoming detections
/// are discarded.
#[derive(Debug)]
pub struct CaptureGate {
    state: watch::Sender<GateState>,
    paused: AtomicBool,
}

impl Default for CaptureGate {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureGate {
    pub fn new() -> Self {
        let (state, _) = watch::channel(GateState::default());
        Self {
            state,
            paused: AtomicBool::new(false),
        }
    }

    /// Apply a detection. Returns false if it was discarded because the gate is paused.
    pub fn apply(&self, detection: &Detection) -> bool {
        if self.paused.load(Ordering::Acquire) {
            tracing::trace!(present = detection.present, "gate paused; detection discarded");
            return false;
        }

        let next = GateState {
            face_detected: detection.present,
            bounds: detection.bounds,
            image_size: detection.bounds.map(|_| detection.image_size),
        };
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            if current.face_detected != next.face_detected {
                tracing::debug!(face_detected = next.face_detected, "face presence changed");
            }
            *current = next;
            true
        });
        true
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
        tracing::debug!("face detection paused");
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        tracing::debug!("face detection resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn is_face_detected(&self) -> bool {
        self.state.borrow().face_detected
    }

    /// Bounds of the last applied positive detection, if the face is still present.
    pub fn live_bounds(&self) -> Option<LiveBounds> {
        let state = self.state.borrow();
        match (state.face_detected, state.bounds, state.image_size) {
            (true, Some(bounds), Some(image_size)) => Some(LiveBounds { bounds, image_size }),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> GateState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GateState> {
        self.state.subscribe()
    }

    /// Forget the current detection.
    pub fn reset(&self) {
        self.state.send_replace(GateState::default());
    }
}
