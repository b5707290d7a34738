//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use image::RgbImage;
use snapsheet::{
    CanvasSpec, Compositor, ProgressInfo, RunSummary, SessionEvent, SnapError, SnapshotListener,
    SyntheticSource,
};

/// Sixty seconds at 25 fps with a keyframe every two seconds.
pub fn standard_source() -> SyntheticSource {
    SyntheticSource::builder(60_000).build()
}

/// Native ticks per millisecond of the default synthetic time base.
pub const TICKS_PER_MS: i64 = 90;

/// A compositor that remembers everything it is handed.
#[derive(Debug, Default)]
pub struct RecordingCompositor {
    pub canvas: Option<CanvasSpec>,
    pub slots: Vec<u32>,
    pub sizes: Vec<(u32, u32)>,
    pub captions: Vec<(u32, String)>,
    pub summary: Option<RunSummary>,
    pub begins: usize,
}

impl Compositor for RecordingCompositor {
    fn begin(&mut self, canvas: &CanvasSpec) -> Result<(), SnapError> {
        self.canvas = Some(canvas.clone());
        self.begins += 1;
        Ok(())
    }

    fn place(&mut self, slot: u32, image: &RgbImage) -> Result<(), SnapError> {
        self.slots.push(slot);
        self.sizes.push(image.dimensions());
        Ok(())
    }

    fn burn_in(&mut self, slot: u32, text: &str) -> Result<(), SnapError> {
        self.captions.push((slot, text.to_string()));
        Ok(())
    }

    fn end(&mut self, summary: &RunSummary) -> Result<(), SnapError> {
        self.summary = Some(summary.clone());
        Ok(())
    }
}

/// A listener that keeps every callback for later inspection.
#[derive(Default)]
pub struct EventLog {
    pub events: Mutex<Vec<SessionEvent>>,
    pub progress: Mutex<Vec<ProgressInfo>>,
    pub begins: Mutex<Vec<(String, Option<u64>)>>,
    pub ends: Mutex<Vec<(String, u64)>>,
}

impl EventLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Media times of the placed shots, in placement order.
    pub fn shot_times(&self) -> Vec<i64> {
        self.progress
            .lock()
            .unwrap()
            .iter()
            .filter_map(|info| info.last_timestamp_ms)
            .collect()
    }

    pub fn partial_events(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, SessionEvent::PartialResult { .. }))
            .count()
    }

    pub fn demotions(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, SessionEvent::StrategyDemoted { .. }))
            .count()
    }
}

impl SnapshotListener for EventLog {
    fn on_begin(&self, label: &str, planned: Option<u64>) {
        self.begins
            .lock()
            .unwrap()
            .push((label.to_string(), planned));
    }

    fn on_progress(&self, info: &ProgressInfo) {
        self.progress.lock().unwrap().push(info.clone());
    }

    fn on_end(&self, label: &str, taken: u64) {
        self.ends.lock().unwrap().push((label.to_string(), taken));
    }

    fn on_event(&self, event: &SessionEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
