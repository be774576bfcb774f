use std::sync::Mutex;

use teleinfo_bus::{BusError, Publish};
use teleinfo_frame::{Frame, FrameWriter};

/// Publisher that records every call and fails on the topics it is told to.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    pub calls: Mutex<Vec<(String, String)>>,
    pub failing_topics: Vec<String>,
}

impl RecordingPublisher {
    pub fn failing_on(topics: &[&str]) -> Self {
        Self {
            calls: Mutex::default(),
            failing_topics: topics.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Publish for RecordingPublisher {
    fn publish(&self, topic: &str, payload: &str) -> teleinfo_bus::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_string()));
        if self.failing_topics.iter().any(|t| t == topic) {
            return Err(BusError::Disconnected);
        }
        Ok(())
    }
}

pub fn call(topic: &str, payload: &str) -> (String, String) {
    (topic.to_string(), payload.to_string())
}

/// Meter-layout bytes for the given frames.
pub fn wire(frames: &[&[(&str, &str)]]) -> Vec<u8> {
    let mut writer = FrameWriter::new(Vec::new());
    for fields in frames {
        let frame: Frame = fields.iter().copied().collect();
        writer.write_frame(&frame).unwrap();
    }
    writer.into_inner()
}
