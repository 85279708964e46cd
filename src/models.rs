use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Reference to a generated image as returned by the service, e.g. a data URI.
pub type ImageRef = String;

#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub file_name: String,
    pub data: Bytes,
}

/// A derived artifact stamped with the epoch of the source snapshot that
/// produced it. Responses are only applied while their epoch is still current.
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped<T> {
    pub epoch: u64,
    pub value: T,
    pub produced_at: DateTime<Utc>,
}

impl<T> Stamped<T> {
    pub fn new(epoch: u64, value: T) -> Self {
        Self { epoch, value, produced_at: Utc::now() }
    }
}

/// Final artifact of the text pipeline, bound to the exact approved text that
/// produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub approved_text: String,
    pub image: ImageRef,
}

/// How far the text pipeline has progressed, derived from which artifacts are
/// present. Analysis and enhancement are independent facets of the same
/// prompt; the stage reports whichever sits closest to generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextStage {
    Idle,
    Analyzed,
    Enhanced,
    Approved,
    Generated,
}

/// Resolution of a remote-invoking action. A stale discard is a success at
/// the API level: the call finished, but its source snapshot was replaced
/// mid-flight so the response was dropped instead of applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Committed,
    StaleDiscarded,
}

/// Which actions the current state permits. The presentation layer renders
/// exactly this; it performs no gating of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActionSet {
    pub analyze: bool,
    pub enhance: bool,
    pub approve_enhanced: bool,
    pub approve_raw: bool,
    pub generate: bool,
    pub analyze_image: bool,
    pub generate_variations: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextView {
    pub prompt: String,
    pub analysis: Option<Value>,
    pub enhanced: Option<String>,
    pub approved: Option<String>,
    pub generated: Option<GeneratedImage>,
    pub stage: TextStage,
    pub busy: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageView {
    pub file_name: Option<String>,
    pub caption: Option<Value>,
    pub variations: Vec<ImageRef>,
    pub busy: bool,
}

/// Short display form for image references so data URIs never flood the
/// terminal or the logs.
pub fn preview(s: &str) -> String {
    if s.len() > 50 && s.is_ascii() {
        format!("{}...[{} chars total]", &s[..50], s.len())
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn stamped_records_epoch() {
        let s = Stamped::new(7, "x".to_string());
        assert_eq!(s.epoch, 7);
        assert_eq!(s.value, "x");
    }

    #[test]
    fn preview_truncates_long_refs() {
        let long = "a".repeat(200);
        let p = preview(&long);
        assert!(p.len() < long.len());
        assert!(p.ends_with("[200 chars total]"));
        assert_eq!(preview("short"), "short");
    }
}
