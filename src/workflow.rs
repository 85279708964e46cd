use crate::gateway::{MediaGateway, RemoteError};
use crate::models::{
    ActionSet, GeneratedImage, ImageRef, ImageView, Outcome, Stamped, TextStage, TextView,
    UploadedImage,
};
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Missing or invalid local input; detected before any network call.
    #[error("{0}")]
    Validation(String),
    /// Another remote operation on the same pipeline is outstanding.
    #[error("another {0} operation is in flight")]
    Busy(&'static str),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    /// The service returned a different number of variations than requested.
    #[error("requested {requested} variations but the service returned {returned}")]
    VariationCountMismatch { requested: usize, returned: usize },
}

fn validation(msg: impl Into<String>) -> WorkflowError {
    WorkflowError::Validation(msg.into())
}

/// Gates remote-invoking actions for one pipeline. Acquisition is a single
/// test-and-set; the permit releases on drop, so success, failure and stale
/// paths all release unconditionally.
struct BusyGuard {
    pipeline: &'static str,
    in_flight: AtomicBool,
}

struct BusyPermit<'a> {
    guard: &'a BusyGuard,
}

impl BusyGuard {
    fn new(pipeline: &'static str) -> Self {
        Self { pipeline, in_flight: AtomicBool::new(false) }
    }

    fn try_acquire(&self) -> Result<BusyPermit<'_>, WorkflowError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Ok(BusyPermit { guard: self })
        } else {
            Err(WorkflowError::Busy(self.pipeline))
        }
    }

    fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl Drop for BusyPermit<'_> {
    fn drop(&mut self) {
        self.guard.in_flight.store(false, Ordering::Release);
    }
}

/// Raw prompt → analysis / enhancement → approval → generated image.
/// `epoch` bumps on every prompt edit; every derived artifact carries the
/// epoch of the prompt it was computed from.
#[derive(Default)]
struct TextPipeline {
    prompt: String,
    epoch: u64,
    analysis: Option<Stamped<Value>>,
    enhanced: Option<Stamped<String>>,
    approved: Option<Stamped<String>>,
    generated: Option<Stamped<GeneratedImage>>,
}

impl TextPipeline {
    fn stage(&self) -> TextStage {
        if self.generated.is_some() {
            TextStage::Generated
        } else if self.approved.is_some() {
            TextStage::Approved
        } else if self.enhanced.is_some() {
            TextStage::Enhanced
        } else if self.analysis.is_some() {
            TextStage::Analyzed
        } else {
            TextStage::Idle
        }
    }
}

/// Uploaded image → caption and/or variations. Same invalidation discipline
/// as the text pipeline: replacing the file bumps the epoch and clears both
/// derived artifacts.
#[derive(Default)]
struct ImagePipeline {
    file: Option<UploadedImage>,
    epoch: u64,
    caption: Option<Stamped<Value>>,
    variations: Option<Stamped<Vec<ImageRef>>>,
}

/// Owns both pipelines, enforces action preconditions, and applies remote
/// responses only while their source snapshot is still current. The sole
/// network path is the injected gateway.
pub struct WorkflowController {
    gateway: Arc<dyn MediaGateway>,
    text: Mutex<TextPipeline>,
    image: Mutex<ImagePipeline>,
    text_guard: BusyGuard,
    image_guard: BusyGuard,
}

impl WorkflowController {
    pub fn new(gateway: Arc<dyn MediaGateway>) -> Self {
        Self {
            gateway,
            text: Mutex::new(TextPipeline::default()),
            image: Mutex::new(ImagePipeline::default()),
            text_guard: BusyGuard::new("text"),
            image_guard: BusyGuard::new("image"),
        }
    }

    // --- Text pipeline -----------------------------------------------------

    /// Replaces the prompt and discards everything derived from the previous
    /// one. Approval is a statement about a specific text, so it goes too.
    pub fn set_prompt(&self, text: impl Into<String>) {
        let mut t = self.text.lock();
        t.prompt = text.into();
        t.epoch += 1;
        t.analysis = None;
        t.enhanced = None;
        t.approved = None;
        t.generated = None;
        debug!(epoch = t.epoch, "prompt replaced, downstream artifacts cleared");
    }

    fn prompt_snapshot(&self) -> Result<(u64, String), WorkflowError> {
        let t = self.text.lock();
        if t.prompt.is_empty() {
            return Err(validation("enter a prompt first"));
        }
        Ok((t.epoch, t.prompt.clone()))
    }

    pub async fn analyze(&self) -> Result<Outcome, WorkflowError> {
        let (epoch, prompt) = self.prompt_snapshot()?;
        let _permit = self.text_guard.try_acquire()?;

        let analysis = self.gateway.analyze_text(&prompt).await?;

        let mut t = self.text.lock();
        if t.epoch != epoch {
            debug!(stale = epoch, current = t.epoch, "discarding stale text analysis");
            return Ok(Outcome::StaleDiscarded);
        }
        t.analysis = Some(Stamped::new(epoch, analysis));
        info!("prompt analyzed");
        Ok(Outcome::Committed)
    }

    /// Enhancement leaves any prior analysis intact; the two are independent
    /// facets of the same prompt. An empty suggestion still commits.
    pub async fn enhance(&self) -> Result<Outcome, WorkflowError> {
        let (epoch, prompt) = self.prompt_snapshot()?;
        let _permit = self.text_guard.try_acquire()?;

        let enhanced = self.gateway.enhance_text(&prompt).await?;

        let mut t = self.text.lock();
        if t.epoch != epoch {
            debug!(stale = epoch, current = t.epoch, "discarding stale enhancement");
            return Ok(Outcome::StaleDiscarded);
        }
        if enhanced.is_empty() {
            info!("enhancement succeeded with an empty suggestion");
        } else {
            info!("prompt enhanced");
        }
        t.enhanced = Some(Stamped::new(epoch, enhanced));
        Ok(Outcome::Committed)
    }

    /// Pure local transition: designates either the enhanced text or the raw
    /// prompt as final. Supersedes any previously generated image.
    pub fn approve(&self, use_enhanced: bool) -> Result<(), WorkflowError> {
        let mut t = self.text.lock();
        let text = if use_enhanced {
            t.enhanced
                .as_ref()
                .map(|e| e.value.clone())
                .ok_or_else(|| validation("no enhanced prompt to approve"))?
        } else {
            if t.prompt.is_empty() {
                return Err(validation("enter a prompt first"));
            }
            t.prompt.clone()
        };
        let epoch = t.epoch;
        t.approved = Some(Stamped::new(epoch, text));
        t.generated = None;
        info!(use_enhanced, "prompt approved");
        Ok(())
    }

    pub async fn generate_from_approved(&self) -> Result<Outcome, WorkflowError> {
        let (epoch, approved) = {
            let t = self.text.lock();
            let a = t.approved.as_ref().ok_or_else(|| validation("approve a prompt first"))?;
            (a.epoch, a.value.clone())
        };
        let _permit = self.text_guard.try_acquire()?;

        let image = self.gateway.generate_image(&approved).await?;

        let mut t = self.text.lock();
        // Approval may have been replaced or cleared mid-flight; the image is
        // only valid for the exact text it was generated from.
        let still_current = t.epoch == epoch
            && t.approved.as_ref().is_some_and(|a| a.epoch == epoch && a.value == approved);
        if !still_current {
            debug!(stale = epoch, current = t.epoch, "discarding stale generated image");
            return Ok(Outcome::StaleDiscarded);
        }
        t.generated = Some(Stamped::new(epoch, GeneratedImage { approved_text: approved, image }));
        info!("image generated");
        Ok(Outcome::Committed)
    }

    // --- Image pipeline ----------------------------------------------------

    /// Replaces the uploaded file and discards its caption and variations.
    /// Rejects payloads that are not a recognizable image.
    pub fn set_file(&self, file_name: impl Into<String>, data: Bytes) -> Result<(), WorkflowError> {
        let file_name = file_name.into();
        image::guess_format(&data)
            .map_err(|_| validation(format!("{file_name} is not a recognized image")))?;

        let mut i = self.image.lock();
        i.file = Some(UploadedImage { file_name, data });
        i.epoch += 1;
        i.caption = None;
        i.variations = None;
        debug!(epoch = i.epoch, "file replaced, caption and variations cleared");
        Ok(())
    }

    fn file_snapshot(&self) -> Result<(u64, UploadedImage), WorkflowError> {
        let i = self.image.lock();
        let file = i.file.clone().ok_or_else(|| validation("choose an image first"))?;
        Ok((i.epoch, file))
    }

    pub async fn analyze_image(&self) -> Result<Outcome, WorkflowError> {
        let (epoch, file) = self.file_snapshot()?;
        let _permit = self.image_guard.try_acquire()?;

        let caption = self.gateway.analyze_image(&file).await?;

        let mut i = self.image.lock();
        if i.epoch != epoch {
            debug!(stale = epoch, current = i.epoch, "discarding stale image caption");
            return Ok(Outcome::StaleDiscarded);
        }
        i.caption = Some(Stamped::new(epoch, caption));
        info!("image analyzed");
        Ok(Outcome::Committed)
    }

    pub async fn generate_variations(&self, count: usize) -> Result<Outcome, WorkflowError> {
        if count == 0 {
            return Err(validation("variation count must be positive"));
        }
        let (epoch, file) = self.file_snapshot()?;
        let _permit = self.image_guard.try_acquire()?;

        let variations = self.gateway.generate_variations(&file, count).await?;

        // A short or long set must be surfaced, never presented as the
        // requested count. The previous set stays as-is.
        if variations.len() != count {
            warn!(requested = count, returned = variations.len(), "variation count mismatch");
            return Err(WorkflowError::VariationCountMismatch {
                requested: count,
                returned: variations.len(),
            });
        }

        let mut i = self.image.lock();
        if i.epoch != epoch {
            debug!(stale = epoch, current = i.epoch, "discarding stale variations");
            return Ok(Outcome::StaleDiscarded);
        }
        i.variations = Some(Stamped::new(epoch, variations));
        info!(count, "variations generated");
        Ok(Outcome::Committed)
    }

    // --- Projections -------------------------------------------------------

    pub fn text_view(&self) -> TextView {
        let t = self.text.lock();
        debug_assert!(t.analysis.as_ref().map_or(true, |a| a.epoch == t.epoch));
        debug_assert!(t.enhanced.as_ref().map_or(true, |e| e.epoch == t.epoch));
        debug_assert!(t.approved.as_ref().map_or(true, |a| a.epoch == t.epoch));
        debug_assert!(t.generated.as_ref().map_or(true, |g| g.epoch == t.epoch));
        TextView {
            prompt: t.prompt.clone(),
            analysis: t.analysis.as_ref().map(|a| a.value.clone()),
            enhanced: t.enhanced.as_ref().map(|e| e.value.clone()),
            approved: t.approved.as_ref().map(|a| a.value.clone()),
            generated: t.generated.as_ref().map(|g| g.value.clone()),
            stage: t.stage(),
            busy: self.text_guard.is_busy(),
        }
    }

    pub fn image_view(&self) -> ImageView {
        let i = self.image.lock();
        debug_assert!(i.caption.as_ref().map_or(true, |c| c.epoch == i.epoch));
        debug_assert!(i.variations.as_ref().map_or(true, |v| v.epoch == i.epoch));
        ImageView {
            file_name: i.file.as_ref().map(|f| f.file_name.clone()),
            caption: i.caption.as_ref().map(|c| c.value.clone()),
            variations: i.variations.as_ref().map(|v| v.value.clone()).unwrap_or_default(),
            busy: self.image_guard.is_busy(),
        }
    }

    /// Pure projection of which actions the current state permits. Approval
    /// is local-only so the busy guard does not gate it.
    pub fn permitted(&self) -> ActionSet {
        let t = self.text.lock();
        let i = self.image.lock();
        let text_idle = !self.text_guard.is_busy();
        let image_idle = !self.image_guard.is_busy();
        ActionSet {
            analyze: text_idle && !t.prompt.is_empty(),
            enhance: text_idle && !t.prompt.is_empty(),
            approve_enhanced: t.enhanced.is_some(),
            approve_raw: !t.prompt.is_empty(),
            generate: text_idle && t.approved.is_some(),
            analyze_image: image_idle && i.file.is_some(),
            generate_variations: image_idle && i.file.is_some(),
        }
    }
}
