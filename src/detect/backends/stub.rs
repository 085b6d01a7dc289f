use anyhow::{anyhow, Result};

use crate::detect::adapter::{AdapterSettings, DetectorAdapter};
use crate::detect::result::{Detection, ModelResult};
use crate::frame::Frame;

/// One scripted inference outcome.
#[derive(Clone, Debug)]
pub enum StubStep {
    /// Return these detections, after the usual allowed-class and confidence
    /// filtering.
    Detections(Vec<Detection>),
    /// Fail inference with the given message.
    Fail(String),
}

/// Stub adapter for testing. Plays back a fixed script of per-call outcomes
/// and returns an empty result once the script is exhausted, so a pipeline
/// can be driven through accept/reject sequences without a model file.
pub struct StubAdapter {
    name: String,
    class_names: Vec<String>,
    settings: AdapterSettings,
    script: Vec<StubStep>,
    cursor: usize,
}

impl StubAdapter {
    pub fn new(name: &str, class_names: Vec<String>, settings: AdapterSettings) -> Self {
        Self {
            name: name.to_string(),
            class_names,
            settings,
            script: Vec::new(),
            cursor: 0,
        }
    }

    /// Append one scripted outcome.
    pub fn push(&mut self, step: StubStep) {
        self.script.push(step);
    }

    pub fn with_script(mut self, script: Vec<StubStep>) -> Self {
        self.script = script;
        self
    }

    /// Number of inference calls made so far.
    pub fn calls(&self) -> usize {
        self.cursor
    }
}

impl DetectorAdapter for StubAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn settings(&self) -> &AdapterSettings {
        &self.settings
    }

    fn infer(&mut self, _frame: &Frame) -> Result<ModelResult> {
        let step = self.script.get(self.cursor).cloned();
        self.cursor += 1;
        match step {
            None => Ok(ModelResult::empty()),
            Some(StubStep::Fail(message)) => Err(anyhow!(message)),
            Some(StubStep::Detections(detections)) => {
                let kept = detections
                    .into_iter()
                    .filter(|d| {
                        self.settings.allowed_classes.contains(&d.class_id)
                            && d.confidence >= self.settings.confidence_threshold
                    })
                    .collect();
                Ok(ModelResult::new(kept))
            }
        }
    }
}
