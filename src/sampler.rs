//! Frame sampling and post-acceptance cooldown.
//!
//! The sampler drives sequential decoding: it decides for every decoded frame
//! whether to run inference, and after an accepted frame it suspends sampling
//! for a cooldown window so near-duplicate frames of the same event are not
//! re-evaluated or re-exported.

/// Sampler configuration, derived from the source fps and the harvest config.
#[derive(Clone, Copy, Debug)]
pub struct SamplerConfig {
    /// `source_fps / target_sampling_fps`, truncated. Zero disables sampling.
    pub skip_factor: u64,
    /// Frames discarded without inference after each acceptance.
    pub cooldown_frames: u32,
    /// Acceptances after which the sampler is done.
    pub max_accepted: u32,
}

/// Sampler phase. `Done` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplerPhase {
    Sampling,
    Skipping,
    Done,
}

/// Decision for one decoded frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameDecision {
    /// Run the detection/acceptance chain on this frame.
    Infer,
    /// Discard without inference.
    Discard,
}

/// Per-video sampling state. Never shared between videos.
#[derive(Debug)]
pub struct FrameSampler {
    config: SamplerConfig,
    frame_index: u64,
    accepted_count: u32,
    skip_counter: u32,
    phase: SamplerPhase,
}

impl FrameSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self {
            config,
            frame_index: 0,
            accepted_count: 0,
            skip_counter: 0,
            phase: SamplerPhase::Sampling,
        }
    }

    /// Observe the next decoded frame and decide what to do with it.
    ///
    /// Frame 0 is never sampled; inference runs on positive multiples of the
    /// skip factor while in the sampling phase.
    pub fn observe(&mut self) -> FrameDecision {
        let index = self.frame_index;
        self.frame_index += 1;
        match self.phase {
            SamplerPhase::Done => FrameDecision::Discard,
            SamplerPhase::Skipping => {
                self.skip_counter -= 1;
                if self.skip_counter == 0 {
                    self.phase = SamplerPhase::Sampling;
                }
                FrameDecision::Discard
            }
            SamplerPhase::Sampling => {
                if index > 0 && self.config.skip_factor > 0 && index % self.config.skip_factor == 0
                {
                    FrameDecision::Infer
                } else {
                    FrameDecision::Discard
                }
            }
        }
    }

    /// Record an accepted (exported) frame and start the cooldown window.
    pub fn record_acceptance(&mut self) {
        self.accepted_count += 1;
        if self.accepted_count >= self.config.max_accepted {
            self.phase = SamplerPhase::Done;
            return;
        }
        if self.config.cooldown_frames > 0 {
            self.skip_counter = self.config.cooldown_frames;
            self.phase = SamplerPhase::Skipping;
        }
    }

    /// Mark the stream exhausted.
    pub fn finish(&mut self) {
        self.phase = SamplerPhase::Done;
    }

    pub fn is_done(&self) -> bool {
        self.phase == SamplerPhase::Done
    }

    pub fn phase(&self) -> SamplerPhase {
        self.phase
    }

    /// Index of the next frame to observe.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn accepted_count(&self) -> u32 {
        self.accepted_count
    }
}
