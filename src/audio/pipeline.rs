//! Sample sinks and the stage chain

/// Consumer at the end of a pipeline
pub trait AudioSink: Send {
    /// Write samples, returning how many were accepted
    fn write_samples(&mut self, samples: &[f32]) -> usize;

    /// No more samples follow for now. Returns true if the flush is
    /// already complete; otherwise the owner reports completion later.
    fn flush_samples(&mut self) -> bool {
        true
    }
}

/// Sink that drops everything
#[derive(Debug, Default)]
pub struct NullSink {
    written: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl AudioSink for NullSink {
    fn write_samples(&mut self, samples: &[f32]) -> usize {
        self.written += samples.len() as u64;
        samples.len()
    }
}

/// One transform in a pipeline
pub trait Stage: Send {
    fn name(&self) -> &'static str;

    /// Transform a block of samples. The output length may differ.
    fn process(&mut self, input: &[f32]) -> Vec<f32>;

    /// Release samples held back by the stage
    fn flush(&mut self) -> Vec<f32> {
        Vec::new()
    }
}

/// Ordered chain of owned stages
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage at the end of the chain
    pub fn push(&mut self, stage: Box<dyn Stage>) {
        tracing::debug!("Adding pipeline stage {}", stage.name());
        self.stages.push(stage);
    }

    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let mut block = input.to_vec();
        for stage in &mut self.stages {
            if block.is_empty() {
                break;
            }
            block = stage.process(&block);
        }
        block
    }

    /// Flush every stage in order, passing held samples downstream
    pub fn flush(&mut self) -> Vec<f32> {
        let mut carry = Vec::new();
        for stage in &mut self.stages {
            let mut out = if carry.is_empty() {
                Vec::new()
            } else {
                stage.process(&carry)
            };
            out.extend(stage.flush());
            carry = out;
        }
        carry
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Fixed gain in dB
#[derive(Debug, Clone)]
pub struct Gain {
    db: f32,
    factor: f32,
}

impl Gain {
    pub fn from_db(db: f32) -> Self {
        Self {
            db,
            factor: 10f32.powf(db / 20.0),
        }
    }

    pub fn db(&self) -> f32 {
        self.db
    }
}

impl Stage for Gain {
    fn name(&self) -> &'static str {
        "gain"
    }

    fn process(&mut self, input: &[f32]) -> Vec<f32> {
        input.iter().map(|s| s * self.factor).collect()
    }
}
