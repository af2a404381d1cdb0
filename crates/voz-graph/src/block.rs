//! Blocks: named processing units with typed ports and a private payload.
//!
//! A [`Block`] couples port configuration with a [`Processor`] — the hook
//! object implementing the block's behaviour. The diagram owns blocks and
//! drives the `initialize → process* → cleanup` lifecycle; processors never
//! see other blocks or the scheduler.

use voz_core::arena::Arena;
use voz_core::error::{EngineError, ErrorKind, Result};

use crate::port::{Port, PortData, PortDirection};

/// Stable block identifier, assigned on insertion into a diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) u32);

impl BlockId {
    /// Raw numeric identifier.
    pub fn index(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlockId({})", self.0)
    }
}

/// Role tag for a block in the canonical pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Feeds PCM into the graph.
    AudioInput,
    /// Extracts the F0 stream.
    F0Extraction,
    /// Computes the spectral envelope.
    SpectrumAnalysis,
    /// Computes band aperiodicity.
    AperiodicityAnalysis,
    /// Merges the three streams into a parameter aggregate.
    ParameterMerge,
    /// Resynthesizes audio from parameters.
    Synthesis,
    /// Emits PCM to the caller.
    AudioOutput,
    /// Anything else.
    Custom,
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BlockKind::AudioInput => "AudioInput",
            BlockKind::F0Extraction => "F0Extraction",
            BlockKind::SpectrumAnalysis => "SpectrumAnalysis",
            BlockKind::AperiodicityAnalysis => "AperiodicityAnalysis",
            BlockKind::ParameterMerge => "ParameterMerge",
            BlockKind::Synthesis => "Synthesis",
            BlockKind::AudioOutput => "AudioOutput",
            BlockKind::Custom => "Custom",
        };
        f.write_str(name)
    }
}

/// Context handed to [`Processor::initialize`].
///
/// Gives the processor arena access for workspace allocation. Output-port
/// buffers are already allocated when the hook runs.
pub struct InitContext<'a> {
    /// The pipeline's memory pool.
    pub arena: &'a mut Arena,
}

/// Port buffer access for one `process` call.
///
/// `inputs[i]` is the buffer of the output port connected to input port
/// `i` — shared with every other consumer of that output, so it must be
/// treated as read-only. `outputs[i]` is this block's own buffer for
/// output port `i`.
pub struct ProcessIo<'a> {
    /// Upstream buffers, by input port index.
    pub inputs: &'a [&'a PortData],
    /// This block's output buffers, by output port index.
    pub outputs: &'a mut [PortData],
}

impl ProcessIo<'_> {
    /// Audio samples on input port `idx`.
    pub fn input_audio(&self, idx: usize) -> Result<&[f32]> {
        self.input(idx)?.as_audio()
    }

    /// F0 stream on input port `idx`.
    pub fn input_f0(&self, idx: usize) -> Result<&[f64]> {
        self.input(idx)?.as_f0()
    }

    /// The raw buffer on input port `idx`.
    pub fn input(&self, idx: usize) -> Result<&PortData> {
        self.inputs.get(idx).copied().ok_or_else(|| {
            EngineError::new(
                ErrorKind::BufferNotAllocated,
                format!("input port {idx} has no connected buffer"),
            )
        })
    }

    /// The raw buffer on output port `idx`, mutable.
    pub fn output(&mut self, idx: usize) -> Result<&mut PortData> {
        self.outputs.get_mut(idx).ok_or_else(|| {
            EngineError::new(
                ErrorKind::BufferNotAllocated,
                format!("output port {idx} has no buffer"),
            )
        })
    }

    /// Audio samples on output port `idx`, mutable.
    pub fn output_audio(&mut self, idx: usize) -> Result<&mut [f32]> {
        self.output(idx)?.as_audio_mut()
    }

    /// F0 stream on output port `idx`, mutable.
    pub fn output_f0(&mut self, idx: usize) -> Result<&mut [f64]> {
        self.output(idx)?.as_f0_mut()
    }
}

/// Behaviour hook implemented by every block.
///
/// `process` reads its inputs through [`ProcessIo`], writes its outputs,
/// and must not reallocate buffers or touch other blocks. For analysis
/// blocks the whole-stream call and a sequence of partial calls must
/// accumulate to the same output; blocks that cannot guarantee that
/// declare [`streaming_capable`](Self::streaming_capable) `false` and are
/// then only driven in one-shot mode.
pub trait Processor: Send {
    /// One-time setup after output buffers exist. May allocate workspace
    /// from the arena.
    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<()>;

    /// Processes `frame_count` elements (samples or frames, per the
    /// block's convention).
    fn process(&mut self, io: &mut ProcessIo<'_>, frame_count: usize) -> Result<()>;

    /// Releases processor state. Must be safe from any state, including
    /// after a failed `initialize`.
    fn cleanup(&mut self);

    /// Whether repeated partial `process` calls are equivalent to one
    /// whole-stream call.
    fn streaming_capable(&self) -> bool {
        true
    }
}

/// A named processing unit owned by a diagram.
pub struct Block {
    id: BlockId,
    name: String,
    kind: BlockKind,
    inputs: Vec<Port>,
    outputs: Vec<Port>,
    processor: Box<dyn Processor>,
    enabled: bool,
    initialized: bool,
}

impl Block {
    /// Creates a block from its ports and processor.
    ///
    /// The id is provisional; [`Diagram::add_block`](crate::Diagram::add_block)
    /// assigns the real one.
    pub fn new(
        name: impl Into<String>,
        kind: BlockKind,
        inputs: Vec<Port>,
        outputs: Vec<Port>,
        processor: Box<dyn Processor>,
    ) -> Result<Self> {
        let name = name.into();
        for port in inputs.iter() {
            if port.direction() != PortDirection::Input {
                return Err(EngineError::new(
                    ErrorKind::InvalidArgument,
                    format!("port '{}' in input list is not an input", port.name()),
                ));
            }
        }
        for port in outputs.iter() {
            if port.direction() != PortDirection::Output {
                return Err(EngineError::new(
                    ErrorKind::InvalidArgument,
                    format!("port '{}' in output list is not an output", port.name()),
                ));
            }
        }
        Ok(Self {
            id: BlockId(u32::MAX),
            name,
            kind,
            inputs,
            outputs,
            processor,
            enabled: true,
            initialized: false,
        })
    }

    /// Block id within its diagram.
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Block name, unique within its diagram.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Role tag.
    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    /// Input port list.
    pub fn inputs(&self) -> &[Port] {
        &self.inputs
    }

    /// Output port list.
    pub fn outputs(&self) -> &[Port] {
        &self.outputs
    }

    /// Whether the executor invokes this block.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enables or disables the block. Disabled blocks are skipped.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether `initialize` has completed successfully.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether the processor supports partial-frame streaming calls.
    pub fn streaming_capable(&self) -> bool {
        self.processor.streaming_capable()
    }

    pub(crate) fn set_id(&mut self, id: BlockId) {
        self.id = id;
    }

    pub(crate) fn input_mut(&mut self, idx: usize) -> &mut Port {
        &mut self.inputs[idx]
    }

    pub(crate) fn output_mut(&mut self, idx: usize) -> &mut Port {
        &mut self.outputs[idx]
    }

    /// Allocates output buffers and runs the processor's init hook.
    pub(crate) fn initialize(&mut self, arena: &mut Arena) -> Result<Vec<PortData>> {
        let mut buffers = Vec::with_capacity(self.outputs.len());
        for port in &self.outputs {
            buffers.push(port.alloc_data(arena)?);
        }
        let mut ctx = InitContext { arena };
        match self.processor.initialize(&mut ctx) {
            Ok(()) => {
                self.initialized = true;
                Ok(buffers)
            }
            Err(e) => {
                // Failure cascades straight to cleanup.
                self.processor.cleanup();
                Err(e)
            }
        }
    }

    pub(crate) fn process(&mut self, io: &mut ProcessIo<'_>, frame_count: usize) -> Result<()> {
        if !self.initialized {
            return Err(EngineError::new(
                ErrorKind::InvalidState,
                format!("block '{}' processed before initialize", self.name),
            ));
        }
        self.processor.process(io, frame_count)
    }

    pub(crate) fn cleanup(&mut self) {
        self.processor.cleanup();
        self.initialized = false;
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .field("enabled", &self.enabled)
            .field("initialized", &self.initialized)
            .finish()
    }
}
