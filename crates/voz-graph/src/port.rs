//! Typed named ports and their buffers.
//!
//! A port is an endpoint on a block. Output ports own their buffers
//! (allocated from the arena at diagram initialization); input ports hold a
//! [`BufferRef`] to the upstream output and never duplicate storage. The
//! buffer payload is a tagged union — type mismatches across a connection
//! are a single `match`, and a block can never reinterpret bytes.

use voz_core::arena::{Arena, ArenaVec};
use voz_core::error::{EngineError, ErrorKind, Result};
use voz_core::params::VoiceParameters;

use crate::block::BlockId;

/// Direction of a port relative to its block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    /// Consumes data from one upstream output port.
    Input,
    /// Produces data; may feed any number of inputs.
    Output,
}

/// The data type carried by a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortType {
    /// PCM samples, `f32`.
    Audio,
    /// Fundamental frequency stream, one `f64` per frame.
    F0,
    /// Spectral envelope rows, `frame_count x (fft_size/2 + 1)` in `f64`.
    Spectrum,
    /// Band aperiodicity rows, same shape as `Spectrum`.
    Aperiodicity,
    /// Opaque merged parameter aggregate.
    Parameters,
    /// Scalar control value, `f64`.
    Control,
}

impl std::fmt::Display for PortType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PortType::Audio => "audio",
            PortType::F0 => "f0",
            PortType::Spectrum => "spectrum",
            PortType::Aperiodicity => "aperiodicity",
            PortType::Parameters => "parameters",
            PortType::Control => "control",
        };
        f.write_str(name)
    }
}

/// Dense row-major `f64` matrix backed by arena storage.
///
/// Used for the spectrum and aperiodicity port buffers, one row per
/// analysis frame.
#[derive(Debug)]
pub struct FrameMatrix {
    data: ArenaVec<f64>,
    rows: usize,
    cols: usize,
}

impl FrameMatrix {
    /// Allocates a zeroed `rows × cols` matrix from the arena.
    pub fn alloc(arena: &mut Arena, rows: usize, cols: usize) -> Result<Self> {
        let data = arena.alloc_vec_f64(rows * cols)?;
        Ok(Self { data, rows, cols })
    }

    /// Number of rows (frames).
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns (bins).
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// One frame's row.
    pub fn row(&self, r: usize) -> &[f64] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// One frame's row, mutable.
    pub fn row_mut(&mut self, r: usize) -> &mut [f64] {
        &mut self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// Full row-major slice.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Full row-major slice, mutable.
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        self.data.as_mut_slice()
    }
}

/// An output port's buffer: tagged storage matching the port's type.
#[derive(Debug)]
pub enum PortData {
    /// PCM samples.
    AudioF32(ArenaVec<f32>),
    /// Per-frame F0 values.
    F0F64(ArenaVec<f64>),
    /// Spectral envelope rows.
    SpectrumF64(FrameMatrix),
    /// Aperiodicity rows.
    AperiodicityF64(FrameMatrix),
    /// Merged parameter aggregate.
    Params(Box<VoiceParameters>),
    /// Scalar control value.
    ControlF64(f64),
}

impl PortData {
    /// The port type this buffer satisfies.
    pub fn port_type(&self) -> PortType {
        match self {
            PortData::AudioF32(_) => PortType::Audio,
            PortData::F0F64(_) => PortType::F0,
            PortData::SpectrumF64(_) => PortType::Spectrum,
            PortData::AperiodicityF64(_) => PortType::Aperiodicity,
            PortData::Params(_) => PortType::Parameters,
            PortData::ControlF64(_) => PortType::Control,
        }
    }

    /// Audio sample view.
    pub fn as_audio(&self) -> Result<&[f32]> {
        match self {
            PortData::AudioF32(v) => Ok(v),
            other => Err(type_error(PortType::Audio, other.port_type())),
        }
    }

    /// Mutable audio sample view.
    pub fn as_audio_mut(&mut self) -> Result<&mut [f32]> {
        match self {
            PortData::AudioF32(v) => Ok(v.as_mut_slice()),
            other => Err(type_error(PortType::Audio, other.port_type())),
        }
    }

    /// F0 stream view.
    pub fn as_f0(&self) -> Result<&[f64]> {
        match self {
            PortData::F0F64(v) => Ok(v),
            other => Err(type_error(PortType::F0, other.port_type())),
        }
    }

    /// Mutable F0 stream view.
    pub fn as_f0_mut(&mut self) -> Result<&mut [f64]> {
        match self {
            PortData::F0F64(v) => Ok(v.as_mut_slice()),
            other => Err(type_error(PortType::F0, other.port_type())),
        }
    }

    /// Spectrum matrix view.
    pub fn as_spectrum(&self) -> Result<&FrameMatrix> {
        match self {
            PortData::SpectrumF64(m) => Ok(m),
            other => Err(type_error(PortType::Spectrum, other.port_type())),
        }
    }

    /// Mutable spectrum matrix view.
    pub fn as_spectrum_mut(&mut self) -> Result<&mut FrameMatrix> {
        match self {
            PortData::SpectrumF64(m) => Ok(m),
            other => Err(type_error(PortType::Spectrum, other.port_type())),
        }
    }

    /// Aperiodicity matrix view.
    pub fn as_aperiodicity(&self) -> Result<&FrameMatrix> {
        match self {
            PortData::AperiodicityF64(m) => Ok(m),
            other => Err(type_error(PortType::Aperiodicity, other.port_type())),
        }
    }

    /// Mutable aperiodicity matrix view.
    pub fn as_aperiodicity_mut(&mut self) -> Result<&mut FrameMatrix> {
        match self {
            PortData::AperiodicityF64(m) => Ok(m),
            other => Err(type_error(PortType::Aperiodicity, other.port_type())),
        }
    }

    /// Parameter aggregate view.
    pub fn as_params(&self) -> Result<&VoiceParameters> {
        match self {
            PortData::Params(p) => Ok(p),
            other => Err(type_error(PortType::Parameters, other.port_type())),
        }
    }

    /// Mutable parameter aggregate view.
    pub fn as_params_mut(&mut self) -> Result<&mut VoiceParameters> {
        match self {
            PortData::Params(p) => Ok(p),
            other => Err(type_error(PortType::Parameters, other.port_type())),
        }
    }
}

fn type_error(expected: PortType, got: PortType) -> EngineError {
    EngineError::new(
        ErrorKind::BufferNotAllocated,
        format!("port buffer is {got}, expected {expected}"),
    )
}

/// Reference to an output port's buffer: `(block, output port index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferRef {
    /// Owning block.
    pub block: BlockId,
    /// Output port index on that block.
    pub port: usize,
}

/// A typed named endpoint on a block.
#[derive(Debug)]
pub struct Port {
    name: String,
    direction: PortDirection,
    port_type: PortType,
    /// Element capacity: samples for audio, frames for the `f64` streams.
    capacity: usize,
    /// Secondary dimension for matrix-typed ports (bins per frame).
    width: usize,
    connected: bool,
    /// For input ports: the upstream output this port reads.
    source: Option<BufferRef>,
}

impl Port {
    /// Creates a vector-typed port (audio, F0, parameters, control).
    pub fn new(
        name: impl Into<String>,
        direction: PortDirection,
        port_type: PortType,
        capacity: usize,
    ) -> Self {
        Self {
            name: name.into(),
            direction,
            port_type,
            capacity,
            width: 0,
            connected: false,
            source: None,
        }
    }

    /// Creates a matrix-typed port (spectrum, aperiodicity) with
    /// `capacity` frames of `width` bins.
    pub fn matrix(
        name: impl Into<String>,
        direction: PortDirection,
        port_type: PortType,
        capacity: usize,
        width: usize,
    ) -> Self {
        Self {
            name: name.into(),
            direction,
            port_type,
            capacity,
            width,
            connected: false,
            source: None,
        }
    }

    /// Port name, unique within its block and direction.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Direction relative to the block.
    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    /// Data type.
    pub fn port_type(&self) -> PortType {
        self.port_type
    }

    /// Element capacity (samples or frames, by type).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bins per frame for matrix-typed ports; 0 otherwise.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Whether this port participates in an activated connection.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// The upstream buffer an input port reads, once activated.
    pub fn source(&self) -> Option<BufferRef> {
        self.source
    }

    pub(crate) fn set_connected(&mut self) {
        self.connected = true;
    }

    pub(crate) fn set_source(&mut self, source: BufferRef) {
        self.source = Some(source);
        self.connected = true;
    }

    /// Allocates the buffer satisfying this port's type and capacity.
    pub(crate) fn alloc_data(&self, arena: &mut Arena) -> Result<PortData> {
        match self.port_type {
            PortType::Audio => Ok(PortData::AudioF32(arena.alloc_vec_f32(self.capacity)?)),
            PortType::F0 => Ok(PortData::F0F64(arena.alloc_vec_f64(self.capacity)?)),
            PortType::Spectrum => Ok(PortData::SpectrumF64(FrameMatrix::alloc(
                arena,
                self.capacity,
                self.width,
            )?)),
            PortType::Aperiodicity => Ok(PortData::AperiodicityF64(FrameMatrix::alloc(
                arena,
                self.capacity,
                self.width,
            )?)),
            PortType::Parameters => Ok(PortData::Params(Box::new(empty_params()))),
            PortType::Control => Ok(PortData::ControlF64(0.0)),
        }
    }
}

fn empty_params() -> VoiceParameters {
    VoiceParameters {
        f0: Vec::new(),
        time_axis: Vec::new(),
        spectrum: voz_core::params::ParamMatrix::new(0, 0),
        aperiodicity: voz_core::params::ParamMatrix::new(0, 0),
        fft_size: 0,
        sample_rate: 0,
        frame_period_ms: 0.0,
    }
}
