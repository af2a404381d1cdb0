//! Voz Core - runtime primitives for the voice analysis/resynthesis engine.
//!
//! This crate provides the foundations every other `voz` crate builds on:
//!
//! - [`error`] - the ordered engine-wide error taxonomy ([`ErrorKind`],
//!   [`EngineError`], [`Result`])
//! - [`arena`] - the bump + free-list memory pool backing all graph and
//!   port buffers ([`Arena`], [`ArenaVec`])
//! - [`fast_math`] - scalar approximations (exp/log/sin/tanh/...) with
//!   documented clamps and error bounds
//! - [`kernels`] - SIMD-dispatched vector arithmetic, GEMM, and
//!   activations with a one-time CPU-capability dispatch
//! - [`params`] - the [`VoiceParameters`] aggregate shared between
//!   analysis and synthesis
//!
//! # Design Principles
//!
//! - **No allocations in the processing path**: the arena is sized once
//!   from the pipeline config; blocks draw fixed-capacity buffers from it.
//! - **IDs, not pointers**: buffers are addressed by handles whose
//!   stability the arena guarantees.
//! - **Unsafe stays here**: the arena storage and the `std::arch` kernel
//!   variants are the only unsafe code in the workspace.

pub mod arena;
pub mod error;
pub mod fast_math;
pub mod kernels;
pub mod params;

pub use arena::{Align, Arena, ArenaRef, ArenaVec, MIN_REUSE_BYTES};
pub use error::{EngineError, ErrorKind, Result, Severity};
pub use fast_math::{
    fast_cos, fast_exp, fast_gelu, fast_inv_sqrt, fast_log, fast_sigmoid, fast_sin, fast_sqrt,
    fast_tanh,
};
pub use kernels::{CpuFeatures, dispatch_name, gemm, vec_add, vec_dot, vec_mul, vec_scale};
pub use params::{ParamMatrix, VoiceParameters};
