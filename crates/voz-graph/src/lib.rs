//! Voz Graph - the typed block/port dataflow runtime.
//!
//! A [`Diagram`] owns named [`Block`]s connected by [`Connection`]s between
//! typed ports. The lifecycle is:
//!
//! 1. **Draft** - add blocks ([`Diagram::add_block`]) and wire them
//!    ([`Diagram::connect`]); local constraints (types, capacities,
//!    single producer) are enforced immediately.
//! 2. **Built** - [`Diagram::build`] validates globally (cycles, required
//!    inputs) and caches the canonical topological order with
//!    ascending-id tie-breaks.
//! 3. **Initialized** - [`Diagram::initialize`] allocates every output
//!    port's buffer from the arena and runs the block init hooks.
//! 4. **Running/Ready** - [`Diagram::process`] executes one pass per call;
//!    a shared [`CancelFlag`] is polled between blocks.
//!
//! Buffers are shared by reference: an output feeding several inputs is a
//! single allocation, and consumers must treat it as read-only during the
//! pass. Blocks implement the [`Processor`] trait and never see each other
//! or the scheduler.

pub mod block;
pub mod connection;
pub mod diagram;
mod dot;
pub mod executor;
pub mod port;

pub use block::{Block, BlockId, BlockKind, InitContext, ProcessIo, Processor};
pub use connection::Connection;
pub use diagram::{BlockObserver, Diagram, DiagramState};
pub use executor::{CancelFlag, ExecOptions};
pub use port::{BufferRef, FrameMatrix, Port, PortData, PortDirection, PortType};
