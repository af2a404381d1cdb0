//! Directed edges between output and input ports.

use voz_core::error::{EngineError, ErrorKind, Result};

use crate::block::{Block, BlockId};
use crate::port::BufferRef;

/// A directed edge `(src_block, src_port) → (dst_block, dst_port)`.
///
/// `src_port` indexes the source block's outputs, `dst_port` the
/// destination block's inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    /// Producing block.
    pub src_block: BlockId,
    /// Output port index on the producer.
    pub src_port: usize,
    /// Consuming block.
    pub dst_block: BlockId,
    /// Input port index on the consumer.
    pub dst_port: usize,
    activated: bool,
}

impl Connection {
    /// Creates an unactivated connection.
    pub fn new(src_block: BlockId, src_port: usize, dst_block: BlockId, dst_port: usize) -> Self {
        Self {
            src_block,
            src_port,
            dst_block,
            dst_port,
            activated: false,
        }
    }

    /// Whether [`activate`](Self::activate) has wired the ports.
    pub fn is_activated(&self) -> bool {
        self.activated
    }

    /// Checks this edge against the block table.
    ///
    /// Enforces: both endpoints exist, port indices are in range, port
    /// types match, the consumer's capacity does not exceed the
    /// producer's, and the edge is not a self-loop. The single-producer
    /// rule is checked by the diagram, which sees all edges.
    pub fn validate(&self, blocks: &[Block]) -> Result<()> {
        if self.src_block == self.dst_block {
            return Err(EngineError::new(
                ErrorKind::InvalidArgument,
                format!("self-loop on block {}", self.src_block),
            ));
        }
        let src = block_by_id(blocks, self.src_block)?;
        let dst = block_by_id(blocks, self.dst_block)?;

        let src_port = src.outputs().get(self.src_port).ok_or_else(|| {
            EngineError::new(
                ErrorKind::NotFound,
                format!("block '{}' has no output port {}", src.name(), self.src_port),
            )
        })?;
        let dst_port = dst.inputs().get(self.dst_port).ok_or_else(|| {
            EngineError::new(
                ErrorKind::NotFound,
                format!("block '{}' has no input port {}", dst.name(), self.dst_port),
            )
        })?;

        if src_port.port_type() != dst_port.port_type() {
            return Err(EngineError::new(
                ErrorKind::InvalidArgument,
                format!(
                    "type mismatch: '{}:{}' is {}, '{}:{}' is {}",
                    src.name(),
                    src_port.name(),
                    src_port.port_type(),
                    dst.name(),
                    dst_port.name(),
                    dst_port.port_type()
                ),
            ));
        }
        if dst_port.capacity() > src_port.capacity() {
            return Err(EngineError::new(
                ErrorKind::InvalidArgument,
                format!(
                    "consumer capacity {} exceeds producer capacity {} on '{}:{}'",
                    dst_port.capacity(),
                    src_port.capacity(),
                    dst.name(),
                    dst_port.name()
                ),
            ));
        }
        Ok(())
    }

    /// Wires the input port to reference the output port's buffer and sets
    /// both `is_connected` flags. Idempotent.
    pub fn activate(&mut self, blocks: &mut [Block]) -> Result<()> {
        if self.activated {
            return Ok(());
        }
        self.validate(blocks)?;
        let source = BufferRef {
            block: self.src_block,
            port: self.src_port,
        };
        // Indices were range-checked by validate.
        let dst_idx = index_of(blocks, self.dst_block)?;
        blocks[dst_idx].input_mut(self.dst_port).set_source(source);
        let src_idx = index_of(blocks, self.src_block)?;
        blocks[src_idx].output_mut(self.src_port).set_connected();
        self.activated = true;
        Ok(())
    }
}

fn block_by_id(blocks: &[Block], id: BlockId) -> Result<&Block> {
    blocks
        .iter()
        .find(|b| b.id() == id)
        .ok_or_else(|| EngineError::new(ErrorKind::NotFound, format!("{id} not in diagram")))
}

fn index_of(blocks: &[Block], id: BlockId) -> Result<usize> {
    blocks
        .iter()
        .position(|b| b.id() == id)
        .ok_or_else(|| EngineError::new(ErrorKind::NotFound, format!("{id} not in diagram")))
}
