//! The diagram: a validated, topologically-ordered set of blocks and
//! connections, plus the buffer table their ports resolve against.
//!
//! Mutation (add/connect) is only legal in `Draft`. [`build`](Diagram::build)
//! validates the wiring, caches the canonical topological order (ascending
//! block id on ties, so execution order is deterministic), and freezes the
//! topology. [`initialize`](Diagram::initialize) allocates every output
//! port's buffer from the arena and runs the block init hooks in
//! topological order.

use std::collections::HashMap;

use voz_core::arena::Arena;
use voz_core::error::{EngineError, ErrorKind, Result};

use crate::block::{Block, BlockId};
use crate::connection::Connection;
use crate::executor::CancelFlag;
use crate::port::PortData;

/// Lifecycle state of a diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagramState {
    /// Mutable: blocks and connections may be added.
    Draft,
    /// Topology frozen, order cached, buffers not yet allocated.
    Built,
    /// Buffers allocated, blocks initialized, ready to process.
    Initialized,
    /// A process pass is in flight.
    Running,
    /// Between passes.
    Ready,
}

/// A validated graph of blocks owning its buffers and execution order.
pub struct Diagram {
    pub(crate) blocks: Vec<Block>,
    pub(crate) connections: Vec<Connection>,
    /// Output-port buffers, keyed by `(block, output index)`. Taken out
    /// for the duration of the owning block's `process` and restored
    /// after, so inputs can be shared views at the same time.
    pub(crate) buffers: HashMap<(BlockId, usize), PortData>,
    pub(crate) topo: Vec<BlockId>,
    /// Topological levels for the optional parallel executor.
    pub(crate) levels: Vec<Vec<BlockId>>,
    pub(crate) state: DiagramState,
    pub(crate) last_error: Option<EngineError>,
    pub(crate) cancel: CancelFlag,
    pub(crate) observer: Option<BlockObserver>,
    next_id: u32,
}

/// Hook invoked after each block's `process` with its wall-clock cost.
pub type BlockObserver = Box<dyn Fn(crate::block::BlockKind, std::time::Duration) + Send + Sync>;

impl Default for Diagram {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagram {
    /// Creates an empty draft diagram.
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            connections: Vec::new(),
            buffers: HashMap::new(),
            topo: Vec::new(),
            levels: Vec::new(),
            state: DiagramState::Draft,
            last_error: None,
            cancel: CancelFlag::default(),
            observer: None,
            next_id: 0,
        }
    }

    /// Installs a per-block timing observer (e.g. the performance
    /// monitor's stage hook).
    pub fn set_block_observer(&mut self, observer: BlockObserver) {
        self.observer = Some(observer);
    }

    /// Adds a block, assigning it the next monotonic id.
    ///
    /// Fails if the diagram is no longer a draft or the name is taken.
    pub fn add_block(&mut self, mut block: Block) -> Result<BlockId> {
        self.require_state(DiagramState::Draft, "add_block")?;
        if self.blocks.iter().any(|b| b.name() == block.name()) {
            return Err(EngineError::new(
                ErrorKind::InvalidArgument,
                format!("block name '{}' already in diagram", block.name()),
            ));
        }
        let id = BlockId(self.next_id);
        self.next_id += 1;
        block.set_id(id);
        self.blocks.push(block);
        Ok(id)
    }

    /// Creates, validates, and activates a connection.
    ///
    /// Local constraints (existence, direction, type, capacity, self-loop,
    /// single producer per input) are enforced here; global ones (cycles,
    /// required inputs) wait for [`validate`](Self::validate).
    pub fn connect(
        &mut self,
        src_block: BlockId,
        src_port: usize,
        dst_block: BlockId,
        dst_port: usize,
    ) -> Result<()> {
        self.require_state(DiagramState::Draft, "connect")?;
        if self
            .connections
            .iter()
            .any(|c| c.dst_block == dst_block && c.dst_port == dst_port)
        {
            return Err(EngineError::new(
                ErrorKind::InvalidArgument,
                format!("input port {dst_port} of {dst_block} already has a producer"),
            ));
        }
        let mut conn = Connection::new(src_block, src_port, dst_block, dst_port);
        conn.activate(&mut self.blocks)?;
        self.connections.push(conn);
        Ok(())
    }

    /// Global wiring check.
    ///
    /// Fails on dangling connections, type mismatches, duplicate producers,
    /// cycles, or a required input left unconnected (every input port of a
    /// block that has inputs must be fed; outputs may dangle).
    pub fn validate(&self) -> Result<()> {
        for conn in &self.connections {
            conn.validate(&self.blocks)?;
        }
        // Duplicate producers (connect() prevents them, but validate must
        // stand on its own for diagrams assembled elsewhere).
        for (i, a) in self.connections.iter().enumerate() {
            for b in &self.connections[i + 1..] {
                if a.dst_block == b.dst_block && a.dst_port == b.dst_port {
                    return Err(EngineError::new(
                        ErrorKind::InvalidArgument,
                        format!("input port {} of {} has two producers", a.dst_port, a.dst_block),
                    ));
                }
            }
        }
        for block in &self.blocks {
            for (idx, port) in block.inputs().iter().enumerate() {
                if !port.is_connected() {
                    return Err(EngineError::new(
                        ErrorKind::InvalidArgument,
                        format!(
                            "input port {idx} ('{}') of block '{}' is unconnected",
                            port.name(),
                            block.name()
                        ),
                    ));
                }
            }
        }
        self.topological_order().map(|_| ())
    }

    /// Validates and freezes the diagram, caching the canonical
    /// topological order.
    pub fn build(&mut self) -> Result<()> {
        self.require_state(DiagramState::Draft, "build")?;
        if let Err(e) = self.validate() {
            let err = EngineError::new(
                ErrorKind::GraphBuildFailed,
                format!("diagram validation failed: {e}"),
            );
            self.last_error = Some(err.clone());
            return Err(err);
        }
        self.topo = self.topological_order()?;
        self.levels = self.topological_levels();
        self.state = DiagramState::Built;
        tracing::debug!(
            blocks = self.blocks.len(),
            connections = self.connections.len(),
            levels = self.levels.len(),
            "diagram built"
        );
        Ok(())
    }

    /// Allocates output-port buffers from the arena and initializes every
    /// block in topological order.
    ///
    /// On failure, blocks initialized so far are cleaned up and the error
    /// is returned.
    pub fn initialize(&mut self, arena: &mut Arena) -> Result<()> {
        self.require_state(DiagramState::Built, "initialize")?;
        let order = self.topo.clone();
        let mut done: Vec<BlockId> = Vec::new();
        for id in order {
            let idx = self.index_of(id)?;
            match self.blocks[idx].initialize(arena) {
                Ok(buffers) => {
                    for (port_idx, data) in buffers.into_iter().enumerate() {
                        self.buffers.insert((id, port_idx), data);
                    }
                    done.push(id);
                }
                Err(e) => {
                    for prev in done {
                        if let Ok(pidx) = self.index_of(prev) {
                            self.blocks[pidx].cleanup();
                        }
                    }
                    self.buffers.clear();
                    self.last_error = Some(e.clone());
                    return Err(e);
                }
            }
        }
        self.state = DiagramState::Initialized;
        Ok(())
    }

    /// Runs every block's cleanup hook and drops the buffer table.
    ///
    /// Safe from any state; the diagram returns to `Built` (or stays
    /// `Draft` if it was never built).
    pub fn cleanup(&mut self) {
        for block in &mut self.blocks {
            block.cleanup();
        }
        self.buffers.clear();
        if self.state != DiagramState::Draft {
            self.state = DiagramState::Built;
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DiagramState {
        self.state
    }

    /// The first error of the most recent failed operation.
    pub fn last_error(&self) -> Option<&EngineError> {
        self.last_error.as_ref()
    }

    /// The cached topological order (empty before `build`).
    pub fn topological_order_cached(&self) -> &[BlockId] {
        &self.topo
    }

    /// The cancel flag polled between blocks.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Replaces the cancel flag, e.g. with a pipeline-owned one shared
    /// across executions.
    pub fn set_cancel_flag(&mut self, flag: CancelFlag) {
        self.cancel = flag;
    }

    /// Looks up a block by id.
    pub fn block(&self, id: BlockId) -> Result<&Block> {
        self.blocks
            .iter()
            .find(|b| b.id() == id)
            .ok_or_else(|| EngineError::new(ErrorKind::NotFound, format!("{id} not in diagram")))
    }

    /// Looks up a block by id, mutable.
    pub fn block_mut(&mut self, id: BlockId) -> Result<&mut Block> {
        self.blocks
            .iter_mut()
            .find(|b| b.id() == id)
            .ok_or_else(|| EngineError::new(ErrorKind::NotFound, format!("{id} not in diagram")))
    }

    /// Looks up a block by name.
    pub fn block_by_name(&self, name: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.name() == name)
    }

    /// All blocks, in insertion order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// All connections, in creation order.
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Whether every block supports streaming-mode (partial frame) calls.
    pub fn supports_streaming(&self) -> bool {
        self.blocks.iter().all(|b| b.streaming_capable())
    }

    /// Reads an output port's buffer, e.g. for tests or result extraction.
    pub fn output_data(&self, block: BlockId, port: usize) -> Result<&PortData> {
        self.buffers.get(&(block, port)).ok_or_else(|| {
            EngineError::new(
                ErrorKind::BufferNotAllocated,
                format!("no buffer for output port {port} of {block}"),
            )
        })
    }

    pub(crate) fn index_of(&self, id: BlockId) -> Result<usize> {
        self.blocks
            .iter()
            .position(|b| b.id() == id)
            .ok_or_else(|| EngineError::new(ErrorKind::NotFound, format!("{id} not in diagram")))
    }

    pub(crate) fn require_state(&self, expected: DiagramState, op: &str) -> Result<()> {
        if self.state != expected {
            return Err(EngineError::new(
                ErrorKind::InvalidState,
                format!("{op} requires {expected:?} state, diagram is {:?}", self.state),
            ));
        }
        Ok(())
    }

    /// Kahn's algorithm with a min-heap so equal-depth blocks execute in
    /// ascending id order.
    fn topological_order(&self) -> Result<Vec<BlockId>> {
        use std::cmp::Reverse;
        use std::collections::BinaryHeap;

        let mut in_degree: HashMap<BlockId, usize> =
            self.blocks.iter().map(|b| (b.id(), 0)).collect();
        for conn in &self.connections {
            if let Some(d) = in_degree.get_mut(&conn.dst_block) {
                *d += 1;
            }
        }

        let mut heap: BinaryHeap<Reverse<BlockId>> = in_degree
            .iter()
            .filter(|&(_, &d)| d == 0)
            .map(|(&id, _)| Reverse(id))
            .collect();

        let mut order = Vec::with_capacity(self.blocks.len());
        while let Some(Reverse(id)) = heap.pop() {
            order.push(id);
            for conn in &self.connections {
                if conn.src_block == id {
                    let d = in_degree
                        .get_mut(&conn.dst_block)
                        .expect("connection validated against block table");
                    *d -= 1;
                    if *d == 0 {
                        heap.push(Reverse(conn.dst_block));
                    }
                }
            }
        }

        if order.len() != self.blocks.len() {
            return Err(EngineError::new(
                ErrorKind::GraphBuildFailed,
                "cycle detected in diagram",
            ));
        }
        Ok(order)
    }

    /// Groups the topological order into depth levels; blocks within one
    /// level are mutually independent.
    fn topological_levels(&self) -> Vec<Vec<BlockId>> {
        let mut depth: HashMap<BlockId, usize> = HashMap::new();
        for &id in &self.topo {
            let d = self
                .connections
                .iter()
                .filter(|c| c.dst_block == id)
                .map(|c| depth.get(&c.src_block).copied().unwrap_or(0) + 1)
                .max()
                .unwrap_or(0);
            depth.insert(id, d);
        }
        let max_depth = depth.values().copied().max().unwrap_or(0);
        let mut levels = vec![Vec::new(); max_depth + 1];
        for &id in &self.topo {
            levels[depth[&id]].push(id);
        }
        levels.retain(|l| !l.is_empty());
        levels
    }
}

impl std::fmt::Debug for Diagram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagram")
            .field("blocks", &self.blocks.len())
            .field("connections", &self.connections.len())
            .field("state", &self.state)
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::port::{Port, PortDirection, PortType};

    #[test]
    fn add_block_assigns_monotonic_ids() {
        let mut d = Diagram::new();
        let a = d.add_block(source("a", 64, 1.0)).unwrap();
        let b = d.add_block(gain("b", 64, 2.0)).unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut d = Diagram::new();
        d.add_block(source("a", 64, 1.0)).unwrap();
        let err = d.add_block(source("a", 64, 1.0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn connect_rejects_type_mismatch() {
        let mut d = Diagram::new();
        let a = d.add_block(source("a", 64, 1.0)).unwrap();
        let b = d
            .add_block(
                crate::block::Block::new(
                    "f0sink",
                    crate::block::BlockKind::Custom,
                    vec![Port::new("in", PortDirection::Input, PortType::F0, 64)],
                    vec![],
                    Box::new(SinkProc { sum: 0.0 }),
                )
                .unwrap(),
            )
            .unwrap();
        let err = d.connect(a, 0, b, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn connect_rejects_capacity_overrun() {
        let mut d = Diagram::new();
        let a = d.add_block(source("a", 64, 1.0)).unwrap();
        let b = d.add_block(sink("b", 128)).unwrap();
        let err = d.connect(a, 0, b, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn connect_rejects_second_producer() {
        let mut d = Diagram::new();
        let a = d.add_block(source("a", 64, 1.0)).unwrap();
        let b = d.add_block(source("b", 64, 2.0)).unwrap();
        let s = d.add_block(sink("s", 64)).unwrap();
        d.connect(a, 0, s, 0).unwrap();
        let err = d.connect(b, 0, s, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn validate_rejects_unconnected_input() {
        let mut d = Diagram::new();
        d.add_block(source("a", 64, 1.0)).unwrap();
        d.add_block(sink("s", 64)).unwrap();
        assert!(d.validate().is_err());
    }

    #[test]
    fn cycle_fails_validate_and_build() {
        let mut d = Diagram::new();
        let a = d.add_block(gain("a", 64, 1.0)).unwrap();
        let b = d.add_block(gain("b", 64, 1.0)).unwrap();
        d.connect(a, 0, b, 0).unwrap();
        d.connect(b, 0, a, 0).unwrap();
        assert!(d.validate().is_err());
        let err = d.build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GraphBuildFailed);
        assert_eq!(d.state(), DiagramState::Draft);
        assert!(d.last_error().is_some());
    }

    #[test]
    fn topo_order_respects_edges_and_id_ties() {
        let mut d = Diagram::new();
        let src = d.add_block(source("src", 64, 1.0)).unwrap();
        let g1 = d.add_block(gain("g1", 64, 1.0)).unwrap();
        let g2 = d.add_block(gain("g2", 64, 1.0)).unwrap();
        let s1 = d.add_block(sink("s1", 64)).unwrap();
        let s2 = d.add_block(sink("s2", 64)).unwrap();
        d.connect(src, 0, g1, 0).unwrap();
        d.connect(src, 0, g2, 0).unwrap();
        d.connect(g1, 0, s1, 0).unwrap();
        d.connect(g2, 0, s2, 0).unwrap();
        d.build().unwrap();

        let topo = d.topological_order_cached();
        assert_eq!(topo.len(), 5);
        // Each block appears exactly once.
        let mut seen = topo.to_vec();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 5);
        // Every edge goes forward.
        let pos =
            |id: BlockId| topo.iter().position(|&x| x == id).unwrap();
        for conn in d.connections() {
            assert!(pos(conn.src_block) < pos(conn.dst_block));
        }
        // Equal-depth blocks in ascending id order.
        assert!(pos(g1) < pos(g2));
        assert!(pos(s1) < pos(s2));
    }

    #[test]
    fn build_freezes_topology() {
        let mut d = Diagram::new();
        let a = d.add_block(source("a", 64, 1.0)).unwrap();
        let s = d.add_block(sink("s", 64)).unwrap();
        d.connect(a, 0, s, 0).unwrap();
        d.build().unwrap();
        assert_eq!(d.state(), DiagramState::Built);
        let err = d.add_block(source("late", 64, 0.0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn initialize_allocates_output_buffers() {
        let mut arena = Arena::with_capacity(1 << 20).unwrap();
        let mut d = Diagram::new();
        let a = d.add_block(source("a", 256, 1.0)).unwrap();
        let s = d.add_block(sink("s", 256)).unwrap();
        d.connect(a, 0, s, 0).unwrap();
        d.build().unwrap();
        d.initialize(&mut arena).unwrap();

        assert_eq!(d.state(), DiagramState::Initialized);
        let data = d.output_data(a, 0).unwrap();
        let audio = data.as_audio().unwrap();
        assert_eq!(audio.len(), 256);
        // Arena-backed buffers are 64-byte aligned.
        assert_eq!((audio.as_ptr() as usize) % 64, 0);
        // The activated input references the upstream output.
        let sink_block = d.block(s).unwrap();
        assert_eq!(
            sink_block.inputs()[0].source(),
            Some(crate::port::BufferRef { block: a, port: 0 })
        );
    }
}
