//! Per-pass execution of a built diagram.
//!
//! The executor walks the cached topological order, taking each block's
//! output buffers out of the diagram's table for the duration of its
//! `process` call while every consumer-visible buffer stays a shared
//! read-only view. It aborts on the first non-success result, records it as
//! the diagram's last error, and never retries — retry policy belongs to
//! the pipeline.
//!
//! A cooperative [`CancelFlag`] is polled between blocks (and between
//! levels in parallel mode); an in-flight block always runs to completion.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use voz_core::error::{EngineError, ErrorKind, Result};

use crate::block::{Block, BlockId, ProcessIo};
use crate::diagram::{Diagram, DiagramState};
use crate::port::PortData;

/// Shared cooperative cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Requests cancellation; observed at the next block boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clears the flag for the next run.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Executor tuning for one pass.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Fan independent blocks of one topological level onto scoped
    /// threads. Sequential when false.
    pub parallel: bool,
    /// Thread bound for parallel fan-out; 0 means available parallelism.
    pub max_threads: usize,
}

impl Diagram {
    /// Runs one sequential pass over `frame_count` elements.
    pub fn process(&mut self, frame_count: usize) -> Result<()> {
        self.process_with(frame_count, &ExecOptions::default())
    }

    /// Runs one pass with explicit executor options.
    pub fn process_with(&mut self, frame_count: usize, opts: &ExecOptions) -> Result<()> {
        match self.state {
            DiagramState::Initialized | DiagramState::Ready => {}
            other => {
                return Err(EngineError::new(
                    ErrorKind::InvalidState,
                    format!("process requires an initialized diagram, state is {other:?}"),
                ));
            }
        }
        self.state = DiagramState::Running;

        let fan_out = opts.parallel && self.levels.iter().any(|l| l.len() > 1);
        let result = if fan_out {
            self.run_parallel(frame_count, opts.max_threads)
        } else {
            self.run_sequential(frame_count)
        };

        self.state = DiagramState::Ready;
        if let Err(ref e) = result {
            self.last_error = Some(e.clone());
        }
        result
    }

    fn run_sequential(&mut self, frame_count: usize) -> Result<()> {
        let order = self.topo.clone();
        for id in order {
            if self.cancel.is_cancelled() {
                return Err(EngineError::new(
                    ErrorKind::Cancelled,
                    "pass cancelled between blocks",
                ));
            }
            let idx = self.index_of(id)?;
            if !self.blocks[idx].is_enabled() {
                continue;
            }
            self.step_block(idx, id, frame_count)?;
        }
        Ok(())
    }

    /// Executes one block: take its outputs, resolve its input views, run
    /// `process`, restore the outputs whatever the outcome.
    fn step_block(&mut self, idx: usize, id: BlockId, frame_count: usize) -> Result<()> {
        let sources: Vec<_> = self.blocks[idx].inputs().iter().map(|p| p.source()).collect();

        let out_count = self.blocks[idx].outputs().len();
        let mut outs: Vec<PortData> = Vec::with_capacity(out_count);
        let mut take_err = None;
        for p in 0..out_count {
            match self.buffers.remove(&(id, p)) {
                Some(data) => outs.push(data),
                None => {
                    take_err = Some(EngineError::new(
                        ErrorKind::BufferNotAllocated,
                        format!("output port {p} of {id} has no buffer"),
                    ));
                    break;
                }
            }
        }

        let result = match take_err {
            Some(e) => Err(e),
            None => {
                let gathered: Result<Vec<&PortData>> = sources
                    .iter()
                    .enumerate()
                    .map(|(i, src)| {
                        let r = src.ok_or_else(|| {
                            EngineError::new(
                                ErrorKind::InvalidState,
                                format!("input port {i} of {id} not activated"),
                            )
                        })?;
                        self.buffers.get(&(r.block, r.port)).ok_or_else(|| {
                            EngineError::new(
                                ErrorKind::BufferNotAllocated,
                                format!("upstream buffer for input {i} of {id} missing"),
                            )
                        })
                    })
                    .collect();
                match gathered {
                    Ok(inputs) => {
                        let block = &mut self.blocks[idx];
                        let kind = block.kind();
                        let started = std::time::Instant::now();
                        let res = {
                            let mut io = ProcessIo {
                                inputs: &inputs,
                                outputs: &mut outs,
                            };
                            block.process(&mut io, frame_count)
                        };
                        if let Some(observer) = &self.observer {
                            observer(kind, started.elapsed());
                        }
                        res
                    }
                    Err(e) => Err(e),
                }
            }
        };

        for (p, data) in outs.into_iter().enumerate() {
            self.buffers.insert((id, p), data);
        }
        result.map_err(|e| {
            tracing::debug!(block = %id, error = %e, "block failed, aborting pass");
            e
        })
    }

    /// Level-wise fork/join execution: blocks within one topological level
    /// are independent and may run on scoped threads; the join barrier sits
    /// at the level boundary, before their common downstream consumers.
    fn run_parallel(&mut self, frame_count: usize, max_threads: usize) -> Result<()> {
        let threads = if max_threads == 0 {
            std::thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            max_threads
        };
        let levels = self.levels.clone();

        for level in levels {
            if self.cancel.is_cancelled() {
                return Err(EngineError::new(
                    ErrorKind::Cancelled,
                    "pass cancelled between levels",
                ));
            }

            let ids: Vec<BlockId> = level
                .iter()
                .copied()
                .filter(|&id| {
                    self.index_of(id)
                        .map(|i| self.blocks[i].is_enabled())
                        .unwrap_or(false)
                })
                .collect();
            if ids.is_empty() {
                continue;
            }
            if ids.len() == 1 || threads == 1 {
                for id in ids {
                    let idx = self.index_of(id)?;
                    self.step_block(idx, id, frame_count)?;
                }
                continue;
            }

            self.step_level_parallel(&ids, frame_count, threads)?;
        }
        Ok(())
    }

    fn step_level_parallel(
        &mut self,
        ids: &[BlockId],
        frame_count: usize,
        threads: usize,
    ) -> Result<()> {
        // Resolve input sources before any buffer is taken.
        let mut sources_per_id = Vec::with_capacity(ids.len());
        for &id in ids {
            let idx = self.index_of(id)?;
            let sources: Result<Vec<_>> = self.blocks[idx]
                .inputs()
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    p.source().ok_or_else(|| {
                        EngineError::new(
                            ErrorKind::InvalidState,
                            format!("input port {i} of {id} not activated"),
                        )
                    })
                })
                .collect();
            sources_per_id.push(sources?);
        }

        // Take every level block's outputs.
        let mut outs_per_id: Vec<Vec<PortData>> = Vec::with_capacity(ids.len());
        for &id in ids {
            let idx = self.index_of(id)?;
            let out_count = self.blocks[idx].outputs().len();
            let mut outs = Vec::with_capacity(out_count);
            for p in 0..out_count {
                match self.buffers.remove(&(id, p)) {
                    Some(data) => outs.push(data),
                    None => {
                        // Restore what was taken, then fail.
                        for (i, taken) in outs_per_id.into_iter().enumerate() {
                            for (pp, data) in taken.into_iter().enumerate() {
                                self.buffers.insert((ids[i], pp), data);
                            }
                        }
                        for (pp, data) in outs.into_iter().enumerate() {
                            self.buffers.insert((id, pp), data);
                        }
                        return Err(EngineError::new(
                            ErrorKind::BufferNotAllocated,
                            format!("output port {p} of {id} has no buffer"),
                        ));
                    }
                }
            }
            outs_per_id.push(outs);
        }

        // Shared input views plus exclusive block handles; the borrows are
        // disjoint fields of self.
        let buffers = &self.buffers;
        let mut block_handles: Vec<(BlockId, &mut Block)> = self
            .blocks
            .iter_mut()
            .filter(|b| ids.contains(&b.id()))
            .map(|b| (b.id(), b))
            .collect();
        block_handles.sort_by_key(|(id, _)| ids.iter().position(|x| x == id));

        struct Job<'a> {
            id: BlockId,
            block: &'a mut Block,
            inputs: Vec<&'a PortData>,
            outs: Vec<PortData>,
        }

        let mut jobs: Vec<Job<'_>> = Vec::with_capacity(ids.len());
        let mut gather_err: Option<EngineError> = None;
        for (((&id, sources), outs), (_, block)) in ids
            .iter()
            .zip(&sources_per_id)
            .zip(outs_per_id.drain(..))
            .zip(block_handles.drain(..))
        {
            let mut inputs = Vec::with_capacity(sources.len());
            for (i, r) in sources.iter().enumerate() {
                match buffers.get(&(r.block, r.port)) {
                    Some(d) => inputs.push(d),
                    None => {
                        gather_err.get_or_insert_with(|| {
                            EngineError::new(
                                ErrorKind::BufferNotAllocated,
                                format!("upstream buffer for input {i} of {id} missing"),
                            )
                        });
                    }
                }
            }
            jobs.push(Job {
                id,
                block,
                inputs,
                outs,
            });
        }

        let mut results: Vec<(BlockId, Vec<PortData>, Result<()>)> = Vec::with_capacity(ids.len());
        if let Some(e) = gather_err {
            for job in jobs {
                results.push((job.id, job.outs, Ok(())));
            }
            restore_outputs(&mut self.buffers, results);
            return Err(e);
        }

        // Round-robin the jobs over at most `threads` workers.
        let mut groups: Vec<Vec<Job<'_>>> = (0..threads.min(jobs.len())).map(|_| Vec::new()).collect();
        for (i, job) in jobs.into_iter().enumerate() {
            let slot = i % groups.len();
            groups[slot].push(job);
        }

        let mut timings: Vec<(crate::block::BlockKind, std::time::Duration)> = Vec::new();
        std::thread::scope(|scope| {
            let handles: Vec<_> = groups
                .into_iter()
                .map(|group| {
                    scope.spawn(move || {
                        let mut group_results = Vec::with_capacity(group.len());
                        for mut job in group {
                            let kind = job.block.kind();
                            let started = std::time::Instant::now();
                            let res = {
                                let mut io = ProcessIo {
                                    inputs: &job.inputs,
                                    outputs: &mut job.outs,
                                };
                                job.block.process(&mut io, frame_count)
                            };
                            group_results.push((job.id, job.outs, res, kind, started.elapsed()));
                        }
                        group_results
                    })
                })
                .collect();
            for handle in handles {
                for (id, outs, res, kind, elapsed) in
                    handle.join().expect("executor worker panicked")
                {
                    timings.push((kind, elapsed));
                    results.push((id, outs, res));
                }
            }
        });
        if let Some(observer) = &self.observer {
            for (kind, elapsed) in timings {
                observer(kind, elapsed);
            }
        }

        // First error in level (id) order wins.
        let mut first_err: Option<(usize, EngineError)> = None;
        for (id, _, res) in &results {
            if let Err(e) = res {
                let pos = ids.iter().position(|x| x == id).unwrap_or(usize::MAX);
                if first_err.as_ref().is_none_or(|(p, _)| pos < *p) {
                    first_err = Some((pos, e.clone()));
                }
            }
        }
        restore_outputs(&mut self.buffers, results);
        match first_err {
            Some((_, e)) => Err(e),
            None => Ok(()),
        }
    }
}

fn restore_outputs(
    buffers: &mut std::collections::HashMap<(BlockId, usize), PortData>,
    results: Vec<(BlockId, Vec<PortData>, Result<()>)>,
) {
    for (id, outs, _) in results {
        for (p, data) in outs.into_iter().enumerate() {
            buffers.insert((id, p), data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::test_support::{gain, sink, source};
    use voz_core::arena::Arena;

    fn chain_diagram(arena: &mut Arena) -> (Diagram, BlockId, BlockId, BlockId) {
        let mut d = Diagram::new();
        let a = d.add_block(source("src", 128, 0.5)).unwrap();
        let g = d.add_block(gain("gain", 128, 2.0)).unwrap();
        let s = d.add_block(sink("sink", 128)).unwrap();
        d.connect(a, 0, g, 0).unwrap();
        d.connect(g, 0, s, 0).unwrap();
        d.build().unwrap();
        d.initialize(arena).unwrap();
        (d, a, g, s)
    }

    #[test]
    fn sequential_pass_flows_data() {
        let mut arena = Arena::with_capacity(1 << 20).unwrap();
        let (mut d, _a, g, _s) = chain_diagram(&mut arena);
        d.process(128).unwrap();
        assert_eq!(d.state(), DiagramState::Ready);
        let out = d.output_data(g, 0).unwrap().as_audio().unwrap();
        assert!((out[0] - 1.0).abs() < 1e-6); // 0.5 * 2.0
        // Repeated passes are fine from Ready.
        d.process(128).unwrap();
    }

    #[test]
    fn disabled_blocks_are_skipped() {
        let mut arena = Arena::with_capacity(1 << 20).unwrap();
        let (mut d, _a, g, _s) = chain_diagram(&mut arena);
        d.block_mut(g).unwrap().set_enabled(false);
        d.process(128).unwrap();
        let out = d.output_data(g, 0).unwrap().as_audio().unwrap();
        assert_eq!(out[0], 0.0); // never written
    }

    #[test]
    fn cancel_aborts_pass() {
        let mut arena = Arena::with_capacity(1 << 20).unwrap();
        let (mut d, _a, _g, _s) = chain_diagram(&mut arena);
        d.cancel_flag().cancel();
        let err = d.process(128).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        d.cancel_flag().reset();
        d.process(128).unwrap();
    }

    #[test]
    fn process_before_initialize_is_invalid_state() {
        let mut d = Diagram::new();
        let a = d.add_block(source("src", 64, 1.0)).unwrap();
        let s = d.add_block(sink("sink", 64)).unwrap();
        d.connect(a, 0, s, 0).unwrap();
        d.build().unwrap();
        let err = d.process(64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn failing_block_aborts_and_records_error() {
        use crate::block::{Block, BlockKind, InitContext, Processor, ProcessIo};
        use crate::port::{Port, PortDirection, PortType};

        struct FailProc;
        impl Processor for FailProc {
            fn initialize(&mut self, _ctx: &mut InitContext<'_>) -> Result<()> {
                Ok(())
            }
            fn process(&mut self, _io: &mut ProcessIo<'_>, _n: usize) -> Result<()> {
                Err(EngineError::new(ErrorKind::F0Extraction, "synthetic failure"))
            }
            fn cleanup(&mut self) {}
        }

        let mut arena = Arena::with_capacity(1 << 20).unwrap();
        let mut d = Diagram::new();
        let a = d.add_block(source("src", 64, 1.0)).unwrap();
        let f = d
            .add_block(
                Block::new(
                    "fail",
                    BlockKind::Custom,
                    vec![Port::new("in", PortDirection::Input, PortType::Audio, 64)],
                    vec![Port::new("out", PortDirection::Output, PortType::Audio, 64)],
                    Box::new(FailProc),
                )
                .unwrap(),
            )
            .unwrap();
        let s = d.add_block(sink("sink", 64)).unwrap();
        d.connect(a, 0, f, 0).unwrap();
        d.connect(f, 0, s, 0).unwrap();
        d.build().unwrap();
        d.initialize(&mut arena).unwrap();

        let err = d.process(64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::F0Extraction);
        assert_eq!(d.last_error().unwrap().kind(), ErrorKind::F0Extraction);
        // Buffers restored despite the failure.
        assert!(d.output_data(f, 0).is_ok());
    }

    #[test]
    fn parallel_pass_matches_sequential() {
        // Diamond: src feeds two gains, both feed sinks.
        let mut arena = Arena::with_capacity(1 << 20).unwrap();
        let mut d = Diagram::new();
        let a = d.add_block(source("src", 128, 1.0)).unwrap();
        let g1 = d.add_block(gain("g1", 128, 2.0)).unwrap();
        let g2 = d.add_block(gain("g2", 128, 3.0)).unwrap();
        let s1 = d.add_block(sink("s1", 128)).unwrap();
        let s2 = d.add_block(sink("s2", 128)).unwrap();
        d.connect(a, 0, g1, 0).unwrap();
        d.connect(a, 0, g2, 0).unwrap();
        d.connect(g1, 0, s1, 0).unwrap();
        d.connect(g2, 0, s2, 0).unwrap();
        d.build().unwrap();
        d.initialize(&mut arena).unwrap();

        let opts = ExecOptions {
            parallel: true,
            max_threads: 2,
        };
        d.process_with(128, &opts).unwrap();

        let o1 = d.output_data(g1, 0).unwrap().as_audio().unwrap();
        let o2 = d.output_data(g2, 0).unwrap().as_audio().unwrap();
        assert!((o1[0] - 2.0).abs() < 1e-6);
        assert!((o2[0] - 3.0).abs() < 1e-6);
    }
}
