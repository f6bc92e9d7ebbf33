//! Radio-astronomy flagging and calibration pipeline built with holoflow.
//!
//! A generator produces synthetic visibility batches, a flagger marks
//! high-amplitude samples and a calibration stage reduces every batch to a
//! weighted sum of its flagged visibilities.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐  vis, flag  ┌─────────┐
//! │ data_gen │────────────▶│ flagger │
//! └────┬─────┘             └────┬────┘
//!      │ vis, weight            │ flag
//!      ▼                        ▼
//! ┌────────────────────────────────────┐
//! │            calibration             │
//! └────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use holoradio::{HoloRadio, config::Dims};
//! use holoflow_graph::prelude::SchedulerConfig;
//!
//! let radio = HoloRadio::compose(Dims([2, 4, 4, 2]), 3).unwrap();
//! let result = radio.run(SchedulerConfig::default()).unwrap();
//! assert!(result.is_success());
//! assert_eq!(radio.results().len(), 3);
//! ```

pub mod config;
pub mod cube;
pub mod ops;

pub use cube::{Complex32, Cube};
pub use ops::{CalibrationOp, DataGeneratorOp, FlagOp};

use holoflow_graph::prelude::*;

use crate::config::Dims;

/// The composed pipeline and the handles of its nodes.
#[derive(Debug)]
pub struct HoloRadio {
    graph: Graph,
    data_gen: NodeId,
    flagger: NodeId,
    calibration: NodeId,
}

impl HoloRadio {
    /// Builds and freezes the pipeline; the generator runs `iterations` times.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigurationError`] raised while wiring the graph.
    pub fn compose(dims: Dims, iterations: u64) -> Result<Self, ConfigurationError> {
        let mut graph = Graph::new();
        let data_gen = graph.add_operator(
            "data_gen",
            DataGeneratorOp::new(dims.0),
            [CountCondition::new(iterations).boxed()],
        )?;
        let flagger = graph.add_operator("flagger", FlagOp, [])?;
        let calibration = graph.add_operator("calibration", CalibrationOp::default(), [])?;

        graph
            .add_flow(data_gen, flagger, [("vis", "vis"), ("flag", "flag")])?
            .add_flow(data_gen, calibration, [("vis", "vis")])?
            .add_flow(data_gen, calibration, [("weight", "weight")])?
            .add_flow(flagger, calibration, [("flag", "flag")])?;
        graph.freeze()?;

        Ok(Self {
            graph,
            data_gen,
            flagger,
            calibration,
        })
    }

    /// Runs the pipeline to completion.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] if the scheduler could not run the graph.
    pub fn run(&self, config: SchedulerConfig) -> Result<RunResult, RunError> {
        Scheduler::new(config).run(&self.graph)
    }

    /// The underlying graph.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Generator node.
    pub fn data_gen(&self) -> NodeId {
        self.data_gen
    }

    /// Flagger node.
    pub fn flagger(&self) -> NodeId {
        self.flagger
    }

    /// Calibration node.
    pub fn calibration(&self) -> NodeId {
        self.calibration
    }

    /// Batches generated so far.
    pub fn generated(&self) -> u64 {
        self.graph
            .operator::<DataGeneratorOp>(self.data_gen)
            .map_or(0, |op| op.count())
    }

    /// Calibration sums recorded so far.
    pub fn results(&self) -> Vec<Complex32> {
        self.graph
            .operator::<CalibrationOp>(self.calibration)
            .map(|op| op.results().to_vec())
            .unwrap_or_default()
    }
}
