//! The pipeline operators.

use holoflow_graph::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cube::{Complex32, Cube, Shape, flag_outliers, flagged_weighted_sum};

/// Seed used for every generated batch, so each iteration sees the same data.
pub const SEED: u64 = 42;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Standard normal sample via the Box-Muller transform.
fn standard_normal(rng: &mut impl Rng) -> f32 {
    // gen() is in [0, 1); 1 - u keeps the logarithm finite
    let u1: f32 = 1.0 - rng.r#gen::<f32>();
    let u2: f32 = rng.r#gen();
    (-2.0 * u1.ln()).sqrt() * (core::f32::consts::TAU * u2).cos()
}

// ─────────────────────────────────────────────────────────────────────────────
// DataGeneratorOp
// ─────────────────────────────────────────────────────────────────────────────

/// Source producing a synthetic `flag`, `vis` and `weight` batch per execution.
///
/// Flags are uniform in `0..8`, visibilities are purely imaginary standard
/// normal samples and weights are standard normal samples.
#[derive(Debug)]
pub struct DataGeneratorOp {
    shape: Shape,
    count: u64,
}

impl DataGeneratorOp {
    /// Creates a generator for cubes of the given shape.
    pub fn new(shape: Shape) -> Self {
        Self { shape, count: 0 }
    }

    /// Shape of the generated cubes.
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Number of batches generated so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Generates one batch.
    pub fn generate(&self) -> (Cube<u8>, Cube<Complex32>, Cube<f32>) {
        let mut rng = StdRng::seed_from_u64(SEED);
        let flag = Cube::from_fn(self.shape, || rng.gen_range(0..8u8));
        let vis = Cube::from_fn(self.shape, || {
            Complex32::new(0.0, standard_normal(&mut rng))
        });
        let weight = Cube::from_fn(self.shape, || standard_normal(&mut rng));
        (flag, vis, weight)
    }
}

impl Operator for DataGeneratorOp {
    fn setup(&self, spec: &mut OperatorSpec) {
        spec.output::<Cube<u8>>("flag")
            .output::<Cube<Complex32>>("vis")
            .output::<Cube<f32>>("weight");
    }

    fn compute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), OperatorError> {
        let (flag, vis, weight) = self.generate();
        let gib = (vis.nbytes() + flag.nbytes() + weight.nbytes()) as f64 / GIB;
        tracing::info!(
            execution = ctx.execution(),
            size = %format!("{gib:.1}GB"),
            "batch generated"
        );

        ctx.emit(flag, "flag")?;
        ctx.emit(vis, "vis")?;
        ctx.emit(weight, "weight")?;
        self.count += 1;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FlagOp
// ─────────────────────────────────────────────────────────────────────────────

/// Raises flags on high-amplitude visibilities.
#[derive(Debug, Default)]
pub struct FlagOp;

impl Operator for FlagOp {
    fn setup(&self, spec: &mut OperatorSpec) {
        spec.input::<Cube<Complex32>>("vis")
            .input::<Cube<u8>>("flag")
            .output::<Cube<u8>>("flag");
    }

    fn compute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), OperatorError> {
        let flag = ctx.receive_as::<Cube<u8>>("flag")?;
        let vis = ctx.receive_as::<Cube<Complex32>>("vis")?;
        let flagged =
            flag_outliers(&vis, &flag).map_err(|err| OperatorError::compute(err.to_string()))?;
        ctx.emit(flagged, "flag")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CalibrationOp
// ─────────────────────────────────────────────────────────────────────────────

/// Reduces each batch to the weighted sum of its flagged visibilities.
#[derive(Debug, Default)]
pub struct CalibrationOp {
    results: Vec<Complex32>,
}

impl CalibrationOp {
    /// One sum per processed batch, in arrival order.
    pub fn results(&self) -> &[Complex32] {
        &self.results
    }
}

impl Operator for CalibrationOp {
    fn setup(&self, spec: &mut OperatorSpec) {
        spec.input::<Cube<Complex32>>("vis")
            .input::<Cube<u8>>("flag")
            .input::<Cube<f32>>("weight");
    }

    fn compute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), OperatorError> {
        let flag = ctx.receive_as::<Cube<u8>>("flag")?;
        let vis = ctx.receive_as::<Cube<Complex32>>("vis")?;
        let weight = ctx.receive_as::<Cube<f32>>("weight")?;

        let sum = flagged_weighted_sum(&vis, &weight, &flag)
            .map_err(|err| OperatorError::compute(err.to_string()))?;
        tracing::info!(execution = ctx.execution(), %sum, "batch calibrated");
        self.results.push(sum);
        Ok(())
    }
}
