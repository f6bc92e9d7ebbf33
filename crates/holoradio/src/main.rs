//! `holoradio` pipeline runner.
//!
//! Generates synthetic visibility batches, flags outliers and calibrates each
//! batch on a multi-worker scheduler.
//!
//! # Usage
//!
//! ```bash
//! HOLORADIO_WORKERS=4 HOLORADIO_ITERATIONS=10 HOLORADIO_DIMS=8,64,32,4 holoradio
//! ```
//!
//! Variables may also be placed in a `.env` file. `HOLORADIO_LOG` takes a
//! tracing filter such as `holoradio=info,holoflow_graph=debug`.

use std::process::ExitCode;

use holoflow_core::{TracingFormat, TracingSetup};
use holoflow_graph::prelude::SchedulerConfig;
use holoradio::HoloRadio;
use holoradio::config::RadioConfig;

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    let config = RadioConfig::from_env();
    let mut setup = TracingSetup::new().with_format(TracingFormat::Compact);
    if let Some(filter) = config.as_ref().ok().and_then(|config| config.log.clone()) {
        setup = setup.with_env_filter(filter);
    }
    setup.init();

    let config = match config {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        workers = config.workers,
        iterations = config.iterations,
        dims = ?config.dims.0,
        "starting holoradio"
    );

    let radio = match HoloRadio::compose(config.dims, config.iterations) {
        Ok(radio) => radio,
        Err(err) => {
            tracing::error!(error = %err, "failed to compose pipeline");
            return ExitCode::FAILURE;
        }
    };

    let result = match radio.run(SchedulerConfig::new().with_worker_count(config.workers)) {
        Ok(result) => result,
        Err(err) => {
            tracing::error!(error = %err, "run failed");
            return ExitCode::FAILURE;
        }
    };

    for report in &result.nodes {
        tracing::info!(
            node = %report.name,
            executions = report.executions,
            outcome = %report.outcome,
            "node finished"
        );
    }
    tracing::info!(
        generated = radio.generated(),
        calibrated = radio.results().len(),
        duration = ?result.duration,
        "holoradio finished"
    );

    match result.into_result() {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "pipeline failed");
            ExitCode::FAILURE
        }
    }
}
