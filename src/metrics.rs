//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Packflow.
//! The Packflow project belongs to the Dunimd Team.
//!
//! Licensed under the Apache License, Version 2.0 (the "License");
//! You may not use this file except in compliance with the License.
//! You may obtain a copy of the License at
//!
//!     http://www.apache.org/licenses/LICENSE-2.0
//!
//! Unless required by applicable law or agreed to in writing, software
//! distributed under the License is distributed on an "AS IS" BASIS,
//! WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//! See the License for the specific language governing permissions and
//! limitations under the License.

//! # Execution Metrics Module
//!
//! Per-call timings of the pipeline stages, in milliseconds rounded to five
//! decimals. Optional stages that were not run stay `None` and do not count
//! towards the total.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Elapsed time of each stage.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PfExecutionTimes {
    pub preprocess: f64,
    pub transform_inputs: Option<f64>,
    pub execute: f64,
    pub transform_outputs: Option<f64>,
}

impl PfExecutionTimes {
    pub fn total(&self) -> f64 {
        self.preprocess
            + self.transform_inputs.unwrap_or(0.0)
            + self.execute
            + self.transform_outputs.unwrap_or(0.0)
    }
}

/// Snapshot of one successful pipeline call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PfExecutionMetrics {
    pub batch_size: usize,
    pub execution_times: PfExecutionTimes,
    pub total_execution_time: f64,
}

impl PfExecutionMetrics {
    pub fn new(batch_size: usize, execution_times: PfExecutionTimes) -> Self {
        let total_execution_time = round_ms(execution_times.total());
        PfExecutionMetrics {
            batch_size,
            execution_times,
            total_execution_time,
        }
    }
}

/// Milliseconds, rounded to five decimals.
pub fn duration_ms(elapsed: Duration) -> f64 {
    round_ms(elapsed.as_secs_f64() * 1000.0)
}

fn round_ms(ms: f64) -> f64 {
    (ms * 100_000.0).round() / 100_000.0
}
