//! Execution context passed explicitly into every engine call.
//!
//! Carries the device selection and collects numeric diagnostics, so callers can
//! tell whether a computation hit a degenerate probability without the engines
//! aborting mid-run.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{RankdistError, Result};

/// Where the dense log-probability recurrences run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
}

impl FromStr for Device {
    type Err = RankdistError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            other => Err(RankdistError::Config(format!(
                "unsupported device '{}' (only 'cpu' is available)",
                other
            ))),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
        }
    }
}

/// Per-call execution state: device plus a counter of numeric degeneracies.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    device: Device,
    degenerate_events: AtomicUsize,
}

impl ExecutionContext {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            degenerate_events: AtomicUsize::new(0),
        }
    }

    pub fn cpu() -> Self {
        Self::new(Device::Cpu)
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Record a NaN or out-of-range intermediate. Logged at error level; the
    /// computation carries on with whatever values it has.
    pub fn report_degenerate(&self, what: &str) {
        let count = self.degenerate_events.fetch_add(1, Ordering::Relaxed) + 1;
        log::error!(
            "Probability in illegal range during {} (event #{}); results may be flawed",
            what,
            count
        );
    }

    /// Number of degenerate events seen since creation (or the last reset).
    pub fn degenerate_events(&self) -> usize {
        self.degenerate_events.load(Ordering::Relaxed)
    }

    pub fn is_degenerate(&self) -> bool {
        self.degenerate_events() > 0
    }

    pub fn reset_diagnostics(&self) {
        self.degenerate_events.store(0, Ordering::Relaxed);
    }
}
