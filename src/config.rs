//! Runtime configuration: failure/activity rates plus the two
//! hard-coded timings the Python reference buried in its source
//! (1.5s critical-section hold, 5s post-failure downtime) pulled out into
//! configuration instead, with every field defaulted via `#[serde(default)]`
//! so a partial config file only needs to name what it overrides.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Failures per second (Exp(failure_rate)); `0.0` disables failure
    /// injection entirely.
    pub failure_rate: f64,
    /// Default per-node request rate (Exp(activity_rate)), used for any
    /// node whose `add_node` call did not override it.
    pub activity_rate: f64,
    /// How long a node holds the resource sentinel once it enters the
    /// critical section. The reference hard-codes 1.5s.
    #[serde(with = "duration_secs_f64")]
    pub cs_duration: Duration,
    /// How long a node sleeps after failing, before broadcasting RESTART.
    /// The reference hard-codes 5s.
    #[serde(with = "duration_secs_f64")]
    pub downtime: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            failure_rate: 0.0,
            activity_rate: 0.05,
            cs_duration: Duration::from_millis(1_500),
            downtime: Duration::from_secs(5),
        }
    }
}

mod duration_secs_f64 {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}
