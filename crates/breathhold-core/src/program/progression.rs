use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How a program picks each round's target hold, before safety clamping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params", rename_all = "lowercase")]
pub enum ProgressionRule {
    /// Same target every round.
    Fixed(#[serde(with = "crate::serde_ms")] Duration),
    /// `start + round * increment`.
    Progressive {
        #[serde(with = "crate::serde_ms")]
        start: Duration,
        #[serde(with = "crate::serde_ms")]
        increment: Duration,
    },
    /// Explicit per-round targets. Rounds past the end repeat the last entry.
    Table(#[serde(with = "crate::serde_ms::vec")] Vec<Duration>),
}

impl ProgressionRule {
    /// Unclamped target for a zero-based round index.
    pub fn target_hold_time(&self, round: u32) -> Duration {
        match self {
            ProgressionRule::Fixed(d) => *d,
            ProgressionRule::Progressive { start, increment } => {
                start.saturating_add(increment.saturating_mul(round))
            }
            ProgressionRule::Table(seq) => {
                let idx = usize::try_from(round).unwrap_or(usize::MAX);
                seq.get(idx)
                    .or_else(|| seq.last())
                    .copied()
                    .unwrap_or(Duration::ZERO)
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ProgressionRule::Fixed(d) => format!("fixed {}s", d.as_secs()),
            ProgressionRule::Progressive { start, increment } => {
                format!("{}s +{}s per round", start.as_secs(), increment.as_secs())
            }
            ProgressionRule::Table(seq) => {
                let secs: Vec<String> = seq.iter().map(|d| d.as_secs().to_string()).collect();
                format!("table [{}]s", secs.join(", "))
            }
        }
    }
}
