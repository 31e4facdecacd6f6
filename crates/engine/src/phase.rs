use serde::{Deserialize, Serialize};
use std::fmt;

/// The states of one evolution cycle, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CyclePhase {
    Collecting,
    Evaluating,
    Selecting,
    Breeding,
    Publishing,
}

impl CyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CyclePhase::Collecting => "COLLECTING",
            CyclePhase::Evaluating => "EVALUATING",
            CyclePhase::Selecting => "SELECTING",
            CyclePhase::Breeding => "BREEDING",
            CyclePhase::Publishing => "PUBLISHING",
        }
    }
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
