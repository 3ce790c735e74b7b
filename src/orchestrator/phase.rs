use std::fmt;

use serde::{Deserialize, Serialize};

/// States of the case state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Intake,
    Triage,
    LightPass,
    FullPass,
    Compose,
    Review,
    ReviseOrFinalize,
    AwaitUserInput,
    Final,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Intake => "INTAKE",
            Self::Triage => "TRIAGE",
            Self::LightPass => "LIGHT_PASS",
            Self::FullPass => "FULL_PASS",
            Self::Compose => "COMPOSE",
            Self::Review => "REVIEW",
            Self::ReviseOrFinalize => "REVISE_OR_FINALIZE",
            Self::AwaitUserInput => "AWAIT_USER_INPUT",
            Self::Final => "FINAL",
        };
        f.write_str(s)
    }
}
