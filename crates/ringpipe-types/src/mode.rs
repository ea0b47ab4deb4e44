use std::fmt;

use serde::{Deserialize, Serialize};

/// Execution mode passed through to the stage-compute function.
///
/// The engine never branches on this; it is part of the opaque stage
/// contract (dropout on/off, KV-cache behaviour, etc. live downstream).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    Train,
    Prefill,
    Decode,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Train => write!(f, "train"),
            Self::Prefill => write!(f, "prefill"),
            Self::Decode => write!(f, "decode"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
