//! Assembler lifecycle
//!
//! ```text
//!                 decode            build           emit
//!  ┌────────────┐ ─────► ┌──────────┐ ────► ┌───────┐ ────┐
//!  │ Configured │        │ Decoding │       │ Built │     │
//!  └────────────┘ ◄───── └──────────┘       └───────┘     │
//!     ▲   │  ▲      abort      ▲ │ decode                 │
//!     │   │  │                 └─┘                        │
//!     │   │  └────────────────────────────────────────────┘
//!     │   │ build (empty cycle) ──► Built
//!     │   ▼
//!     │ ┌──────────┐
//!     └─│ TornDown │  (terminal, reached by teardown from any live state)
//!       └──────────┘
//! ```

/// Lifecycle state of an event assembler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssemblerState {
    /// Collaborators injected, no cycle in progress
    #[default]
    Configured,
    /// At least one fragment decoded in the current cycle
    Decoding,
    /// Events built, waiting for emission
    Built,
    /// Terminal state, no further cycles
    TornDown,
}

impl AssemblerState {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: AssemblerState) -> bool {
        use AssemblerState::*;
        matches!(
            (self, target),
            // Cycle flow
            (Configured, Decoding)
            | (Decoding, Decoding)
            | (Configured, Built)   // cycle with no input
            | (Decoding, Built)
            | (Built, Configured)   // emit
            // Aborted cycle
            | (Decoding, Configured)
            | (Configured, Configured)
            // Teardown from any live state
            | (Configured, TornDown)
            | (Decoding, TornDown)
            | (Built, TornDown)
        )
    }

    /// Operations allowed in this state
    pub fn valid_operations(&self) -> &'static [&'static str] {
        use AssemblerState::*;
        match self {
            Configured => &["decode", "build", "abort", "teardown"],
            Decoding => &["decode", "build", "abort", "teardown"],
            Built => &["emit", "abort", "teardown"],
            TornDown => &[],
        }
    }

    /// Whether decode calls are accepted
    pub fn accepts_input(&self) -> bool {
        matches!(self, Self::Configured | Self::Decoding)
    }
}

impl std::fmt::Display for AssemblerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssemblerState::Configured => write!(f, "Configured"),
            AssemblerState::Decoding => write!(f, "Decoding"),
            AssemblerState::Built => write!(f, "Built"),
            AssemblerState::TornDown => write!(f, "TornDown"),
        }
    }
}
