//! Engine crate – shared backend logic for deskpad.
//!
//! Holds the calculator state machine and the contact-directory plumbing
//! behind traits. It knows nothing about terminals or windows, so any front
//! end (the `deskctl` CLI, a GUI shell, a test) can drive it.

pub mod calculator;
pub mod commands;
pub mod contacts;
pub mod context;
pub mod keypad;
pub mod platform;
pub mod scenario;
pub mod traits;
pub mod types;

// Re-exports for convenience
pub use calculator::{Calculator, CalculatorState, Operator};
pub use commands::CommandRegistry;
pub use context::AppContext;
pub use keypad::Key;
pub use types::{CommandResult, ErrorCode, ErrorInfo, Status};
