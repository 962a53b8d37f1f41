//! Terminal output helpers
//!
//! Uses `cliclack` for styled output in interactive terminals with automatic
//! fallback to plain `[OK]`/`[WARN]` lines in CI and when piped.

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{
    intro, key_value, outro_success, outro_warn, section, step_error, step_info, step_ok_detail,
    step_warn_hint,
};
pub use progress::TaskSpinner;
