//! Step execution loop and final assembly checks
//!
//! Each build step turns a plan entry into a code fragment, validates it
//! against the program built so far, optionally repairs it, and merges it.
//! Once every step is merged the whole program goes through static sanity,
//! a playability probe and the compliance checker, and [`classify`] decides
//! where any failure should be routed.

mod feedback;
mod probe;
mod step;

pub use feedback::{Feedback, classify};
pub use probe::{PlayabilityProbe, ProbeReport, SanityReport, StaticProbe, static_sanity};
pub use step::{StepError, StepInput, StepOutcome, StepRunner, StepState};
