//! The Leiden community-detection engine: a dense [`Graph`] provider, a
//! seedable [`rng`], six [`quality::Quality`] functions, the [`partition`]
//! bookkeeping each is scored through, and the [`optimiser`] that drives
//! local moving, refinement and aggregation across levels.

pub mod graph;
pub mod optimiser;
pub mod partition;
pub mod quality;
pub mod rng;

pub use graph::{Graph, Mode};
pub use optimiser::{ConsiderComms, Optimiser, OptimiserConfig, Routine};
pub use partition::Partition;
pub use quality::Quality;
