pub mod naive;
pub(crate) mod reconstruct;
pub mod sweep;
pub mod triangulate;

pub use naive::segment_intersections_naive;
pub use sweep::{Sweep, SweepOptions};
pub use triangulate::triangulate;
