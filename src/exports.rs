pub use crate::error::{DavisError, DavisResult};
pub use crate::geometry::Geometry;
pub use crate::inverter::{Inverter, Profiles};
pub use crate::polar::{PolarGrid, PolarReproject};
pub use crate::progress::{CancelToken, NoProgress, ProgressSink};
