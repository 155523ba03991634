pub mod clock;
pub mod decimator;
pub mod engine;
pub mod mapper;

pub use clock::{Pacing, PlaybackClock, SystemTimer, Timer};
pub use decimator::{Sample, SampleDecimator};
pub use engine::{Engine, Hud, Input, RunState, Session, Surface, Termination};
pub use mapper::{CoordinateMapper, OriginalPoint, PreviewPoint};
