pub mod alerts;
pub mod events;
pub mod latency;
pub mod pnl;

pub use alerts::AlertManager;
pub use events::{EngineEvent, EventBus};
pub use latency::LatencyTracker;
pub use pnl::PnlTracker;
