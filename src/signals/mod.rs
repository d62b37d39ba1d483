// =============================================================================
// Signals Module
// =============================================================================
//
// Pure decision logic of the squeeze detector:
// - Rolling open-interest windows (surge ratio, point-to-point change)
// - Tiered multi-factor scoring
// - Tiered alert cooldown

pub mod cooldown;
pub mod oi_window;
pub mod scoring;

pub use cooldown::CooldownGate;
pub use oi_window::{OIObservation, OIWindowTracker};
pub use scoring::{ScoreFactors, SqueezeScorer};
