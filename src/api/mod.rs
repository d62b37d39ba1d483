// =============================================================================
// Status API — read-only view of the engine state
// =============================================================================

pub mod rest;
