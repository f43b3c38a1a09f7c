// Error types returned by fallible sim operations.
//
// Only a handful of operations can fail in a way the caller must react to:
// looking up something by id, placing a blueprint, loading config or
// blueprint JSON, and restoring a snapshot. Everything else (reservation
// contention, a worker with nothing to do) is an expected outcome and is
// reported through `bool`/`Option` returns instead.
//
// See also: `construction.rs` for placement validation, `structural.rs` for
// the foundation check that produces `PlacementError::UnevenTerrain`.

use crate::types::{AgentId, BlueprintId, SiteId, WorldPos};
use std::fmt;

/// Something referenced by id does not exist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotFound {
    Blueprint(BlueprintId),
    Site(SiteId),
    Agent(AgentId),
    Block { site: SiteId, pos: WorldPos },
}

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFound::Blueprint(id) => write!(f, "unknown blueprint '{id}'"),
            NotFound::Site(id) => write!(f, "unknown site {id}"),
            NotFound::Agent(id) => write!(f, "unknown agent {id}"),
            NotFound::Block { site, pos } => write!(f, "{site} has no block at {pos}"),
        }
    }
}

/// Why a blueprint could not be placed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlacementError {
    /// The rotated footprint overlaps an existing site.
    Overlap { existing: SiteId },
    /// A footprint cell has no solid ground beneath it.
    UnevenTerrain { at: WorldPos },
    /// Part of the structure falls outside the world's vertical range.
    OutOfBounds { at: WorldPos },
}

impl PlacementError {
    /// Short human-readable reason.
    pub fn reason(&self) -> &'static str {
        match self {
            PlacementError::Overlap { .. } => "blocks would collide",
            PlacementError::UnevenTerrain { .. } => "terrain too uneven",
            PlacementError::OutOfBounds { .. } => "structure exceeds world height",
        }
    }
}

impl fmt::Display for PlacementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlacementError::Overlap { existing } => {
                write!(f, "{} (with {existing})", self.reason())
            }
            PlacementError::UnevenTerrain { at } | PlacementError::OutOfBounds { at } => {
                write!(f, "{} at {at}", self.reason())
            }
        }
    }
}

/// Crate-level error.
#[derive(Debug)]
pub enum SimError {
    NotFound(NotFound),
    InvalidPlacement(PlacementError),
    /// The site is already complete and can no longer be changed.
    SiteFinished(SiteId),
    /// Malformed config or blueprint definition.
    Config(String),
    /// A snapshot could not be encoded or decoded.
    Snapshot(String),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::NotFound(nf) => write!(f, "not found: {nf}"),
            SimError::InvalidPlacement(pe) => write!(f, "invalid placement: {pe}"),
            SimError::SiteFinished(id) => write!(f, "{id} is already complete"),
            SimError::Config(msg) => write!(f, "config error: {msg}"),
            SimError::Snapshot(msg) => write!(f, "snapshot error: {msg}"),
        }
    }
}

impl std::error::Error for SimError {}

impl From<NotFound> for SimError {
    fn from(nf: NotFound) -> Self {
        SimError::NotFound(nf)
    }
}

impl From<PlacementError> for SimError {
    fn from(pe: PlacementError) -> Self {
        SimError::InvalidPlacement(pe)
    }
}
