//! Maps interaction events on governed surfaces onto the placement engine
//!
//! The coordinator owns the set of governed surfaces. Surfaces join the set at
//! construction or through [`InteractionCoordinator::surface_activated`];
//! events on any other surface pass through untouched.

use crate::engine::{PlacementEngine, PlacementKind, PlacementOutcome};
use log::info;
use shared::{CellContent, CellPos, Facing, Feedback, SurfaceId, UserId};
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

/// An interaction reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    /// Non-committing interaction, such as an attempt to break a cell
    Probe { surface: SurfaceId, pos: CellPos },
    /// Attempt to place the held content at or next to `pos`
    Commit {
        surface: SurfaceId,
        user: UserId,
        pos: CellPos,
        facing: Facing,
        held: Option<CellContent>,
    },
    /// The host's own placement mechanics firing on the surface
    NativePlace { surface: SurfaceId, user: UserId },
}

impl Interaction {
    pub fn surface(&self) -> &str {
        match self {
            Interaction::Probe { surface, .. }
            | Interaction::Commit { surface, .. }
            | Interaction::NativePlace { surface, .. } => surface,
        }
    }
}

/// How the host should treat the event, and what to tell the actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub suppress: bool,
    pub feedback: Option<Feedback>,
}

impl Response {
    fn pass() -> Self {
        Self {
            suppress: false,
            feedback: None,
        }
    }

    fn suppressed(feedback: Option<Feedback>) -> Self {
        Self {
            suppress: true,
            feedback,
        }
    }
}

pub struct InteractionCoordinator {
    engine: Arc<PlacementEngine>,
    surfaces: RwLock<HashSet<SurfaceId>>,
}

impl InteractionCoordinator {
    pub fn new(engine: Arc<PlacementEngine>, surfaces: impl IntoIterator<Item = SurfaceId>) -> Self {
        Self {
            engine,
            surfaces: RwLock::new(surfaces.into_iter().collect()),
        }
    }

    pub fn engine(&self) -> &Arc<PlacementEngine> {
        &self.engine
    }

    /// Puts `surface` under governance. Returns false if it already was.
    pub fn surface_activated(&self, surface: impl Into<SurfaceId>) -> bool {
        let surface = surface.into();
        let added = self
            .surfaces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(surface.clone());
        if added {
            info!("Surface {} is now governed", surface);
        }
        added
    }

    pub fn governs(&self, surface: &str) -> bool {
        self.surfaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(surface)
    }

    pub fn handle(&self, interaction: Interaction) -> Response {
        if !self.governs(interaction.surface()) {
            return Response::pass();
        }

        match interaction {
            Interaction::Probe { .. } => Response::suppressed(None),
            Interaction::NativePlace { .. } => Response::suppressed(Some(Feedback::NotAllowed)),
            Interaction::Commit {
                surface,
                user,
                pos,
                facing,
                held,
            } => {
                let Some(content) = held else {
                    return Response::suppressed(None);
                };
                let outcome = self.engine.attempt(&surface, &user, pos, facing, content);
                Response::suppressed(feedback_for(outcome))
            }
        }
    }
}

fn feedback_for(outcome: PlacementOutcome) -> Option<Feedback> {
    match outcome {
        PlacementOutcome::OutOfBounds => None,
        PlacementOutcome::RateLimited { remaining_seconds } => Some(Feedback::Wait {
            seconds: remaining_seconds,
        }),
        PlacementOutcome::Committed {
            kind: PlacementKind::Placement,
            pos,
            overwrote,
        } => Some(Feedback::Placed { pos, overwrote }),
        PlacementOutcome::Committed {
            kind: PlacementKind::Replacement,
            pos,
            overwrote,
        } => Some(Feedback::Replaced { pos, overwrote }),
    }
}
