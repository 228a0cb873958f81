//! Finalizer bookkeeping for Game objects
//!
//! The finalizer keeps a Game around until its cross-namespace UDP route
//! has been removed. Owned children are left to the garbage collector.

use kube::ResourceExt;

use crate::crd::Game;

/// Finalizer recorded on every Game before any child is created
pub const GAME_FINALIZER: &str = "game.stream.indiegamestream.com/finalizer";

/// Check if a Game carries our finalizer
pub fn has_finalizer(game: &Game) -> bool {
    game.finalizers().iter().any(|f| f == GAME_FINALIZER)
}

/// Check if deletion of the Game has been requested
pub fn is_deleting(game: &Game) -> bool {
    game.metadata.deletion_timestamp.is_some()
}

/// Copy of `game` with the finalizer appended; `None` if already present
pub fn with_finalizer(game: &Game) -> Option<Game> {
    if has_finalizer(game) {
        return None;
    }
    let mut updated = game.clone();
    updated
        .metadata
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(GAME_FINALIZER.to_string());
    Some(updated)
}

/// Copy of `game` with the finalizer removed; `None` if it was absent
pub fn without_finalizer(game: &Game) -> Option<Game> {
    if !has_finalizer(game) {
        return None;
    }
    let mut updated = game.clone();
    if let Some(finalizers) = updated.metadata.finalizers.as_mut() {
        finalizers.retain(|f| f != GAME_FINALIZER);
    }
    Some(updated)
}
