//! Reordering within an owner's media list.
//!
//! Every operation runs as one transaction: owner lock first, then row
//! locks on everything it rewrites. Boundary moves and vanished rows are
//! reported as `Ok(false)`, not as errors.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, trace};
use uuid::Uuid;

use vitrine_core::{Error, MediaFamily, MediaStore, MediaTransaction, OwnerScope, Result};

/// Direction of a single-step move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "move_up",
            Direction::Down => "move_down",
        }
    }
}

/// Renumber the locked siblings of `scope` to `1..=N`, skipping rows that
/// already hold their position. Returns the number of rows rewritten.
///
/// The caller must already hold the owner lock in `tx`.
pub async fn tighten_locked(tx: &mut dyn MediaTransaction, scope: OwnerScope) -> Result<u64> {
    let siblings = tx.lock_siblings(scope).await?;
    let mut updated = 0;
    for (index, sibling) in siblings.iter().enumerate() {
        let position = index as i32 + 1;
        if sibling.display_order != position {
            trace!(
                media_id = %sibling.id,
                from = sibling.display_order,
                to = position,
                "tighten: renumber"
            );
            tx.set_display_order(scope.family, sibling.id, position)
                .await?;
            updated += 1;
        }
    }
    Ok(updated)
}

/// Move-up, move-down, move-to-position and tightening.
#[derive(Clone)]
pub struct ReorderService {
    store: Arc<dyn MediaStore>,
}

impl ReorderService {
    pub fn new(store: Arc<dyn MediaStore>) -> Self {
        Self { store }
    }

    /// Swap with the previous sibling. `false` when already first.
    pub async fn move_up(&self, family: MediaFamily, id: Uuid) -> Result<bool> {
        self.step(family, id, Direction::Up).await
    }

    /// Swap with the next sibling. `false` when already last.
    pub async fn move_down(&self, family: MediaFamily, id: Uuid) -> Result<bool> {
        self.step(family, id, Direction::Down).await
    }

    async fn step(&self, family: MediaFamily, id: Uuid, direction: Direction) -> Result<bool> {
        let start = Instant::now();
        let Some(scope) = self.scope_of(family, id).await? else {
            debug!(op = direction.as_str(), media_id = %id, family = %family, "Media gone, nothing to move");
            return Ok(false);
        };

        let mut tx = self.store.begin().await?;
        tx.lock_owner(scope).await?;

        let Some(current) = tx.lock_attached(family, id).await? else {
            return Ok(false);
        };
        let order = current.display_order;

        let target_order = match direction {
            Direction::Up if order <= 1 => {
                debug!(op = direction.as_str(), media_id = %id, "Already first");
                return Ok(false);
            }
            Direction::Up => order - 1,
            Direction::Down => order + 1,
        };

        let Some(neighbor) = tx.lock_attached_at(scope, target_order).await? else {
            debug!(op = direction.as_str(), media_id = %id, display_order = order, "Already last");
            return Ok(false);
        };

        tx.set_display_order(family, neighbor.id, order).await?;
        tx.set_display_order(family, current.id, target_order)
            .await?;
        tx.commit().await?;

        info!(
            subsystem = "media",
            component = "reorder",
            op = direction.as_str(),
            media_id = %id,
            family = %family,
            owner_id = %scope.owner_id,
            from = order,
            to = target_order,
            duration_ms = start.elapsed().as_millis() as u64,
            "Media moved"
        );
        Ok(true)
    }

    /// Move to `position`, clamped to the list length, shifting the rows in
    /// between by one. `false` for positions below 1 or a vanished row.
    pub async fn move_to_position(
        &self,
        family: MediaFamily,
        id: Uuid,
        position: i32,
    ) -> Result<bool> {
        if position < 1 {
            return Ok(false);
        }
        let Some(scope) = self.scope_of(family, id).await? else {
            return Ok(false);
        };

        let mut tx = self.store.begin().await?;
        tx.lock_owner(scope).await?;
        let siblings = tx.lock_siblings(scope).await?;
        let Some(current) = siblings.iter().find(|m| m.id == id) else {
            return Ok(false);
        };
        let from = current.display_order;
        let max = siblings.last().map(|m| m.display_order).unwrap_or(from);
        let target = position.min(max);
        if target == from {
            return Ok(true);
        }

        if from < target {
            tx.shift_range(scope, from + 1, target, -1).await?;
        } else {
            tx.shift_range(scope, target, from - 1, 1).await?;
        }
        tx.set_display_order(family, id, target).await?;
        tx.commit().await?;

        info!(
            subsystem = "media",
            component = "reorder",
            op = "move_to_position",
            media_id = %id,
            family = %family,
            owner_id = %scope.owner_id,
            from,
            to = target,
            "Media moved"
        );
        Ok(true)
    }

    /// Renumber an owner's list to `1..=N`. Returns rows rewritten.
    pub async fn tighten(&self, scope: OwnerScope) -> Result<u64> {
        let mut tx = self.store.begin().await?;
        tx.lock_owner(scope).await?;
        let updated = tighten_locked(tx.as_mut(), scope).await?;
        tx.commit().await?;

        if updated > 0 {
            info!(
                subsystem = "media",
                component = "reorder",
                op = "tighten",
                family = %scope.family,
                owner_id = %scope.owner_id,
                rows_updated = updated,
                "Ordering tightened"
            );
        }
        Ok(updated)
    }

    /// Tighten the list that `id` belongs to.
    pub async fn tighten_from(&self, family: MediaFamily, id: Uuid) -> Result<u64> {
        let scope = self
            .scope_of(family, id)
            .await?
            .ok_or(Error::MediaNotFound(id))?;
        self.tighten(scope).await
    }

    /// Owner scope of an attached row, read without locks. The owner of a
    /// row never changes, so the answer stays valid once locks are taken.
    async fn scope_of(&self, family: MediaFamily, id: Uuid) -> Result<Option<OwnerScope>> {
        Ok(self
            .store
            .find_attached(family, id)
            .await?
            .map(|m| m.scope()))
    }
}
