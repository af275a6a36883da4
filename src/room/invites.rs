//! Pending invite tracking for the waiting-room phase.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::protocol::{InviteId, InviteStatus, PendingInvite, UserId};

/// Invites keyed by id, persisted as a map under the `invites` key.
#[derive(Debug, Clone, Default)]
pub struct InviteBook {
    invites: HashMap<InviteId, PendingInvite>,
}

impl InviteBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(invites: HashMap<InviteId, PendingInvite>) -> Self {
        Self { invites }
    }

    pub fn to_map(&self) -> HashMap<InviteId, PendingInvite> {
        self.invites.clone()
    }

    pub fn get(&self, invite_id: InviteId) -> Option<&PendingInvite> {
        self.invites.get(&invite_id)
    }

    pub fn len(&self) -> usize {
        self.invites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invites.is_empty()
    }

    /// An outstanding pending invite to the same user, if any.
    pub fn pending_for(&self, to_user_id: UserId) -> Option<&PendingInvite> {
        self.invites
            .values()
            .find(|i| i.to_user_id == to_user_id && i.status == InviteStatus::Pending)
    }

    pub fn create(
        &mut self,
        from_user_id: UserId,
        to_user_id: UserId,
        expires_at: DateTime<Utc>,
    ) -> PendingInvite {
        let invite = PendingInvite {
            invite_id: uuid::Uuid::new_v4(),
            from_user_id,
            to_user_id,
            expires_at,
            status: InviteStatus::Pending,
        };
        self.invites.insert(invite.invite_id, invite.clone());
        invite
    }

    /// Move a pending invite to a terminal status and drop it from the book.
    /// Returns the resolved invite, None when unknown or already resolved.
    pub fn resolve(&mut self, invite_id: InviteId, status: InviteStatus) -> Option<PendingInvite> {
        let invite = self.invites.get(&invite_id)?;
        if invite.status != InviteStatus::Pending {
            return None;
        }
        let mut invite = self.invites.remove(&invite_id)?;
        invite.status = status;
        Some(invite)
    }

    /// Resolve every pending invite (room left the waiting phase).
    pub fn cancel_all(&mut self) -> Vec<PendingInvite> {
        let ids: Vec<InviteId> = self
            .invites
            .values()
            .filter(|i| i.status == InviteStatus::Pending)
            .map(|i| i.invite_id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.resolve(id, InviteStatus::Cancelled))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn create_and_resolve() {
        let mut book = InviteBook::new();
        let host = Uuid::new_v4();
        let target = Uuid::new_v4();
        let invite = book.create(host, target, Utc::now() + chrono::Duration::seconds(60));

        assert_eq!(book.pending_for(target).unwrap().invite_id, invite.invite_id);

        let resolved = book.resolve(invite.invite_id, InviteStatus::Accepted).unwrap();
        assert_eq!(resolved.status, InviteStatus::Accepted);
        assert!(book.is_empty());
        // Double resolution is a no-op
        assert!(book.resolve(invite.invite_id, InviteStatus::Declined).is_none());
    }

    #[test]
    fn cancel_all_resolves_every_pending_invite() {
        let mut book = InviteBook::new();
        let host = Uuid::new_v4();
        book.create(host, Uuid::new_v4(), Utc::now());
        book.create(host, Uuid::new_v4(), Utc::now());

        let cancelled = book.cancel_all();
        assert_eq!(cancelled.len(), 2);
        assert!(cancelled.iter().all(|i| i.status == InviteStatus::Cancelled));
        assert!(book.is_empty());
    }
}
