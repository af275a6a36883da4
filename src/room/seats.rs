//! Seat registry: assignment, reservation deadlines, reclamation.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::protocol::{PlayerSummary, ReclaimOutcome, ReclaimRejectReason, Seat, UserId};

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SeatError {
    #[error("no free seat in the room")]
    RoomFull,
    #[error("user already holds a seat")]
    AlreadySeated,
}

/// All seats of one room. Persisted as a plain array under the `seats` key.
///
/// Invariants: at most one seat per user; turn orders unique; a disconnected
/// seat always carries a reconnect deadline.
#[derive(Debug, Clone, Default)]
pub struct SeatRegistry {
    seats: Vec<Seat>,
}

impl SeatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seats(seats: Vec<Seat>) -> Self {
        Self { seats }
    }

    pub fn to_vec(&self) -> Vec<Seat> {
        self.seats.clone()
    }

    pub fn len(&self) -> usize {
        self.seats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }

    pub fn get(&self, user_id: UserId) -> Option<&Seat> {
        self.seats.iter().find(|s| s.user_id == user_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Seat> {
        self.seats.iter()
    }

    /// Seats in turn order, the order play proceeds in.
    pub fn in_turn_order(&self) -> Vec<&Seat> {
        let mut seats: Vec<&Seat> = self.seats.iter().collect();
        seats.sort_by_key(|s| s.turn_order);
        seats
    }

    pub fn summaries(&self, host_id: UserId) -> Vec<PlayerSummary> {
        self.in_turn_order()
            .into_iter()
            .map(|s| PlayerSummary::from_seat(s, host_id))
            .collect()
    }

    /// Assign the lowest free turn order to a new player.
    pub fn assign(
        &mut self,
        user_id: UserId,
        display_name: String,
        max_players: u8,
        is_ai: bool,
        ai_profile_id: Option<String>,
    ) -> Result<u8, SeatError> {
        if self.get(user_id).is_some() {
            return Err(SeatError::AlreadySeated);
        }
        if self.seats.len() >= usize::from(max_players) {
            return Err(SeatError::RoomFull);
        }

        let turn_order = (0..max_players)
            .find(|order| !self.seats.iter().any(|s| s.turn_order == *order))
            .ok_or(SeatError::RoomFull)?;

        self.seats.push(Seat {
            user_id,
            display_name,
            turn_order,
            is_connected: !is_ai,
            reconnect_deadline: None,
            is_ai,
            ai_profile_id,
        });
        Ok(turn_order)
    }

    /// Reserve the seat of a user whose socket dropped.
    /// Returns the deadline actually recorded, None when the user holds no seat.
    pub fn mark_disconnected(
        &mut self,
        user_id: UserId,
        deadline: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let seat = self.seats.iter_mut().find(|s| s.user_id == user_id)?;
        seat.is_connected = false;
        seat.reconnect_deadline = Some(deadline);
        Some(deadline)
    }

    /// Atomic reclaim check. The interval is half-open: a reconnect at
    /// exactly the deadline is rejected.
    pub fn reclaim(&mut self, user_id: UserId, now: DateTime<Utc>) -> ReclaimOutcome {
        let Some(seat) = self.seats.iter_mut().find(|s| s.user_id == user_id) else {
            return ReclaimOutcome::Spectator(ReclaimRejectReason::NoSeat);
        };

        if seat.is_connected {
            // A live connection already owns the seat; the caller decides
            // whether that connection is actually alive
            return ReclaimOutcome::Spectator(ReclaimRejectReason::SeatTaken);
        }

        match seat.reconnect_deadline {
            Some(deadline) if now < deadline => {
                seat.is_connected = true;
                seat.reconnect_deadline = None;
                ReclaimOutcome::Reclaimed
            }
            _ => ReclaimOutcome::Spectator(ReclaimRejectReason::DeadlinePassed),
        }
    }

    /// Force a seat back to connected without deadline checks. Used when the
    /// registry says connected but no live socket exists (post-crash wake).
    pub fn force_reconnect(&mut self, user_id: UserId) -> bool {
        match self.seats.iter_mut().find(|s| s.user_id == user_id) {
            Some(seat) => {
                seat.is_connected = true;
                seat.reconnect_deadline = None;
                true
            }
            None => false,
        }
    }

    pub fn release(&mut self, user_id: UserId) -> Option<Seat> {
        let pos = self.seats.iter().position(|s| s.user_id == user_id)?;
        Some(self.seats.remove(pos))
    }

    /// Disconnected seats whose deadline has passed, in turn order.
    pub fn expired(&self, now: DateTime<Utc>) -> Vec<UserId> {
        let mut expired: Vec<&Seat> = self
            .seats
            .iter()
            .filter(|s| {
                !s.is_connected && s.reconnect_deadline.is_some_and(|deadline| deadline <= now)
            })
            .collect();
        expired.sort_by_key(|s| s.turn_order);
        expired.into_iter().map(|s| s.user_id).collect()
    }

    pub fn human_count(&self) -> usize {
        self.seats.iter().filter(|s| !s.is_ai).count()
    }

    pub fn ai_count(&self) -> usize {
        self.seats.iter().filter(|s| s.is_ai).count()
    }

    /// The remaining player best placed to inherit the host role: the
    /// earliest turn order among non-AI seats.
    pub fn next_host_candidate(&self, excluding: UserId) -> Option<UserId> {
        self.in_turn_order()
            .into_iter()
            .find(|s| !s.is_ai && s.user_id != excluding)
            .map(|s| s.user_id)
    }

    /// Invariant sweep used by tests: disconnected iff deadline set.
    pub fn invariants_hold(&self) -> bool {
        let unique_orders = {
            let mut orders: Vec<u8> = self.seats.iter().map(|s| s.turn_order).collect();
            orders.sort_unstable();
            orders.windows(2).all(|w| w[0] != w[1])
        };
        unique_orders
            && self
                .seats
                .iter()
                .all(|s| s.is_connected == s.reconnect_deadline.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn registry_with(n: u8) -> (SeatRegistry, Vec<UserId>) {
        let mut registry = SeatRegistry::new();
        let users: Vec<UserId> = (0..n).map(|_| Uuid::new_v4()).collect();
        for (i, &user) in users.iter().enumerate() {
            registry.assign(user, format!("p{i}"), 4, false, None).unwrap();
        }
        (registry, users)
    }

    #[test]
    fn assign_gives_sequential_turn_orders() {
        let (registry, users) = registry_with(3);
        for (i, &user) in users.iter().enumerate() {
            assert_eq!(registry.get(user).unwrap().turn_order, i as u8);
        }
        assert!(registry.invariants_hold());
    }

    #[test]
    fn assign_rejects_duplicates_and_overflow() {
        let (mut registry, users) = registry_with(4);
        assert_eq!(
            registry.assign(users[0], "again".into(), 4, false, None),
            Err(SeatError::AlreadySeated)
        );
        assert_eq!(
            registry.assign(Uuid::new_v4(), "late".into(), 4, false, None),
            Err(SeatError::RoomFull)
        );
    }

    #[test]
    fn released_turn_order_is_reused() {
        let (mut registry, users) = registry_with(3);
        registry.release(users[1]).unwrap();
        let newcomer = Uuid::new_v4();
        let order = registry.assign(newcomer, "new".into(), 4, false, None).unwrap();
        assert_eq!(order, 1);
        assert!(registry.invariants_hold());
    }

    #[test]
    fn reclaim_within_window_restores_the_seat() {
        let (mut registry, users) = registry_with(2);
        let now = Utc::now();
        let deadline = now + chrono::Duration::minutes(5);
        registry.mark_disconnected(users[0], deadline);
        assert!(registry.invariants_hold());

        let outcome = registry.reclaim(users[0], now + chrono::Duration::minutes(4));
        assert_eq!(outcome, ReclaimOutcome::Reclaimed);
        let seat = registry.get(users[0]).unwrap();
        assert!(seat.is_connected);
        assert!(seat.reconnect_deadline.is_none());
        assert_eq!(seat.turn_order, 0, "same seat, same turn order");
    }

    #[test]
    fn reclaim_at_exact_deadline_is_rejected() {
        let (mut registry, users) = registry_with(1);
        let now = Utc::now();
        let deadline = now + chrono::Duration::minutes(5);
        registry.mark_disconnected(users[0], deadline);

        let outcome = registry.reclaim(users[0], deadline);
        assert_eq!(outcome, ReclaimOutcome::Spectator(ReclaimRejectReason::DeadlinePassed));
    }

    #[test]
    fn reclaim_reasons() {
        let (mut registry, users) = registry_with(2);
        let now = Utc::now();

        assert_eq!(
            registry.reclaim(Uuid::new_v4(), now),
            ReclaimOutcome::Spectator(ReclaimRejectReason::NoSeat)
        );
        // Still connected: someone holds the seat
        assert_eq!(
            registry.reclaim(users[0], now),
            ReclaimOutcome::Spectator(ReclaimRejectReason::SeatTaken)
        );
    }

    #[test]
    fn expired_lists_only_past_deadlines() {
        let (mut registry, users) = registry_with(3);
        let now = Utc::now();
        registry.mark_disconnected(users[0], now - chrono::Duration::seconds(1));
        registry.mark_disconnected(users[2], now + chrono::Duration::minutes(1));

        assert_eq!(registry.expired(now), vec![users[0]]);
        // Boundary: a deadline exactly at now is expired
        registry.mark_disconnected(users[1], now);
        let expired = registry.expired(now);
        assert!(expired.contains(&users[0]) && expired.contains(&users[1]));
        assert!(!expired.contains(&users[2]));
    }

    #[test]
    fn host_candidate_skips_ai_seats() {
        let mut registry = SeatRegistry::new();
        let host = Uuid::new_v4();
        let human = Uuid::new_v4();
        registry.assign(host, "host".into(), 4, false, None).unwrap();
        registry
            .assign(Uuid::new_v4(), "bot".into(), 4, true, Some("greedy".into()))
            .unwrap();
        registry.assign(human, "human".into(), 4, false, None).unwrap();

        assert_eq!(registry.next_host_candidate(host), Some(human));
        assert_eq!(registry.ai_count(), 1);
        assert_eq!(registry.human_count(), 2);
    }
}
