//! Priority+FIFO ordering of the active set.
//!
//! The active tickets arrive already sorted by creation time; sequencing is
//! a stable partition — every urgent ticket ahead of every waiting one,
//! relative order preserved inside each group. Positions are 1-based and
//! ETA is whole minutes, rounded down.

use crate::model::{Status, Ticket};

/// One recomputed slot: (ticket id, position, eta minutes).
pub type Assignment = (i64, i64, i64);

/// Sequence the active set and assign positions and ETAs.
///
/// Tickets not in {waiting, urgent} are ignored; callers pass the active
/// set in creation order.
pub fn assign(active: &[Ticket], avg_service_minutes: f64) -> Vec<Assignment> {
    let urgent = active.iter().filter(|t| t.status == Status::Urgent);
    let waiting = active.iter().filter(|t| t.status == Status::Waiting);

    urgent
        .chain(waiting)
        .enumerate()
        .map(|(idx, ticket)| {
            let position = idx as i64 + 1;
            let eta = (position as f64 * avg_service_minutes).floor() as i64;
            (ticket.id, position, eta)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Channel;
    use chrono::{Duration, Utc};

    fn ticket(id: i64, status: Status, age_minutes: i64) -> Ticket {
        let created = Utc::now() - Duration::minutes(age_minutes);
        Ticket {
            id,
            code: format!("Q{id:04}"),
            status,
            identity: None,
            note: None,
            channel: Channel::Kiosk,
            position: None,
            eta_minutes: None,
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn positions_are_contiguous_one_based() {
        let active = vec![
            ticket(1, Status::Waiting, 30),
            ticket(2, Status::Waiting, 20),
            ticket(3, Status::Waiting, 10),
        ];
        let assignments = assign(&active, 12.0);
        let positions: Vec<i64> = assignments.iter().map(|&(_, p, _)| p).collect();
        assert_eq!(positions, vec![1, 2, 3]);
    }

    #[test]
    fn urgent_tickets_jump_ahead_of_earlier_waiting() {
        // Waiting ticket joined first, urgent ticket later.
        let active = vec![
            ticket(1, Status::Waiting, 30),
            ticket(2, Status::Urgent, 5),
        ];
        let assignments = assign(&active, 10.0);
        assert_eq!(assignments[0], (2, 1, 10));
        assert_eq!(assignments[1], (1, 2, 20));
    }

    #[test]
    fn fifo_order_preserved_within_groups() {
        let active = vec![
            ticket(1, Status::Urgent, 40),
            ticket(2, Status::Waiting, 30),
            ticket(3, Status::Urgent, 20),
            ticket(4, Status::Waiting, 10),
        ];
        let assignments = assign(&active, 1.0);
        let order: Vec<i64> = assignments.iter().map(|&(id, _, _)| id).collect();
        assert_eq!(order, vec![1, 3, 2, 4]);
    }

    #[test]
    fn eta_is_position_times_average_floored() {
        let active = vec![
            ticket(1, Status::Waiting, 20),
            ticket(2, Status::Waiting, 10),
        ];
        let assignments = assign(&active, 7.5);
        assert_eq!(assignments[0].2, 7); // floor(1 * 7.5)
        assert_eq!(assignments[1].2, 15); // floor(2 * 7.5)
    }

    #[test]
    fn empty_active_set_yields_no_assignments() {
        assert!(assign(&[], 12.0).is_empty());
    }
}
