use rand::{seq::SliceRandom, Rng};

use crate::{error::RollCallError, models::Candidate};

/// Weighted draw source for one roll.
///
/// Each candidate owns `weight` tickets; a draw picks one ticket uniformly,
/// with replacement, so a weight-`k` candidate is `k` times as likely per
/// draw as a weight-1 candidate.
#[derive(Debug, Clone)]
pub struct TicketSampler {
    candidates: Vec<Candidate>,
    tickets: Vec<usize>,
}

impl TicketSampler {
    pub fn new<R: Rng + ?Sized>(
        candidates: Vec<Candidate>,
        rng: &mut R,
    ) -> Result<Self, RollCallError> {
        if candidates.is_empty() {
            return Err(RollCallError::NoCandidates);
        }

        let mut tickets: Vec<usize> = candidates
            .iter()
            .enumerate()
            .flat_map(|(idx, candidate)| std::iter::repeat(idx).take(ticket_count(candidate)))
            .collect();
        // Fisher-Yates.
        tickets.shuffle(rng);

        Ok(Self {
            candidates,
            tickets,
        })
    }

    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> &Candidate {
        let ticket = self.tickets[rng.gen_range(0..self.tickets.len())];
        &self.candidates[ticket]
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn ticket_count(&self) -> usize {
        self.tickets.len()
    }
}

fn ticket_count(candidate: &Candidate) -> usize {
    candidate.weight.max(1) as usize
}
