use std::cmp::Ordering;

/// A node id paired with its distance to some query.
///
/// Ordered by distance, then id, so heaps and sorts are total and
/// deterministic even when distances tie.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub distance: f32,
    pub id: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

#[cfg(test)]
mod tests {
    use std::{cmp::Reverse, collections::BinaryHeap};

    use super::*;

    #[test]
    fn max_heap_pops_farthest_first() {
        let mut heap: BinaryHeap<Candidate> = [0.3, 0.1, 0.9, 0.5]
            .iter()
            .enumerate()
            .map(|(id, &distance)| Candidate {
                distance,
                id: id as u32,
            })
            .collect();
        assert_eq!(heap.pop().map(|c| c.id), Some(2));
        assert_eq!(heap.pop().map(|c| c.id), Some(3));
    }

    #[test]
    fn reversed_heap_pops_closest_first() {
        let mut heap = BinaryHeap::new();
        heap.push(Reverse(Candidate {
            distance: 0.4,
            id: 1,
        }));
        heap.push(Reverse(Candidate {
            distance: 0.2,
            id: 7,
        }));
        assert_eq!(heap.pop().map(|Reverse(c)| c.id), Some(7));
    }

    #[test]
    fn ties_break_on_id() {
        let a = Candidate {
            distance: 0.5,
            id: 3,
        };
        let b = Candidate {
            distance: 0.5,
            id: 9,
        };
        assert!(a < b);
    }

    #[test]
    fn nan_sorts_after_finite_distances() {
        let finite = Candidate {
            distance: 10.0,
            id: 0,
        };
        let nan = Candidate {
            distance: f32::NAN,
            id: 0,
        };
        assert!(finite < nan);
    }
}
