/*
Euclidean Rhythms
=================

A Euclidean rhythm spreads `fills` hits as evenly as possible over `steps`
slots. The classic tresillo is E(3, 8):

    x . . x . . x .

Bucket algorithm
----------------

Walk the slots once, pouring `fills` into a bucket each step. Whenever the
bucket holds at least `steps`, empty `steps` out of it and mark a hit.

    steps = 8, fills = 3

    step    0  1  2  3  4  5  6  7
    pour    3  6  9  4  7  10 5  8
    keep    3  6  1  4  7  2  5  0
    hit     .  .  x  .  .  x  .  x

That is the same rhythm as the tresillo, rotated. Rotation shifts the result
cyclically to the right by `rotation mod steps`, so rotating by `r` and then
by `steps - r` gives back the original.

The pattern is always rebuilt from scratch; a `PatternState` is never edited
in place.
*/

/// A Euclidean rhythm and the parameters that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternState {
    pub steps: usize,
    pub fills: usize,
    pub rotation: usize,
    pub bits: Vec<bool>,
}

impl PatternState {
    pub fn new(steps: usize, fills: usize, rotation: usize) -> Self {
        let bits = euclid(steps, fills, rotation);
        Self {
            steps,
            fills: fills.min(steps),
            rotation: if steps == 0 { 0 } else { rotation % steps },
            bits,
        }
    }

    /// Whether slot `position` (wrapped) is a hit.
    pub fn hit(&self, position: usize) -> bool {
        if self.bits.is_empty() {
            return false;
        }
        self.bits[position % self.bits.len()]
    }

    pub fn hits(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }
}

/// Evenly distribute `fills` hits over `steps` slots, rotated right by
/// `rotation`. `fills` larger than `steps` saturates.
pub fn euclid(steps: usize, fills: usize, rotation: usize) -> Vec<bool> {
    if steps == 0 {
        return Vec::new();
    }
    let fills = fills.min(steps);
    let mut bucket = 0;
    let mut bits = Vec::with_capacity(steps);
    for _ in 0..steps {
        bucket += fills;
        if bucket >= steps {
            bucket -= steps;
            bits.push(true);
        } else {
            bits.push(false);
        }
    }
    rotate(&mut bits, rotation);
    bits
}

/// Rotate a pattern right by `rotation mod len`.
pub fn rotate(bits: &mut [bool], rotation: usize) {
    if bits.is_empty() {
        return;
    }
    let r = rotation % bits.len();
    bits.rotate_right(r);
}

/// Render a pattern as `x . . x` for logs and the UI.
pub fn pattern_string(bits: &[bool]) -> String {
    bits.iter()
        .map(|hit| if *hit { 'x' } else { '.' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tresillo() {
        assert_eq!(pattern_string(&euclid(8, 3, 0)), "..x..x.x");
    }

    #[test]
    fn fill_count_is_exact() {
        for steps in 0..=32 {
            for fills in 0..=steps {
                let bits = euclid(steps, fills, 0);
                assert_eq!(bits.len(), steps);
                assert_eq!(bits.iter().filter(|b| **b).count(), fills);
            }
        }
    }

    #[test]
    fn rotation_is_cyclic_and_invertible() {
        for steps in 1..=24 {
            for fills in 0..=steps {
                let base = euclid(steps, fills, 0);
                for r in 0..steps {
                    let mut bits = euclid(steps, fills, r);
                    rotate(&mut bits, steps - r);
                    assert_eq!(bits, base, "E({fills},{steps}) r={r}");
                }
                assert_eq!(euclid(steps, fills, steps), base);
            }
        }
    }

    #[test]
    fn hits_are_maximally_even() {
        let bits = euclid(16, 4, 0);
        let positions: Vec<usize> = (0..16).filter(|i| bits[*i]).collect();
        let gaps: Vec<usize> = positions.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(gaps.iter().all(|g| *g == 4));
    }

    #[test]
    fn overfull_and_empty_patterns() {
        assert_eq!(euclid(4, 9, 0), vec![true; 4]);
        assert!(euclid(0, 3, 2).is_empty());
        let state = PatternState::new(0, 0, 5);
        assert!(!state.hit(3));
    }

    #[test]
    fn state_wraps_positions() {
        let state = PatternState::new(8, 3, 1);
        assert_eq!(state.rotation, 1);
        assert_eq!(state.hits(), 3);
        assert_eq!(state.hit(0), state.hit(8));
        assert_eq!(pattern_string(&state.bits), "x..x..x.");
    }
}
