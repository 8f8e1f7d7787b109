use ambient_drift::harmony::chords::{microtonal_variation, ChordPool, MAX_DETUNE_CENTS};
use ambient_drift::harmony::notes::cents_between;
use ambient_drift::rhythm::{euclid, rotate, PatternState, RandomWalk};
use ambient_drift::Rng;

#[test]
fn eight_three_spreads_three_hits() {
    assert_eq!(
        euclid(8, 3, 0),
        vec![false, false, true, false, false, true, false, true]
    );
}

#[test]
fn fills_are_exact_for_every_size() {
    for steps in 0..=32 {
        for fills in 0..=steps {
            let bits = euclid(steps, fills, 0);
            assert_eq!(bits.len(), steps);
            assert_eq!(bits.iter().filter(|b| **b).count(), fills, "E({fills},{steps})");
        }
    }
}

#[test]
fn hits_are_maximally_even() {
    for steps in 1..=24 {
        for fills in 1..=steps {
            let bits = euclid(steps, fills, 0);
            let hits: Vec<usize> = (0..steps).filter(|i| bits[*i]).collect();
            let gaps: Vec<usize> = hits
                .iter()
                .zip(hits.iter().cycle().skip(1))
                .map(|(a, b)| (b + steps - a - 1) % steps + 1)
                .collect();
            let min = gaps.iter().min().copied().unwrap_or(0);
            let max = gaps.iter().max().copied().unwrap_or(0);
            assert!(max - min <= 1, "E({fills},{steps}) gaps {gaps:?}");
        }
    }
}

#[test]
fn rotation_is_cyclic_and_invertible() {
    for steps in 1..=20 {
        for fills in 0..=steps {
            let base = euclid(steps, fills, 0);
            for r in 0..steps * 2 {
                let mut bits = euclid(steps, fills, r);
                rotate(&mut bits, steps - r % steps);
                assert_eq!(bits, base);
            }
        }
    }
}

#[test]
fn pattern_state_wraps_positions() {
    let pattern = PatternState::new(16, 5, 3);
    assert_eq!(pattern.hits(), 5);
    assert_eq!(pattern.rotation, 3);
    for position in 0..16 {
        assert_eq!(pattern.hit(position), pattern.hit(position + 16));
    }
}

#[test]
fn same_seed_same_stream() {
    for seed in [1u32, 7, 123_456, u32::MAX] {
        let mut a = Rng::new(seed);
        let mut b = Rng::new(seed);
        for _ in 0..10_000 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
        let mut c = Rng::new(seed);
        let mut d = Rng::new(seed);
        for _ in 0..1_000 {
            assert_eq!(c.next_int(-5, 17), d.next_int(-5, 17));
            assert_eq!(c.next_float(0.5, 2.0), d.next_float(0.5, 2.0));
        }
    }
}

#[test]
fn shuffled_pool_is_a_permutation() {
    let chords: Vec<Vec<f32>> = (1..=12)
        .map(|i| vec![100.0 * i as f32, 150.0 * i as f32])
        .collect();
    for seed in [3u32, 4, 5] {
        let mut pool = ChordPool::from_chords(chords.clone());
        pool.shuffle(&mut Rng::new(seed));

        let mut sorted: Vec<Vec<f32>> = pool.chords().to_vec();
        sorted.sort_by(|a, b| a[0].total_cmp(&b[0]));
        assert_eq!(sorted, chords);
    }
}

#[test]
fn pool_never_repeats_back_to_back() {
    let chords: Vec<Vec<f32>> = (1..=4).map(|i| vec![110.0 * i as f32]).collect();
    let mut pool = ChordPool::from_chords(chords);
    let mut rng = Rng::new(99);
    let mut last = None;
    for _ in 0..500 {
        let index = pool.next_index(&mut rng);
        assert!(index.is_some());
        assert_ne!(index, last);
        last = index;
    }
}

#[test]
fn zero_intensity_keeps_pitch() {
    let chord = [130.81, 164.81, 196.0, 246.94];
    let mut rng = Rng::new(8);
    for _ in 0..100 {
        assert_eq!(microtonal_variation(&chord, 0.0, &mut rng), chord.to_vec());
    }
}

#[test]
fn full_intensity_detunes_every_note_within_bounds() {
    let chord = [130.81, 164.81, 196.0, 246.94, 329.63];
    let mut rng = Rng::new(21);
    for _ in 0..200 {
        let varied = microtonal_variation(&chord, 1.0, &mut rng);
        assert_eq!(varied.len(), chord.len());
        for (before, after) in chord.iter().zip(&varied) {
            let cents = cents_between(*before, *after).abs();
            assert!(cents > 0.5, "{before} -> {after}");
            assert!(cents <= MAX_DETUNE_CENTS as f32 + 0.01);
            assert!(*after > 0.0);
        }
    }
}

#[test]
fn density_walk_stays_in_range() {
    let mut walk = RandomWalk::new(0.1, 0.95, 0.04, 0.5);
    let mut rng = Rng::new(1234);
    for _ in 0..50_000 {
        let value = walk.tick(&mut rng);
        assert!((0.1..=0.95).contains(&value));
    }
}
