use std::collections::HashMap;

use rand::Rng;

/// Draws `count` distinct positions from `0..pool_size`, uniformly and without replacement.
///
/// When `count >= pool_size` every position is returned in ascending order. Otherwise this is a
/// partial Fisher-Yates shuffle over a virtual `0..pool_size` array: position `i` is swapped
/// with a uniformly random position in `i..pool_size`, and the first `count` slots are returned.
/// Only swapped slots are materialized, so large pools do not allocate.
pub fn sample_indexes<R: Rng + ?Sized>(pool_size: usize, count: usize, rng: &mut R) -> Vec<usize> {
    if count >= pool_size {
        return (0..pool_size).collect();
    }

    let mut swapped: HashMap<usize, usize> = HashMap::with_capacity(count * 2);
    let mut picked = Vec::with_capacity(count);
    for position in 0..count {
        let target = rng.gen_range(position..pool_size);
        let at_target = *swapped.get(&target).unwrap_or(&target);
        let at_position = *swapped.get(&position).unwrap_or(&position);
        swapped.insert(target, at_position);
        picked.push(at_target);
    }
    picked
}

/// Picks `count` distinct elements of `pool`. See [`sample_indexes`].
pub fn index_sample<T: Clone, R: Rng + ?Sized>(pool: &[T], count: usize, rng: &mut R) -> Vec<T> {
    sample_indexes(pool.len(), count, rng)
        .into_iter()
        .map(|idx| pool[idx].clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::rngs::mock::StepRng;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn test_whole_pool_is_returned_unpermuted() {
        let mut rng = StdRng::seed_from_u64(7);
        let pool = vec!['a', 'b', 'c', 'd'];

        assert_eq!(pool, index_sample(&pool, 4, &mut rng));
        assert_eq!(pool, index_sample(&pool, 10, &mut rng));
    }

    #[test]
    fn test_zero_count_is_empty() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(index_sample(&[1, 2, 3], 0, &mut rng).is_empty());
        assert!(sample_indexes(0, 0, &mut rng).is_empty());
        assert!(sample_indexes(0, 5, &mut rng).is_empty());
    }

    #[test]
    fn test_fixed_random_source_is_deterministic() {
        // Always drawing the lower bound leaves the virtual array untouched.
        let mut rng = StepRng::new(0, 0);
        assert_eq!(vec![10, 11, 12], index_sample(&[10, 11, 12, 13, 14], 3, &mut rng));

        let first = sample_indexes(1000, 20, &mut StdRng::seed_from_u64(42));
        let second = sample_indexes(1000, 20, &mut StdRng::seed_from_u64(42));
        assert_eq!(first, second);
    }

    #[test]
    fn test_samples_are_distinct_members() {
        let mut rng = StdRng::seed_from_u64(3);
        for pool_size in 1..40 {
            for count in 1..pool_size {
                let picked = sample_indexes(pool_size, count, &mut rng);
                assert_eq!(count, picked.len());
                assert!(picked.iter().all(|&idx| idx < pool_size));
                assert_eq!(count, picked.iter().collect::<HashSet<_>>().len());
            }
        }
    }

    #[test]
    fn test_large_pool_does_not_materialize() {
        let mut rng = StdRng::seed_from_u64(11);
        let picked = sample_indexes(usize::MAX / 2, 5, &mut rng);
        assert_eq!(5, picked.iter().collect::<HashSet<_>>().len());
    }

    #[test]
    fn test_selection_is_uniform() {
        const POOL: usize = 10;
        const COUNT: usize = 3;
        const TRIALS: usize = 10_000;
        // Chi-squared critical value for 9 degrees of freedom at p = 0.001.
        const CRITICAL: f64 = 27.877;

        let mut rng = StdRng::seed_from_u64(2024);
        let mut hits = [0usize; POOL];
        for _ in 0..TRIALS {
            for idx in sample_indexes(POOL, COUNT, &mut rng) {
                hits[idx] += 1;
            }
        }

        let expected = (TRIALS * COUNT) as f64 / POOL as f64;
        let chi_squared: f64 = hits
            .iter()
            .map(|&observed| (observed as f64 - expected).powi(2) / expected)
            .sum();
        assert!(
            chi_squared < CRITICAL,
            "chi squared {} over {:?}",
            chi_squared,
            hits
        );
    }
}
