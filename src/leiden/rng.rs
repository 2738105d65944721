use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Returns a seedable random number generator.
///
/// Mirrors the crate's existing `get_rng` convention used elsewhere for
/// shuffling: an explicit seed gives reproducible runs, `None` draws a fresh
/// seed from the thread RNG.
pub fn get_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::seed_from_u64(rand::thread_rng().gen()),
    }
}

/// Fisher–Yates shuffle, in place, driven by `rng`.
pub fn shuffle<T>(v: &mut [T], rng: &mut StdRng) {
    let n = v.len();
    for idx in (1..n).rev() {
        let rand_idx = rng.gen_range(0..=idx);
        v.swap(idx, rand_idx);
    }
}

/// Returns `0..n`, shuffled.
pub fn shuffled_indexes(n: usize, rng: &mut StdRng) -> Vec<usize> {
    let mut indexes: Vec<usize> = (0..n).collect();
    shuffle(&mut indexes, rng);
    indexes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shuffle_is_a_permutation() {
        let mut rng = get_rng(Some(42));
        let mut v: Vec<usize> = (0..20).collect();
        shuffle(&mut v, &mut rng);
        let mut sorted = v.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..20).collect::<Vec<usize>>());
    }

    #[test]
    fn same_seed_gives_same_shuffle() {
        let mut rng1 = get_rng(Some(7));
        let mut rng2 = get_rng(Some(7));
        let a = shuffled_indexes(50, &mut rng1);
        let b = shuffled_indexes(50, &mut rng2);
        assert_eq!(a, b);
    }
}
