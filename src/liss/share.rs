//! Coefficient sampling and the routing of matrix rows into per-user
//! share maps.

use std::collections::BTreeMap;

use curv::BigInt;

use super::matrix::AccessStructure;
use crate::math::{ceil_log2, sample_symmetric};

/// Samples the LISS coefficient column: the secret in
/// `[-2^bigrange, 2^bigrange]`, the remaining entries widened by the
/// distribution distance and the matrix width so the linear combinations
/// do not leak the secret statistically.
pub fn sample_coefficients(
    num_cols: usize,
    bigrange: usize,
    distance_dist: usize,
) -> Vec<BigInt> {
    let widened = bigrange + distance_dist + ceil_log2(num_cols) + 1;
    (0..num_cols)
        .map(|i| {
            if i == 0 {
                sample_symmetric(bigrange)
            } else {
                sample_symmetric(widened)
            }
        })
        .collect()
}

/// Routes per-row values into `[group][user] -> combination-key -> value`.
/// Row `k` lands in the slot of the one user holding position
/// `tag.position` of its combination.
pub fn route_rows<T: Clone>(
    structure: &AccessStructure,
    values: &[T],
) -> Vec<Vec<BTreeMap<String, T>>> {
    debug_assert_eq!(values.len(), structure.matrix().num_rows());
    let mut out: Vec<Vec<BTreeMap<String, T>>> = structure
        .configs()
        .iter()
        .map(|config| vec![BTreeMap::new(); config.users])
        .collect();
    for (k, tag) in structure.row_tags().iter().enumerate() {
        let key = structure.key_of(tag);
        out[tag.group][tag.user].insert(key, values[k].clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liss::matrix::GroupConfig;

    #[test]
    fn coefficient_ranges() {
        let v = sample_coefficients(8, 16, 8);
        assert_eq!(v.len(), 8);
        let secret_bound = BigInt::from(1) << 16;
        assert!(v[0] >= -secret_bound.clone() && v[0] <= secret_bound);
        let widened_bound = BigInt::from(1) << (16 + 8 + 3 + 1);
        for entry in &v[1..] {
            assert!(*entry >= -widened_bound.clone() && *entry <= widened_bound);
        }
    }

    #[test]
    fn routing_covers_every_participating_user() {
        let configs = [
            GroupConfig { users: 3, threshold: 2 },
            GroupConfig { users: 3, threshold: 2 },
        ];
        let structure = AccessStructure::build(&configs).unwrap();
        let values: Vec<usize> = (0..structure.matrix().num_rows()).collect();
        let routed = route_rows(&structure, &values);

        for group in 0..2 {
            for user in 0..3 {
                let keys: Vec<String> = routed[group][user].keys().cloned().collect();
                let mut expected = structure.keys_for_user(group, user);
                expected.sort();
                assert_eq!(keys, expected);
            }
        }
        // all twelve rows routed, each to exactly one slot
        let total: usize = routed
            .iter()
            .flat_map(|group| group.iter().map(|m| m.len()))
            .sum();
        assert_eq!(total, 12);
    }
}
