//! Integer access-structure matrix: threshold blocks per user subset,
//! OR-stacked inside a group, AND-concatenated across groups. Stored in
//! compressed sparse row form.

use curv::BigInt;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// `{users, threshold}` for one approval group.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub users: usize,
    pub threshold: usize,
}

impl GroupConfig {
    pub fn validate(&self) -> Result<()> {
        if self.users == 0 || self.threshold == 0 || self.threshold > self.users {
            return Err(Error::WrongInput(format!(
                "invalid group config {}-of-{}",
                self.threshold, self.users
            )));
        }
        Ok(())
    }
}

/// Compressed sparse row matrix over the integers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SparseMatrix {
    value: Vec<BigInt>,
    column_idx: Vec<usize>,
    // CSR row pointers, length rows + 1
    row_idx: Vec<usize>,
    num_cols: usize,
}

impl SparseMatrix {
    fn from_rows(rows: Vec<Vec<(usize, BigInt)>>, num_cols: usize) -> Self {
        let mut value = Vec::new();
        let mut column_idx = Vec::new();
        let mut row_idx = vec![0];
        for row in rows {
            for (col, entry) in row {
                debug_assert!(col < num_cols);
                column_idx.push(col);
                value.push(entry);
            }
            row_idx.push(column_idx.len());
        }
        Self {
            value,
            column_idx,
            row_idx,
            num_cols,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.row_idx.len() - 1
    }

    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    pub fn row(&self, k: usize) -> impl Iterator<Item = (usize, &BigInt)> {
        let start = self.row_idx[k];
        let end = self.row_idx[k + 1];
        self.column_idx[start..end]
            .iter()
            .copied()
            .zip(self.value[start..end].iter())
            .map(|(col, v)| (col, v))
    }

    pub fn mul_vector(&self, v: &[BigInt]) -> Result<Vec<BigInt>> {
        if v.len() != self.num_cols {
            return Err(Error::DifferentLength);
        }
        Ok((0..self.num_rows())
            .map(|k| {
                self.row(k)
                    .map(|(col, entry)| entry * &v[col])
                    .fold(BigInt::from(0), |acc, term| acc + term)
            })
            .collect())
    }
}

/// Which `(group, user, combination, position)` a matrix row feeds.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RowTag {
    pub group: usize,
    pub user: usize,
    pub combination: usize,
    pub position: usize,
}

/// The full AND-of-ORs-of-thresholds structure for a config list.
#[derive(Clone, Debug)]
pub struct AccessStructure {
    configs: Vec<GroupConfig>,
    matrix: SparseMatrix,
    rows: Vec<RowTag>,
    // per group, the sorted t-subsets in enumeration order
    combinations: Vec<Vec<Vec<usize>>>,
}

impl AccessStructure {
    pub fn build(configs: &[GroupConfig]) -> Result<Self> {
        if configs.is_empty() {
            return Err(Error::EmptySlice);
        }
        for config in configs {
            config.validate()?;
        }
        let num_groups = configs.len();
        let group_combinations: Vec<Vec<Vec<usize>>> = configs
            .iter()
            .map(|c| combinations(c.users, c.threshold))
            .collect();

        // columns [0, num_groups) hold the secret side: column 0 is the
        // shared secret, column g the AND slack of group g
        let mut next_free = num_groups;
        let mut rows = Vec::new();
        let mut tags = Vec::new();
        let one = BigInt::from(1);

        for (g, config) in configs.iter().enumerate() {
            let t = config.threshold;
            for (c, combination) in group_combinations[g].iter().enumerate() {
                let fresh: Vec<usize> = (next_free..next_free + t - 1).collect();
                next_free += t - 1;

                // position 0: the summing row
                let mut top = Vec::new();
                if g == 0 {
                    for col in 0..num_groups {
                        top.push((col, one.clone()));
                    }
                } else {
                    top.push((g, one.clone()));
                }
                for &col in &fresh {
                    top.push((col, one.clone()));
                }
                rows.push(top);
                tags.push(RowTag {
                    group: g,
                    user: combination[0],
                    combination: c,
                    position: 0,
                });

                // positions 1..t: a single 1 walking backward through the
                // block's local columns
                for p in 1..t {
                    rows.push(vec![(fresh[t - p - 1], one.clone())]);
                    tags.push(RowTag {
                        group: g,
                        user: combination[p],
                        combination: c,
                        position: p,
                    });
                }
            }
        }

        let matrix = SparseMatrix::from_rows(rows, next_free);
        Ok(Self {
            configs: configs.to_vec(),
            matrix,
            rows: tags,
            combinations: group_combinations,
        })
    }

    pub fn configs(&self) -> &[GroupConfig] {
        &self.configs
    }

    pub fn matrix(&self) -> &SparseMatrix {
        &self.matrix
    }

    pub fn row_tags(&self) -> &[RowTag] {
        &self.rows
    }

    pub fn num_groups(&self) -> usize {
        self.configs.len()
    }

    pub fn combinations(&self, group: usize) -> &[Vec<usize>] {
        &self.combinations[group]
    }

    /// Combination key of the row's subset.
    pub fn key_of(&self, tag: &RowTag) -> String {
        share_key(&self.combinations[tag.group][tag.combination])
    }

    /// Every combination key of `group` that contains `user`.
    pub fn keys_for_user(&self, group: usize, user: usize) -> Vec<String> {
        self.combinations[group]
            .iter()
            .filter(|combination| combination.contains(&user))
            .map(|combination| share_key(combination))
            .collect()
    }
}

/// Sorted `t`-subsets of `{0, .., n-1}` in lexicographic order.
pub(crate) fn combinations(n: usize, t: usize) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    let mut current = Vec::with_capacity(t);
    fn recurse(n: usize, t: usize, start: usize, current: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if current.len() == t {
            out.push(current.clone());
            return;
        }
        for i in start..n {
            current.push(i);
            recurse(n, t, i + 1, current, out);
            current.pop();
        }
    }
    recurse(n, t, 0, &mut current, &mut out);
    out
}

/// Canonical label of a user subset: sorted indices joined by commas.
pub fn share_key(indices: &[usize]) -> String {
    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    sorted
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
