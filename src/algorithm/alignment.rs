use std::ops::{Index, IndexMut};

/// Which index to move when the "up" and "left" cells of the LCS table hold
/// the same length during backtracking.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TieBreak {
    /// Step back in the second sequence, as if it advanced more recently.
    ShrinkB,
    /// Step back in the first sequence.
    ShrinkA,
}

/// Changing this changes which alignment is reported when several longest
/// common subsequences exist, and with it the position features downstream.
pub const LCS_TIE_BREAK: TieBreak = TieBreak::ShrinkB;

/// Row-major `(rows x cols)` table addressed by `[row, col]`.
#[derive(Clone)]
struct DpTable {
    cols: usize,
    internal: Vec<usize>,
}

impl DpTable {
    fn new(rows: usize, cols: usize) -> Self {
        DpTable {
            cols,
            internal: vec![0; rows * cols],
        }
    }
}

impl Index<[usize; 2]> for DpTable {
    type Output = usize;

    fn index(&self, index: [usize; 2]) -> &Self::Output {
        &self.internal[index[0] * self.cols + index[1]]
    }
}

impl IndexMut<[usize; 2]> for DpTable {
    fn index_mut(&mut self, index: [usize; 2]) -> &mut Self::Output {
        &mut self.internal[index[0] * self.cols + index[1]]
    }
}

fn lcs_table<T: PartialEq>(a: &[T], b: &[T]) -> DpTable {
    let sizes = [a.len(), b.len()];
    let mut table = DpTable::new(sizes[0] + 1, sizes[1] + 1);
    for i in 1..=sizes[0] {
        for j in 1..=sizes[1] {
            table[[i, j]] = if a[i - 1] == b[j - 1] {
                table[[i - 1, j - 1]] + 1
            } else {
                usize::max(table[[i - 1, j]], table[[i, j - 1]])
            };
        }
    }
    table
}

pub fn lcs_length<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    lcs_table(a, b)[[a.len(), b.len()]]
}

/// Index pairs `(i, j)` of one longest common subsequence, increasing in both
/// coordinates. Uses [`LCS_TIE_BREAK`].
pub fn lcs_positions<T: PartialEq>(a: &[T], b: &[T]) -> Vec<(usize, usize)> {
    lcs_positions_with(a, b, LCS_TIE_BREAK)
}

pub fn lcs_positions_with<T: PartialEq>(a: &[T], b: &[T], tie_break: TieBreak) -> Vec<(usize, usize)> {
    let table = lcs_table(a, b);

    let mut result = vec![];
    let mut indices = [a.len(), b.len()];
    while indices[0] > 0 && indices[1] > 0 {
        let [i, j] = indices;
        if a[i - 1] == b[j - 1] {
            result.push((i - 1, j - 1));
            indices = [i - 1, j - 1];
            continue;
        }
        let up = table[[i - 1, j]];
        let left = table[[i, j - 1]];
        let shrink_b = match tie_break {
            TieBreak::ShrinkB => up <= left,
            TieBreak::ShrinkA => up < left,
        };
        if shrink_b {
            indices[1] -= 1;
        } else {
            indices[0] -= 1;
        }
    }
    result.reverse();
    result
}

/// Levenshtein distance with unit costs, divided by the longer length.
/// Two empty sequences are at distance 0.
pub fn normalized_edit_distance<T: PartialEq>(a: &[T], b: &[T]) -> f64 {
    let sizes = [a.len(), b.len()];
    let longest = usize::max(usize::max(sizes[0], sizes[1]), 1);

    // Only two rows are live at any time.
    let row_range = 2;
    let mut table = DpTable::new(row_range, sizes[1] + 1);
    for j in 0..=sizes[1] {
        table[[0, j]] = j;
    }
    for i in 1..=sizes[0] {
        let (row, previous) = (i % row_range, (i - 1) % row_range);
        table[[row, 0]] = i;
        for j in 1..=sizes[1] {
            let substitution = usize::from(a[i - 1] != b[j - 1]);
            table[[row, j]] = usize::min(
                table[[previous, j - 1]] + substitution,
                usize::min(table[[previous, j]], table[[row, j - 1]]) + 1,
            );
        }
    }

    table[[sizes[0] % row_range, sizes[1]]] as f64 / longest as f64
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{Rng, SeedableRng};

    fn random_sequence(rng: &mut impl Rng) -> Vec<u8> {
        let length = rng.gen_range(0..12);
        (0..length).map(|_| rng.gen_range(b'a'..=b'd')).collect()
    }

    fn chars(text: &str) -> Vec<char> {
        text.chars().collect()
    }

    #[test]
    fn lcs_empty_inputs() {
        assert_eq!(lcs_positions::<char>(&[], &[]), vec![]);
        assert_eq!(lcs_positions(&chars("abc"), &[]), vec![]);
        assert_eq!(lcs_positions(&[], &chars("abc")), vec![]);
    }

    #[test]
    fn lcs_identical() {
        let a = chars("xyz");
        assert_eq!(lcs_positions(&a, &a), vec![(0, 0), (1, 1), (2, 2)]);
    }

    #[test]
    fn lcs_classic() {
        let a = chars("ABCBDAB");
        let b = chars("BDCABA");
        let positions = lcs_positions(&a, &b);
        assert_eq!(positions.len(), 4);
        assert_eq!(lcs_length(&a, &b), 4);
    }

    #[test]
    fn tie_break_selects_alignment() {
        let a = chars("xy");
        let b = chars("yx");
        assert_eq!(lcs_positions_with(&a, &b, TieBreak::ShrinkB), vec![(1, 0)]);
        assert_eq!(lcs_positions_with(&a, &b, TieBreak::ShrinkA), vec![(0, 1)]);
        assert_eq!(lcs_positions(&a, &b), vec![(1, 0)]);
    }

    #[test]
    fn lcs_properties_on_random_sequences() {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(42);
        for _ in 0..500 {
            let a = random_sequence(&mut rng);
            let b = random_sequence(&mut rng);
            for tie_break in [TieBreak::ShrinkA, TieBreak::ShrinkB] {
                let positions = lcs_positions_with(&a, &b, tie_break);
                for window in positions.windows(2) {
                    assert!(window[0].0 < window[1].0);
                    assert!(window[0].1 < window[1].1);
                }
                for &(i, j) in &positions {
                    assert_eq!(a[i], b[j]);
                }
                assert_eq!(positions.len(), lcs_length(&a, &b));
            }
        }
    }

    #[test]
    fn edit_distance_known_values() {
        assert_eq!(normalized_edit_distance(&chars("kitten"), &chars("sitting")), 3.0 / 7.0);
        assert_eq!(normalized_edit_distance(&chars("abc"), &[]), 1.0);
        assert_eq!(normalized_edit_distance::<char>(&[], &[]), 0.0);
        assert_eq!(normalized_edit_distance(&["f1", "g"], &["f1", "h"]), 0.5);
    }

    #[test]
    fn edit_distance_is_case_sensitive() {
        assert_eq!(normalized_edit_distance(&["Foo"], &["foo"]), 1.0);
    }

    #[test]
    fn edit_distance_properties_on_random_sequences() {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(7);
        for _ in 0..500 {
            let a = random_sequence(&mut rng);
            let b = random_sequence(&mut rng);
            let forward = normalized_edit_distance(&a, &b);
            assert_eq!(forward, normalized_edit_distance(&b, &a));
            assert!((0.0..=1.0).contains(&forward));
            assert_eq!(normalized_edit_distance(&a, &a), 0.0);
        }
    }
}
