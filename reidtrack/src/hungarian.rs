/// Hungarian algorithm for maximum-weight assignment
///
/// Scores are scaled to integers and handed to `pathfinding`'s Kuhn-Munkres
/// solver, which maximises the total weight of a perfect matching.
use ndarray::ArrayView2;
use pathfinding::prelude::{kuhn_munkres, Matrix};
use rayon::prelude::*;

/// Fixed-point scale applied to scores before solving
const SCORE_SCALE: f64 = 1_000_000.0;

/// Column chosen for one row of the score matrix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assignment {
    pub row: usize,
    /// May index a padding column when the matrix has more rows than columns
    pub column: usize,
    /// Unscaled score, `0.0` for padding columns
    pub score: f32,
}

/// Hungarian assignment solver
pub struct HungarianSolver;

impl HungarianSolver {
    /// Assign every row to a distinct column so the total score is maximal.
    ///
    /// Non-square inputs are padded with zero-score rows/columns. The result
    /// holds one entry per input row, in row order.
    pub fn solve_max(scores: ArrayView2<f32>) -> Vec<Assignment> {
        let rows = scores.nrows();
        let cols = scores.ncols();
        if rows == 0 {
            return Vec::new();
        }

        let size = rows.max(cols);
        let mut weights = Matrix::new(size, size, 0i64);

        // Parallel conversion, sequential writes
        let cells: Vec<(usize, usize, i64)> = (0..rows)
            .into_par_iter()
            .flat_map(|i| {
                (0..cols)
                    .into_par_iter()
                    .map(move |j| (i, j, Self::to_weight(scores[[i, j]])))
            })
            .collect();
        for (i, j, w) in cells {
            weights[(i, j)] = w;
        }

        let (_total, columns) = kuhn_munkres(&weights);

        columns
            .into_iter()
            .take(rows)
            .enumerate()
            .map(|(row, column)| Assignment {
                row,
                column,
                score: if column < cols {
                    scores[[row, column]]
                } else {
                    0.0
                },
            })
            .collect()
    }

    fn to_weight(score: f32) -> i64 {
        if score.is_finite() {
            (score as f64 * SCORE_SCALE).round() as i64
        } else {
            0
        }
    }

    /// Sum of scores over real (non-padding) assignments
    pub fn total_score(assignments: &[Assignment], cols: usize) -> f32 {
        assignments
            .iter()
            .filter(|a| a.column < cols)
            .map(|a| a.score)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};

    #[test]
    fn test_picks_maximum_total() {
        // Greedy row-by-row would take (0,0)=0.9 and leave (1,1)=0.1
        let scores = array![[0.9, 0.8], [0.85, 0.1]];
        let result = HungarianSolver::solve_max(scores.view());

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].column, 1);
        assert_eq!(result[1].column, 0);
        assert_abs_diff_eq!(HungarianSolver::total_score(&result, 2), 1.65, epsilon = 1e-6);
    }

    #[test]
    fn test_more_rows_than_columns_uses_padding() {
        let scores = array![[0.2], [0.9], [0.5]];
        let result = HungarianSolver::solve_max(scores.view());

        assert_eq!(result.len(), 3);
        let real: Vec<_> = result.iter().filter(|a| a.column < 1).collect();
        assert_eq!(real.len(), 1);
        assert_eq!(real[0].row, 1);
        for a in result.iter().filter(|a| a.column >= 1) {
            assert_eq!(a.score, 0.0);
        }
    }

    #[test]
    fn test_more_columns_than_rows() {
        let scores = array![[0.1, 0.2, 0.7]];
        let result = HungarianSolver::solve_max(scores.view());
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].column, 2);
    }

    #[test]
    fn test_empty_matrix() {
        let scores = Array2::<f32>::zeros((0, 0));
        assert!(HungarianSolver::solve_max(scores.view()).is_empty());

        let scores = Array2::<f32>::zeros((0, 4));
        assert!(HungarianSolver::solve_max(scores.view()).is_empty());
    }

    #[test]
    fn test_columns_are_distinct() {
        let scores = Array2::from_shape_fn((6, 6), |(i, j)| ((i * 7 + j * 3) % 11) as f32 / 10.0);
        let result = HungarianSolver::solve_max(scores.view());
        let mut cols: Vec<usize> = result.iter().map(|a| a.column).collect();
        cols.sort_unstable();
        cols.dedup();
        assert_eq!(cols.len(), 6);
    }
}
