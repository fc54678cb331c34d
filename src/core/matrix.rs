//! Host×instance matrices exchanged between constraints, costs and solvers.
//!
//! Matrices are flat row-major buffers. A constraint matrix has one column per
//! instance count: column `j` tells whether the host may hold at least `j + 1`
//! instances of the batch. An extended cost matrix has one more leading column
//! for the "zero instances" baseline; the plain cost matrix is the extended one
//! without that column.

#[derive(Default, Debug, Clone, PartialEq)]
pub struct Matrix<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

pub type ConstraintMatrix = Matrix<bool>;
pub type CostMatrix = Matrix<f64>;

impl<T: Copy> Matrix<T> {
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Builds a matrix from row vectors. Returns `None` for ragged input.
    pub fn from_rows(rows: Vec<Vec<T>>) -> Option<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != cols) {
            return None;
        }
        Some(Self {
            rows: rows.len(),
            cols,
            data: rows.into_iter().flatten().collect(),
        })
    }

    pub fn num_rows(&self) -> usize {
        self.rows
    }

    pub fn num_cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn has_shape(&self, rows: usize, cols: usize) -> bool {
        self.rows == rows && self.cols == cols
    }

    pub fn get(&self, row: usize, col: usize) -> T {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: T) {
        self.data[row * self.cols + col] = value;
    }

    pub fn row(&self, row: usize) -> &[T] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [T] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn set_row(&mut self, row: usize, values: &[T]) {
        self.row_mut(row).copy_from_slice(values);
    }

    pub fn rows(&self) -> impl Iterator<Item = &[T]> + '_ {
        (0..self.rows).map(move |row| self.row(row))
    }

    pub fn to_rows(&self) -> Vec<Vec<T>> {
        self.rows().map(<[T]>::to_vec).collect()
    }
}

/// Row of a constraint matrix allowing at most `capacity` instances.
pub fn capacity_row(num_instances: usize, capacity: usize) -> Vec<bool> {
    (0..num_instances).map(|col| col < capacity).collect()
}

impl Matrix<bool> {
    /// All-true matrix: every host may take every instance count.
    pub fn permissive(num_hosts: usize, num_instances: usize) -> Self {
        Self::filled(num_hosts, num_instances, true)
    }

    pub fn set_row_capacity(&mut self, row: usize, capacity: usize) {
        let cols = self.cols;
        self.set_row(row, &capacity_row(cols, capacity));
    }

    pub fn set_row_all(&mut self, row: usize, value: bool) {
        self.row_mut(row).fill(value);
    }

    /// Logical AND with a matrix of the same shape.
    pub fn and_assign(&mut self, other: &ConstraintMatrix) {
        for (lhs, rhs) in self.data.iter_mut().zip(&other.data) {
            *lhs = *lhs && *rhs;
        }
    }

    /// Number of leading true cells of a row, i.e. how many instances the host may take.
    pub fn row_capacity(&self, row: usize) -> usize {
        self.row(row).iter().take_while(|&&allowed| allowed).count()
    }

    /// Once false, a row must stay false.
    pub fn is_row_monotone(&self, row: usize) -> bool {
        self.row(row).windows(2).all(|pair| pair[0] || !pair[1])
    }
}

impl Matrix<f64> {
    pub fn zeros(num_hosts: usize, cols: usize) -> Self {
        Self::filled(num_hosts, cols, 0.0)
    }

    /// `self += multiplier * other`, element-wise.
    pub fn add_scaled(&mut self, other: &CostMatrix, multiplier: f64) {
        for (lhs, rhs) in self.data.iter_mut().zip(&other.data) {
            *lhs += multiplier * rhs;
        }
    }

    /// Extended cost matrix without its leading "zero instances" column.
    pub fn without_first_column(&self) -> CostMatrix {
        let cols = self.cols.saturating_sub(1);
        Self {
            rows: self.rows,
            cols,
            data: self.rows().flat_map(|row| row.iter().skip(1).copied()).collect(),
        }
    }

    pub fn first_column(&self) -> Vec<f64> {
        if self.cols == 0 {
            return Vec::new();
        }
        self.rows().map(|row| row[0]).collect()
    }

    pub fn last_column(&self) -> Vec<f64> {
        self.rows().filter_map(|row| row.last().copied()).collect()
    }
}

/// Scales the matrix so that the largest absolute value of the first column becomes 1.
///
/// Signs and relative differences inside each row are kept. A matrix whose first
/// column is all zeros comes back unchanged. Dividing by the scale (rather than
/// multiplying by its inverse) keeps the operation exactly idempotent.
pub fn normalize_cost_matrix(matrix: &CostMatrix) -> CostMatrix {
    let max_abs = matrix
        .first_column()
        .into_iter()
        .fold(0.0_f64, |acc, value| acc.max(value.abs()));
    if max_abs == 0.0 {
        return matrix.clone();
    }
    let mut normalized = matrix.clone();
    for value in normalized.data.iter_mut() {
        *value /= max_abs;
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_rejects_ragged_input() {
        assert!(ConstraintMatrix::from_rows(vec![vec![true, false], vec![true]]).is_none());
        let empty = CostMatrix::from_rows(vec![]).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.num_cols(), 0);
    }

    #[test]
    fn test_capacity_rows_are_monotone() {
        let mut matrix = ConstraintMatrix::permissive(3, 4);
        matrix.set_row_capacity(0, 0);
        matrix.set_row_capacity(1, 2);
        matrix.set_row_capacity(2, 10);
        assert_eq!(matrix.row(0), &[false, false, false, false]);
        assert_eq!(matrix.row(1), &[true, true, false, false]);
        assert_eq!(matrix.row(2), &[true, true, true, true]);
        assert_eq!(matrix.row_capacity(1), 2);
        assert!((0..3).all(|row| matrix.is_row_monotone(row)));

        matrix.set_row(0, &[false, true, false, false]);
        assert!(!matrix.is_row_monotone(0));
    }

    #[test]
    fn test_and_assign() {
        let mut lhs = ConstraintMatrix::from_rows(vec![vec![true, true], vec![true, false]]).unwrap();
        let rhs = ConstraintMatrix::from_rows(vec![vec![true, false], vec![false, false]]).unwrap();
        lhs.and_assign(&rhs);
        assert_eq!(lhs.to_rows(), vec![vec![true, false], vec![false, false]]);
    }

    #[test]
    fn test_without_first_column() {
        let extended = CostMatrix::from_rows(vec![vec![0.0, 1.0, 2.0], vec![5.0, 6.0, 7.0]]).unwrap();
        let plain = extended.without_first_column();
        assert_eq!(plain.to_rows(), vec![vec![1.0, 2.0], vec![6.0, 7.0]]);
    }

    #[test]
    fn test_normalize_scales_by_first_column() {
        let matrix = CostMatrix::from_rows(vec![vec![-4.0, -3.0, -2.0], vec![2.0, 3.0, 4.0]]).unwrap();
        let normalized = normalize_cost_matrix(&matrix);
        assert_eq!(
            normalized.to_rows(),
            vec![vec![-1.0, -0.75, -0.5], vec![0.5, 0.75, 1.0]]
        );
        assert_eq!(normalize_cost_matrix(&normalized), normalized);
    }

    #[test]
    fn test_normalize_keeps_zero_first_column() {
        let matrix = CostMatrix::from_rows(vec![vec![0.0, 1.0], vec![0.0, 2.0]]).unwrap();
        assert_eq!(normalize_cost_matrix(&matrix), matrix);
    }
}
