//! 化学计量矩阵与对应（选择）矩阵的稠密封装.
//!
//! 计量矩阵 `S` 每列对应一个计量迁移、每行对应一个（自由或全部）库所；
//! 列由迁移的稀疏计量列向量水平拼装而成。对应矩阵为 0/1 选择矩阵，
//! 以预计算的索引数组实现 gather/scatter，每仿真构造一次、每步复用。
use std::fmt;

use smallvec::SmallVec;

type Row = SmallVec<[f64; 4]>;

/// Dense row-major f64 matrix, rows kept in small inline buffers.
#[derive(Clone, PartialEq)]
pub struct Matrix {
    rows: Vec<Row>,
    cols: usize,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows: (0..rows).map(|_| SmallVec::from_elem(0.0, cols)).collect(),
            cols,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.rows[row][col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.rows[row][col] = value;
    }

    /// 以稀疏 (行, 系数) 条目装入一列；未列出的行保持 0.
    pub fn set_column(&mut self, col: usize, entries: &[(usize, f64)]) {
        for &(row, value) in entries {
            self.rows[row][col] = value;
        }
    }

    /// `S · v`，`v` 长为列数，结果长为行数.
    pub fn mul_vec(&self, v: &[f64]) -> Vec<f64> {
        debug_assert_eq!(v.len(), self.cols);
        self.rows
            .iter()
            .map(|row| row.iter().zip(v).map(|(a, b)| a * b).sum())
            .collect()
    }

    /// `Sᵀ · v`，`v` 长为行数，结果长为列数.
    pub fn transpose_mul_vec(&self, v: &[f64]) -> Vec<f64> {
        debug_assert_eq!(v.len(), self.rows.len());
        let mut out = vec![0.0; self.cols];
        for (row, &scale) in self.rows.iter().zip(v) {
            for (entry, value) in out.iter_mut().zip(row.iter()) {
                *entry += value * scale;
            }
        }
        out
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.rows[row]
    }
}

impl fmt::Debug for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matrix")
            .field("rows", &self.rows.len())
            .field("cols", &self.cols)
            .finish()
    }
}

/// A subset-to-all index correspondence. `to_all[i]` is the all-places index
/// of subset member `i`; gather/scatter over these arrays replace repeated
/// selector-matrix multiplication on every step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Correspondence {
    to_all: Vec<usize>,
    all_len: usize,
}

impl Correspondence {
    pub fn new(to_all: Vec<usize>, all_len: usize) -> Self {
        debug_assert!(to_all.iter().all(|&i| i < all_len));
        Self { to_all, all_len }
    }

    pub fn len(&self) -> usize {
        self.to_all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_all.is_empty()
    }

    pub fn all_len(&self) -> usize {
        self.all_len
    }

    pub fn to_all(&self) -> &[usize] {
        &self.to_all
    }

    /// 自全体向量收集子集分量.
    pub fn gather(&self, all: &[f64]) -> Vec<f64> {
        debug_assert_eq!(all.len(), self.all_len);
        self.to_all.iter().map(|&i| all[i]).collect()
    }

    /// 将子集增量散布累加到全体向量.
    pub fn scatter_add(&self, subset: &[f64], all: &mut [f64]) {
        debug_assert_eq!(subset.len(), self.to_all.len());
        for (&i, &value) in self.to_all.iter().zip(subset) {
            all[i] += value;
        }
    }

    /// 将子集值散布写入全体向量.
    pub fn scatter_set(&self, subset: &[f64], all: &mut [f64]) {
        debug_assert_eq!(subset.len(), self.to_all.len());
        for (&i, &value) in self.to_all.iter().zip(subset) {
            all[i] = value;
        }
    }

    /// 0/1 选择矩阵视图（子集 × 全体），供核对与报告使用.
    pub fn as_matrix(&self) -> Matrix {
        let mut matrix = Matrix::zeros(self.to_all.len(), self.all_len);
        for (row, &col) in self.to_all.iter().enumerate() {
            matrix.set(row, col, 1.0);
        }
        matrix
    }

    /// 全体索引到子集位置的逆映射.
    pub fn inverse(&self) -> Vec<Option<usize>> {
        let mut inverse = vec![None; self.all_len];
        for (subset_index, &all_index) in self.to_all.iter().enumerate() {
            inverse[all_index] = Some(subset_index);
        }
        inverse
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_vec_and_transpose() {
        let mut m = Matrix::zeros(2, 3);
        m.set_column(0, &[(0, 1.0), (1, -1.0)]);
        m.set_column(2, &[(1, 2.0)]);
        assert_eq!(m.mul_vec(&[2.0, 5.0, 3.0]), vec![2.0, 4.0]);
        assert_eq!(m.transpose_mul_vec(&[1.0, 10.0]), vec![-9.0, 0.0, 20.0]);
    }

    #[test]
    fn gather_scatter_round_trip() {
        let c = Correspondence::new(vec![0, 2], 4);
        let all = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(c.gather(&all), vec![1.0, 3.0]);

        let mut target = [0.0; 4];
        c.scatter_add(&[5.0, 7.0], &mut target);
        assert_eq!(target, [5.0, 0.0, 7.0, 0.0]);
        c.scatter_set(&[1.0, 1.0], &mut target);
        assert_eq!(target, [1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn selector_matrix_gathers_like_index_arrays() {
        let c = Correspondence::new(vec![1, 3], 4);
        let all = [4.0, 5.0, 6.0, 7.0];
        assert_eq!(c.as_matrix().mul_vec(&all), c.gather(&all));
        // 转置乘法把子集散布回全体空间
        assert_eq!(
            c.as_matrix().transpose_mul_vec(&[1.0, 2.0]),
            vec![0.0, 1.0, 0.0, 2.0]
        );
    }

    #[test]
    fn inverse_maps_back() {
        let c = Correspondence::new(vec![2, 0], 3);
        assert_eq!(c.inverse(), vec![Some(1), None, Some(0)]);
    }
}
