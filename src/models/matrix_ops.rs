//! Small element-wise helpers over `faer` column matrices.

use faer::Mat;

/// Rows of `matrix` at `indices`, in order. Indices may repeat.
#[must_use]
pub fn select_rows(matrix: &Mat<f64>, indices: &[usize]) -> Mat<f64> {
    Mat::from_fn(indices.len(), matrix.ncols(), |i, j| {
        matrix[(indices[i], j)]
    })
}

#[must_use]
pub fn map_mat(values: &Mat<f64>, f: impl Fn(f64) -> f64) -> Mat<f64> {
    Mat::from_fn(values.nrows(), values.ncols(), |i, j| f(values[(i, j)]))
}

#[must_use]
pub fn zip_mat(a: &Mat<f64>, b: &Mat<f64>, f: impl Fn(f64, f64) -> f64) -> Mat<f64> {
    Mat::from_fn(a.nrows(), a.ncols(), |i, j| f(a[(i, j)], b[(i, j)]))
}
