use linfa::Float;
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2};

/// A matrix kept together with the per-column mean and standard deviation
/// it was scaled by, so the same scaling can be applied to later queries.
#[derive(Debug, Clone)]
pub(crate) struct NormalizedData<F: Float> {
    /// Normalized data
    pub data: Array2<F>,
    /// Per-column mean of the original data
    pub mean: Array1<F>,
    /// Per-column standard deviation of the original data
    pub std: Array1<F>,
}

impl<F: Float> NormalizedData<F> {
    pub fn new(x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> NormalizedData<F> {
        let (data, mean, std) = normalize(x);
        NormalizedData { data, mean, std }
    }

    /// Dimension of the data points
    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }
}

/// Center and scale each column to zero mean and unit standard deviation.
/// A constant column gets a unit scale so later divisions stay finite.
pub(crate) fn normalize<F: Float>(
    x: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> (Array2<F>, Array1<F>, Array1<F>) {
    let mean = x.mean_axis(Axis(0)).unwrap();
    let std = x
        .std_axis(Axis(0), F::one())
        .mapv(|v| if v == F::zero() { F::one() } else { v });
    let data = (x - &mean) / &std;
    (data, mean, std)
}

/// Componentwise absolute differences between every pair of training rows,
/// stored once as a ((n * (n-1)) / 2, nx) array together with the (i, j)
/// row indices each difference came from.
#[derive(Debug)]
pub(crate) struct DiffMatrix<F: Float> {
    pub d: Array2<F>,
    pub d_indices: Array2<usize>,
    pub n_obs: usize,
}

impl<F: Float> DiffMatrix<F> {
    pub fn new(x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> DiffMatrix<F> {
        let n_obs = x.nrows();
        let n_pairs = n_obs * (n_obs - 1) / 2;
        let mut d = Array2::zeros((n_pairs, x.ncols()));
        let mut d_indices = Array2::zeros((n_pairs, 2));
        let mut row = 0;
        for i in 0..n_obs - 1 {
            for j in (i + 1)..n_obs {
                let diff = (&x.row(i) - &x.row(j)).mapv(|v| num_traits::float::Float::abs(v));
                d.row_mut(row).assign(&diff);
                d_indices[[row, 0]] = i;
                d_indices[[row, 1]] = j;
                row += 1;
            }
        }
        DiffMatrix {
            d,
            d_indices,
            n_obs,
        }
    }
}

/// Componentwise differences between a point `x` and every row of `y`,
/// as a (nrows(y), nx) array. *Panics* if dimensions disagree.
pub(crate) fn differences<F: Float>(
    x: &ArrayBase<impl Data<Elem = F>, Ix1>,
    y: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Array2<F> {
    assert!(x.len() == y.ncols());
    x.to_owned() - y
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_normalize() {
        let x = array![[1., 10.], [3., 20.], [5., 30.]];
        let norm = NormalizedData::new(&x);
        assert_eq!(norm.ncols(), 2);
        assert_abs_diff_eq!(array![3., 20.], norm.mean);
        assert_abs_diff_eq!(array![2., 10.], norm.std);
        assert_abs_diff_eq!(array![[-1., -1.], [0., 0.], [1., 1.]], norm.data);
    }

    #[test]
    fn test_normalize_constant_column() {
        let x = array![[2., 1.], [2., 3.]];
        let norm = NormalizedData::new(&x);
        assert_abs_diff_eq!(norm.std[0], 1.);
        assert_abs_diff_eq!(norm.data.column(0).sum(), 0.);
    }

    #[test]
    fn test_diff_matrix() {
        let x = array![[0.], [1.], [3.]];
        let dm = DiffMatrix::new(&x);
        assert_eq!(dm.n_obs, 3);
        assert_abs_diff_eq!(array![[1.], [3.], [2.]], dm.d);
        assert_eq!(array![[0usize, 1], [0, 2], [1, 2]], dm.d_indices);
    }

    #[test]
    fn test_differences() {
        let x = array![1., 2.];
        let y = array![[0., 0.], [1., 1.], [2., 4.]];
        assert_abs_diff_eq!(
            array![[1., 2.], [0., 1.], [-1., -2.]],
            differences(&x, &y),
            epsilon = 1e-12
        );
    }
}
