//! Turns raw (instance, time, feature) arrays into supervised windows and
//! iterates them in fixed-size batches.
//!
//! Feature 0 is always the forecast target. Training arrays carry exactly
//! `encode_len + decode_len` steps; inference arrays carry at least
//! `encode_len` steps and only the most recent `encode_len` are used.

use ndarray::{s, Array2, Array3, ArrayBase, Axis, Data, Ix3};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{ForecastError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowMode {
    Train,
    Infer,
}

/// Window geometry the arrays are checked against
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowSpec {
    pub encode_len: usize,
    pub decode_len: usize,
    pub feat_dim: usize,
}

/// History windows (N, encode_len, feat_dim) with their feature-0 targets
/// (N, decode_len), the latter only present for training windows
#[derive(Clone, Debug)]
pub struct WindowedData {
    pub history: Array3<f64>,
    pub target: Option<Array2<f64>>,
}

impl WindowedData {
    pub fn len(&self) -> usize {
        self.history.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split `data` into history/target windows.
///
/// Never mutates `data`; the returned arrays are freshly allocated.
pub fn extract<S>(data: &ArrayBase<S, Ix3>, mode: WindowMode, spec: &WindowSpec) -> Result<WindowedData>
where
    S: Data<Elem = f64>,
{
    let (_, time_steps, features) = data.dim();
    if features != spec.feat_dim {
        return Err(ForecastError::shape("feature dimension", spec.feat_dim, features));
    }

    match mode {
        WindowMode::Train => {
            let required = spec.encode_len + spec.decode_len;
            if time_steps != required {
                return Err(ForecastError::shape("training sequence length", required, time_steps));
            }
            let history = data.slice(s![.., ..spec.encode_len, ..]).to_owned();
            let target = data.slice(s![.., spec.encode_len.., 0]).to_owned();
            Ok(WindowedData {
                history,
                target: Some(target),
            })
        }
        WindowMode::Infer => {
            if time_steps < spec.encode_len {
                return Err(ForecastError::InsufficientHistory {
                    required: spec.encode_len,
                    actual: time_steps,
                });
            }
            let start = time_steps - spec.encode_len;
            let history = data.slice(s![.., start.., ..]).to_owned();
            Ok(WindowedData { history, target: None })
        }
    }
}

/// One mini-batch of windows
#[derive(Clone, Debug)]
pub struct Batch {
    pub history: Array3<f64>,
    pub target: Option<Array2<f64>>,
}

/// Restartable batch source over a windowed dataset
///
/// Every call to [`Batches::sequential`] or [`Batches::shuffled`] starts a
/// fresh pass; batches are materialised lazily as the iterator advances.
pub struct Batches<'a> {
    data: &'a WindowedData,
    batch_size: usize,
}

impl<'a> Batches<'a> {
    pub fn new(data: &'a WindowedData, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(ForecastError::InvalidConfig("batch_size must be positive".to_string()));
        }
        Ok(Batches { data, batch_size })
    }

    /// Number of batches in one pass (the last may be short)
    pub fn len(&self) -> usize {
        (self.data.len() + self.batch_size - 1) / self.batch_size
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Input order, used for inference and evaluation
    pub fn sequential(&self) -> BatchIter<'a> {
        self.iter_with_order((0..self.data.len()).collect())
    }

    /// A new random permutation per call, used for training epochs
    pub fn shuffled<R: Rng + ?Sized>(&self, rng: &mut R) -> BatchIter<'a> {
        let mut order: Vec<usize> = (0..self.data.len()).collect();
        order.shuffle(rng);
        self.iter_with_order(order)
    }

    fn iter_with_order(&self, order: Vec<usize>) -> BatchIter<'a> {
        BatchIter {
            data: self.data,
            order,
            batch_size: self.batch_size,
            position: 0,
        }
    }
}

pub struct BatchIter<'a> {
    data: &'a WindowedData,
    order: Vec<usize>,
    batch_size: usize,
    position: usize,
}

impl<'a> Iterator for BatchIter<'a> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.position >= self.order.len() {
            return None;
        }
        let end = (self.position + self.batch_size).min(self.order.len());
        let indices = &self.order[self.position..end];
        self.position = end;

        Some(Batch {
            history: self.data.history.select(Axis(0), indices),
            target: self.data.target.as_ref().map(|t| t.select(Axis(0), indices)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn spec() -> WindowSpec {
        WindowSpec { encode_len: 4, decode_len: 2, feat_dim: 2 }
    }

    fn series(n: usize, t: usize, d: usize) -> Array3<f64> {
        Array3::from_shape_fn((n, t, d), |(i, j, k)| (i * 100 + j * 10 + k) as f64)
    }

    #[test]
    fn test_train_split() {
        let data = series(3, 6, 2);
        let windows = extract(&data, WindowMode::Train, &spec()).unwrap();

        assert_eq!(windows.history.dim(), (3, 4, 2));
        let target = windows.target.unwrap();
        assert_eq!(target.dim(), (3, 2));
        assert_eq!(target[[1, 0]], data[[1, 4, 0]]);
        assert_eq!(target[[2, 1]], data[[2, 5, 0]]);
    }

    #[test]
    fn test_train_rejects_wrong_length() {
        let data = series(3, 7, 2);
        let err = extract(&data, WindowMode::Train, &spec()).unwrap_err();
        match err {
            ForecastError::ShapeMismatch { expected, actual, .. } => {
                assert_eq!(expected, "6");
                assert_eq!(actual, "7");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_feature_dimension_checked_first() {
        let data = series(3, 6, 3);
        for mode in [WindowMode::Train, WindowMode::Infer] {
            let err = extract(&data, mode, &spec()).unwrap_err();
            assert!(matches!(err, ForecastError::ShapeMismatch { ref context, .. } if context == "feature dimension"));
        }
    }

    #[test]
    fn test_infer_takes_most_recent_steps() {
        let data = series(2, 9, 2);
        let windows = extract(&data, WindowMode::Infer, &spec()).unwrap();
        assert!(windows.target.is_none());
        assert_eq!(windows.history, data.slice(s![.., 5.., ..]));
    }

    #[test]
    fn test_infer_requires_encode_len() {
        let data = series(2, 3, 2);
        let err = extract(&data, WindowMode::Infer, &spec()).unwrap_err();
        assert!(matches!(err, ForecastError::InsufficientHistory { required: 4, actual: 3 }));
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let windows = extract(&series(3, 6, 2), WindowMode::Train, &spec()).unwrap();
        assert!(matches!(Batches::new(&windows, 0), Err(ForecastError::InvalidConfig(_))));
    }

    #[test]
    fn test_sequential_batches_preserve_order() {
        let data = series(5, 6, 2);
        let windows = extract(&data, WindowMode::Train, &spec()).unwrap();
        let batches = Batches::new(&windows, 2).unwrap();
        assert_eq!(batches.len(), 3);

        let sizes: Vec<usize> = batches.sequential().map(|b| b.history.len_of(Axis(0))).collect();
        assert_eq!(sizes, vec![2, 2, 1]);

        let firsts: Vec<f64> = batches.sequential().map(|b| b.history[[0, 0, 0]]).collect();
        assert_eq!(firsts, vec![0.0, 200.0, 400.0]);
    }

    #[test]
    fn test_shuffled_batches_cover_every_instance_once() {
        let data = series(7, 6, 2);
        let windows = extract(&data, WindowMode::Train, &spec()).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        let mut seen: Vec<f64> = Batches::new(&windows, 3)
            .unwrap()
            .shuffled(&mut rng)
            .flat_map(|b| {
                let target = b.target.unwrap();
                assert_eq!(target.len_of(Axis(0)), b.history.len_of(Axis(0)));
                b.history.index_axis(Axis(1), 0).index_axis(Axis(1), 0).to_vec()
            })
            .collect();
        seen.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(seen, vec![0.0, 100.0, 200.0, 300.0, 400.0, 500.0, 600.0]);
    }
}
