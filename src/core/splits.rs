//! Seeded train/val/test partition of a store's row indices.
use std::fs;
use std::path::Path;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::params::SplitParams;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Splits {
    pub train: Vec<usize>,
    pub val: Vec<usize>,
    pub test: Vec<usize>,
}

impl Splits {
    pub fn len(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_fraction(arg: &'static str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::InvalidArgument {
            arg,
            value: value.to_string(),
        });
    }
    Ok(())
}

impl SplitParams {
    pub fn validate(&self) -> Result<()> {
        check_fraction("train", self.train)?;
        check_fraction("val", self.val)?;
        check_fraction("test", self.test)?;
        let total = self.train + self.val + self.test;
        if (total - 1.0).abs() > 1e-6 {
            return Err(Error::InvalidArgument {
                arg: "train+val+test",
                value: total.to_string(),
            });
        }
        Ok(())
    }
}

/// Shuffle `0..rows` and cut it by the configured fractions.
/// Train and val sizes are floored; test takes whatever remains.
pub fn create_splits(rows: usize, params: &SplitParams) -> Result<Splits> {
    params.validate()?;
    let n_train = (params.train * rows as f64).floor() as usize;
    let n_val = ((params.val * rows as f64).floor() as usize).min(rows - n_train);

    let mut indices: Vec<usize> = (0..rows).collect();
    let mut rng = StdRng::seed_from_u64(params.seed);
    indices.shuffle(&mut rng);

    let test = indices.split_off(n_train + n_val);
    let val = indices.split_off(n_train);
    let splits = Splits {
        train: indices,
        val,
        test,
    };
    info!(
        "Split {} rows: train={}, val={}, test={}",
        rows,
        splits.train.len(),
        splits.val.len(),
        splits.test.len()
    );
    Ok(splits)
}

pub fn write_splits(path: &Path, splits: &Splits) -> Result<()> {
    let file = fs::File::create(path)?;
    serde_json::to_writer(std::io::BufWriter::new(file), splits)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_puts_everything_in_train() {
        let s = create_splits(10, &SplitParams::default()).unwrap();
        assert_eq!(s.train.len(), 10);
        assert!(s.val.is_empty() && s.test.is_empty());
        let mut all = s.train.clone();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn fractions_floor_and_test_takes_remainder() {
        let params = SplitParams {
            train: 0.7,
            val: 0.15,
            test: 0.15,
            seed: 3,
        };
        let s = create_splits(11, &params).unwrap();
        assert_eq!((s.train.len(), s.val.len(), s.test.len()), (7, 1, 3));
        assert_eq!(s, create_splits(11, &params).unwrap());

        let mut all: Vec<_> = s.train.iter().chain(&s.val).chain(&s.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..11).collect::<Vec<_>>());
    }

    #[test]
    fn invalid_fractions_are_rejected() {
        let params = SplitParams {
            train: 0.8,
            val: 0.5,
            test: 0.0,
            seed: 0,
        };
        assert!(create_splits(4, &params).is_err());
        let params = SplitParams {
            train: -0.1,
            val: 0.6,
            test: 0.5,
            seed: 0,
        };
        assert!(create_splits(4, &params).is_err());
    }
}
