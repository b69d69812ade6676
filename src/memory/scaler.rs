use serde::{Deserialize, Serialize};

/// Per-dimension value ranges of the node centroids.
///
/// Fitted when a snapshot is captured and persisted alongside the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    min: Vec<f32>,
    max: Vec<f32>,
}

impl MinMaxScaler {
    /// Fit on `rows`. `None` when there are no rows or their lengths differ.
    pub fn fit<'a, I>(rows: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a [f32]>,
    {
        let mut rows = rows.into_iter();
        let first = rows.next()?;
        let mut min = first.to_vec();
        let mut max = first.to_vec();

        for row in rows {
            if row.len() != min.len() {
                return None;
            }
            for (i, &x) in row.iter().enumerate() {
                min[i] = min[i].min(x);
                max[i] = max[i].max(x);
            }
        }
        Some(Self { min, max })
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.min.len()
    }

    #[must_use]
    pub fn min(&self) -> &[f32] {
        &self.min
    }

    #[must_use]
    pub fn max(&self) -> &[f32] {
        &self.max
    }
}
