//! Vehicle-count forecasting over calendar features.
//!
//! [`ForecastService`] owns a loaded [`Regressor`] and turns a list of
//! timestamp strings into a [`ForecastResult`] keyed by those strings.

use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;

use crate::error::{ServeError, ServeResult};
use crate::features::{extract_features, FEATURE_COUNT};

/// A trained regression model over calendar features.
///
/// Implementations must be deterministic and safe to share across
/// requests; the service never mutates them.
pub trait Regressor: Send + Sync {
    /// Predict one value per row, in row order.
    fn predict(&self, rows: &[[f32; FEATURE_COUNT]]) -> anyhow::Result<Vec<f32>>;
}

/// Predictions keyed by the caller's original timestamp strings.
///
/// Keys keep first-seen input order. A timestamp string that appears more
/// than once maps to the prediction of its last occurrence.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ForecastResult(IndexMap<String, f64>);

impl ForecastResult {
    pub fn get(&self, timestamp: &str) -> Option<f64> {
        self.0.get(timestamp).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Forecasting service wrapping a shared model.
#[derive(Clone)]
pub struct ForecastService {
    model: Arc<dyn Regressor>,
}

impl ForecastService {
    pub fn new(model: Arc<dyn Regressor>) -> Self {
        Self { model }
    }

    /// Predict vehicle counts for each timestamp.
    ///
    /// The whole batch goes to the model in a single call.
    pub fn predict(&self, timestamps: &[String]) -> ServeResult<ForecastResult> {
        if timestamps.is_empty() {
            return Err(ServeError::invalid_input("timestamps must not be empty"));
        }

        let rows: Vec<[f32; FEATURE_COUNT]> = extract_features(timestamps)?
            .iter()
            .map(|r| r.to_array())
            .collect();

        let predictions = self.model.predict(&rows).map_err(|e| {
            tracing::error!(error = %e, "forecast model failed");
            ServeError::generation("failed to compute predictions")
        })?;

        if predictions.len() != timestamps.len() {
            tracing::error!(
                expected = timestamps.len(),
                got = predictions.len(),
                "forecast model returned wrong number of predictions"
            );
            return Err(ServeError::generation("failed to compute predictions"));
        }

        let mut result = IndexMap::with_capacity(timestamps.len());
        for (ts, value) in timestamps.iter().zip(predictions) {
            result.insert(ts.clone(), value as f64);
        }

        tracing::debug!(count = result.len(), "forecast computed");
        Ok(ForecastResult(result))
    }
}
