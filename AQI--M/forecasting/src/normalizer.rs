use crate::{
    error::{ForecastError, ForecastResult},
    stats::SeriesStatistics,
};

/// Z-scores every value against `stats`.
pub fn normalize(series: &[f64], stats: &SeriesStatistics) -> ForecastResult<Vec<f64>> {
    guard(stats)?;
    Ok(series
        .iter()
        .map(|x| (x - stats.mean) / stats.std_dev)
        .collect())
}

/// Maps a z-score back to the raw AQI scale.
pub fn denormalize(value: f64, stats: &SeriesStatistics) -> ForecastResult<f64> {
    guard(stats)?;
    Ok(value * stats.std_dev + stats.mean)
}

fn guard(stats: &SeriesStatistics) -> ForecastResult<()> {
    if stats.is_degenerate() || !stats.mean.is_finite() {
        return Err(ForecastError::DegenerateDistribution);
    }
    Ok(())
}
