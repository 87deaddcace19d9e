use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use crate::domain::{MetalType, PriceObservation};
use crate::error::AppError;
use crate::ports::PriceRepository;

/// Upper bound on points in a chart series.
pub const MAX_CHART_POINTS: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    #[default]
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "1w")]
    OneWeek,
    #[serde(rename = "1m")]
    OneMonth,
    #[serde(rename = "3m")]
    ThreeMonths,
    #[serde(rename = "6m")]
    SixMonths,
    #[serde(rename = "1y")]
    OneYear,
}

impl Period {
    pub const ALL: [Period; 6] = [
        Period::OneDay,
        Period::OneWeek,
        Period::OneMonth,
        Period::ThreeMonths,
        Period::SixMonths,
        Period::OneYear,
    ];

    pub fn window(&self) -> Duration {
        match self {
            Period::OneDay => Duration::days(1),
            Period::OneWeek => Duration::days(7),
            Period::OneMonth => Duration::days(30),
            Period::ThreeMonths => Duration::days(90),
            Period::SixMonths => Duration::days(180),
            Period::OneYear => Duration::days(365),
        }
    }

    /// Sampling granularity that keeps responses small for the window.
    pub fn sampling_interval(&self) -> Duration {
        match self {
            Period::OneDay => Duration::minutes(5),
            Period::OneWeek => Duration::hours(1),
            Period::OneMonth => Duration::hours(4),
            Period::ThreeMonths | Period::SixMonths => Duration::days(1),
            Period::OneYear => Duration::weeks(1),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::OneDay => "1d",
            Period::OneWeek => "1w",
            Period::OneMonth => "1m",
            Period::ThreeMonths => "3m",
            Period::SixMonths => "6m",
            Period::OneYear => "1y",
        }
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Period::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown period '{}', expected one of 1d, 1w, 1m, 3m, 6m, 1y", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub buy_price: f64,
    pub sell_price: f64,
}

impl From<&PriceObservation> for PricePoint {
    fn from(obs: &PriceObservation) -> Self {
        Self {
            timestamp: obs.timestamp,
            buy_price: obs.buy_price,
            sell_price: obs.sell_price,
        }
    }
}

/// Statistics over the buy-price series of a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceStats {
    pub metal_type: MetalType,
    pub period: Period,
    pub high: f64,
    pub low: f64,
    pub average: f64,
    /// Population standard deviation.
    pub volatility: f64,
    pub change: f64,
    pub change_percent: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodChange {
    pub period: Period,
    pub change: f64,
    pub change_percent: f64,
    pub count: usize,
}

/// Keeps the last observation of each `interval` bucket starting at `from`.
/// Input must be ordered oldest first.
pub fn sample(observations: &[PriceObservation], from: DateTime<Utc>, interval: Duration) -> Vec<PricePoint> {
    let step = interval.num_seconds().max(1);
    let mut points: Vec<PricePoint> = Vec::new();
    let mut current_bucket: Option<i64> = None;

    for obs in observations {
        let bucket = (obs.timestamp - from).num_seconds().div_euclid(step);
        if current_bucket == Some(bucket) {
            if let Some(last) = points.last_mut() {
                *last = PricePoint::from(obs);
            }
        } else {
            current_bucket = Some(bucket);
            points.push(PricePoint::from(obs));
        }
    }
    points
}

/// Evenly thins `points` to at most `max` entries, always keeping the newest.
pub fn downsample(points: Vec<PricePoint>, max: usize) -> Vec<PricePoint> {
    if points.len() <= max || max == 0 {
        return points;
    }
    if max == 1 {
        return points.into_iter().last().into_iter().collect();
    }

    let last = points.len() - 1;
    (0..max)
        .map(|i| points[i * last / (max - 1)].clone())
        .collect()
}

fn summarize(metal: MetalType, period: Period, series: &[f64]) -> PriceStats {
    let count = series.len();
    if count == 0 {
        return PriceStats {
            metal_type: metal,
            period,
            high: 0.0,
            low: 0.0,
            average: 0.0,
            volatility: 0.0,
            change: 0.0,
            change_percent: 0.0,
            count,
        };
    }

    let high = series.iter().copied().fold(f64::MIN, f64::max);
    let low = series.iter().copied().fold(f64::MAX, f64::min);
    let average = series.iter().sum::<f64>() / count as f64;
    let variance = series.iter().map(|p| (p - average).powi(2)).sum::<f64>() / count as f64;
    let first = series[0];
    let change = series[count - 1] - first;
    let change_percent = if first > 0.0 { change / first * 100.0 } else { 0.0 };

    PriceStats {
        metal_type: metal,
        period,
        high,
        low,
        average,
        volatility: variance.sqrt(),
        change,
        change_percent,
        count,
    }
}

/// Read-side queries over the stored price series.
#[derive(Clone)]
pub struct PriceAnalytics {
    store: Arc<dyn PriceRepository>,
}

impl PriceAnalytics {
    pub fn new(store: Arc<dyn PriceRepository>) -> Self {
        Self { store }
    }

    async fn window(&self, metal: MetalType, period: Period, now: DateTime<Utc>) -> Result<Vec<PriceObservation>, AppError> {
        Ok(self.store.range(metal, now - period.window(), now).await?)
    }

    pub async fn history(&self, metal: MetalType, period: Period) -> Result<Vec<PricePoint>, AppError> {
        let now = Utc::now();
        let observations = self.window(metal, period, now).await?;
        Ok(sample(&observations, now - period.window(), period.sampling_interval()))
    }

    pub async fn chart(&self, metal: MetalType, period: Period) -> Result<Vec<PricePoint>, AppError> {
        let points = self.history(metal, period).await?;
        Ok(downsample(points, MAX_CHART_POINTS))
    }

    pub async fn stats(&self, metal: MetalType, period: Period) -> Result<PriceStats, AppError> {
        let observations = self.window(metal, period, Utc::now()).await?;
        let series: Vec<f64> = observations.iter().map(|o| o.buy_price).collect();
        Ok(summarize(metal, period, &series))
    }

    pub async fn compare(&self, metal: MetalType) -> Result<Vec<PeriodChange>, AppError> {
        let now = Utc::now();
        // One read for the longest window; shorter ones are suffixes of it.
        let year = self.window(metal, Period::OneYear, now).await?;

        Ok(Period::ALL
            .into_iter()
            .map(|period| {
                let from = now - period.window();
                let series: Vec<f64> = year
                    .iter()
                    .filter(|o| o.timestamp >= from)
                    .map(|o| o.buy_price)
                    .collect();
                let stats = summarize(metal, period, &series);
                PeriodChange {
                    period,
                    change: stats.change,
                    change_percent: stats.change_percent,
                    count: stats.count,
                }
            })
            .collect())
    }
}
