use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Scalar biometric and location metrics carried by telemetry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    HeartRate,
    Spo2,
    Calories,
    Distance,
    Hrv,
    Vo2Max,
    Latitude,
    Longitude,
}

impl Metric {
    pub const ALL: [Metric; 8] = [
        Metric::HeartRate,
        Metric::Spo2,
        Metric::Calories,
        Metric::Distance,
        Metric::Hrv,
        Metric::Vo2Max,
        Metric::Latitude,
        Metric::Longitude,
    ];
}

/// Latest reading per metric; absent metrics have not been sampled yet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Readings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spo2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hrv: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vo2_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl Readings {
    fn slot(&mut self, metric: Metric) -> &mut Option<f64> {
        match metric {
            Metric::HeartRate => &mut self.heart_rate,
            Metric::Spo2 => &mut self.spo2,
            Metric::Calories => &mut self.calories,
            Metric::Distance => &mut self.distance,
            Metric::Hrv => &mut self.hrv,
            Metric::Vo2Max => &mut self.vo2_max,
            Metric::Latitude => &mut self.latitude,
            Metric::Longitude => &mut self.longitude,
        }
    }

    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::HeartRate => self.heart_rate,
            Metric::Spo2 => self.spo2,
            Metric::Calories => self.calories,
            Metric::Distance => self.distance,
            Metric::Hrv => self.hrv,
            Metric::Vo2Max => self.vo2_max,
            Metric::Latitude => self.latitude,
            Metric::Longitude => self.longitude,
        }
    }

    pub fn set(&mut self, metric: Metric, value: f64) {
        *self.slot(metric) = Some(value);
    }

    /// Overwrite metrics present in `update`, keep the rest
    pub fn merge(&mut self, update: &Readings) {
        for metric in Metric::ALL {
            if let Some(value) = update.get(metric) {
                self.set(metric, value);
            }
        }
    }

    /// Number of metrics with a reading
    pub fn present(&self) -> usize {
        Metric::ALL.iter().filter(|m| self.get(**m).is_some()).count()
    }
}

/// One telemetry message: the present readings plus capture time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    #[serde(flatten)]
    pub readings: Readings,
    pub timestamp: DateTime<Utc>,
}

impl TelemetrySample {
    pub fn new(readings: Readings) -> Self {
        Self {
            readings,
            timestamp: Utc::now(),
        }
    }
}

/// Latest known value of each metric, shared between sample sources and the dispatcher
#[derive(Clone, Default)]
pub struct MetricsStore {
    readings: Arc<RwLock<Readings>>,
}

impl MetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, metric: Metric, value: f64) {
        self.readings.write().await.set(metric, value);
    }

    pub async fn update(&self, update: &Readings) {
        self.readings.write().await.merge(update);
    }

    pub async fn readings(&self) -> Readings {
        self.readings.read().await.clone()
    }

    /// Package the current readings for sending
    pub async fn snapshot(&self) -> TelemetrySample {
        TelemetrySample::new(self.readings().await)
    }
}
