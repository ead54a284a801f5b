//! Fixed protocol, timing and calibration constants.
//!
//! None of these are user-configurable. The timing values define the link
//! supervision policy; the calibration values align band units with the
//! distribution the classifier was trained on.

use std::time::Duration;
use uuid::Uuid;

/// Maximum number of failed connection attempts before the link is declared failed.
pub const MAX_ATTEMPTS: u32 = 3;

/// Delay between a failed attempt and the next one.
pub const RETRY_BACKOFF_MS: u64 = 2000;

/// Time allowed from entering `Connecting` to reaching `Ready`.
pub const CONNECTION_TIMEOUT_MS: u64 = 10_000;

/// Silence on a ready link after which the link is considered dead.
pub const DATA_STALE_MS: u64 = 6000;

/// Settle time for the radio stack between picking a device and issuing connect.
pub const CONNECT_SETTLE_MS: u64 = 500;

/// Transfer unit requested after the transport connects.
pub const REQUESTED_MTU: u16 = 512;

/// Length of the classification window.
pub const WINDOW_SECONDS: u32 = 30;

/// Interval at which the band emits one telemetry record.
pub const SAMPLE_PERIOD_SECONDS: u32 = 2;

/// Samples held by the feature window: round(WINDOW_SECONDS / SAMPLE_PERIOD_SECONDS).
pub const WINDOW_CAPACITY: usize =
    ((2 * WINDOW_SECONDS + SAMPLE_PERIOD_SECONDS) / (2 * SAMPLE_PERIOD_SECONDS)) as usize;

/// Instantaneous predictions considered by the majority-vote stabilizer.
pub const PREDICTION_HISTORY: usize = 5;

/// Hysteresis: flip to positive only above this smoothed probability.
pub const STRESS_THRESHOLD: f64 = 0.7;

/// Hysteresis: flip back to negative only below this smoothed probability.
pub const NORMAL_THRESHOLD: f64 = 0.3;

/// Smoothing factor of the hysteresis moving average.
pub const HYSTERESIS_ALPHA: f64 = 0.3;

/// Upper bound on bytes held while waiting for a closing brace.
pub const MAX_REASSEMBLY_BYTES: usize = 4096;

/// Accelerometer scale: m/s² to 1/64 g counts.
pub const ACC_SCALE: f64 = 64.0 / 9.806_65;

/// Added to the skin temperature reading (°C).
pub const TEMP_OFFSET: f64 = 1.5;

/// BVP amplitude scale.
pub const BVP_SCALE: f64 = 0.5;

/// Telemetry service exposed by the band.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0xa0e6fc00_df5e_11ee_a506_0050569c1234);

/// Characteristic carrying telemetry notifications.
pub const CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0xa0e6fc01_df5e_11ee_a506_0050569c1234);

/// Standard client characteristic configuration descriptor.
pub const CCCD_UUID: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

pub fn retry_backoff() -> Duration {
    Duration::from_millis(RETRY_BACKOFF_MS)
}

pub fn connection_timeout() -> Duration {
    Duration::from_millis(CONNECTION_TIMEOUT_MS)
}

pub fn data_stale() -> Duration {
    Duration::from_millis(DATA_STALE_MS)
}

pub fn connect_settle() -> Duration {
    Duration::from_millis(CONNECT_SETTLE_MS)
}
