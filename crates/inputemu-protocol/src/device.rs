//! # Device Types
//!
//! Device-level values carried inside request and reply payloads.

use crate::codec::WireError;
use serde::{Deserialize, Serialize};

/// Kind of tracked device, as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum DeviceClass {
    Invalid,
    Hmd,
    Controller,
    GenericTracker,
    TrackingReference,
    DisplayRedirect,
    Other(u32),
}

impl From<u32> for DeviceClass {
    fn from(code: u32) -> Self {
        match code {
            0 => DeviceClass::Invalid,
            1 => DeviceClass::Hmd,
            2 => DeviceClass::Controller,
            3 => DeviceClass::GenericTracker,
            4 => DeviceClass::TrackingReference,
            5 => DeviceClass::DisplayRedirect,
            other => DeviceClass::Other(other),
        }
    }
}

impl From<DeviceClass> for u32 {
    fn from(class: DeviceClass) -> Self {
        match class {
            DeviceClass::Invalid => 0,
            DeviceClass::Hmd => 1,
            DeviceClass::Controller => 2,
            DeviceClass::GenericTracker => 3,
            DeviceClass::TrackingReference => 4,
            DeviceClass::DisplayRedirect => 5,
            DeviceClass::Other(code) => code,
        }
    }
}

/// Answer to a device info query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_id: u32,
    pub device_class: DeviceClass,
    /// Driver-side manipulation mode of the device.
    pub device_mode: i32,
    /// Reference device used for motion compensation, if any.
    pub ref_device_id: u32,
}

/// How velocity and acceleration are compensated while motion compensation
/// is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum MotionCompensationVelAccMode {
    Disabled,
    SetZero,
    SubstractMotionRef,
    KalmanFilter,
    LinearApproximation,
}

impl TryFrom<u32> for MotionCompensationVelAccMode {
    type Error = WireError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Disabled),
            1 => Ok(Self::SetZero),
            2 => Ok(Self::SubstractMotionRef),
            3 => Ok(Self::KalmanFilter),
            4 => Ok(Self::LinearApproximation),
            other => Err(WireError::UnknownVelAccMode(other)),
        }
    }
}

impl From<MotionCompensationVelAccMode> for u32 {
    fn from(mode: MotionCompensationVelAccMode) -> Self {
        match mode {
            MotionCompensationVelAccMode::Disabled => 0,
            MotionCompensationVelAccMode::SetZero => 1,
            MotionCompensationVelAccMode::SubstractMotionRef => 2,
            MotionCompensationVelAccMode::KalmanFilter => 3,
            MotionCompensationVelAccMode::LinearApproximation => 4,
        }
    }
}

/// Global motion compensation settings. Only the properties that are set are
/// applied by the driver; the rest keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionCompensationProperties {
    pub vel_acc_mode: Option<MotionCompensationVelAccMode>,
    pub kalman_process_noise: Option<f64>,
    pub kalman_observation_noise: Option<f64>,
    pub moving_average_window: Option<u32>,
}

impl MotionCompensationProperties {
    pub fn with_vel_acc_mode(mode: MotionCompensationVelAccMode) -> Self {
        Self {
            vel_acc_mode: Some(mode),
            ..Self::default()
        }
    }

    pub fn with_kalman_process_noise(variance: f64) -> Self {
        Self {
            kalman_process_noise: Some(variance),
            ..Self::default()
        }
    }

    pub fn with_kalman_observation_noise(variance: f64) -> Self {
        Self {
            kalman_observation_noise: Some(variance),
            ..Self::default()
        }
    }

    pub fn with_moving_average_window(window: u32) -> Self {
        Self {
            moving_average_window: Some(window),
            ..Self::default()
        }
    }

    /// True when no property would be changed.
    pub fn is_empty(&self) -> bool {
        self.vel_acc_mode.is_none()
            && self.kalman_process_noise.is_none()
            && self.kalman_observation_noise.is_none()
            && self.moving_average_window.is_none()
    }
}
