//! Scripted focuser and camera sharing one event log

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use autofocus::{MeasurementError, ScanConfig, StarMeasurement};
use hardware::{DeviceError, DeviceResult, ExposureInterface, FocuserInterface, ShutterMode};

/// Device calls in the order they happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    SetOffset(i64),
    SetAbsolute(i64),
    Position(i64),
    /// Integration started at this actual position
    ExposureStart(i64),
    ExposureEnd,
}

#[derive(Debug, Default)]
pub struct Rig {
    pub baseline: i64,
    pub offset: i64,
    /// Added to every commanded position, e.g. an uncorrected backlash
    pub skew: i64,
    pub events: Vec<Event>,
    /// Actuation number (0-based) that fails
    pub fail_actuation: Option<usize>,
    actuations: usize,
}

impl Rig {
    pub fn actual_position(&self) -> i64 {
        self.baseline + self.offset + self.skew
    }

    fn actuate(&mut self) -> DeviceResult<()> {
        let n = self.actuations;
        self.actuations += 1;
        if self.fail_actuation == Some(n) {
            return Err(DeviceError::Actuation {
                device: "F0".to_string(),
                message: "motor stalled".to_string(),
            });
        }
        Ok(())
    }
}

pub type SharedRig = Rc<RefCell<Rig>>;

pub struct ScriptedFocuser {
    rig: SharedRig,
}

impl FocuserInterface for ScriptedFocuser {
    fn id(&self) -> &str {
        "F0"
    }

    fn set_offset(&mut self, ticks: i64) -> DeviceResult<()> {
        let mut rig = self.rig.borrow_mut();
        rig.actuate()?;
        rig.offset = ticks;
        rig.events.push(Event::SetOffset(ticks));
        Ok(())
    }

    fn set_absolute(&mut self, ticks: i64) -> DeviceResult<()> {
        let mut rig = self.rig.borrow_mut();
        rig.actuate()?;
        rig.baseline = ticks;
        rig.events.push(Event::SetAbsolute(ticks));
        Ok(())
    }

    fn position(&mut self) -> DeviceResult<i64> {
        let mut rig = self.rig.borrow_mut();
        let position = rig.actual_position();
        rig.events.push(Event::Position(position));
        Ok(position)
    }
}

/// Frame carrying the actual position during integration
#[derive(Debug, Clone, Copy)]
pub struct ScriptedFrame {
    pub index: usize,
    pub position: i64,
}

pub struct ScriptedCamera {
    rig: SharedRig,
    exposures: usize,
}

impl ScriptedCamera {
    pub fn exposures(&self) -> usize {
        self.exposures
    }
}

impl ExposureInterface for ScriptedCamera {
    type Frame = ScriptedFrame;

    fn take_exposure(
        &mut self,
        _duration: Duration,
        _shutter: ShutterMode,
        on_dead_time: &mut dyn FnMut() -> DeviceResult<()>,
    ) -> DeviceResult<ScriptedFrame> {
        let position = {
            let mut rig = self.rig.borrow_mut();
            let position = rig.actual_position();
            rig.events.push(Event::ExposureStart(position));
            position
        };

        on_dead_time()?;

        self.rig.borrow_mut().events.push(Event::ExposureEnd);
        let frame = ScriptedFrame {
            index: self.exposures,
            position,
        };
        self.exposures += 1;
        Ok(frame)
    }
}

pub fn scripted_rig() -> (ScriptedFocuser, ScriptedCamera, SharedRig) {
    let rig: SharedRig = Rc::new(RefCell::new(Rig::default()));
    let focuser = ScriptedFocuser { rig: rig.clone() };
    let camera = ScriptedCamera {
        rig: rig.clone(),
        exposures: 0,
    };
    (focuser, camera, rig)
}

/// Measurement reporting `profile(position)` with plenty of stars
pub fn profile_measurement(
    profile: impl Fn(i64) -> f64,
) -> impl Fn(&ScriptedFrame, u32) -> Result<StarMeasurement, MeasurementError> {
    move |frame: &ScriptedFrame, _min_stars: u32| -> Result<StarMeasurement, MeasurementError> {
        Ok(StarMeasurement {
            fwhm: profile(frame.position),
            star_count: 40,
        })
    }
}

/// Five exposures one tick apart, threshold 5 ticks
pub fn small_scan_config() -> ScanConfig {
    ScanConfig {
        exposure_time_s: 0.1,
        step_size: 1,
        attempt_count: 5,
        ..Default::default()
    }
}
