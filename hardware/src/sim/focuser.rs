use tracing::debug;

use super::{lock, SharedMechanism};
use crate::{DeviceError, DeviceResult, FocuserInterface};

/// Simulated focuser with backlash and travel limits.
///
/// Moves that end in negative travel leave the mechanism `backlash` ticks
/// short of the commanded position, so [`position`](FocuserInterface::position)
/// reports something other than what was commanded.
pub struct SimFocuser {
    id: String,
    mechanism: SharedMechanism,
    backlash: i64,
    travel: (i64, i64),
}

impl SimFocuser {
    pub(super) fn new(
        id: String,
        mechanism: SharedMechanism,
        backlash: i64,
        travel: (i64, i64),
    ) -> Self {
        Self {
            id,
            mechanism,
            backlash,
            travel,
        }
    }

    /// Currently commanded baseline (absolute ticks)
    pub fn baseline(&self) -> DeviceResult<i64> {
        Ok(lock(&self.mechanism)?.baseline)
    }

    /// Currently commanded offset (ticks)
    pub fn offset(&self) -> DeviceResult<i64> {
        Ok(lock(&self.mechanism)?.offset)
    }

    fn drive(&mut self, baseline: i64, offset: i64) -> DeviceResult<()> {
        let target = baseline.checked_add(offset).ok_or_else(|| DeviceError::Actuation {
            device: self.id.clone(),
            message: format!("target overflow: {baseline} + {offset}"),
        })?;

        let (min, max) = self.travel;
        if target < min || target > max {
            return Err(DeviceError::OutOfRange {
                device: self.id.clone(),
                requested: target,
                min,
                max,
            });
        }

        let mut mech = lock(&self.mechanism)?;
        let previous_target = mech.baseline + mech.offset;
        let direction = (target - previous_target).signum();
        if direction != 0 {
            mech.direction = direction;
        }

        mech.baseline = baseline;
        mech.offset = offset;
        mech.position = if mech.direction < 0 {
            target + self.backlash
        } else {
            target
        };
        debug!(
            "{}: target {} -> actual {}",
            self.id, target, mech.position
        );
        Ok(())
    }
}

impl FocuserInterface for SimFocuser {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_offset(&mut self, ticks: i64) -> DeviceResult<()> {
        let baseline = lock(&self.mechanism)?.baseline;
        self.drive(baseline, ticks)
    }

    fn set_absolute(&mut self, ticks: i64) -> DeviceResult<()> {
        let offset = lock(&self.mechanism)?.offset;
        self.drive(ticks, offset)
    }

    fn position(&mut self) -> DeviceResult<i64> {
        Ok(lock(&self.mechanism)?.position)
    }
}

#[cfg(test)]
mod tests {
    use crate::sim::{sim_rig, SimOptics, SimRigOptions};
    use crate::{DeviceError, FocuserInterface};

    fn rig(backlash: i64) -> crate::sim::SimFocuser {
        let options = SimRigOptions {
            backlash,
            travel: (-1000, 1000),
            ..Default::default()
        };
        sim_rig(SimOptics::default(), options).0
    }

    #[test]
    fn test_offset_adds_to_baseline() {
        let mut focuser = rig(0);
        focuser.set_absolute(100).unwrap();
        focuser.set_offset(-30).unwrap();
        assert_eq!(focuser.position().unwrap(), 70);
        assert_eq!(focuser.baseline().unwrap(), 100);
        assert_eq!(focuser.offset().unwrap(), -30);
    }

    #[test]
    fn test_backlash_on_negative_moves() {
        let mut focuser = rig(3);
        focuser.set_offset(50).unwrap();
        assert_eq!(focuser.position().unwrap(), 50);

        focuser.set_offset(20).unwrap();
        assert_eq!(focuser.position().unwrap(), 23);

        // Repeating the same command does not change direction
        focuser.set_offset(20).unwrap();
        assert_eq!(focuser.position().unwrap(), 23);

        focuser.set_offset(40).unwrap();
        assert_eq!(focuser.position().unwrap(), 40);
    }

    #[test]
    fn test_travel_limits() {
        let mut focuser = rig(0);
        let err = focuser.set_absolute(5000).unwrap_err();
        assert!(matches!(
            err,
            DeviceError::OutOfRange {
                requested: 5000,
                ..
            }
        ));
        assert!(err.is_actuation());
        // Rejected moves leave the mechanism untouched
        assert_eq!(focuser.position().unwrap(), 0);
    }
}
