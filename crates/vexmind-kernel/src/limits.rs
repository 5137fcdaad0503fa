//! [`MotionLimits`] – physical actuation envelope for timed motion commands.
//!
//! Unlike a rejecting rule, the limits are applied as a *clamp*: values below
//! the floor are raised to the floor, values above the ceiling are lowered to
//! the ceiling.  [`MotionLimits::check`] is the strict counterpart used once
//! the clamped command has been rendered back to text.

use crate::grammar::GrammarError;

/// Duration appended to a motion command that names a direction and a
/// velocity but no duration.
pub const DEFAULT_DURATION_SECS: f64 = 1.0;

/// Inclusive velocity / duration bounds for `vex robot move`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionLimits {
    pub min_velocity: u16,
    pub max_velocity: u16,
    /// Seconds.
    pub min_duration: f64,
    /// Seconds.
    pub max_duration: f64,
}

impl Default for MotionLimits {
    fn default() -> Self {
        Self {
            min_velocity: 10,
            max_velocity: 188,
            min_duration: 0.5,
            max_duration: 3.0,
        }
    }
}

impl MotionLimits {
    /// Clamp a requested `(velocity, duration)` pair into the envelope.
    ///
    /// `v' = clamp(v, min_velocity, max_velocity)` and
    /// `d' = clamp(d, min_duration, max_duration)`.
    pub fn clamp(&self, velocity: u32, duration: f64) -> (u16, f64) {
        let v = velocity.clamp(
            u32::from(self.min_velocity),
            u32::from(self.max_velocity),
        );
        let d = duration.clamp(self.min_duration, self.max_duration);
        // `v` is bounded by a u16 ceiling.
        (v as u16, d)
    }

    /// Strict range check; no adjustment.
    pub fn check(&self, velocity: u32, duration: f64) -> Result<(), GrammarError> {
        if velocity < u32::from(self.min_velocity) || velocity > u32::from(self.max_velocity) {
            return Err(GrammarError::OutOfRange {
                field: "velocity",
                value: velocity.to_string(),
            });
        }
        if !(self.min_duration..=self.max_duration).contains(&duration) {
            return Err(GrammarError::OutOfRange {
                field: "duration",
                value: duration.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_inside_envelope_are_unchanged() {
        let limits = MotionLimits::default();
        assert_eq!(limits.clamp(50, 2.0), (50, 2.0));
        assert_eq!(limits.clamp(10, 0.5), (10, 0.5));
        assert_eq!(limits.clamp(188, 3.0), (188, 3.0));
    }

    #[test]
    fn values_below_floor_are_raised() {
        let limits = MotionLimits::default();
        assert_eq!(limits.clamp(5, 0.1), (10, 0.5));
        assert_eq!(limits.clamp(0, 0.0), (10, 0.5));
    }

    #[test]
    fn values_above_ceiling_are_lowered() {
        let limits = MotionLimits::default();
        assert_eq!(limits.clamp(250, 10.0), (188, 3.0));
        assert_eq!(limits.clamp(u32::MAX, f64::MAX), (188, 3.0));
    }

    #[test]
    fn clamp_law_holds_across_samples() {
        let limits = MotionLimits::default();
        for v in [0u32, 9, 10, 11, 100, 187, 188, 189, 1000] {
            for d in [0.0f64, 0.49, 0.5, 1.0, 2.99, 3.0, 3.01, 60.0] {
                let (v2, d2) = limits.clamp(v, d);
                assert_eq!(u32::from(v2), v.clamp(10, 188));
                assert_eq!(d2, d.clamp(0.5, 3.0));
                assert!(limits.check(u32::from(v2), d2).is_ok());
            }
        }
    }

    #[test]
    fn check_rejects_out_of_range() {
        let limits = MotionLimits::default();
        assert!(matches!(
            limits.check(9, 1.0),
            Err(GrammarError::OutOfRange { field: "velocity", .. })
        ));
        assert!(matches!(
            limits.check(50, 3.5),
            Err(GrammarError::OutOfRange { field: "duration", .. })
        ));
    }
}
