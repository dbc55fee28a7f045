//! Channel-width schedules for encoder and decoder stacks.
//!
//! A schedule is the per-layer sequence of output-channel widths: encoders
//! progressively double the width up to a ceiling, decoders progressively
//! halve it down to a floor, both on a fixed layer cadence. Successive values
//! differ by at most a factor of two.

use crate::error::{NeuralError, Result};

fn check_cadence(step_cadence: usize) -> Result<()> {
    if step_cadence == 0 {
        return Err(NeuralError::invalid_configuration(
            "schedule step cadence must be at least 1",
        ));
    }
    Ok(())
}

/// Growing schedule for encoders.
///
/// Starting from `start_width`, the width doubles at every `step_cadence`-th
/// layer after the first while it has not passed `max_width * 2`. The first
/// layer always keeps `start_width`.
///
/// A `max_width` at or below `start_width` yields a constant schedule rather
/// than an error; the bounds are advisory clamps, not validation.
pub fn growing(
    num_layers: usize,
    start_width: usize,
    step_cadence: usize,
    max_width: usize,
) -> Result<Vec<usize>> {
    check_cadence(step_cadence)?;
    let mut widths = Vec::with_capacity(num_layers);
    let mut width = start_width;
    for nl in 0..num_layers {
        if nl >= 1 && nl % step_cadence == 0 && width <= max_width * 2 {
            width *= 2;
        }
        widths.push(width);
    }
    Ok(widths)
}

/// Shrinking schedule for decoders.
///
/// Starting from `start_width`, the width halves at every `step_cadence`-th
/// layer while the halved value stays at or above `min_width`. Unlike
/// [`growing`], the very first layer is eligible for the step.
pub fn shrinking(
    num_layers: usize,
    start_width: usize,
    step_cadence: usize,
    min_width: usize,
) -> Result<Vec<usize>> {
    check_cadence(step_cadence)?;
    let mut widths = Vec::with_capacity(num_layers);
    let mut width = start_width;
    for nl in 0..num_layers {
        if nl % step_cadence == 0 && width / 2 >= min_width {
            width /= 2;
        }
        widths.push(width);
    }
    Ok(widths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growing_doubles_on_cadence() {
        let widths = growing(5, 8, 1, 128).unwrap();
        assert_eq!(widths, vec![8, 16, 32, 64, 128]);
    }

    #[test]
    fn growing_respects_ceiling() {
        let widths = growing(6, 8, 1, 16).unwrap();
        // Doubling stops once the width passes twice the bound.
        assert_eq!(widths, vec![8, 16, 32, 64, 64, 64]);
    }

    #[test]
    fn growing_holds_between_steps() {
        let widths = growing(6, 8, 2, 128).unwrap();
        assert_eq!(widths, vec![8, 8, 16, 16, 32, 32]);
    }

    #[test]
    fn shrinking_halves_immediately() {
        // The first layer is eligible, unlike the growing schedule.
        let widths = shrinking(4, 256, 1, 8).unwrap();
        assert_eq!(widths, vec![128, 64, 32, 16]);
    }

    #[test]
    fn shrinking_is_monotone_and_power_of_two() {
        for num_layers in 1..12 {
            let widths = shrinking(num_layers, 256, 1, 8).unwrap();
            for pair in widths.windows(2) {
                assert!(pair[1] <= pair[0]);
            }
            for &w in &widths {
                assert!(w >= 8);
                assert!(256 % w == 0, "width {w} is not a power-of-two fraction of 256");
            }
        }
    }

    #[test]
    fn shrinking_floors_at_min_width() {
        let widths = shrinking(8, 64, 1, 8).unwrap();
        assert_eq!(&widths[3..], &[8, 8, 8, 8, 8]);
    }

    #[test]
    fn constant_schedule_when_floor_meets_start() {
        // min_width >= start_width silently yields a constant schedule.
        let widths = shrinking(4, 8, 1, 8).unwrap();
        assert_eq!(widths, vec![8, 8, 8, 8]);
    }

    #[test]
    fn grow_then_shrink_round_trips() {
        let up = growing(4, 16, 1, 256).unwrap();
        let top = *up.last().unwrap();
        // With the floor set to the original start width, shrinking walks the
        // growing schedule back down to where it began.
        let down = shrinking(4, top, 1, 16).unwrap();
        assert_eq!(up.first(), Some(&16));
        assert_eq!(down.last(), Some(&16));
    }

    #[test]
    fn zero_cadence_is_rejected() {
        assert!(growing(3, 8, 0, 128).is_err());
        assert!(shrinking(3, 64, 0, 8).is_err());
    }
}
