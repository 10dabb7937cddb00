use super::transitions::{ensure_editable, LifecycleController};
use crate::controller::error::EngineError;
use crate::model::{Audience, Experiment, MAX_TEST_SHARE, MIN_TEST_SHARE};
use tracing::warn;

/// Parsed form of a user-entered percentage
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShareInput {
    /// Empty field: the explicit clear path
    Cleared,
    /// A finite percentage (e.g. 10.0 for "10")
    Percent(f64),
    /// Non-empty input that is not a finite number
    Invalid,
}

/// Parse a percentage string as typed into the share field
///
/// Surrounding whitespace and a trailing '%' are ignored.
pub fn parse_share_input(raw: &str) -> ShareInput {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix('%').unwrap_or(trimmed).trim_end();
    if trimmed.is_empty() {
        return ShareInput::Cleared;
    }
    match trimmed.parse::<f64>() {
        Ok(percent) if percent.is_finite() => ShareInput::Percent(percent),
        _ => ShareInput::Invalid,
    }
}

/// Clamp a fraction into [0.01, 1.0]
///
/// NaN clamps to the floor.
pub fn clamp_share(fraction: f64) -> f64 {
    if fraction.is_nan() {
        return MIN_TEST_SHARE;
    }
    fraction.clamp(MIN_TEST_SHARE, MAX_TEST_SHARE)
}

/// Convert raw input to the stored fraction
///
/// Cleared input yields 0; every other input lands in [0.01, 1.0].
pub fn share_from_input(raw: &str) -> f64 {
    match parse_share_input(raw) {
        ShareInput::Cleared => 0.0,
        ShareInput::Percent(percent) => clamp_share(percent / 100.0),
        ShareInput::Invalid => MIN_TEST_SHARE,
    }
}

/// Render a stored fraction as the share field's text
///
/// A cleared share (0) renders as an empty field, never "0".
pub fn display_share(fraction: f64) -> String {
    if fraction <= 0.0 || fraction.is_nan() {
        return String::new();
    }
    let percent = (fraction * 100.0 * 100.0).round() / 100.0;
    if percent.fract() == 0.0 {
        format!("{}", percent as i64)
    } else {
        format!("{}", percent)
    }
}

/// Normalize an audience loaded from storage
///
/// Forces the test reference onto the base (control) segment and re-clamps
/// the share, keeping an explicitly cleared share at 0. Returns true when
/// something changed.
pub fn normalize_audience(audience: &mut Audience) -> bool {
    let mut changed = false;

    if audience.test != audience.control {
        audience.test = audience.control.clone();
        changed = true;
    }

    let share = audience.test_share;
    let normalized = if share == 0.0 { 0.0 } else { clamp_share(share) };
    if normalized != share {
        audience.test_share = normalized;
        changed = true;
    }

    changed
}

impl LifecycleController {
    /// Set the base segment both arms are carved from
    pub fn set_base_segment(
        &self,
        experiment: &mut Experiment,
        segment_id: &str,
    ) -> Result<(), EngineError> {
        ensure_editable(experiment, "change audience")?;
        let segment_id = segment_id.trim();
        if segment_id.is_empty() {
            return Err(EngineError::validation("base segment id is empty"));
        }

        let share = experiment.audience.test_share;
        experiment.audience = Audience::new(segment_id, share);
        Ok(())
    }

    /// Set the test share from a user-entered percentage ("10" means 10%)
    ///
    /// Empty input clears the share to 0. Non-numeric input is logged and
    /// clamps to the 1% floor. Returns the stored fraction.
    pub fn set_share(&self, experiment: &mut Experiment, raw: &str) -> Result<f64, EngineError> {
        ensure_editable(experiment, "change test share")?;

        let input = parse_share_input(raw);
        if input == ShareInput::Invalid {
            warn!(
                experiment = %experiment.id,
                raw = %raw,
                "Non-numeric test share, clamping to the 1% floor"
            );
        }

        let fraction = share_from_input(raw);
        experiment.audience.test_share = fraction;
        Ok(fraction)
    }

    /// Clear the test share (explicit clear path, stores 0)
    pub fn clear_share(&self, experiment: &mut Experiment) -> Result<(), EngineError> {
        ensure_editable(experiment, "change test share")?;
        experiment.audience.test_share = 0.0;
        Ok(())
    }
}
