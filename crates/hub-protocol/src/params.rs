//! Per-action numeric parameter bounds (§4.2a), generalized from
//! `ProjectorCommandParams.validate_adjustment_value` in the original
//! `lab_orchestrator` service: a keystone adjustment (`H-KEYSTONE`/
//! `V-KEYSTONE`) must fall in `[-40, 40]`, an image-shift adjustment
//! (`H-IMAGE-SHIFT`/`V-IMAGE-SHIFT`) in `[-100, 100]`. The spec keeps
//! actions and their parameter shapes generic, so this crate exposes the
//! bound as a small reusable type rather than hard-coding projector field
//! names; callers register bounds per action/param-key pair.

use std::collections::HashMap;

use crate::validate::ValidationError;

/// An inclusive numeric bound a command param value must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamBound {
    pub min: i64,
    pub max: i64,
}

impl ParamBound {
    pub const fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    pub fn check(&self, field: &'static str, value: i64) -> Result<(), ValidationError> {
        if value < self.min || value > self.max {
            return Err(ValidationError::Field {
                field,
                reason: format!("{value} out of bounds [{}, {}]", self.min, self.max),
            });
        }
        Ok(())
    }
}

/// Keystone adjustments: `±40` inclusive.
pub const KEYSTONE_BOUND: ParamBound = ParamBound::new(-40, 40);
/// Image-shift adjustments: `±100` inclusive.
pub const IMAGE_SHIFT_BOUND: ParamBound = ParamBound::new(-100, 100);

/// A table of `param_key -> ParamBound` an action's params must satisfy,
/// keyed by the `adjustment` discriminator the original schema used
/// (`H-KEYSTONE`, `V-IMAGE-SHIFT`, ...). Actions with no registered bound are
/// left unconstrained, per §4.2a's "defaulting to unbounded" note.
#[derive(Debug, Clone, Default)]
pub struct ParamBoundTable {
    bounds: HashMap<&'static str, ParamBound>,
}

impl ParamBoundTable {
    pub fn new() -> Self {
        Self { bounds: HashMap::new() }
    }

    /// The original projector's four adjustment kinds, pre-registered.
    pub fn projector_defaults() -> Self {
        let mut table = Self::new();
        table.insert("H-KEYSTONE", KEYSTONE_BOUND);
        table.insert("V-KEYSTONE", KEYSTONE_BOUND);
        table.insert("H-IMAGE-SHIFT", IMAGE_SHIFT_BOUND);
        table.insert("V-IMAGE-SHIFT", IMAGE_SHIFT_BOUND);
        table
    }

    pub fn insert(&mut self, adjustment: &'static str, bound: ParamBound) -> &mut Self {
        self.bounds.insert(adjustment, bound);
        self
    }

    /// Validates `value` against the bound registered for `adjustment`, if
    /// any. An unregistered adjustment is unbounded and always passes.
    pub fn check(&self, adjustment: &str, value: i64) -> Result<(), ValidationError> {
        match self.bounds.get(adjustment) {
            Some(bound) => bound.check("value", value),
            None => Ok(()),
        }
    }

    /// Convenience for command params shaped like the projector module's:
    /// `{"adjustment": "H-KEYSTONE", "value": 41}`. Missing `adjustment` or
    /// non-integer `value` is not this validator's concern (that belongs to
    /// module-specific schemas above this crate) and passes through.
    pub fn check_params(&self, params: &serde_json::Value) -> Result<(), ValidationError> {
        let Some(adjustment) = params.get("adjustment").and_then(|v| v.as_str()) else {
            return Ok(());
        };
        let Some(value) = params.get("value").and_then(|v| v.as_i64()) else {
            return Ok(());
        };
        self.check(adjustment, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keystone_accepts_boundary_and_rejects_one_past_it() {
        let table = ParamBoundTable::projector_defaults();
        assert!(table.check("H-KEYSTONE", 40).is_ok());
        assert!(table.check("H-KEYSTONE", -40).is_ok());
        assert!(table.check("H-KEYSTONE", 41).is_err());
        assert!(table.check("H-KEYSTONE", -41).is_err());
    }

    #[test]
    fn image_shift_accepts_boundary_and_rejects_one_past_it() {
        let table = ParamBoundTable::projector_defaults();
        assert!(table.check("V-IMAGE-SHIFT", 100).is_ok());
        assert!(table.check("V-IMAGE-SHIFT", -100).is_ok());
        assert!(table.check("V-IMAGE-SHIFT", 101).is_err());
    }

    #[test]
    fn unregistered_adjustment_is_unbounded() {
        let table = ParamBoundTable::projector_defaults();
        assert!(table.check("UNKNOWN", i64::MAX).is_ok());
    }

    #[test]
    fn check_params_reads_adjustment_and_value_from_json() {
        let table = ParamBoundTable::projector_defaults();
        assert!(table.check_params(&serde_json::json!({"adjustment": "H-KEYSTONE", "value": 41})).is_err());
        assert!(table.check_params(&serde_json::json!({"adjustment": "H-KEYSTONE", "value": 40})).is_ok());
        assert!(table.check_params(&serde_json::json!({"command": "raw"})).is_ok());
    }
}
