//! 守卫：对拟议标记值的命名验证谓词.
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GuardError {
    #[error("marking {value} violates guard: {assertion}")]
    Violation { assertion: String, value: f64 },
    #[error("place {place}: marking {value} violates guard: {assertion}")]
    PlaceViolation {
        place: String,
        assertion: String,
        value: f64,
    },
    /// 多库所违规的汇总，见 [`Net::check_domain_guards`](crate::net::Net::check_domain_guards).
    #[error("guard violations: {details}")]
    Violations { details: String },
}

impl GuardError {
    /// 附加违规库所名；已定位的错误原样返回.
    pub fn at_place(self, place: &str) -> GuardError {
        match self {
            GuardError::Violation { assertion, value } => GuardError::PlaceViolation {
                place: place.to_string(),
                assertion,
                value,
            },
            located => located,
        }
    }
}

/// A named predicate over a prospective marking value. A place's effective
/// guard is the conjunction of all its registered guards; see [`check_all`].
#[derive(Clone)]
pub struct Guard {
    assertion: String,
    test: Rc<dyn Fn(f64) -> bool>,
}

impl Guard {
    pub fn new(assertion: impl Into<String>, test: impl Fn(f64) -> bool + 'static) -> Self {
        Self {
            assertion: assertion.into(),
            test: Rc::new(test),
        }
    }

    /// 缺省守卫：标记必须是有限实数（拒绝 NaN 与 ±∞）.
    pub fn finite() -> Self {
        Self::new("marking must be a finite number", f64::is_finite)
    }

    pub fn non_negative() -> Self {
        Self::new("marking must be non-negative", |m| m >= 0.0)
    }

    pub fn integer_valued() -> Self {
        Self::new("marking must be integer-valued", |m| m.fract() == 0.0)
    }

    pub fn assertion(&self) -> &str {
        &self.assertion
    }

    pub fn admits(&self, value: f64) -> bool {
        (self.test)(value)
    }

    pub fn check(&self, value: f64) -> Result<(), GuardError> {
        if self.admits(value) {
            Ok(())
        } else {
            Err(GuardError::Violation {
                assertion: self.assertion.clone(),
                value,
            })
        }
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard")
            .field("assertion", &self.assertion)
            .finish()
    }
}

/// Conjunction over a guard set; the first failing guard is reported.
pub fn check_all(guards: &[Guard], value: f64) -> Result<(), GuardError> {
    for guard in guards {
        guard.check(value)?;
    }
    Ok(())
}
