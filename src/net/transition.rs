//! 迁移：六类基本迁移加赋值迁移的分类、构造与机关状态机.
//!
//! 分类由三个布尔特征决定：计量的（S/s）、带速率的（R/r）、时间的（T/t），
//! 合法组合 `ts`、`tS`、`Tsr`、`TSr`、`sR`、`SR` 以及正交的赋值类 `A`。
//! 每类迁移的计算闭包形状由对应的 [`Kernel`] 变体在编译期固定，
//! 调用方在构造时指名类别，不存在参数个数推断。
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::net::ids::PlaceId;

pub type ScalarFn = Rc<dyn Fn(&[f64]) -> f64>;
pub type VectorFn = Rc<dyn Fn(&[f64]) -> Vec<f64>>;
pub type TimedScalarFn = Rc<dyn Fn(f64, &[f64]) -> f64>;
pub type TimedVectorFn = Rc<dyn Fn(f64, &[f64]) -> Vec<f64>>;

/// Per-category compute closure. The argument slice is the domain marking in
/// domain order; timed variants additionally receive `Δt`.
#[derive(Clone)]
pub enum Kernel {
    /// `ts` — 无时间、非计量：逐写集库所返回增量.
    TimelessVec(VectorFn),
    /// `tS` — 无时间、计量：标量结果乘计量向量.
    TimelessScalar(ScalarFn),
    /// `Tsr` — 时间、无速率、非计量：`f(Δt, dom)` 逐写集库所返回增量.
    TimedVec(TimedVectorFn),
    /// `TSr` — 时间、无速率、计量：`f(Δt, dom)` 标量乘计量向量.
    TimedScalar(TimedScalarFn),
    /// `sR` — 带速率、非计量：逐写集库所返回速率，动作为 `rate · Δt`.
    RateVec(VectorFn),
    /// `SR` — 带速率、计量：标量流率，动作为 `flux · Δt` 乘计量向量.
    RateScalar(ScalarFn),
    /// `A` — 赋值：结果*替换*写集标记.
    Assignment(VectorFn),
}

impl Kernel {
    pub fn kind(&self) -> TransitionKind {
        match self {
            Kernel::TimelessVec(_) => TransitionKind::TimelessNonstoichiometric,
            Kernel::TimelessScalar(_) => TransitionKind::TimelessStoichiometric,
            Kernel::TimedVec(_) => TransitionKind::TimedRatelessNonstoichiometric,
            Kernel::TimedScalar(_) => TransitionKind::TimedRatelessStoichiometric,
            Kernel::RateVec(_) => TransitionKind::NonstoichiometricWithRate,
            Kernel::RateScalar(_) => TransitionKind::StoichiometricWithRate,
            Kernel::Assignment(_) => TransitionKind::Assignment,
        }
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Kernel({})", self.kind().code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    /// `ts`
    TimelessNonstoichiometric,
    /// `tS`
    TimelessStoichiometric,
    /// `Tsr`
    TimedRatelessNonstoichiometric,
    /// `TSr`
    TimedRatelessStoichiometric,
    /// `sR`
    NonstoichiometricWithRate,
    /// `SR`
    StoichiometricWithRate,
    /// `A`
    Assignment,
}

impl TransitionKind {
    /// 速率蕴含时间性：`has_rate ⇒ timed`.
    pub fn timed(self) -> bool {
        matches!(
            self,
            TransitionKind::TimedRatelessNonstoichiometric
                | TransitionKind::TimedRatelessStoichiometric
                | TransitionKind::NonstoichiometricWithRate
                | TransitionKind::StoichiometricWithRate
        )
    }

    pub fn has_rate(self) -> bool {
        matches!(
            self,
            TransitionKind::NonstoichiometricWithRate | TransitionKind::StoichiometricWithRate
        )
    }

    pub fn stoichiometric(self) -> bool {
        matches!(
            self,
            TransitionKind::TimelessStoichiometric
                | TransitionKind::TimedRatelessStoichiometric
                | TransitionKind::StoichiometricWithRate
        )
    }

    pub fn assignment(self) -> bool {
        matches!(self, TransitionKind::Assignment)
    }

    pub fn code(self) -> &'static str {
        match self {
            TransitionKind::TimelessNonstoichiometric => "ts",
            TransitionKind::TimelessStoichiometric => "tS",
            TransitionKind::TimedRatelessNonstoichiometric => "Tsr",
            TransitionKind::TimedRatelessStoichiometric => "TSr",
            TransitionKind::NonstoichiometricWithRate => "sR",
            TransitionKind::StoichiometricWithRate => "SR",
            TransitionKind::Assignment => "A",
        }
    }
}

/// 软发生的两态机关：上膛后发生一次即消耗.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cocking {
    #[default]
    Uncocked,
    Cocked,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConstructionError {
    #[error("transition {0}: codomain must not be empty")]
    EmptyCodomain(String),
    #[error("transition {name}: place {place} occurs twice in the domain")]
    DuplicateDomainPlace { name: String, place: PlaceId },
    #[error("transition {name}: place {place} occurs twice in the codomain")]
    DuplicateCodomainPlace { name: String, place: PlaceId },
}

/// A rule moving (or, for assignments, replacing) marking across places.
///
/// `domain` is the ordered read set, `codomain` the ordered write set;
/// stoichiometric categories align one coefficient per codomain place, an
/// invariant the constructors make structural by taking `(PlaceId, f64)`
/// pairs.
#[derive(Clone)]
pub struct Transition {
    name: String,
    domain: Vec<PlaceId>,
    codomain: Vec<PlaceId>,
    stoichiometry: Option<Vec<f64>>,
    kernel: Kernel,
    cocked: Cocking,
}

impl Transition {
    fn build(
        name: String,
        domain: Vec<PlaceId>,
        codomain: Vec<PlaceId>,
        stoichiometry: Option<Vec<f64>>,
        kernel: Kernel,
    ) -> Result<Self, ConstructionError> {
        if codomain.is_empty() {
            return Err(ConstructionError::EmptyCodomain(name));
        }
        if let Some(place) = first_duplicate(&domain) {
            return Err(ConstructionError::DuplicateDomainPlace { name, place });
        }
        if let Some(place) = first_duplicate(&codomain) {
            return Err(ConstructionError::DuplicateCodomainPlace { name, place });
        }
        debug_assert!(
            stoichiometry.as_ref().is_none_or(|s| s.len() == codomain.len()),
            "stoichiometry length must equal codomain length"
        );
        Ok(Self {
            name,
            domain,
            codomain,
            stoichiometry,
            kernel,
            cocked: Cocking::Uncocked,
        })
    }

    /// `ts`：无时间、非计量，动作逐写集库所返回增量.
    pub fn timeless(
        name: impl Into<String>,
        domain: &[PlaceId],
        codomain: &[PlaceId],
        action: impl Fn(&[f64]) -> Vec<f64> + 'static,
    ) -> Result<Self, ConstructionError> {
        Self::build(
            name.into(),
            domain.to_vec(),
            codomain.to_vec(),
            None,
            Kernel::TimelessVec(Rc::new(action)),
        )
    }

    /// `tS`：无时间、计量，标量动作乘计量向量.
    pub fn timeless_stoichiometric(
        name: impl Into<String>,
        domain: &[PlaceId],
        codomain: &[(PlaceId, f64)],
        action: impl Fn(&[f64]) -> f64 + 'static,
    ) -> Result<Self, ConstructionError> {
        let (places, coefficients) = split_pairs(codomain);
        Self::build(
            name.into(),
            domain.to_vec(),
            places,
            Some(coefficients),
            Kernel::TimelessScalar(Rc::new(action)),
        )
    }

    /// `Tsr`：时间、无速率、非计量，`f(Δt, dom)` 逐写集库所返回增量.
    pub fn timed(
        name: impl Into<String>,
        domain: &[PlaceId],
        codomain: &[PlaceId],
        action: impl Fn(f64, &[f64]) -> Vec<f64> + 'static,
    ) -> Result<Self, ConstructionError> {
        Self::build(
            name.into(),
            domain.to_vec(),
            codomain.to_vec(),
            None,
            Kernel::TimedVec(Rc::new(action)),
        )
    }

    /// `TSr`：时间、无速率、计量.
    pub fn timed_stoichiometric(
        name: impl Into<String>,
        domain: &[PlaceId],
        codomain: &[(PlaceId, f64)],
        action: impl Fn(f64, &[f64]) -> f64 + 'static,
    ) -> Result<Self, ConstructionError> {
        let (places, coefficients) = split_pairs(codomain);
        Self::build(
            name.into(),
            domain.to_vec(),
            places,
            Some(coefficients),
            Kernel::TimedScalar(Rc::new(action)),
        )
    }

    /// `sR`：带速率、非计量，闭包逐写集库所返回速率.
    pub fn with_rates(
        name: impl Into<String>,
        domain: &[PlaceId],
        codomain: &[PlaceId],
        rate: impl Fn(&[f64]) -> Vec<f64> + 'static,
    ) -> Result<Self, ConstructionError> {
        Self::build(
            name.into(),
            domain.to_vec(),
            codomain.to_vec(),
            None,
            Kernel::RateVec(Rc::new(rate)),
        )
    }

    /// `SR`：带速率、计量，标量流率乘计量向量.
    pub fn with_flux(
        name: impl Into<String>,
        domain: &[PlaceId],
        codomain: &[(PlaceId, f64)],
        flux: impl Fn(&[f64]) -> f64 + 'static,
    ) -> Result<Self, ConstructionError> {
        let (places, coefficients) = split_pairs(codomain);
        Self::build(
            name.into(),
            domain.to_vec(),
            places,
            Some(coefficients),
            Kernel::RateScalar(Rc::new(flux)),
        )
    }

    /// `A`：赋值，结果替换写集标记；恒可发生.
    pub fn assignment(
        name: impl Into<String>,
        domain: &[PlaceId],
        codomain: &[PlaceId],
        action: impl Fn(&[f64]) -> Vec<f64> + 'static,
    ) -> Result<Self, ConstructionError> {
        Self::build(
            name.into(),
            domain.to_vec(),
            codomain.to_vec(),
            None,
            Kernel::Assignment(Rc::new(action)),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TransitionKind {
        self.kernel.kind()
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    /// Ordered read set.
    pub fn domain(&self) -> &[PlaceId] {
        &self.domain
    }

    /// Ordered write set.
    pub fn codomain(&self) -> &[PlaceId] {
        &self.codomain
    }

    /// Aligned with the codomain; `None` for non-stoichiometric kinds.
    pub fn stoichiometry(&self) -> Option<&[f64]> {
        self.stoichiometry.as_deref()
    }

    pub fn is_cocked(&self) -> bool {
        self.cocked == Cocking::Cocked
    }

    pub fn cock(&mut self) {
        self.cocked = Cocking::Cocked;
    }

    pub fn uncock(&mut self) {
        self.cocked = Cocking::Uncocked;
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("name", &self.name)
            .field("kind", &self.kind().code())
            .field("domain", &self.domain)
            .field("codomain", &self.codomain)
            .field("stoichiometry", &self.stoichiometry)
            .field("cocked", &self.cocked)
            .finish()
    }
}

fn split_pairs(pairs: &[(PlaceId, f64)]) -> (Vec<PlaceId>, Vec<f64>) {
    pairs.iter().map(|&(place, coefficient)| (place, coefficient)).unzip()
}

fn first_duplicate(places: &[PlaceId]) -> Option<PlaceId> {
    for (i, place) in places.iter().enumerate() {
        if places[i + 1..].contains(place) {
            return Some(*place);
        }
    }
    None
}
