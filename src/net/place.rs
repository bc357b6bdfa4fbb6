//! 库所：持有标记的命名单元，带缺省值、量子与弧反向引用.
use std::fmt;

use crate::net::guard::{Guard, GuardError, check_all};
use crate::net::ids::TransitionId;

/// A named marking cell. `upstream_arcs` are the transitions that write this
/// place, `downstream_arcs` those that read it; both are non-owning ids
/// maintained by the [`Net`](crate::net::Net).
#[derive(Clone)]
pub struct Place {
    name: String,
    marking: Option<f64>,
    default_marking: Option<f64>,
    quantum: f64,
    guards: Vec<Guard>,
    pub(crate) upstream_arcs: Vec<TransitionId>,
    pub(crate) downstream_arcs: Vec<TransitionId>,
}

impl Place {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            marking: None,
            default_marking: None,
            quantum: 1.0,
            guards: vec![Guard::finite()],
            upstream_arcs: Vec::new(),
            downstream_arcs: Vec::new(),
        }
    }

    pub fn with_default(mut self, default_marking: f64) -> Self {
        self.default_marking = Some(default_marking);
        self
    }

    pub fn with_marking(mut self, marking: f64) -> Self {
        self.marking = Some(marking);
        self
    }

    pub fn with_quantum(mut self, quantum: f64) -> Self {
        self.quantum = quantum;
        self
    }

    pub fn with_guard(mut self, guard: Guard) -> Self {
        self.guards.push(guard);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 当前标记；未显式赋值时回落到缺省标记.
    pub fn marking(&self) -> Option<f64> {
        self.marking.or(self.default_marking)
    }

    pub fn default_marking(&self) -> Option<f64> {
        self.default_marking
    }

    /// 建模标注的标记粒度. 执行语义不按量子离散化，发生与步进始终按
    /// 连续实数增量进行；该值仅供调用方解读.
    pub fn quantum(&self) -> f64 {
        self.quantum
    }

    pub fn guards(&self) -> &[Guard] {
        &self.guards
    }

    /// Transitions writing this place.
    pub fn upstream_arcs(&self) -> &[TransitionId] {
        &self.upstream_arcs
    }

    /// Transitions reading this place.
    pub fn downstream_arcs(&self) -> &[TransitionId] {
        &self.downstream_arcs
    }

    /// 拟议值对本库所守卫合取的检验，错误中带库所名.
    pub fn check_guards(&self, value: f64) -> Result<(), GuardError> {
        check_all(&self.guards, value).map_err(|e| e.at_place(&self.name))
    }

    /// Guard-checked mutation; on failure the stored marking is unchanged.
    pub fn set_marking(&mut self, value: f64) -> Result<(), GuardError> {
        self.check_guards(value)?;
        self.marking = Some(value);
        Ok(())
    }

    /// Guard-checked increment; returns the new marking.
    pub fn add(&mut self, delta: f64) -> Result<f64, GuardError> {
        let current = self.marking().unwrap_or(0.0);
        let next = current + delta;
        self.set_marking(next)?;
        Ok(next)
    }

    /// 恢复缺省标记.
    pub fn reset(&mut self) {
        self.marking = self.default_marking;
    }
}

impl fmt::Debug for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Place")
            .field("name", &self.name)
            .field("marking", &self.marking)
            .field("default_marking", &self.default_marking)
            .field("quantum", &self.quantum)
            .field("guards", &self.guards.len())
            .finish()
    }
}
