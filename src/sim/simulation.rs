//! 仿真：自由/钳制划分、整步暂存提交的 Euler 变体步进与历史重构.
//!
//! 步进语义：非赋值迁移的贡献按 [`Method`] 选定的次序合成 —
//! `pseudo_euler` 将无时间与时间贡献在同一基准标记上求值后一次叠加；
//! `quasi_euler` 先提交无时间贡献，时间刻度观察其结果；
//! `euler_then_timeless` 次序相反。赋值迁移随后按网序发生，
//! 读到的是已更新的暂存状态。对钳制库所的一切写入被丢弃（钳制获胜）。
use std::collections::HashMap;
use std::fmt;

use itertools::Itertools;
use log::{debug, info};
use thiserror::Error;

use crate::net::core::Net;
use crate::net::guard::{Guard, GuardError, check_all};
use crate::net::ids::PlaceId;
use crate::net::transition::{Kernel, TransitionKind};
use crate::sim::matrix::{Correspondence, Matrix};
use crate::sim::recording::{Event, Recorder, Recording, RecordingError, SamplingPolicy};
use crate::sim::settings::{Method, SimSettings};

/// 时钟比较容差.
const CLOCK_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConsistencyError {
    #[error("clamp or initial prescription names place {0} outside the net")]
    UnknownPlace(PlaceId),
    #[error("place(s) {places} are prescribed both a clamp and an initial marking")]
    DoublySpecified { places: String },
    #[error("place(s) {places} have neither a clamp, an initial marking nor a default")]
    Unspecified { places: String },
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Guard(#[from] GuardError),
    #[error("step at t = {time} would drive place {place} from {current} to {proposed}")]
    Infeasible {
        time: f64,
        place: String,
        current: f64,
        proposed: f64,
    },
    #[error("transition {transition}: kernel returned {got} values for {expected} codomain places")]
    KernelArity {
        transition: String,
        expected: usize,
        got: usize,
    },
}

#[derive(Debug, Error)]
pub enum ReconstructError {
    #[error(transparent)]
    Recording(#[from] RecordingError),
    #[error("override names unknown place `{0}`")]
    UnknownName(String),
}

/// 终步策略：目标时刻不整除步长时最后一步的取舍.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalStep {
    /// 停在目标之前的最后一个整步.
    Before,
    /// 再走一个整步，越过目标.
    After,
    /// 缩短最后一步，恰好落在目标上.
    Exact,
}

/// Name-keyed re-prescriptions applied when reconstructing a simulation from
/// its recording.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// 以给定值作为自由库所的新初始标记.
    pub marking: Vec<(String, f64)>,
    /// 把库所改为钳制（或改写既有钳制值）.
    pub clamps: Vec<(String, f64)>,
}

/// 报告用计量矩阵的类别选择.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoichCategory {
    /// `tS`
    Timeless,
    /// `TSr`
    TimedRateless,
    /// `SR`
    Rate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Role {
    Free { initial: f64 },
    Clamped { value: f64 },
}

#[derive(Clone)]
struct PlaceRep {
    name: String,
    role: Role,
    guards: Vec<Guard>,
}

/// 迁移映像：读写集解析为稠密下标，闭包经 `Rc` 与源网共享.
#[derive(Clone)]
struct TransitionRep {
    name: String,
    kind: TransitionKind,
    domain: Vec<usize>,
    codomain: Vec<usize>,
    stoichiometry: Option<Vec<f64>>,
    kernel: Kernel,
}

/// An immutable run-time image of a [`Net`] plus the mutable marking vector,
/// clock and step counter it evolves.
///
/// Construction resolves every id to a dense index, partitions the places
/// into free and clamped, groups the transitions by category and assembles
/// one stoichiometry matrix per stoichiometric category over the free rows.
/// The kernels and guards are shared with the net via `Rc`; mutating the net
/// afterwards is unobservable from the simulation.
pub struct Simulation {
    places: Vec<PlaceRep>,
    transitions: Vec<TransitionRep>,
    timeless_vec: Vec<usize>,
    timeless_stoich: Vec<usize>,
    timed_vec: Vec<usize>,
    timed_stoich: Vec<usize>,
    rate_vec: Vec<usize>,
    rate_stoich: Vec<usize>,
    assignments: Vec<usize>,
    stoich_timeless: Matrix,
    stoich_timed: Matrix,
    stoich_rate: Matrix,
    free: Correspondence,
    clamped: Correspondence,
    all_to_free: Vec<Option<usize>>,
    timed: bool,
    settings: SimSettings,
    marking: Vec<f64>,
    time: f64,
    steps: u64,
    recorder: Recorder,
}

impl Simulation {
    /// 对网 `net` 依处方划分并快照. `clamps` 指定钳制库所及其恒定值，
    /// `initial` 指定自由库所的初始标记；两者皆未提及的库所回落到缺省
    /// 标记（静默补全），仍无缺省者汇入 [`ConsistencyError::Unspecified`].
    pub fn new(
        net: &Net,
        settings: SimSettings,
        clamps: &[(PlaceId, f64)],
        initial: &[(PlaceId, f64)],
    ) -> Result<Self, ConsistencyError> {
        let index_of: HashMap<PlaceId, usize> = net
            .places()
            .enumerate()
            .map(|(index, (id, _))| (id, index))
            .collect();
        for &(id, _) in clamps.iter().chain(initial) {
            if !index_of.contains_key(&id) {
                return Err(ConsistencyError::UnknownPlace(id));
            }
        }
        let clamp_of: HashMap<PlaceId, f64> = clamps.iter().copied().collect();
        let initial_of: HashMap<PlaceId, f64> = initial.iter().copied().collect();

        let mut doubly: Vec<String> = Vec::new();
        let mut unspecified: Vec<String> = Vec::new();
        let mut places = Vec::with_capacity(net.places_len());
        for (id, place) in net.places() {
            let role = match (clamp_of.get(&id), initial_of.get(&id)) {
                (Some(_), Some(_)) => {
                    doubly.push(place.name().to_string());
                    Role::Free { initial: 0.0 }
                }
                (Some(&value), None) => Role::Clamped { value },
                (None, Some(&initial)) => Role::Free { initial },
                (None, None) => match place.default_marking() {
                    Some(default) => {
                        debug!(
                            "simulation: place {} completed from default {}",
                            place.name(),
                            default
                        );
                        Role::Free { initial: default }
                    }
                    None => {
                        unspecified.push(place.name().to_string());
                        Role::Free { initial: 0.0 }
                    }
                },
            };
            places.push(PlaceRep {
                name: place.name().to_string(),
                role,
                guards: place.guards().to_vec(),
            });
        }
        if !doubly.is_empty() {
            return Err(ConsistencyError::DoublySpecified {
                places: doubly.iter().join(", "),
            });
        }
        if !unspecified.is_empty() {
            return Err(ConsistencyError::Unspecified {
                places: unspecified.iter().join(", "),
            });
        }

        let transitions = net
            .transitions()
            .map(|(_, transition)| TransitionRep {
                name: transition.name().to_string(),
                kind: transition.kind(),
                domain: transition.domain().iter().map(|id| index_of[id]).collect(),
                codomain: transition.codomain().iter().map(|id| index_of[id]).collect(),
                stoichiometry: transition.stoichiometry().map(<[f64]>::to_vec),
                kernel: transition.kernel().clone(),
            })
            .collect();

        Ok(Self::from_reps(places, transitions, settings))
    }

    fn from_reps(
        places: Vec<PlaceRep>,
        transitions: Vec<TransitionRep>,
        settings: SimSettings,
    ) -> Self {
        let all_len = places.len();
        let free_indices: Vec<usize> = places
            .iter()
            .enumerate()
            .filter(|(_, p)| matches!(p.role, Role::Free { .. }))
            .map(|(i, _)| i)
            .collect();
        let clamped_indices: Vec<usize> = places
            .iter()
            .enumerate()
            .filter(|(_, p)| matches!(p.role, Role::Clamped { .. }))
            .map(|(i, _)| i)
            .collect();
        let free = Correspondence::new(free_indices, all_len);
        let clamped = Correspondence::new(clamped_indices, all_len);
        let all_to_free = free.inverse();

        let mut timeless_vec = Vec::new();
        let mut timeless_stoich = Vec::new();
        let mut timed_vec = Vec::new();
        let mut timed_stoich = Vec::new();
        let mut rate_vec = Vec::new();
        let mut rate_stoich = Vec::new();
        let mut assignments = Vec::new();
        for (index, rep) in transitions.iter().enumerate() {
            match rep.kind {
                TransitionKind::TimelessNonstoichiometric => timeless_vec.push(index),
                TransitionKind::TimelessStoichiometric => timeless_stoich.push(index),
                TransitionKind::TimedRatelessNonstoichiometric => timed_vec.push(index),
                TransitionKind::TimedRatelessStoichiometric => timed_stoich.push(index),
                TransitionKind::NonstoichiometricWithRate => rate_vec.push(index),
                TransitionKind::StoichiometricWithRate => rate_stoich.push(index),
                TransitionKind::Assignment => assignments.push(index),
            }
        }

        let stoich_timeless =
            stoich_matrix(&transitions, &timeless_stoich, &all_to_free, free.len());
        let stoich_timed = stoich_matrix(&transitions, &timed_stoich, &all_to_free, free.len());
        let stoich_rate = stoich_matrix(&transitions, &rate_stoich, &all_to_free, free.len());

        let timed = transitions.iter().any(|t| t.kind.timed());
        let columns = places.iter().map(|p| p.name.clone()).collect();
        let start_clock = if timed { settings.time_start } else { 0.0 };
        let recorder = Recorder::new(
            columns,
            SamplingPolicy::Period(settings.sampling_period),
            start_clock,
        );
        info!(
            "simulation: {} free / {} clamped places, {} transitions ({})",
            free.len(),
            clamped.len(),
            transitions.len(),
            if timed { "timed" } else { "timeless" },
        );

        let mut simulation = Self {
            marking: vec![0.0; all_len],
            time: settings.time_start,
            steps: 0,
            places,
            transitions,
            timeless_vec,
            timeless_stoich,
            timed_vec,
            timed_stoich,
            rate_vec,
            rate_stoich,
            assignments,
            stoich_timeless,
            stoich_timed,
            stoich_rate,
            free,
            clamped,
            all_to_free,
            timed,
            settings,
            recorder,
        };
        simulation.reset();
        simulation
    }

    /// 改用给定采样策略并重置. 缺省策略为按设置的周期采样；
    /// [`SamplingPolicy::EveryStep`] 每步必采（"sample at every occasion"）.
    pub fn with_sampling(mut self, policy: SamplingPolicy) -> Self {
        let columns = self.places.iter().map(|p| p.name.clone()).collect();
        let start_clock = if self.timed { self.settings.time_start } else { 0.0 };
        self.recorder = Recorder::new(columns, policy, start_clock);
        self.reset();
        self
    }

    /// 回到初始状态：自由库所取初始值、钳制库所取钳制值，时钟与步数
    /// 归零，历史清空并重采初始状态.
    pub fn reset(&mut self) {
        for (index, rep) in self.places.iter().enumerate() {
            self.marking[index] = match rep.role {
                Role::Free { initial } => initial,
                Role::Clamped { value } => value,
            };
        }
        self.time = self.settings.time_start;
        self.steps = 0;
        let clock = if self.timed { self.time } else { 0.0 };
        self.recorder.restart(clock);
        let event = self.current_event();
        self.recorder.sample_now(event, &self.marking);
    }

    /// 以设置中的步长走一步.
    pub fn step(&mut self) -> Result<(), StepError> {
        self.step_by(self.settings.step_size)
    }

    /// 走一个 `dt` 步：整步结果在暂存向量上求出并全量检验后才提交，
    /// 出错时标记、时钟与步数均不变.
    pub fn step_by(&mut self, dt: f64) -> Result<(), StepError> {
        let mut scratch = self.marking.clone();
        let mut delta = vec![0.0; self.free.len()];
        match self.settings.method {
            Method::PseudoEuler => {
                self.accumulate_timeless(&self.marking, &mut delta)?;
                self.accumulate_timed(&self.marking, dt, &mut delta)?;
                self.free.scatter_add(&delta, &mut scratch);
            }
            Method::QuasiEuler => {
                self.accumulate_timeless(&self.marking, &mut delta)?;
                self.free.scatter_add(&delta, &mut scratch);
                let mut late = vec![0.0; self.free.len()];
                self.accumulate_timed(&scratch, dt, &mut late)?;
                self.free.scatter_add(&late, &mut scratch);
            }
            Method::EulerThenTimeless => {
                self.accumulate_timed(&self.marking, dt, &mut delta)?;
                self.free.scatter_add(&delta, &mut scratch);
                let mut late = vec![0.0; self.free.len()];
                self.accumulate_timeless(&scratch, &mut late)?;
                self.free.scatter_add(&late, &mut scratch);
            }
        }

        let mut assigned = vec![false; scratch.len()];
        self.apply_assignments(&mut scratch, &mut assigned)?;
        self.validate(&scratch, &assigned)?;

        self.marking = scratch;
        self.steps += 1;
        if self.timed {
            self.time += dt;
        }
        let (clock, eps) = if self.timed {
            (self.time, dt * 0.5)
        } else {
            (self.steps as f64, 0.5)
        };
        let event = self.current_event();
        self.recorder.note_step(clock, eps, event, &self.marking);
        Ok(())
    }

    /// 推进到设置的终止时刻（终步取 [`FinalStep::Exact`]）.
    pub fn run(&mut self) -> Result<(), StepError> {
        let end = self.settings.time_end;
        self.run_until(end, FinalStep::Exact)
    }

    /// 以整步推进到 `target`（无时间网以步数为时钟）.
    pub fn run_until(&mut self, target: f64, last: FinalStep) -> Result<(), StepError> {
        if self.timed {
            let dt = self.settings.step_size;
            while self.time + dt <= target + CLOCK_EPS {
                self.step_by(dt)?;
            }
            let rest = target - self.time;
            if rest > CLOCK_EPS {
                match last {
                    FinalStep::Before => {}
                    FinalStep::After => self.step_by(dt)?,
                    FinalStep::Exact => self.step_by(rest)?,
                }
            }
        } else {
            while (self.steps as f64) + 1.0 <= target + CLOCK_EPS {
                self.step()?;
            }
            if (self.steps as f64) < target - CLOCK_EPS && last != FinalStep::Before {
                self.step()?;
            }
        }
        Ok(())
    }

    pub fn run_steps(&mut self, count: u64) -> Result<(), StepError> {
        for _ in 0..count {
            self.step()?;
        }
        Ok(())
    }

    pub fn marking(&self) -> &[f64] {
        &self.marking
    }

    pub fn marking_of(&self, name: &str) -> Option<f64> {
        self.places
            .iter()
            .position(|p| p.name == name)
            .map(|i| self.marking[i])
    }

    pub fn free_marking(&self) -> Vec<f64> {
        self.free.gather(&self.marking)
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// 任一迁移为时间类即为时间制仿真.
    pub fn is_timed(&self) -> bool {
        self.timed
    }

    pub fn settings(&self) -> &SimSettings {
        &self.settings
    }

    pub fn place_names(&self) -> Vec<&str> {
        self.places.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn recording(&self) -> &Recording {
        self.recorder.recording()
    }

    /// 自由库所的对应（子集到全体的下标数组）.
    pub fn free(&self) -> &Correspondence {
        &self.free
    }

    /// 钳制库所的对应.
    pub fn clamped(&self) -> &Correspondence {
        &self.clamped
    }

    /// 自由行上的计量矩阵（构造时装配，逐步复用）.
    pub fn stoichiometry_matrix(&self, category: StoichCategory) -> &Matrix {
        match category {
            StoichCategory::Timeless => &self.stoich_timeless,
            StoichCategory::TimedRateless => &self.stoich_timed,
            StoichCategory::Rate => &self.stoich_rate,
        }
    }

    /// 全体库所行上的计量矩阵，供报告与核对.
    pub fn stoichiometry_matrix_all(&self, category: StoichCategory) -> Matrix {
        let identity: Vec<Option<usize>> = (0..self.places.len()).map(Some).collect();
        stoich_matrix(
            &self.transitions,
            self.members_of(category),
            &identity,
            self.places.len(),
        )
    }

    /// 以 `event` 处的（记录或插值）状态为新初始标记重建仿真；
    /// `overrides` 按名字改写初始值或钳制后重新划分.
    pub fn reconstruct_at(
        &self,
        event: &Event,
        overrides: &Overrides,
    ) -> Result<Simulation, ReconstructError> {
        let state: Vec<f64> = match event {
            Event::Time(t) => self.recording().interpolate(*t)?,
            other => self
                .recording()
                .get(other)
                .ok_or_else(|| RecordingError::MissingEvent(other.to_string()))?
                .to_vec(),
        };
        let mut places = self.places.clone();
        for (rep, &value) in places.iter_mut().zip(&state) {
            if let Role::Free { initial } = &mut rep.role {
                *initial = value;
            }
        }
        for (name, value) in &overrides.marking {
            place_rep_mut(&mut places, name)?.role = Role::Free { initial: *value };
        }
        for (name, value) in &overrides.clamps {
            place_rep_mut(&mut places, name)?.role = Role::Clamped { value: *value };
        }
        Ok(Simulation::from_reps(
            places,
            self.transitions.clone(),
            self.settings.clone(),
        ))
    }

    fn current_event(&self) -> Event {
        if self.timed {
            Event::Time(self.time)
        } else {
            Event::Step(self.steps)
        }
    }

    fn members_of(&self, category: StoichCategory) -> &[usize] {
        match category {
            StoichCategory::Timeless => &self.timeless_stoich,
            StoichCategory::TimedRateless => &self.timed_stoich,
            StoichCategory::Rate => &self.rate_stoich,
        }
    }

    /// 无时间贡献：`tS` 走计量矩阵，`ts` 逐迁移散布；基准标记为 `basis`.
    fn accumulate_timeless(&self, basis: &[f64], out: &mut [f64]) -> Result<(), StepError> {
        if !self.timeless_stoich.is_empty() {
            let mut actions = vec![0.0; self.timeless_stoich.len()];
            for (col, &t) in self.timeless_stoich.iter().enumerate() {
                let rep = &self.transitions[t];
                let Kernel::TimelessScalar(f) = &rep.kernel else {
                    continue;
                };
                actions[col] = f(&domain_slice(rep, basis));
            }
            add_into(out, &self.stoich_timeless.mul_vec(&actions));
        }
        for &t in &self.timeless_vec {
            let rep = &self.transitions[t];
            let Kernel::TimelessVec(f) = &rep.kernel else {
                continue;
            };
            let values = checked_arity(rep, f(&domain_slice(rep, basis)))?;
            self.scatter_codomain(rep, &values, out);
        }
        Ok(())
    }

    /// 时间贡献：`TSr` 求 `f(Δt, dom)`，`SR` 求 `flux · Δt`，
    /// 非计量同类逐迁移散布.
    fn accumulate_timed(&self, basis: &[f64], dt: f64, out: &mut [f64]) -> Result<(), StepError> {
        if !self.timed_stoich.is_empty() {
            let mut actions = vec![0.0; self.timed_stoich.len()];
            for (col, &t) in self.timed_stoich.iter().enumerate() {
                let rep = &self.transitions[t];
                let Kernel::TimedScalar(f) = &rep.kernel else {
                    continue;
                };
                actions[col] = f(dt, &domain_slice(rep, basis));
            }
            add_into(out, &self.stoich_timed.mul_vec(&actions));
        }
        if !self.rate_stoich.is_empty() {
            let mut fluxes = vec![0.0; self.rate_stoich.len()];
            for (col, &t) in self.rate_stoich.iter().enumerate() {
                let rep = &self.transitions[t];
                let Kernel::RateScalar(f) = &rep.kernel else {
                    continue;
                };
                fluxes[col] = f(&domain_slice(rep, basis)) * dt;
            }
            add_into(out, &self.stoich_rate.mul_vec(&fluxes));
        }
        for &t in &self.timed_vec {
            let rep = &self.transitions[t];
            let Kernel::TimedVec(f) = &rep.kernel else {
                continue;
            };
            let values = checked_arity(rep, f(dt, &domain_slice(rep, basis)))?;
            self.scatter_codomain(rep, &values, out);
        }
        for &t in &self.rate_vec {
            let rep = &self.transitions[t];
            let Kernel::RateVec(f) = &rep.kernel else {
                continue;
            };
            let rates = checked_arity(rep, f(&domain_slice(rep, basis)))?;
            let values: Vec<f64> = rates.into_iter().map(|rate| rate * dt).collect();
            self.scatter_codomain(rep, &values, out);
        }
        Ok(())
    }

    /// 赋值迁移按网序发生在已更新的暂存状态上；写入钳制库所被丢弃.
    fn apply_assignments(
        &self,
        scratch: &mut [f64],
        assigned: &mut [bool],
    ) -> Result<(), StepError> {
        for &t in &self.assignments {
            let rep = &self.transitions[t];
            let Kernel::Assignment(f) = &rep.kernel else {
                continue;
            };
            let values = checked_arity(rep, f(&domain_slice(rep, scratch)))?;
            for (&place, &value) in rep.codomain.iter().zip(&values) {
                if self.all_to_free[place].is_some() {
                    scratch[place] = value;
                    assigned[place] = true;
                }
            }
        }
        Ok(())
    }

    /// 提交前全量检验：自由库所不得被增量驱入负值（赋值替换除外），
    /// 且拟议值通过各自守卫合取.
    fn validate(&self, scratch: &[f64], assigned: &[bool]) -> Result<(), StepError> {
        for &place in self.free.to_all() {
            let rep = &self.places[place];
            let current = self.marking[place];
            let proposed = scratch[place];
            if !assigned[place] && proposed < 0.0 && proposed < current {
                return Err(StepError::Infeasible {
                    time: self.time,
                    place: rep.name.clone(),
                    current,
                    proposed,
                });
            }
            check_all(&rep.guards, proposed).map_err(|e| e.at_place(&rep.name))?;
        }
        Ok(())
    }

    fn scatter_codomain(&self, rep: &TransitionRep, values: &[f64], out: &mut [f64]) {
        for (&place, &value) in rep.codomain.iter().zip(values) {
            if let Some(row) = self.all_to_free[place] {
                out[row] += value;
            }
        }
    }
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("places", &self.places.len())
            .field("free", &self.free.len())
            .field("clamped", &self.clamped.len())
            .field("transitions", &self.transitions.len())
            .field("timed", &self.timed)
            .field("time", &self.time)
            .field("steps", &self.steps)
            .finish()
    }
}

/// 逐列装配：`members` 中第 `col` 个迁移的计量列经 `row_of` 投影到目标行.
fn stoich_matrix(
    transitions: &[TransitionRep],
    members: &[usize],
    row_of: &[Option<usize>],
    rows: usize,
) -> Matrix {
    let mut matrix = Matrix::zeros(rows, members.len());
    for (col, &t) in members.iter().enumerate() {
        let rep = &transitions[t];
        let coefficients = rep.stoichiometry.as_deref().unwrap_or(&[]);
        let entries: Vec<(usize, f64)> = rep
            .codomain
            .iter()
            .zip(coefficients)
            .filter_map(|(&place, &coefficient)| row_of[place].map(|row| (row, coefficient)))
            .collect();
        matrix.set_column(col, &entries);
    }
    matrix
}

fn domain_slice(rep: &TransitionRep, basis: &[f64]) -> Vec<f64> {
    rep.domain.iter().map(|&i| basis[i]).collect()
}

fn checked_arity(rep: &TransitionRep, values: Vec<f64>) -> Result<Vec<f64>, StepError> {
    if values.len() != rep.codomain.len() {
        return Err(StepError::KernelArity {
            transition: rep.name.clone(),
            expected: rep.codomain.len(),
            got: values.len(),
        });
    }
    Ok(values)
}

fn add_into(out: &mut [f64], delta: &[f64]) {
    for (entry, value) in out.iter_mut().zip(delta) {
        *entry += value;
    }
}

fn place_rep_mut<'a>(
    places: &'a mut [PlaceRep],
    name: &str,
) -> Result<&'a mut PlaceRep, ReconstructError> {
    places
        .iter_mut()
        .find(|p| p.name == name)
        .ok_or_else(|| ReconstructError::UnknownName(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{Guard, Net, Place, Transition};

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn settings(step_size: f64, time_end: f64) -> SimSettings {
        SimSettings {
            step_size,
            time_end,
            ..SimSettings::default()
        }
    }

    #[test]
    fn reset_restores_prescribed_state_and_clamp_holds() {
        init_logging();
        let mut net = Net::new();
        let a = net.include_place(Place::new("A").with_default(1.0));
        let b = net.include_place(Place::new("B").with_default(0.0));
        let t = Transition::with_flux("f", &[a], &[(a, -1.0), (b, 1.0)], |m| 0.1 * m[0]).unwrap();
        net.include_transition(t).unwrap();

        let mut sim =
            Simulation::new(&net, settings(0.1, 1.0), &[(b, 5.0)], &[(a, 9.0)]).unwrap();
        assert_eq!(sim.marking(), &[9.0, 5.0]);
        sim.run().unwrap();
        assert!(sim.marking_of("A").unwrap() < 9.0);
        // 钳制获胜：写入被丢弃
        assert_eq!(sim.marking_of("B"), Some(5.0));

        sim.reset();
        assert_eq!(sim.marking(), &[9.0, 5.0]);
        assert_eq!(sim.time(), 0.0);
        assert_eq!(sim.steps(), 0);
        assert_eq!(sim.recording().len(), 1);
    }

    #[test]
    fn partition_errors_name_every_offender() {
        let mut net = Net::new();
        let a = net.include_place(Place::new("A"));
        let b = net.include_place(Place::new("B"));

        let err = Simulation::new(&net, SimSettings::default(), &[], &[]).unwrap_err();
        match err {
            ConsistencyError::Unspecified { places } => {
                assert!(places.contains('A') && places.contains('B'));
            }
            other => panic!("expected Unspecified, got {other:?}"),
        }

        let err = Simulation::new(
            &net,
            SimSettings::default(),
            &[(a, 1.0)],
            &[(a, 2.0), (b, 0.0)],
        )
        .unwrap_err();
        assert!(matches!(err, ConsistencyError::DoublySpecified { .. }));

        let foreign = PlaceId::new(42);
        let err =
            Simulation::new(&net, SimSettings::default(), &[(foreign, 1.0)], &[]).unwrap_err();
        assert_eq!(err, ConsistencyError::UnknownPlace(foreign));
    }

    #[test]
    fn selector_matrices_partition_the_identity() {
        let mut net = Net::new();
        let _a = net.include_place(Place::new("A").with_default(1.0));
        let b = net.include_place(Place::new("B").with_default(2.0));
        let _c = net.include_place(Place::new("C").with_default(3.0));
        let sim = Simulation::new(&net, SimSettings::default(), &[(b, 7.0)], &[]).unwrap();

        let f = sim.free().as_matrix();
        let c = sim.clamped().as_matrix();
        for i in 0..3 {
            let mut e = vec![0.0; 3];
            e[i] = 1.0;
            let via_free = f.transpose_mul_vec(&f.mul_vec(&e));
            let via_clamped = c.transpose_mul_vec(&c.mul_vec(&e));
            let sum: Vec<f64> = via_free.iter().zip(&via_clamped).map(|(x, y)| x + y).collect();
            assert_eq!(sum, e);
        }
    }

    #[test]
    fn one_step_delta_matches_stoichiometry_times_flux() {
        let mut net = Net::new();
        let p = net.include_place(Place::new("P").with_default(10.0));
        let q = net.include_place(Place::new("Q").with_default(1.0));
        let t = Transition::with_flux("t", &[p], &[(p, -2.0), (q, 1.0)], |m| 0.3 * m[0]).unwrap();
        net.include_transition(t).unwrap();

        let dt = 0.05;
        let mut sim = Simulation::new(&net, settings(dt, 1.0), &[], &[]).unwrap();
        let before = sim.marking().to_vec();
        let s = sim.stoichiometry_matrix_all(StoichCategory::Rate);
        let expected = s.mul_vec(&[0.3 * before[0] * dt]);

        sim.step().unwrap();
        for i in 0..before.len() {
            assert!((sim.marking()[i] - (before[i] + expected[i])).abs() < 1e-9);
        }
    }

    #[test]
    fn threshold_drain_empties_then_idles() {
        let mut net = Net::new();
        let _a = net.include_place(Place::new("A").with_default(1.0));
        let b = net.include_place(Place::new("B").with_default(10.0));
        let t = Transition::timeless_stoichiometric(
            "B_disappearing",
            &[b],
            &[(b, -1.0)],
            |m| if m[0] >= 1.0 { 1.0 } else { 0.0 },
        )
        .unwrap();
        net.include_transition(t).unwrap();

        let mut sim = Simulation::new(&net, SimSettings::default(), &[], &[]).unwrap();
        assert!(!sim.is_timed());
        sim.run_steps(12).unwrap();
        assert_eq!(sim.marking_of("B"), Some(0.0));
        assert_eq!(sim.marking_of("A"), Some(1.0));
        assert_eq!(sim.steps(), 12);
        // 无时间制以步数为事件键
        assert_eq!(sim.recording().events()[0], Event::Step(0));
    }

    #[test]
    fn mass_action_run_is_monotone_in_the_recording() {
        init_logging();
        let mut net = Net::new();
        let p = net.include_place(Place::new("P").with_default(1.0));
        let q = net.include_place(Place::new("Q").with_default(1.0));
        let tp = Transition::with_flux("Tp", &[p], &[(p, -1.0)], |m| 0.1 * m[0]).unwrap();
        let tq = Transition::with_flux("Tq", &[], &[(q, 1.0)], |_| 0.02).unwrap();
        net.include_transition(tp).unwrap();
        net.include_transition(tq).unwrap();

        let settings = SimSettings {
            step_size: 0.01,
            sampling_period: 1.0,
            time_start: 0.0,
            time_end: 30.0,
            ..SimSettings::default()
        };
        let mut sim = Simulation::new(&net, settings, &[], &[]).unwrap();
        sim.run().unwrap();
        assert!((sim.time() - 30.0).abs() < 1e-6);

        let recording = sim.recording();
        assert_eq!(recording.columns(), &["P".to_string(), "Q".to_string()]);
        assert_eq!(recording.len(), 31);
        for pair in recording.samples().windows(2) {
            assert!(pair[1][0] < pair[0][0], "P must strictly decrease");
            assert!(pair[1][1] > pair[0][1], "Q must strictly increase");
        }
        // 离散衰减 (1 - 0.001)^3000 ≈ 0.0497
        let p_end = sim.marking_of("P").unwrap();
        assert!(p_end > 0.0 && p_end < 0.06);
    }

    #[test]
    fn assignment_replaces_prior_marking_exactly() {
        let mut net = Net::new();
        let pool = net.include_place(Place::new("pool").with_default(10.0));
        let di = net.include_place(Place::new("di").with_default(2.0));
        let tri = net.include_place(Place::new("tri").with_default(3.0));
        let tdp = net.include_place(Place::new("TDP").with_default(99.0));
        let define = Transition::assignment("define_TDP", &[pool, di, tri], &[tdp], |m| {
            vec![m[0] * m[1] / (m[1] + m[2])]
        })
        .unwrap();
        net.include_transition(define).unwrap();

        let mut sim = Simulation::new(&net, SimSettings::default(), &[], &[]).unwrap();
        sim.step().unwrap();
        assert_eq!(sim.marking_of("TDP"), Some(4.0));
        sim.step().unwrap();
        assert_eq!(sim.marking_of("TDP"), Some(4.0));
    }

    #[test]
    fn guard_violation_aborts_the_whole_step() {
        let mut net = Net::new();
        let a = net.include_place(
            Place::new("A")
                .with_default(9.9)
                .with_guard(Guard::new("marking must stay below 10", |m| m < 10.0)),
        );
        let b = net.include_place(Place::new("B").with_default(0.0));
        let pump = Transition::with_flux("pump", &[], &[(a, 1.0), (b, 1.0)], |_| 1.0).unwrap();
        net.include_transition(pump).unwrap();

        let mut sim = Simulation::new(&net, settings(0.5, 1.0), &[], &[]).unwrap();
        let err = sim.step().unwrap_err();
        assert!(matches!(err, StepError::Guard(_)));
        // 整步拒绝：B 不被部分写入，时钟与步数不变
        assert_eq!(sim.marking(), &[9.9, 0.0]);
        assert_eq!(sim.time(), 0.0);
        assert_eq!(sim.steps(), 0);
    }

    #[test]
    fn overdraw_is_infeasible() {
        let mut net = Net::new();
        let a = net.include_place(Place::new("A").with_default(0.5));
        let drain = Transition::with_flux("drain", &[], &[(a, -1.0)], |_| 1.0).unwrap();
        net.include_transition(drain).unwrap();

        let mut sim = Simulation::new(&net, settings(1.0, 2.0), &[], &[]).unwrap();
        let err = sim.step().unwrap_err();
        assert!(matches!(err, StepError::Infeasible { .. }));
        assert_eq!(sim.marking_of("A"), Some(0.5));
    }

    #[test]
    fn quasi_euler_lets_the_tick_see_timeless_output() {
        fn one_step(method: Method) -> (f64, f64) {
            let mut net = Net::new();
            let x = net.include_place(Place::new("X").with_default(0.0));
            let y = net.include_place(Place::new("Y").with_default(0.0));
            let bump = Transition::timeless("bump", &[], &[x], |_| vec![1.0]).unwrap();
            let feed = Transition::with_rates("feed", &[x], &[y], |m| vec![m[0]]).unwrap();
            net.include_transition(bump).unwrap();
            net.include_transition(feed).unwrap();
            let settings = SimSettings {
                step_size: 1.0,
                method,
                ..SimSettings::default()
            };
            let mut sim = Simulation::new(&net, settings, &[], &[]).unwrap();
            sim.step().unwrap();
            (sim.marking_of("X").unwrap(), sim.marking_of("Y").unwrap())
        }

        // 基准标记上 X = 0：时间刻度看不到本步的无时间增量
        assert_eq!(one_step(Method::PseudoEuler), (1.0, 0.0));
        // 无时间增量先提交：速率读到 X = 1
        assert_eq!(one_step(Method::QuasiEuler), (1.0, 1.0));
    }

    #[test]
    fn euler_then_timeless_lets_timeless_see_the_tick() {
        fn one_step(method: Method) -> (f64, f64) {
            let mut net = Net::new();
            let x = net.include_place(Place::new("X").with_default(0.0));
            let y = net.include_place(Place::new("Y").with_default(0.0));
            let tick = Transition::with_rates("tick", &[], &[y], |_| vec![1.0]).unwrap();
            let copy = Transition::timeless("copy", &[y], &[x], |m| vec![m[0]]).unwrap();
            net.include_transition(tick).unwrap();
            net.include_transition(copy).unwrap();
            let settings = SimSettings {
                step_size: 1.0,
                method,
                ..SimSettings::default()
            };
            let mut sim = Simulation::new(&net, settings, &[], &[]).unwrap();
            sim.step().unwrap();
            (sim.marking_of("X").unwrap(), sim.marking_of("Y").unwrap())
        }

        assert_eq!(one_step(Method::PseudoEuler), (0.0, 1.0));
        // 刻度先提交：无时间迁移读到 Y = 1
        assert_eq!(one_step(Method::EulerThenTimeless), (1.0, 1.0));
    }

    #[test]
    fn every_step_sampling_records_each_step() {
        let mut net = Net::new();
        let y = net.include_place(Place::new("Y").with_default(0.0));
        let tick = Transition::with_flux("tick", &[], &[(y, 1.0)], |_| 1.0).unwrap();
        net.include_transition(tick).unwrap();

        let mut sim = Simulation::new(&net, settings(0.5, 10.0), &[], &[])
            .unwrap()
            .with_sampling(SamplingPolicy::EveryStep);
        sim.run_steps(5).unwrap();
        // 周期策略（缺省 2.0）只会采到 0 与 2；每步必采得到初始态加 5 步
        assert_eq!(sim.recording().len(), 6);
        assert_eq!(sim.recording().events()[1], Event::Time(0.5));
    }

    #[test]
    fn run_until_final_step_modes() {
        fn run_to(last: FinalStep) -> f64 {
            let mut net = Net::new();
            let y = net.include_place(Place::new("Y").with_default(0.0));
            let tick = Transition::with_flux("tick", &[], &[(y, 1.0)], |_| 1.0).unwrap();
            net.include_transition(tick).unwrap();
            let mut sim = Simulation::new(&net, settings(0.4, 10.0), &[], &[]).unwrap();
            sim.run_until(1.0, last).unwrap();
            sim.time()
        }

        assert!((run_to(FinalStep::Before) - 0.8).abs() < 1e-9);
        assert!((run_to(FinalStep::After) - 1.2).abs() < 1e-9);
        assert!((run_to(FinalStep::Exact) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn snapshot_ignores_later_net_mutation() {
        let mut net = Net::new();
        let a = net.include_place(Place::new("A").with_default(5.0));
        let decay = Transition::with_flux("decay", &[a], &[(a, -1.0)], |m| 0.5 * m[0]).unwrap();
        let decay = net.include_transition(decay).unwrap();

        let mut sim = Simulation::new(&net, settings(0.1, 1.0), &[], &[]).unwrap();
        net.place_mut(a).unwrap().set_marking(1000.0).unwrap();
        net.exclude_transition(decay).unwrap();

        sim.step().unwrap();
        // 快照仍按构造时的网推进：5 - 0.5·5·0.1
        assert!((sim.marking_of("A").unwrap() - 4.75).abs() < 1e-9);
    }

    #[test]
    fn reconstruction_restarts_from_recorded_state() {
        let mut net = Net::new();
        let p = net.include_place(Place::new("P").with_default(8.0));
        let decay = Transition::with_flux("decay", &[p], &[(p, -1.0)], |m| 0.2 * m[0]).unwrap();
        net.include_transition(decay).unwrap();

        let settings = SimSettings {
            step_size: 0.1,
            sampling_period: 1.0,
            time_end: 10.0,
            ..SimSettings::default()
        };
        let mut sim = Simulation::new(&net, settings, &[], &[]).unwrap();
        sim.run().unwrap();

        let snapshot = sim.recording().interpolate(4.0).unwrap();
        let restarted = sim
            .reconstruct_at(&Event::Time(4.0), &Overrides::default())
            .unwrap();
        assert_eq!(restarted.marking(), &snapshot[..]);
        assert_eq!(restarted.time(), 0.0);
        assert_eq!(restarted.steps(), 0);

        let clamped = sim
            .reconstruct_at(
                &Event::Time(4.0),
                &Overrides {
                    clamps: vec![("P".into(), 1.0)],
                    ..Overrides::default()
                },
            )
            .unwrap();
        assert_eq!(clamped.marking_of("P"), Some(1.0));
        assert_eq!(clamped.clamped().len(), 1);

        let err = sim
            .reconstruct_at(
                &Event::Time(4.0),
                &Overrides {
                    marking: vec![("Z".into(), 1.0)],
                    ..Overrides::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, ReconstructError::UnknownName(_)));
    }
}
