//! 网容器：成员不变式维护与手动令牌博弈（可发生性、软/硬发生、递归传播）.
use std::collections::HashSet;

use indexmap::IndexMap;
use itertools::Itertools;
use log::debug;
use thiserror::Error;

use crate::net::guard::GuardError;
use crate::net::ids::{PlaceId, TransitionId};
use crate::net::place::Place;
use crate::net::transition::{Kernel, Transition};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum NetError {
    #[error("transition {transition} references place {place} outside the net")]
    ForeignPlace {
        transition: String,
        place: PlaceId,
    },
    #[error("place {place} is still referenced by transition(s) {transitions}; exclude them first")]
    PlaceInUse {
        place: String,
        transitions: String,
    },
    #[error("unknown place {0}")]
    UnknownPlace(PlaceId),
    #[error("unknown transition {0}")]
    UnknownTransition(TransitionId),
}

#[derive(Debug, Error)]
pub enum FireError {
    #[error("unknown transition {0}")]
    UnknownTransition(TransitionId),
    #[error("place {place} has no marking to read (neither value nor default)")]
    UnsetMarking { place: String },
    #[error(transparent)]
    Guard(#[from] GuardError),
    #[error("transition {transition} would drive place {place} from {current} to {proposed}")]
    Infeasible {
        transition: String,
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

/// 拟议动作：增量（非赋值类）或替换值（赋值类），均按写集顺序对齐.
enum Action {
    Delta(Vec<f64>),
    Replace(Vec<f64>),
}

/// A structural container of places and transitions, insertion order
/// preserved. Membership invariant: every transition's domain and codomain
/// lie inside the net, and a place cannot be excluded while referenced.
///
/// Ids stay stable across exclusions; the token game mutates place markings
/// directly and leaves simulation snapshots untouched.
#[derive(Debug, Default)]
pub struct Net {
    places: IndexMap<PlaceId, Place>,
    transitions: IndexMap<TransitionId, Transition>,
    next_place: u32,
    next_transition: u32,
}

impl Net {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include_place(&mut self, place: Place) -> PlaceId {
        let id = PlaceId::new(self.next_place);
        self.next_place += 1;
        debug!("net: include place {} as {}", place.name(), id);
        self.places.insert(id, place);
        id
    }

    pub fn include_transition(&mut self, transition: Transition) -> Result<TransitionId, NetError> {
        for &pid in transition.domain().iter().chain(transition.codomain()) {
            if !self.places.contains_key(&pid) {
                return Err(NetError::ForeignPlace {
                    transition: transition.name().to_string(),
                    place: pid,
                });
            }
        }
        let id = TransitionId::new(self.next_transition);
        self.next_transition += 1;
        for &pid in transition.domain() {
            self.places[&pid].downstream_arcs.push(id);
        }
        for &pid in transition.codomain() {
            self.places[&pid].upstream_arcs.push(id);
        }
        debug!(
            "net: include transition {} ({}) as {}",
            transition.name(),
            transition.kind().code(),
            id
        );
        self.transitions.insert(id, transition);
        Ok(id)
    }

    pub fn exclude_transition(&mut self, id: TransitionId) -> Result<Transition, NetError> {
        let transition = self
            .transitions
            .shift_remove(&id)
            .ok_or(NetError::UnknownTransition(id))?;
        for &pid in transition.domain() {
            if let Some(place) = self.places.get_mut(&pid) {
                place.downstream_arcs.retain(|&t| t != id);
            }
        }
        for &pid in transition.codomain() {
            if let Some(place) = self.places.get_mut(&pid) {
                place.upstream_arcs.retain(|&t| t != id);
            }
        }
        debug!("net: exclude transition {}", transition.name());
        Ok(transition)
    }

    pub fn exclude_place(&mut self, id: PlaceId) -> Result<Place, NetError> {
        let place = self.places.get(&id).ok_or(NetError::UnknownPlace(id))?;
        let referents: Vec<&str> = place
            .upstream_arcs
            .iter()
            .chain(&place.downstream_arcs)
            .unique()
            .filter_map(|t| self.transitions.get(t).map(Transition::name))
            .collect();
        if !referents.is_empty() {
            return Err(NetError::PlaceInUse {
                place: place.name().to_string(),
                transitions: referents.iter().join(", "),
            });
        }
        debug!("net: exclude place {}", place.name());
        Ok(self
            .places
            .shift_remove(&id)
            .expect("membership checked above"))
    }

    pub fn place(&self, id: PlaceId) -> Option<&Place> {
        self.places.get(&id)
    }

    pub fn place_mut(&mut self, id: PlaceId) -> Option<&mut Place> {
        self.places.get_mut(&id)
    }

    pub fn transition(&self, id: TransitionId) -> Option<&Transition> {
        self.transitions.get(&id)
    }

    pub fn transition_mut(&mut self, id: TransitionId) -> Option<&mut Transition> {
        self.transitions.get_mut(&id)
    }

    pub fn find_place(&self, name: &str) -> Option<PlaceId> {
        self.places
            .iter()
            .find(|(_, p)| p.name() == name)
            .map(|(&id, _)| id)
    }

    pub fn find_transition(&self, name: &str) -> Option<TransitionId> {
        self.transitions
            .iter()
            .find(|(_, t)| t.name() == name)
            .map(|(&id, _)| id)
    }

    pub fn places(&self) -> impl Iterator<Item = (PlaceId, &Place)> {
        self.places.iter().map(|(&id, place)| (id, place))
    }

    pub fn transitions(&self) -> impl Iterator<Item = (TransitionId, &Transition)> {
        self.transitions.iter().map(|(&id, transition)| (id, transition))
    }

    pub fn places_len(&self) -> usize {
        self.places.len()
    }

    pub fn transitions_len(&self) -> usize {
        self.transitions.len()
    }

    pub fn cock(&mut self, id: TransitionId) -> Result<(), NetError> {
        self.transitions
            .get_mut(&id)
            .ok_or(NetError::UnknownTransition(id))?
            .cock();
        Ok(())
    }

    pub fn uncock(&mut self, id: TransitionId) -> Result<(), NetError> {
        self.transitions
            .get_mut(&id)
            .ok_or(NetError::UnknownTransition(id))?
            .uncock();
        Ok(())
    }

    pub fn is_cocked(&self, id: TransitionId) -> bool {
        self.transitions.get(&id).is_some_and(Transition::is_cocked)
    }

    /// 域守卫：拟议的读集标记（按读集顺序）逐库所检验守卫合取，
    /// 一次汇报全部违规库所.
    pub fn check_domain_guards(
        &self,
        id: TransitionId,
        prospective: &[f64],
    ) -> Result<(), FireError> {
        let transition = self
            .transitions
            .get(&id)
            .ok_or(FireError::UnknownTransition(id))?;
        debug_assert_eq!(prospective.len(), transition.domain().len());
        let failures: Vec<String> = transition
            .domain()
            .iter()
            .zip(prospective)
            .filter_map(|(pid, &value)| {
                let place = self
                    .places
                    .get(pid)
                    .expect("net invariant: domain places are members");
                place.check_guards(value).err().map(|e| e.to_string())
            })
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(GuardError::Violations {
                details: failures.iter().join("; "),
            }
            .into())
        }
    }

    /// 可发生性：拟议动作对写集每个库所的守卫与可行性检验；赋值类恒可发生.
    pub fn enabled(&self, id: TransitionId, dt: f64) -> Result<bool, FireError> {
        let transition = self
            .transitions
            .get(&id)
            .ok_or(FireError::UnknownTransition(id))?;
        if transition.kind().assignment() {
            return Ok(true);
        }
        let action = self.proposed_action(transition, dt)?;
        match self.validate_action(transition, &action) {
            Ok(()) => Ok(true),
            Err(FireError::Guard(_) | FireError::Infeasible { .. }) => Ok(false),
            Err(other) => Err(other),
        }
    }

    pub fn enabled_transitions(&self, dt: f64) -> Vec<TransitionId> {
        self.transitions
            .keys()
            .copied()
            .filter(|&id| self.enabled(id, dt).unwrap_or(false))
            .collect()
    }

    /// Soft firing: a no-op returning `Ok(false)` while uncocked, otherwise
    /// consumes the cock and applies the action.
    pub fn fire(&mut self, id: TransitionId, dt: f64) -> Result<bool, FireError> {
        let cocked = self
            .transitions
            .get(&id)
            .ok_or(FireError::UnknownTransition(id))?
            .is_cocked();
        if !cocked {
            return Ok(false);
        }
        self.fire_unconditionally(id, dt)?;
        if let Some(transition) = self.transitions.get_mut(&id) {
            transition.uncock();
        }
        Ok(true)
    }

    /// Hard firing: bypasses cocking; applies the action if enabled, else
    /// raises the guard or infeasibility error. The net is unchanged on error.
    pub fn fire_unconditionally(&mut self, id: TransitionId, dt: f64) -> Result<(), FireError> {
        let writes: Vec<(PlaceId, f64)> = {
            let transition = self
                .transitions
                .get(&id)
                .ok_or(FireError::UnknownTransition(id))?;
            let action = self.proposed_action(transition, dt)?;
            self.validate_action(transition, &action)?;
            self.resolve_writes(transition, action)?
        };
        for (pid, value) in writes {
            let place = self
                .places
                .get_mut(&pid)
                .expect("net invariant: codomain places are members");
            place.set_marking(value)?;
        }
        debug!("net: fired {}", id);
        Ok(())
    }

    /// 先递归发生写入读集的上游迁移，再软发生本迁移；visited 集保证环上终止.
    /// 返回实际发生的迁移数.
    pub fn fire_upstream_recursively(
        &mut self,
        id: TransitionId,
        dt: f64,
    ) -> Result<usize, FireError> {
        let mut visited = HashSet::new();
        self.fire_upstream_visited(id, dt, &mut visited)
    }

    /// 先软发生本迁移，再递归发生读取写集的下游迁移.
    pub fn fire_downstream_recursively(
        &mut self,
        id: TransitionId,
        dt: f64,
    ) -> Result<usize, FireError> {
        let mut visited = HashSet::new();
        self.fire_downstream_visited(id, dt, &mut visited)
    }

    fn fire_upstream_visited(
        &mut self,
        id: TransitionId,
        dt: f64,
        visited: &mut HashSet<TransitionId>,
    ) -> Result<usize, FireError> {
        if !visited.insert(id) {
            return Ok(0);
        }
        let domain = self
            .transitions
            .get(&id)
            .ok_or(FireError::UnknownTransition(id))?
            .domain()
            .to_vec();
        let mut fired = 0;
        for pid in domain {
            let writers = self
                .places
                .get(&pid)
                .expect("net invariant: domain places are members")
                .upstream_arcs
                .clone();
            for writer in writers {
                fired += self.fire_upstream_visited(writer, dt, visited)?;
            }
        }
        if self.fire(id, dt)? {
            fired += 1;
        }
        Ok(fired)
    }

    fn fire_downstream_visited(
        &mut self,
        id: TransitionId,
        dt: f64,
        visited: &mut HashSet<TransitionId>,
    ) -> Result<usize, FireError> {
        if !visited.insert(id) {
            return Ok(0);
        }
        let mut fired = 0;
        if self.fire(id, dt)? {
            fired += 1;
        }
        let codomain = self
            .transitions
            .get(&id)
            .ok_or(FireError::UnknownTransition(id))?
            .codomain()
            .to_vec();
        for pid in codomain {
            let readers = self
                .places
                .get(&pid)
                .expect("net invariant: codomain places are members")
                .downstream_arcs
                .clone();
            for reader in readers {
                fired += self.fire_downstream_visited(reader, dt, visited)?;
            }
        }
        Ok(fired)
    }

    fn domain_marking(&self, transition: &Transition) -> Result<Vec<f64>, FireError> {
        transition
            .domain()
            .iter()
            .map(|pid| {
                let place = self
                    .places
                    .get(pid)
                    .expect("net invariant: domain places are members");
                place.marking().ok_or_else(|| FireError::UnsetMarking {
                    place: place.name().to_string(),
                })
            })
            .collect()
    }

    fn proposed_action(&self, transition: &Transition, dt: f64) -> Result<Action, FireError> {
        let dm = self.domain_marking(transition)?;
        let scaled = |scalar: f64| -> Vec<f64> {
            transition
                .stoichiometry()
                .expect("stoichiometric kinds carry coefficients")
                .iter()
                .map(|coefficient| coefficient * scalar)
                .collect()
        };
        let action = match transition.kernel() {
            Kernel::TimelessVec(f) => Action::Delta(self.checked_arity(transition, f(&dm))?),
            Kernel::TimelessScalar(f) => Action::Delta(scaled(f(&dm))),
            Kernel::TimedVec(f) => Action::Delta(self.checked_arity(transition, f(dt, &dm))?),
            Kernel::TimedScalar(f) => Action::Delta(scaled(f(dt, &dm))),
            Kernel::RateVec(f) => {
                let rates = self.checked_arity(transition, f(&dm))?;
                Action::Delta(rates.into_iter().map(|rate| rate * dt).collect())
            }
            Kernel::RateScalar(f) => Action::Delta(scaled(f(&dm) * dt)),
            Kernel::Assignment(f) => Action::Replace(self.checked_arity(transition, f(&dm))?),
        };
        Ok(action)
    }

    fn checked_arity(
        &self,
        transition: &Transition,
        values: Vec<f64>,
    ) -> Result<Vec<f64>, FireError> {
        if values.len() != transition.codomain().len() {
            return Err(FireError::KernelArity {
                transition: transition.name().to_string(),
                expected: transition.codomain().len(),
                got: values.len(),
            });
        }
        Ok(values)
    }

    fn validate_action(&self, transition: &Transition, action: &Action) -> Result<(), FireError> {
        match action {
            Action::Delta(deltas) => {
                for (&pid, &delta) in transition.codomain().iter().zip(deltas) {
                    let place = self
                        .places
                        .get(&pid)
                        .expect("net invariant: codomain places are members");
                    let current = place.marking().ok_or_else(|| FireError::UnsetMarking {
                        place: place.name().to_string(),
                    })?;
                    let proposed = current + delta;
                    if proposed < 0.0 && proposed < current {
                        return Err(FireError::Infeasible {
                            transition: transition.name().to_string(),
                            place: place.name().to_string(),
                            current,
                            proposed,
                        });
                    }
                    place.check_guards(proposed)?;
                }
            }
            Action::Replace(values) => {
                for (&pid, &value) in transition.codomain().iter().zip(values) {
                    let place = self
                        .places
                        .get(&pid)
                        .expect("net invariant: codomain places are members");
                    place.check_guards(value)?;
                }
            }
        }
        Ok(())
    }

    fn resolve_writes(
        &self,
        transition: &Transition,
        action: Action,
    ) -> Result<Vec<(PlaceId, f64)>, FireError> {
        match action {
            Action::Delta(deltas) => transition
                .codomain()
                .iter()
                .zip(deltas)
                .map(|(&pid, delta)| {
                    let place = self
                        .places
                        .get(&pid)
                        .expect("net invariant: codomain places are members");
                    let current = place.marking().ok_or_else(|| FireError::UnsetMarking {
                        place: place.name().to_string(),
                    })?;
                    Ok((pid, current + delta))
                })
                .collect(),
            Action::Replace(values) => Ok(transition
                .codomain()
                .iter()
                .zip(values)
                .map(|(&pid, value)| (pid, value))
                .collect()),
        }
    }
}
