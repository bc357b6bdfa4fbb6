//! # 混合 Petri 网核心定义（Hybrid Place/Transition Net）
//!
//! 设库所集合 `P`（标记取实数值）与迁移集合 `T`。每个迁移 `t ∈ T` 具有
//! 有序读集 `dom(t) ⊆ P` 与有序写集 `cod(t) ⊆ P`，并按三个布尔特征分类：
//! 计量的（S/s）、带速率的（R/r，速率蕴含时间性）、时间的（T/t）。
//! 合法组合为 `ts`、`tS`、`Tsr`、`TSr`、`sR`、`SR`，外加正交的赋值类 `A`
//! （无时间、无计量，动作*替换*写集标记而非增量）。
//!
//! * 动作语义：无速率迁移求值 `f(M|dom)`（无时间）或 `f(Δt, M|dom)`（时间），
//!   计量迁移的标量结果与计量向量相乘得到逐库所增量，非计量迁移
//!   逐写集库所各返回一个值；带速率迁移在区间 `Δt` 上的动作为
//!   `rate(M|dom) · Δt`；赋值迁移恒可发生且直接写入；
//! * 非赋值迁移 **可发生** 当且仅当对写集中每个库所 `p`，
//!   `guard_p(M[p] + δ[p])` 成立且结果可行（不跌破零），其中 `δ` 为拟议增量；
//! * 发生受两态机关控制：`uncocked → cocked →（发生消耗机关）`。
//!   [`Net::fire`] 为软发生（未上膛时为空操作），
//!   [`Net::fire_unconditionally`] 绕过机关直接施加动作；
//! * 递归传播（[`Net::fire_upstream_recursively`] /
//!   [`Net::fire_downstream_recursively`]）沿弧图游走，显式 visited
//!   集保证环上终止。
//!
//! ## 示例
//!
//! ```rust
//! use RustHPN::net::{Net, Place, Transition};
//!
//! let mut net = Net::new();
//! let a = net.include_place(Place::new("a").with_default(2.0));
//! let b = net.include_place(Place::new("b").with_default(0.0));
//! let mv = Transition::timeless_stoichiometric("move", &[a], &[(a, -1.0), (b, 1.0)], |_| 1.0)
//!     .unwrap();
//! let mv = net.include_transition(mv).unwrap();
//!
//! net.cock(mv).unwrap();
//! assert!(net.fire(mv, 0.0).unwrap());
//! assert_eq!(net.place(a).unwrap().marking(), Some(1.0));
//!
//! // 机关已消耗，软发生为空操作
//! assert!(!net.fire(mv, 0.0).unwrap());
//! ```

pub mod core;
pub mod guard;
pub mod ids;
pub mod place;
pub mod transition;

pub use self::core::{FireError, Net, NetError};
pub use self::guard::{Guard, GuardError};
pub use self::ids::{PlaceId, TransitionId};
pub use self::place::Place;
pub use self::transition::{Cocking, ConstructionError, Kernel, Transition, TransitionKind};
