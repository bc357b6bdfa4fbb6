//! # RustHPN — 混合 Petri 网仿真引擎
//!
//! 面向反应网络的混合（连续/离散、时间/无时间）Petri 网执行引擎：
//! 库所（Place）持有数值标记（marking），迁移（Transition）按守卫约束
//! 在库所之间搬运或替换标记；仿真（Simulation）将网快照为不可变的
//! 运行时映像，装配化学计量矩阵与逐迁移计算闭包，按选定的 Euler 变体
//! 推进标记向量并采样历史。
//!
//! 分层：
//! * [`net`] — 静态结构与手动令牌博弈（库所、迁移分类、守卫、机关状态机）；
//! * [`sim`] — 运行时映像（自由/钳制划分、化学计量与对应矩阵）、
//!   步进循环、记录与插值重构。
//!
//! ## 示例
//!
//! ```rust
//! use RustHPN::net::{Net, Place, Transition};
//! use RustHPN::sim::{SimSettings, Simulation};
//!
//! let mut net = Net::new();
//! let a = net.include_place(Place::new("A").with_default(5.0));
//! let b = net.include_place(Place::new("B").with_default(0.0));
//! let decay = Transition::with_flux("decay", &[a], &[(a, -1.0), (b, 1.0)], |m| 0.5 * m[0])
//!     .unwrap();
//! net.include_transition(decay).unwrap();
//!
//! let settings = SimSettings {
//!     step_size: 0.1,
//!     time_end: 1.0,
//!     ..SimSettings::default()
//! };
//! let mut sim = Simulation::new(&net, settings, &[], &[]).unwrap();
//! sim.run().unwrap();
//!
//! assert!(sim.marking_of("A").unwrap() < 5.0);
//! assert!(sim.marking_of("B").unwrap() > 0.0);
//! ```

pub mod net;
pub mod sim;
