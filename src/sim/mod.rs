//! # 仿真层：网的运行时映像
//!
//! [`Simulation`] 在构造时把 [`Net`](crate::net::Net) 快照为不可变映像：
//! 库所按处方划分为自由（free，由仿真推进）与钳制（clamped，恒为处方值）
//! 两类，迁移按类别装配为化学计量矩阵加逐迁移计算闭包。此后对源网的任何
//! 改动都不影响既有仿真。
//!
//! 每步在暂存向量上求出整步结果、通过全部守卫与可行性检验后才原子提交；
//! 采样钩子按 [`SamplingPolicy`] 把状态写入 [`Recording`]，
//! 支持地板/天花板/线性插值查询与 [`Simulation::reconstruct_at`] 重构。

pub mod matrix;
pub mod recording;
pub mod settings;
pub mod simulation;

pub use self::matrix::{Correspondence, Matrix};
pub use self::recording::{Event, IoError, Recorder, Recording, RecordingError, SamplingPolicy};
pub use self::settings::{Method, ParseMethodError, SimSettings};
pub use self::simulation::{
    ConsistencyError, FinalStep, Overrides, ReconstructError, Simulation, StepError,
    StoichCategory,
};
