//! 仿真设置：步长、采样周期、时间范围与步进方法选择.
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Step strategy: when timeless transitions are interleaved relative to the
/// timed integration tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// 无时间与时间贡献合并为单次同时增量（规范算法）.
    #[default]
    PseudoEuler,
    /// 先施加无时间贡献，时间刻度随后观察其效果.
    QuasiEuler,
    /// 先施加时间刻度，无时间贡献随后观察其效果.
    EulerThenTimeless,
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown simulation method `{0}`; expected pseudo_euler, quasi_euler or euler_then_timeless")]
pub struct ParseMethodError(String);

impl FromStr for Method {
    type Err = ParseMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pseudo_euler" => Ok(Method::PseudoEuler),
            "quasi_euler" => Ok(Method::QuasiEuler),
            "euler_then_timeless" => Ok(Method::EulerThenTimeless),
            other => Err(ParseMethodError(other.to_string())),
        }
    }
}

/// Simulation configuration with documented defaults
/// (`step = 0.02, sampling = 2, time = 0..60, method = pseudo_euler`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimSettings {
    #[serde(default = "default_step_size")]
    pub step_size: f64,
    #[serde(default = "default_sampling_period")]
    pub sampling_period: f64,
    #[serde(default = "default_time_start")]
    pub time_start: f64,
    #[serde(default = "default_time_end")]
    pub time_end: f64,
    #[serde(default)]
    pub method: Method,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            step_size: default_step_size(),
            sampling_period: default_sampling_period(),
            time_start: default_time_start(),
            time_end: default_time_end(),
            method: Method::default(),
        }
    }
}

impl SimSettings {
    /// 自 TOML 文件加载；文件缺失时返回缺省设置.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {:?}", path))?;
        let settings: SimSettings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {:?}", path))?;
        Ok(settings)
    }
}

fn default_step_size() -> f64 {
    0.02
}

fn default_sampling_period() -> f64 {
    2.0
}

fn default_time_start() -> f64 {
    0.0
}

fn default_time_end() -> f64 {
    60.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_documented_values() {
        let s = SimSettings::default();
        assert_eq!(s.step_size, 0.02);
        assert_eq!(s.sampling_period, 2.0);
        assert_eq!(s.time_start, 0.0);
        assert_eq!(s.time_end, 60.0);
        assert_eq!(s.method, Method::PseudoEuler);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let s: SimSettings = toml::from_str("step_size = 0.1\nmethod = \"quasi_euler\"").unwrap();
        assert_eq!(s.step_size, 0.1);
        assert_eq!(s.method, Method::QuasiEuler);
        assert_eq!(s.sampling_period, 2.0);
        assert_eq!(s.time_end, 60.0);
    }

    #[test]
    fn toml_round_trip() {
        let s = SimSettings {
            step_size: 0.5,
            method: Method::EulerThenTimeless,
            ..SimSettings::default()
        };
        let text = toml::to_string(&s).unwrap();
        assert_eq!(toml::from_str::<SimSettings>(&text).unwrap(), s);
    }

    #[test]
    fn method_from_str() {
        assert_eq!("pseudo_euler".parse::<Method>().unwrap(), Method::PseudoEuler);
        assert_eq!("quasi_euler".parse::<Method>().unwrap(), Method::QuasiEuler);
        assert_eq!(
            "euler_then_timeless".parse::<Method>().unwrap(),
            Method::EulerThenTimeless
        );
        assert!("midpoint".parse::<Method>().is_err());
    }
}
