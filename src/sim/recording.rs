//! 记录与插值：按事件索引的状态历史采样、查询与 CSV/JSON/RON 输出.
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use log::debug;
use serde::Serialize;
use thiserror::Error;

/// 采样值统一舍入到 5 位小数，约束浮点噪声与存储.
const PRECISION: f64 = 1e5;

/// 时间事件相等判定的容差.
const EVENT_EPS: f64 = 1e-9;

fn round_sample(value: f64) -> f64 {
    (value * PRECISION).round() / PRECISION
}

/// Event label of one recorded state: a step index for timeless runs, a time
/// for timed runs, or an explicit key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Event {
    Step(u64),
    Time(f64),
    Named(String),
}

impl Event {
    fn time(&self) -> Option<f64> {
        match self {
            Event::Time(t) => Some(*t),
            _ => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Step(n) => write!(f, "{n}"),
            Event::Time(t) => write!(f, "{t}"),
            Event::Named(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RecordingError {
    #[error("recording is not keyed by time; floor/ceiling/interpolation need timed events")]
    NotTimed,
    #[error("event {0} is not covered by the recording")]
    OutOfRange(f64),
    #[error("event {0} is not recorded")]
    MissingEvent(String),
    #[error("recording is empty")]
    Empty,
}

#[derive(Debug, Error)]
pub enum IoError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ron error: {0}")]
    Ron(#[from] ron::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// An append-only, insertion-ordered series of state samples, one row per
/// event, columns in place order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Recording {
    columns: Vec<String>,
    events: Vec<Event>,
    samples: Vec<Vec<f64>>,
}

impl Recording {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            events: Vec::new(),
            samples: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn samples(&self) -> &[Vec<f64>] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// 追加一条采样；各分量舍入到 5 位小数.
    pub fn push(&mut self, event: Event, sample: &[f64]) {
        debug_assert_eq!(sample.len(), self.columns.len());
        self.events.push(event);
        self.samples
            .push(sample.iter().map(|&v| round_sample(v)).collect());
    }

    pub fn last(&self) -> Option<(&Event, &[f64])> {
        self.events
            .last()
            .zip(self.samples.last().map(Vec::as_slice))
    }

    pub fn get(&self, event: &Event) -> Option<&[f64]> {
        self.events
            .iter()
            .position(|e| match (e, event) {
                (Event::Time(a), Event::Time(b)) => (a - b).abs() <= EVENT_EPS,
                (a, b) => a == b,
            })
            .map(|i| self.samples[i].as_slice())
    }

    fn timed_iter(&self) -> Result<impl Iterator<Item = (f64, &[f64])>, RecordingError> {
        if self.events.iter().any(|e| e.time().is_none()) {
            return Err(RecordingError::NotTimed);
        }
        Ok(self
            .events
            .iter()
            .zip(&self.samples)
            .map(|(e, s)| (e.time().expect("checked above"), s.as_slice())))
    }

    /// 不晚于 `t` 的最近记录事件.
    pub fn floor(&self, t: f64) -> Result<Option<(f64, &[f64])>, RecordingError> {
        let mut best: Option<(f64, &[f64])> = None;
        for (et, sample) in self.timed_iter()? {
            if et <= t + EVENT_EPS && best.is_none_or(|(bt, _)| et >= bt) {
                best = Some((et, sample));
            }
        }
        Ok(best)
    }

    /// 不早于 `t` 的最近记录事件.
    pub fn ceiling(&self, t: f64) -> Result<Option<(f64, &[f64])>, RecordingError> {
        let mut best: Option<(f64, &[f64])> = None;
        for (et, sample) in self.timed_iter()? {
            if et >= t - EVENT_EPS && best.is_none_or(|(bt, _)| et <= bt) {
                best = Some((et, sample));
            }
        }
        Ok(best)
    }

    /// 精确命中返回原记录，否则对 floor/ceiling 逐分量线性插值.
    pub fn interpolate(&self, t: f64) -> Result<Vec<f64>, RecordingError> {
        if self.is_empty() {
            return Err(RecordingError::Empty);
        }
        if let Some(sample) = self.get(&Event::Time(t)) {
            return Ok(sample.to_vec());
        }
        let (t0, lower) = self.floor(t)?.ok_or(RecordingError::OutOfRange(t))?;
        let (t1, upper) = self.ceiling(t)?.ok_or(RecordingError::OutOfRange(t))?;
        let ratio = (t - t0) / (t1 - t0);
        Ok(lower
            .iter()
            .zip(upper)
            .map(|(a, b)| a + ratio * (b - a))
            .collect())
    }

    /// 截取 `[from, to]` 时间窗内的记录.
    pub fn slice(&self, from: f64, to: f64) -> Result<Recording, RecordingError> {
        let mut out = Recording::new(self.columns.clone());
        for (et, sample) in self.timed_iter()? {
            if et >= from - EVENT_EPS && et <= to + EVENT_EPS {
                out.events.push(Event::Time(et));
                out.samples.push(sample.to_vec());
            }
        }
        Ok(out)
    }

    /// CSV 序列化：每行 `event,value1,value2,...`，表头可选.
    pub fn to_csv(&self, header: bool) -> String {
        let mut out = String::new();
        if header {
            out.push_str("event");
            for column in &self.columns {
                out.push(',');
                out.push_str(column);
            }
            out.push('\n');
        }
        for (event, sample) in self.events.iter().zip(&self.samples) {
            out.push_str(&event.to_string());
            for value in sample {
                out.push(',');
                out.push_str(&value.to_string());
            }
            out.push('\n');
        }
        out
    }

    pub fn write_csv<P: AsRef<Path>>(&self, path: P, header: bool) -> Result<(), IoError> {
        let mut file = File::create(path)?;
        file.write_all(self.to_csv(header).as_bytes())?;
        Ok(())
    }

    pub fn to_json_string(&self) -> Result<String, IoError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<(), IoError> {
        let mut file = File::create(path)?;
        file.write_all(self.to_json_string()?.as_bytes())?;
        Ok(())
    }

    pub fn to_ron_string(&self) -> Result<String, IoError> {
        let mut pretty = ron::ser::PrettyConfig::default();
        pretty.new_line = "\n".into();
        Ok(ron::ser::to_string_pretty(self, pretty)?)
    }
}

/// Sampling policy of the state-change hook.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplingPolicy {
    /// 每步必采（"sample at every occasion"）.
    EveryStep,
    /// 按固定周期采样（时间制为时间周期，无时间制为步数周期）.
    Period(f64),
}

/// The state-change hook: decides after each committed step whether the
/// current marking is sampled into the recording.
#[derive(Debug, Clone)]
pub struct Recorder {
    recording: Recording,
    policy: SamplingPolicy,
    next_sample_at: f64,
}

impl Recorder {
    pub fn new(columns: Vec<String>, policy: SamplingPolicy, start_clock: f64) -> Self {
        let mut recorder = Self {
            recording: Recording::new(columns),
            policy,
            next_sample_at: 0.0,
        };
        recorder.restart(start_clock);
        recorder
    }

    pub fn recording(&self) -> &Recording {
        &self.recording
    }

    pub fn into_recording(self) -> Recording {
        self.recording
    }

    pub fn policy(&self) -> SamplingPolicy {
        self.policy
    }

    /// 清空历史并重置采样时钟（不含初始采样，初始状态由调用方显式采样）.
    pub fn restart(&mut self, start_clock: f64) {
        self.recording.events.clear();
        self.recording.samples.clear();
        self.next_sample_at = match self.policy {
            SamplingPolicy::EveryStep => start_clock,
            SamplingPolicy::Period(period) => start_clock + period,
        };
    }

    /// 无条件采样当前状态.
    pub fn sample_now(&mut self, event: Event, marking: &[f64]) {
        debug!("recorder: sample at {event}");
        self.recording.push(event, marking);
    }

    /// 步后钩子：按策略决定是否采样. `eps` 为时钟比较容差（通常取半步长）.
    pub fn note_step(&mut self, clock: f64, eps: f64, event: Event, marking: &[f64]) {
        match self.policy {
            SamplingPolicy::EveryStep => self.sample_now(event, marking),
            SamplingPolicy::Period(period) => {
                if clock + eps >= self.next_sample_at {
                    self.sample_now(event, marking);
                    while self.next_sample_at <= clock + eps {
                        self.next_sample_at += period;
                    }
                }
            }
        }
    }
}
