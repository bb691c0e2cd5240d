//! Append-only event log written by the engine.
//!
//! Per step the engine appends, in order: one [`StepRecord`], every
//! [`SensorReadingRecord`], every [`ControlActionRecord`], then every
//! [`FaultEventRecord`]. A [`RunRecord`] is appended when the run starts and
//! again, with its end time and step count filled in, when it is finalized.

use crate::config::SimulationConfig;
use crate::controller::ControlAction;
use crate::fault::{AlertLevel, FaultEvent, FaultType};
use crate::sensors::SensorReading;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("log sink I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode log record: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub scenario_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_steps: u64,
    pub config: SimulationConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub run_id: Uuid,
    pub step_id: String,
    pub step_index: u64,
    pub timestamp: DateTime<Utc>,
}

impl StepRecord {
    pub fn step_id(run_id: Uuid, step_index: u64) -> String {
        format!("{}_{}", run_id, step_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorReadingRecord {
    pub step_id: String,
    pub sensor_kind: String,
    pub sensor_name: String,
    pub encoded_value: String,
    pub is_fault: bool,
}

impl SensorReadingRecord {
    pub fn new(step_id: &str, reading: &SensorReading) -> Result<Self, SinkError> {
        Ok(Self {
            step_id: step_id.to_string(),
            sensor_kind: reading.kind().as_str().to_string(),
            sensor_name: reading.name(),
            encoded_value: reading.value.encode()?,
            is_fault: reading.is_fault,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlActionRecord {
    pub step_id: String,
    pub controller: String,
    pub action_type: String,
    pub target: String,
    pub command: String,
    pub success: bool,
}

impl ControlActionRecord {
    pub fn new(step_id: &str, action: &ControlAction) -> Self {
        Self {
            step_id: step_id.to_string(),
            controller: action.controller.to_string(),
            action_type: action.action_type.as_str().to_string(),
            target: action.target.to_string(),
            command: action.command.clone(),
            success: action.success,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultEventRecord {
    pub step_id: String,
    pub fault_id: u64,
    pub fault_type: FaultType,
    pub alert_level: AlertLevel,
    pub description: String,
    pub affected_component: String,
    pub detected_at: u64,
    pub resolved_at: Option<u64>,
}

impl FaultEventRecord {
    pub fn new(step_id: &str, fault: &FaultEvent) -> Self {
        Self {
            step_id: step_id.to_string(),
            fault_id: fault.id,
            fault_type: fault.fault_type,
            alert_level: fault.alert_level,
            description: fault.description.clone(),
            affected_component: fault.affected_component.clone(),
            detected_at: fault.detected_at,
            resolved_at: fault.resolved_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum LogRecord {
    RunStarted(RunRecord),
    Step(StepRecord),
    SensorReading(SensorReadingRecord),
    ControlAction(ControlActionRecord),
    FaultEvent(FaultEventRecord),
    RunFinalized(RunRecord),
}

pub trait LogSink {
    fn append(&mut self, record: LogRecord) -> Result<(), SinkError>;

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<S: LogSink + ?Sized> LogSink for &mut S {
    fn append(&mut self, record: LogRecord) -> Result<(), SinkError> {
        (**self).append(record)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        (**self).flush()
    }
}

/// Keeps every record in memory, in append order.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Vec<LogRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn steps(&self) -> impl Iterator<Item = &StepRecord> {
        self.records.iter().filter_map(|r| match r {
            LogRecord::Step(step) => Some(step),
            _ => None,
        })
    }

    pub fn sensor_readings(&self) -> impl Iterator<Item = &SensorReadingRecord> {
        self.records.iter().filter_map(|r| match r {
            LogRecord::SensorReading(reading) => Some(reading),
            _ => None,
        })
    }

    pub fn control_actions(&self) -> impl Iterator<Item = &ControlActionRecord> {
        self.records.iter().filter_map(|r| match r {
            LogRecord::ControlAction(action) => Some(action),
            _ => None,
        })
    }

    pub fn fault_events(&self) -> impl Iterator<Item = &FaultEventRecord> {
        self.records.iter().filter_map(|r| match r {
            LogRecord::FaultEvent(fault) => Some(fault),
            _ => None,
        })
    }

    /// Latest run record: the finalized one if present, else the start record.
    pub fn run(&self) -> Option<&RunRecord> {
        self.records.iter().rev().find_map(|r| match r {
            LogRecord::RunStarted(run) | LogRecord::RunFinalized(run) => Some(run),
            _ => None,
        })
    }
}

impl LogSink for MemorySink {
    fn append(&mut self, record: LogRecord) -> Result<(), SinkError> {
        self.records.push(record);
        Ok(())
    }
}

/// Writes one JSON object per line.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: u64,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> LogSink for JsonLinesSink<W> {
    fn append(&mut self, record: LogRecord) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::{DeviceId, ReadingValue};

    #[test]
    fn test_json_lines_are_tagged() {
        let mut sink = JsonLinesSink::new(Vec::new());
        let reading = SensorReading {
            device: DeviceId::spot(4),
            value: ReadingValue::Flag(true),
            is_fault: true,
        };
        sink.append(LogRecord::SensorReading(SensorReadingRecord::new("run_1", &reading).unwrap()))
            .unwrap();

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let line: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(line["record"], "sensor_reading");
        assert_eq!(line["sensor_kind"], "occupancy");
        assert_eq!(line["sensor_name"], "spot_4");
        assert_eq!(line["encoded_value"], "true");
        assert_eq!(line["is_fault"], true);
    }

    #[test]
    fn test_memory_sink_filters_by_record_kind() {
        let mut sink = MemorySink::new();
        let run_id = Uuid::nil();
        sink.append(LogRecord::Step(StepRecord {
            run_id,
            step_id: StepRecord::step_id(run_id, 1),
            step_index: 1,
            timestamp: Utc::now(),
        }))
        .unwrap();

        assert_eq!(sink.steps().count(), 1);
        assert_eq!(sink.fault_events().count(), 0);
        assert_eq!(
            sink.steps().next().unwrap().step_id,
            "00000000-0000-0000-0000-000000000000_1"
        );
    }
}
