//! Tabular result frames and their JSON wire encoding
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{DatasourceError, Result};
use crate::query::TimeRange;

/// Name given to every frame this datasource produces
pub const RESPONSE_FRAME: &str = "response";

/// The two magnitudes the synthetic values alternate between
pub const LOW_VALUE: i64 = 10;
pub const HIGH_VALUE: i64 = 20;

/// Column values of a single field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValues {
    Time(Vec<DateTime<Utc>>),
    Int64(Vec<i64>),
}

impl FieldValues {
    pub fn len(&self) -> usize {
        match self {
            FieldValues::Time(v) => v.len(),
            FieldValues::Int64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn type_name(&self) -> &'static str {
        match self {
            FieldValues::Time(_) => "time",
            FieldValues::Int64(_) => "number",
        }
    }

    fn frame_type(&self) -> &'static str {
        match self {
            FieldValues::Time(_) => "time.Time",
            FieldValues::Int64(_) => "int64",
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValues::Time(v) => v.iter().map(|t| t.timestamp_millis()).collect(),
            FieldValues::Int64(v) => v.iter().copied().collect(),
        }
    }
}

/// A named column
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub values: FieldValues,
}

impl Field {
    pub fn new(name: impl Into<String>, values: FieldValues) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Overwrite the time value at `idx`
    pub fn set_time(&mut self, idx: usize, value: DateTime<Utc>) -> Result<()> {
        match &mut self.values {
            FieldValues::Time(v) => {
                let slot = v.get_mut(idx).ok_or_else(|| out_of_range(&self.name, idx))?;
                *slot = value;
                Ok(())
            }
            other => Err(type_mismatch(&self.name, "time", other.type_name())),
        }
    }

    /// Overwrite the integer value at `idx`
    pub fn set_int64(&mut self, idx: usize, value: i64) -> Result<()> {
        match &mut self.values {
            FieldValues::Int64(v) => {
                let slot = v.get_mut(idx).ok_or_else(|| out_of_range(&self.name, idx))?;
                *slot = value;
                Ok(())
            }
            other => Err(type_mismatch(&self.name, "number", other.type_name())),
        }
    }
}

fn out_of_range(field: &str, idx: usize) -> DatasourceError {
    DatasourceError::Frame(format!("index {} out of range for field '{}'", idx, field))
}

fn type_mismatch(field: &str, wanted: &str, actual: &str) -> DatasourceError {
    DatasourceError::Frame(format!(
        "field '{}' holds {} values, not {}",
        field, actual, wanted
    ))
}

/// Optional frame annotations
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameMeta {
    /// Live channel the client should subscribe to for updates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

/// An ordered collection of equal-length columns
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub name: String,
    pub fields: Vec<Field>,
    pub meta: Option<FrameMeta>,
}

impl Frame {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            meta: None,
        }
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn set_meta(&mut self, meta: FrameMeta) {
        self.meta = Some(meta);
    }

    pub fn channel(&self) -> Option<&str> {
        self.meta.as_ref().and_then(|m| m.channel.as_deref())
    }

    /// Number of rows, i.e. the length of the first column
    pub fn rows(&self) -> usize {
        self.fields.first().map_or(0, Field::len)
    }

    pub fn field_mut(&mut self, idx: usize) -> Result<&mut Field> {
        let name = self.name.clone();
        self.fields
            .get_mut(idx)
            .ok_or_else(|| DatasourceError::Frame(format!("frame '{}' has no field {}", name, idx)))
    }

    /// Check that all columns have the same length
    pub fn validate(&self) -> Result<()> {
        let rows = self.rows();
        match self.fields.iter().find(|f| f.len() != rows) {
            Some(field) => Err(DatasourceError::Frame(format!(
                "field '{}' has {} rows, expected {}",
                field.name,
                field.len(),
                rows
            ))),
            None => Ok(()),
        }
    }

    /// Encode the frame as schema + data JSON
    pub fn to_json(&self) -> Result<Vec<u8>> {
        self.validate()?;

        let wire = WireFrame {
            schema: WireSchema {
                name: &self.name,
                meta: self.meta.as_ref(),
                fields: self
                    .fields
                    .iter()
                    .map(|f| WireField {
                        name: &f.name,
                        kind: f.values.type_name(),
                        type_info: WireTypeInfo {
                            frame: f.values.frame_type(),
                        },
                    })
                    .collect(),
            },
            data: WireData {
                values: self.fields.iter().map(|f| f.values.to_json()).collect(),
            },
        };

        Ok(serde_json::to_vec(&wire)?)
    }
}

#[derive(Serialize)]
struct WireFrame<'a> {
    schema: WireSchema<'a>,
    data: WireData,
}

#[derive(Serialize)]
struct WireSchema<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<&'a FrameMeta>,
    fields: Vec<WireField<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireField<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    type_info: WireTypeInfo,
}

#[derive(Serialize)]
struct WireTypeInfo {
    frame: &'static str,
}

#[derive(Serialize)]
struct WireData {
    values: Vec<serde_json::Value>,
}

/// Build the query result frame: the range bounds and two fixed values
pub fn response_frame(range: &TimeRange) -> Frame {
    Frame::new(RESPONSE_FRAME)
        .with_field(Field::new("time", FieldValues::Time(vec![range.from, range.to])))
        .with_field(Field::new(
            "values",
            FieldValues::Int64(vec![LOW_VALUE, HIGH_VALUE]),
        ))
}

/// Build the single-row frame refreshed on every stream tick
pub fn stream_frame() -> Frame {
    Frame::new(RESPONSE_FRAME)
        .with_field(Field::new("time", FieldValues::Time(vec![DateTime::<Utc>::UNIX_EPOCH])))
        .with_field(Field::new("values", FieldValues::Int64(vec![0])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn range() -> TimeRange {
        TimeRange {
            from: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            to: Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_response_frame_shape() {
        let frame = response_frame(&range());
        assert_eq!(frame.fields.len(), 2);
        assert_eq!(frame.rows(), 2);
        frame.validate().unwrap();
        assert_eq!(
            frame.fields[0].values,
            FieldValues::Time(vec![range().from, range().to])
        );
        assert_eq!(frame.fields[1].values, FieldValues::Int64(vec![10, 20]));
        assert!(frame.channel().is_none());
    }

    #[test]
    fn test_setters_check_type_and_index() {
        let mut frame = stream_frame();
        frame.field_mut(1).unwrap().set_int64(0, 20).unwrap();
        assert!(frame.field_mut(1).unwrap().set_int64(1, 20).is_err());
        assert!(frame.field_mut(0).unwrap().set_int64(0, 20).is_err());
        assert!(frame.field_mut(2).is_err());
    }

    #[test]
    fn test_unequal_columns_rejected() {
        let frame = Frame::new("bad")
            .with_field(Field::new("a", FieldValues::Int64(vec![1, 2])))
            .with_field(Field::new("b", FieldValues::Int64(vec![1])));
        assert!(frame.validate().is_err());
        assert!(frame.to_json().is_err());
    }

    #[test]
    fn test_json_encoding() {
        let mut frame = response_frame(&range());
        frame.set_meta(FrameMeta {
            channel: Some("ds/7/stream".to_string()),
        });

        let json: serde_json::Value = serde_json::from_slice(&frame.to_json().unwrap()).unwrap();
        assert_eq!(json["schema"]["name"], "response");
        assert_eq!(json["schema"]["meta"]["channel"], "ds/7/stream");
        assert_eq!(json["schema"]["fields"][0]["type"], "time");
        assert_eq!(json["schema"]["fields"][1]["typeInfo"]["frame"], "int64");
        assert_eq!(
            json["data"]["values"][0][0],
            range().from.timestamp_millis()
        );
        assert_eq!(json["data"]["values"][1], serde_json::json!([10, 20]));
    }
}
