//! InfluxDB line-protocol points

use std::collections::BTreeMap;
use std::fmt::Write;

/// Value of one field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    Boolean(bool),
    String(String),
}

impl FieldValue {
    /// Whether InfluxDB accepts the value (NaN and infinities are rejected).
    pub fn is_valid(&self) -> bool {
        match self {
            FieldValue::Float(v) => v.is_finite(),
            _ => true,
        }
    }

    fn write_to(&self, out: &mut String) {
        match self {
            FieldValue::Float(v) => {
                let _ = write!(out, "{}", v);
            }
            FieldValue::Integer(v) => {
                let _ = write!(out, "{}i", v);
            }
            FieldValue::Boolean(v) => out.push_str(if *v { "true" } else { "false" }),
            FieldValue::String(v) => {
                out.push('"');
                for ch in v.chars() {
                    if ch == '"' || ch == '\\' {
                        out.push('\\');
                    }
                    out.push(ch);
                }
                out.push('"');
            }
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::Float(v as f64)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

macro_rules! integer_field {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(v: $ty) -> Self {
                    FieldValue::Integer(v as i64)
                }
            }
        )*
    };
}

integer_field!(i8, i16, i32, i64, u8, u16, u32);

/// One measurement row.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    /// Nanoseconds since the Unix epoch; the server assigns one when absent
    pub timestamp: Option<i64>,
}

impl Point {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: None,
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn timestamp(mut self, nanos: i64) -> Self {
        self.timestamp = Some(nanos);
        self
    }

    /// Render as one line of line protocol, without the trailing newline.
    ///
    /// Invalid fields are skipped; a point left with no fields renders as
    /// `None`.
    pub fn to_line_protocol(&self) -> Option<String> {
        let mut fields = self.fields.iter().filter(|(_, value)| value.is_valid()).peekable();
        fields.peek()?;

        let mut line = String::with_capacity(64 + self.fields.len() * 24);
        escape_into(&mut line, &self.measurement, &[',', ' ']);
        for (key, value) in &self.tags {
            if value.is_empty() {
                continue;
            }
            line.push(',');
            escape_into(&mut line, key, &[',', '=', ' ']);
            line.push('=');
            escape_into(&mut line, value, &[',', '=', ' ']);
        }

        line.push(' ');
        for (i, (key, value)) in fields.enumerate() {
            if i > 0 {
                line.push(',');
            }
            escape_into(&mut line, key, &[',', '=', ' ']);
            line.push('=');
            value.write_to(&mut line);
        }

        if let Some(timestamp) = self.timestamp {
            let _ = write!(line, " {}", timestamp);
        }
        Some(line)
    }
}

fn escape_into(out: &mut String, text: &str, special: &[char]) {
    for ch in text.chars() {
        if special.contains(&ch) || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_tags_fields_and_timestamp() {
        let point = Point::new("attitude")
            .tag("category", "attitude")
            .tag("vehicle", "x500 alpha")
            .field("roll", 0.5f64)
            .field("armed", true)
            .field("clipping", 3u32)
            .timestamp(1_700_000_000_000_000_000);

        assert_eq!(
            point.to_line_protocol().as_deref(),
            Some(
                "attitude,category=attitude,vehicle=x500\\ alpha armed=true,clipping=3i,roll=0.5 1700000000000000000"
            )
        );
    }

    #[test]
    fn escapes_strings() {
        let point = Point::new("status,log").field("text", r#"say "hi" \o/"#);
        assert_eq!(
            point.to_line_protocol().as_deref(),
            Some(r#"status\,log text="say \"hi\" \\o/""#)
        );
    }

    #[test]
    fn non_finite_fields_are_skipped() {
        let point = Point::new("imu").field("xacc", f64::NAN).field("yacc", 1.25f64);
        assert_eq!(point.to_line_protocol().as_deref(), Some("imu yacc=1.25"));

        let empty = Point::new("imu").field("xacc", f32::INFINITY);
        assert_eq!(empty.to_line_protocol(), None);
    }
}
