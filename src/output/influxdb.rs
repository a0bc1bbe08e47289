//! InfluxDB line protocol output formatter.

use crate::measurement::Measurement;
use crate::output::OutputFormatter;
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

/// Field values for InfluxDB line protocol
#[derive(Debug, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::Float(num) => write!(f, "{num}"),
            FieldValue::Integer(num) => write!(f, "{num}i"),
        }
    }
}

/// Data point in InfluxDB line protocol
#[derive(Debug)]
pub struct DataPoint {
    pub measurement: String,
    pub tag_set: BTreeMap<String, String>,
    pub field_set: BTreeMap<String, FieldValue>,
    pub timestamp: Option<SystemTime>,
}

/// Escape commas, equals signs and spaces in a tag value.
fn escape_tag(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, ',' | '=' | ' ') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn fmt_tags(data_point: &DataPoint, fmt: &mut fmt::Formatter) -> fmt::Result {
    for (key, value) in data_point.tag_set.iter() {
        write!(fmt, ",{}={}", key, escape_tag(value))?;
    }
    Ok(())
}

fn fmt_fields(data_point: &DataPoint, fmt: &mut fmt::Formatter) -> fmt::Result {
    let mut first = true;
    for (key, value) in data_point.field_set.iter() {
        if first {
            first = false;
        } else {
            write!(fmt, ",")?;
        }
        write!(fmt, "{}={}", key, value)?;
    }
    Ok(())
}

fn fmt_timestamp(data_point: &DataPoint, fmt: &mut fmt::Formatter) -> fmt::Result {
    if let Some(nanos) = data_point
        .timestamp
        .and_then(|time| time.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|duration| duration.as_nanos())
    {
        write!(fmt, " {}", nanos)?;
    }
    Ok(())
}

impl fmt::Display for DataPoint {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.measurement)?;
        fmt_tags(self, fmt)?;
        write!(fmt, " ")?;
        fmt_fields(self, fmt)?;
        fmt_timestamp(self, fmt)
    }
}

/// InfluxDB line protocol formatter.
///
/// Tags: `mac`, and `name` (falls back to the MAC when the device has no
/// name). Humidity is written as a fraction (0-1), battery potential in Volts.
pub struct InfluxDbFormatter {
    measurement_name: String,
}

impl InfluxDbFormatter {
    pub fn new(measurement_name: String) -> Self {
        Self { measurement_name }
    }

    #[inline]
    fn humidity_fraction(percent: f64) -> f64 {
        percent / 100.0
    }

    fn tag_set(&self, m: &Measurement, name: Option<&str>) -> BTreeMap<String, String> {
        let mac = m.mac.to_string();
        let name = name.map_or_else(|| mac.clone(), str::to_string);

        let mut tags = BTreeMap::new();
        tags.insert("mac".to_string(), mac);
        tags.insert("name".to_string(), name);
        tags
    }

    fn field_set(&self, m: &Measurement) -> BTreeMap<String, FieldValue> {
        let mut fields = BTreeMap::new();

        macro_rules! add {
            ($name:literal, $val:expr) => {
                fields.insert($name.into(), $val);
            };
        }

        add!("temperature", FieldValue::Float(m.temperature));
        add!(
            "humidity",
            FieldValue::Float(Self::humidity_fraction(m.humidity))
        );
        add!("battery_potential", FieldValue::Float(m.battery_voltage));
        add!(
            "battery_percent",
            FieldValue::Integer(i64::from(m.battery_percent))
        );
        add!("frame_counter", FieldValue::Integer(i64::from(m.frame_counter)));
        add!("flags", FieldValue::Integer(i64::from(m.flags.bits())));

        if let Some(rssi) = m.rssi {
            add!("rssi", FieldValue::Integer(i64::from(rssi)));
        }

        fields
    }

    fn to_data_point(&self, m: &Measurement, name: Option<&str>) -> DataPoint {
        DataPoint {
            measurement: self.measurement_name.clone(),
            tag_set: self.tag_set(m, name),
            field_set: self.field_set(m),
            timestamp: Some(m.timestamp),
        }
    }
}

impl OutputFormatter for InfluxDbFormatter {
    fn format(&self, measurement: &Measurement, name: Option<&str>) -> String {
        self.to_data_point(measurement, name).to_string()
    }
}
