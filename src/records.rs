//! Typed rows for the three sensor tables.

use chrono::NaiveDateTime;
use geo::{point, Point};
use serde::Serialize;

/// Fixed-location sensor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaticSensor {
    pub sensor_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub extra: Vec<String>,
}

/// One reading from a static sensor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaticReading {
    pub sensor_id: String,
    pub timestamp: NaiveDateTime,
    pub value: f64,
    pub units: String,
    pub extra: Vec<String>,
}

/// One reading from a mobile sensor, with its position at that moment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MobileReading {
    pub sensor_id: String,
    pub timestamp: NaiveDateTime,
    pub value: f64,
    pub units: String,
    pub user_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub extra: Vec<String>,
}

/// Common view over static and mobile readings used by cleaning and statistics.
pub trait Reading {
    fn sensor_id(&self) -> &str;
    fn timestamp(&self) -> NaiveDateTime;
    fn value(&self) -> f64;
}

impl Reading for StaticReading {
    fn sensor_id(&self) -> &str {
        &self.sensor_id
    }
    fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }
    fn value(&self) -> f64 {
        self.value
    }
}

impl Reading for MobileReading {
    fn sensor_id(&self) -> &str {
        &self.sensor_id
    }
    fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }
    fn value(&self) -> f64 {
        self.value
    }
}

impl<R: Reading + ?Sized> Reading for &R {
    fn sensor_id(&self) -> &str {
        (**self).sensor_id()
    }
    fn timestamp(&self) -> NaiveDateTime {
        (**self).timestamp()
    }
    fn value(&self) -> f64 {
        (**self).value()
    }
}

impl StaticSensor {
    /// Location as a geo point (x = longitude, y = latitude)
    pub fn location(&self) -> Point<f64> {
        point!(x: self.longitude, y: self.latitude)
    }
}

impl MobileReading {
    pub fn location(&self) -> Point<f64> {
        point!(x: self.longitude, y: self.latitude)
    }
}

/// A static reading joined with its sensor's location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocatedReading {
    pub sensor_id: String,
    pub timestamp: NaiveDateTime,
    pub value: f64,
    pub latitude: f64,
    pub longitude: f64,
}

impl LocatedReading {
    pub fn location(&self) -> Point<f64> {
        point!(x: self.longitude, y: self.latitude)
    }
}

impl Reading for LocatedReading {
    fn sensor_id(&self) -> &str {
        &self.sensor_id
    }
    fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }
    fn value(&self) -> f64 {
        self.value
    }
}

impl From<&MobileReading> for LocatedReading {
    fn from(r: &MobileReading) -> Self {
        Self {
            sensor_id: r.sensor_id.clone(),
            timestamp: r.timestamp,
            value: r.value,
            latitude: r.latitude,
            longitude: r.longitude,
        }
    }
}

/// Inner join of static readings with sensor locations on `sensor_id`.
/// Readings whose sensor has no location are dropped.
pub fn join_static_locations(
    readings: &[StaticReading],
    sensors: &[StaticSensor],
) -> Vec<LocatedReading> {
    let locations: std::collections::HashMap<&str, &StaticSensor> = sensors
        .iter()
        .map(|s| (s.sensor_id.as_str(), s))
        .collect();

    readings
        .iter()
        .filter_map(|r| {
            locations.get(r.sensor_id.as_str()).map(|s| LocatedReading {
                sensor_id: r.sensor_id.clone(),
                timestamp: r.timestamp,
                value: r.value,
                latitude: s.latitude,
                longitude: s.longitude,
            })
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::NaiveDate;

    pub fn ts(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 4, day)
            .and_then(|d| d.and_hms_opt(hour, minute, 0))
            .unwrap()
    }

    pub fn static_reading(sensor: &str, timestamp: NaiveDateTime, value: f64) -> StaticReading {
        StaticReading {
            sensor_id: sensor.to_string(),
            timestamp,
            value,
            units: "cpm".to_string(),
            extra: Vec::new(),
        }
    }

    pub fn mobile_reading(
        sensor: &str,
        timestamp: NaiveDateTime,
        value: f64,
        latitude: f64,
        longitude: f64,
    ) -> MobileReading {
        MobileReading {
            sensor_id: sensor.to_string(),
            timestamp,
            value,
            units: "cpm".to_string(),
            user_id: format!("user-{sensor}"),
            latitude,
            longitude,
            extra: Vec::new(),
        }
    }

    pub fn sensor(id: &str, latitude: f64, longitude: f64) -> StaticSensor {
        StaticSensor {
            sensor_id: id.to_string(),
            latitude,
            longitude,
            extra: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_join_drops_unknown_sensors() {
        let sensors = vec![sensor("1", 0.1, -119.9)];
        let readings = vec![
            static_reading("1", ts(6, 0, 0), 12.0),
            static_reading("9", ts(6, 0, 0), 14.0),
        ];

        let joined = join_static_locations(&readings, &sensors);
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].sensor_id, "1");
        assert_eq!(joined[0].longitude, -119.9);
    }

    #[test]
    fn test_location_axis_order() {
        let s = sensor("1", 0.2, -119.8);
        assert_eq!(s.location().x(), -119.8);
        assert_eq!(s.location().y(), 0.2);
    }
}
