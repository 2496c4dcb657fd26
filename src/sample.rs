//! Synthetic CNC telemetry readings.

use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use serde::{Serialize, Serializer};

pub const SPINDLE_RPM: (u32, u32) = (800, 12_000);
pub const SPINDLE_TEMP_C: (f64, f64) = (40.0, 75.0);
pub const MOTOR_LOAD_PCT: (f64, f64) = (30.0, 80.0);
pub const VIBRATION_MM_S: (f64, f64) = (0.01, 0.2);
pub const POWER_KW: (f64, f64) = (2.5, 8.0);
pub const COOLANT_FLOW_L_MIN: (f64, f64) = (1.5, 4.0);
pub const CYCLE_TIME_SEC: (u32, u32) = (15, 300);

pub const TOOL_IDS: [&str; 6] = ["TOOL-A", "TOOL-B", "TOOL-C", "TOOL-D", "TOOL-E", "TOOL-F"];

/// One reading from a simulated machine. Immutable once generated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CncSample {
    pub machine_id: String,
    pub spindle_rpm: u32,
    pub spindle_temp: f64,
    pub motor_load: f64,
    pub vibration_x: f64,
    pub vibration_y: f64,
    pub power_consumption: f64,
    pub coolant_flow: f64,
    pub cycle_time_sec: u32,
    pub tool_id: &'static str,
    #[serde(serialize_with = "serialize_rfc3339_secs")]
    pub timestamp: DateTime<Utc>,
}

impl CncSample {
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Draws a fresh reading for `machine_id` from the thread-local RNG and the wall clock.
pub fn generate(machine_id: &str) -> CncSample {
    generate_with(&mut rand::thread_rng(), machine_id, Utc::now())
}

pub fn generate_with<R: Rng + ?Sized>(
    rng: &mut R,
    machine_id: &str,
    now: DateTime<Utc>,
) -> CncSample {
    CncSample {
        machine_id: machine_id.to_string(),
        spindle_rpm: rng.gen_range(SPINDLE_RPM.0..=SPINDLE_RPM.1),
        spindle_temp: rng.gen_range(SPINDLE_TEMP_C.0..=SPINDLE_TEMP_C.1),
        motor_load: rng.gen_range(MOTOR_LOAD_PCT.0..=MOTOR_LOAD_PCT.1),
        vibration_x: rng.gen_range(VIBRATION_MM_S.0..=VIBRATION_MM_S.1),
        vibration_y: rng.gen_range(VIBRATION_MM_S.0..=VIBRATION_MM_S.1),
        power_consumption: rng.gen_range(POWER_KW.0..=POWER_KW.1),
        coolant_flow: rng.gen_range(COOLANT_FLOW_L_MIN.0..=COOLANT_FLOW_L_MIN.1),
        cycle_time_sec: rng.gen_range(CYCLE_TIME_SEC.0..=CYCLE_TIME_SEC.1),
        tool_id: TOOL_IDS[rng.gen_range(0..TOOL_IDS.len())],
        timestamp: now,
    }
}

fn serialize_rfc3339_secs<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::Value as JsonValue;

    fn within<T: PartialOrd>(value: T, (lo, hi): (T, T)) -> bool {
        value >= lo && value <= hi
    }

    #[test]
    fn every_field_stays_in_range() {
        for _ in 0..10_000 {
            let sample = generate("CNC-1");
            assert!(within(sample.spindle_rpm, SPINDLE_RPM), "{sample:?}");
            assert!(within(sample.spindle_temp, SPINDLE_TEMP_C), "{sample:?}");
            assert!(within(sample.motor_load, MOTOR_LOAD_PCT), "{sample:?}");
            assert!(within(sample.vibration_x, VIBRATION_MM_S), "{sample:?}");
            assert!(within(sample.vibration_y, VIBRATION_MM_S), "{sample:?}");
            assert!(within(sample.power_consumption, POWER_KW), "{sample:?}");
            assert!(within(sample.coolant_flow, COOLANT_FLOW_L_MIN), "{sample:?}");
            assert!(within(sample.cycle_time_sec, CYCLE_TIME_SEC), "{sample:?}");
            assert!(TOOL_IDS.contains(&sample.tool_id), "{sample:?}");
            assert_eq!(sample.machine_id, "CNC-1");
        }
    }

    #[test]
    fn seeded_rng_covers_every_tool() {
        let mut rng = StdRng::seed_from_u64(7);
        let now = Utc::now();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1_000 {
            seen.insert(generate_with(&mut rng, "CNC-2", now).tool_id);
        }
        assert_eq!(seen.len(), TOOL_IDS.len());
    }

    #[test]
    fn wire_format_matches_ingest_schema() {
        let mut rng = StdRng::seed_from_u64(42);
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let sample = generate_with(&mut rng, "CNC-MQTT-3", now);

        let value: JsonValue = serde_json::from_slice(&sample.to_json().unwrap()).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 11);
        assert_eq!(obj["machine_id"], "CNC-MQTT-3");
        assert_eq!(obj["timestamp"], "2024-05-01T12:00:00Z");
        assert!(obj["spindle_rpm"].is_u64());
        assert!(obj["cycle_time_sec"].is_u64());
        for key in [
            "spindle_temp",
            "motor_load",
            "vibration_x",
            "vibration_y",
            "power_consumption",
            "coolant_flow",
        ] {
            assert!(obj[key].is_f64(), "{key} should be a float");
        }
        assert!(obj["tool_id"].as_str().unwrap().starts_with("TOOL-"));
    }

    #[test]
    fn timestamp_drops_subsecond_precision() {
        let mut rng = StdRng::seed_from_u64(1);
        let now = Utc.timestamp_opt(1_714_564_800, 987_654_321).unwrap();
        let sample = generate_with(&mut rng, "CNC-9", now);
        let value: JsonValue = serde_json::from_slice(&sample.to_json().unwrap()).unwrap();
        assert_eq!(value["timestamp"], "2024-05-01T12:00:00Z");
    }
}
