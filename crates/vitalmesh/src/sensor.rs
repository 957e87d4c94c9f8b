// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Producer seam and the medical sensor backing it.
//!
//! The forwarding engine answers interests for names under its owned prefix
//! by asking a [`ProducerStore`]: given the name remainder, return a payload
//! or nothing. [`MedicalSensorSystem`] is the store used by sensor nodes; it
//! synthesizes one patient's vitals at startup and serves slices of the
//! document addressed by `/`-separated path components
//! (`heartrate/ecg` -> the ECG reading).

use rand::Rng;
use serde_json::{json, Value};

/// Narrow producer interface injected into the forwarding engine at
/// construction: given a name (relative to the owned prefix), return a
/// payload or nothing.
pub trait ProducerStore: Send + Sync {
    fn lookup(&self, name: &str) -> Option<String>;
}

/// A producer that owns no data; every lookup misses.
pub struct EmptyProducer;

impl ProducerStore for EmptyProducer {
    fn lookup(&self, _name: &str) -> Option<String> {
        None
    }
}

/// Synthesized vitals for one monitored patient.
pub struct MedicalSensorSystem {
    data: Value,
}

impl MedicalSensorSystem {
    /// Synthesize a full vitals document with plausible ranges.
    pub fn new(patient_id: &str) -> Self {
        let mut rng = rand::thread_rng();
        let invasive_mmhg: i64 = rng.gen_range(90..=140);
        let noninvasive_mmhg: i64 = rng.gen_range(90..=140);
        let spo2: f64 = rng.gen_range(95.0..100.0);
        let data = json!({
            "patientinfo": {
                "PatientID": patient_id,
                "Ward": format!("W{}", rng.gen_range(1..=6)),
                "Bed": rng.gen_range(1..=40),
            },
            "heartrate": {
                "ecg": rng.gen_range(60..=100),
                "ppg": rng.gen_range(60..=100),
            },
            "bloodpressure": {
                "invasive": {
                    "mmHg": invasive_mmhg,
                    "kPa": mmhg_to_kpa(invasive_mmhg as f64),
                },
                "noninvasive": {
                    "mmHg": noninvasive_mmhg,
                    "kPa": mmhg_to_kpa(noninvasive_mmhg as f64),
                },
            },
            "glucose": rng.gen_range(70.0..150.0),
            "temperature": {
                "celsius": rng.gen_range(36.0..38.0),
                "fahrenheit": rng.gen_range(96.8..100.4),
            },
            "oxygensaturation": {
                "percentage": spo2,
                "fractional": spo2 / 100.0,
            },
            "respiratoryRate": rng.gen_range(12..=20),
            "movement": {
                "accelerometer": {
                    "x": rng.gen_range(-1.0..1.0),
                    "y": rng.gen_range(-1.0..1.0),
                    "z": rng.gen_range(-1.0..1.0),
                },
                "gyroscope": {
                    "roll": rng.gen_range(-180.0..180.0),
                    "pitch": rng.gen_range(-90.0..90.0),
                    "yaw": rng.gen_range(-180.0..180.0),
                },
            },
            "eeg": rng.gen_range(0.0..100.0),
        });
        Self { data }
    }

    /// Walk the document by `/`-separated components; empty components are
    /// skipped so both `heartrate/ecg` and `/heartrate/ecg/` resolve.
    fn resolve(&self, name: &str) -> Option<&Value> {
        let mut current = &self.data;
        for component in name.split('/').filter(|c| !c.is_empty()) {
            current = current.get(component)?;
        }
        Some(current)
    }
}

impl ProducerStore for MedicalSensorSystem {
    fn lookup(&self, name: &str) -> Option<String> {
        self.resolve(name).map(|value| value.to_string())
    }
}

fn mmhg_to_kpa(mmhg: f64) -> f64 {
    mmhg * 0.133322
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_leaf_value() {
        let sensor = MedicalSensorSystem::new("patient-4711");
        let ecg = sensor.lookup("heartrate/ecg").expect("ecg reading");
        let value: i64 = ecg.parse().expect("integer bpm");
        assert!((60..=100).contains(&value));
    }

    #[test]
    fn test_lookup_subtree_is_json() {
        let sensor = MedicalSensorSystem::new("patient-4711");
        let hr = sensor.lookup("heartrate").expect("heartrate subtree");
        let doc: Value = serde_json::from_str(&hr).expect("valid json");
        assert!(doc.get("ecg").is_some());
        assert!(doc.get("ppg").is_some());
    }

    #[test]
    fn test_lookup_tolerates_slashes() {
        let sensor = MedicalSensorSystem::new("patient-4711");
        assert!(sensor.lookup("/heartrate/ecg/").is_some());
        assert!(sensor.lookup("").is_some()); // whole document
    }

    #[test]
    fn test_lookup_miss() {
        let sensor = MedicalSensorSystem::new("patient-4711");
        assert!(sensor.lookup("heartrate/nope").is_none());
        assert!(sensor.lookup("xray").is_none());
    }

    #[test]
    fn test_empty_producer_never_answers() {
        assert!(EmptyProducer.lookup("heartrate/ecg").is_none());
    }
}
