use serde::{Deserialize, Serialize};

use crate::analysis::FrameFeatures;

/// Flat JSON object the collector accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsPayload {
    /// Pitch estimate in Hz, 0 when unpitched.
    pub f0: f32,
    /// Spectral centroid in Hz.
    pub centroid: f32,
    /// Loudness in dB.
    pub rms: f32,
    #[serde(rename = "startedAt")]
    pub started_at: String,
    #[serde(rename = "endedAt")]
    pub ended_at: String,
    /// Milliseconds since the Unix epoch at serialization time.
    #[serde(rename = "localTime")]
    pub local_time: i64,
}

impl MetricsPayload {
    pub(crate) fn new(features: &FrameFeatures, started_secs: f64, ended_secs: f64) -> Self {
        Self {
            f0: features.fundamental_hz,
            centroid: features.centroid_hz,
            rms: features.loudness_db,
            started_at: format_timecode(started_secs),
            ended_at: format_timecode(ended_secs),
            local_time: unix_millis(),
        }
    }
}

/// Transport seconds as `HH:MM:SS.mmm`, rounded to the millisecond.
/// Positions before the timeline origin clamp to zero.
pub(crate) fn format_timecode(seconds: f64) -> String {
    let total_millis = (seconds.max(0.0) * 1_000.0).round() as u64;
    let hours = total_millis / 3_600_000;
    let minutes = (total_millis / 60_000) % 60;
    let secs = (total_millis / 1_000) % 60;
    let millis = total_millis % 1_000;
    format!("{hours:02}:{minutes:02}:{secs:02}.{millis:03}")
}

fn unix_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features() -> FrameFeatures {
        FrameFeatures {
            loudness_db: -12.5,
            fundamental_hz: 220.4,
            centroid_hz: 1_830.7,
            zero_crossing_rate: 950.0,
            flatness: 0.2,
            rolloff_hz: 4_100.0,
        }
    }

    #[test]
    fn timecode_formats_hours_minutes_seconds_millis() {
        assert_eq!(format_timecode(0.0), "00:00:00.000");
        assert_eq!(format_timecode(3_723.456), "01:02:03.456");
        assert_eq!(format_timecode(59.9996), "00:01:00.000");
        assert_eq!(format_timecode(-5.0), "00:00:00.000");
    }

    #[test]
    fn payload_uses_the_collector_field_names() {
        let payload = MetricsPayload::new(&features(), 1.25, 3.5);
        let value: serde_json::Value = serde_json::to_value(&payload).unwrap();
        let object = value.as_object().unwrap();
        for key in ["f0", "centroid", "rms", "startedAt", "endedAt", "localTime"] {
            assert!(object.contains_key(key), "missing {key}");
        }
        assert_eq!(object["startedAt"], "00:00:01.250");
        assert_eq!(object["endedAt"], "00:00:03.500");
    }

    #[test]
    fn payload_round_trips_numeric_fields() {
        let payload = MetricsPayload::new(&features(), 0.0, 1.0);
        let text = serde_json::to_string(&payload).unwrap();
        let back: MetricsPayload = serde_json::from_str(&text).unwrap();
        assert_eq!(back.f0, payload.f0);
        assert_eq!(back.centroid, payload.centroid);
        assert_eq!(back.rms, payload.rms);
        assert!(back.local_time > 0);
    }
}
