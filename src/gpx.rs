//! GPX activity files: finish time and distance from a recorded track.

use std::io::Read;

use chrono::{DateTime, Duration, Utc};
use geo::{HaversineDistance, Point};
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("invalid GPX document: {0}")]
    Parse(#[from] gpx::errors::GpxError),
    #[error("track needs at least two timestamped points")]
    TooFewPoints,
    #[error("track timestamps run backwards")]
    NegativeDuration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivitySummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub distance_m: f64,
    pub points: usize,
}

/// All track points of every track and segment, in file order.
pub fn read_track<R: Read>(reader: R) -> Result<Vec<TrackPoint>, ActivityError> {
    let document = gpx::read(reader)?;
    let mut points = Vec::new();
    for track in &document.tracks {
        for segment in &track.segments {
            for waypoint in &segment.points {
                let point = waypoint.point();
                points.push(TrackPoint {
                    latitude: point.y(),
                    longitude: point.x(),
                    time: waypoint.time.clone().and_then(to_utc),
                });
            }
        }
    }
    Ok(points)
}

fn to_utc(time: gpx::Time) -> Option<DateTime<Utc>> {
    let time: OffsetDateTime = time.into();
    DateTime::from_timestamp(time.unix_timestamp(), time.nanosecond())
}

/// Elapsed time runs from the first to the last timestamped point; distance
/// sums every leg, timed or not.
pub fn summarize(points: &[TrackPoint]) -> Result<ActivitySummary, ActivityError> {
    let mut times = points.iter().filter_map(|p| p.time);
    let started_at = times.next().ok_or(ActivityError::TooFewPoints)?;
    let finished_at = times.last().ok_or(ActivityError::TooFewPoints)?;
    let elapsed = finished_at.signed_duration_since(started_at);
    if elapsed < Duration::zero() {
        return Err(ActivityError::NegativeDuration);
    }

    let distance_m = points
        .windows(2)
        .map(|leg| {
            Point::new(leg[0].longitude, leg[0].latitude)
                .haversine_distance(&Point::new(leg[1].longitude, leg[1].latitude))
        })
        .sum();

    Ok(ActivitySummary {
        started_at,
        finished_at,
        elapsed,
        distance_m,
        points: points.len(),
    })
}

pub fn summarize_gpx(data: &[u8]) -> Result<ActivitySummary, ActivityError> {
    summarize(&read_track(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="drawntorun-tests" xmlns="http://www.topografix.com/GPX/1/1">
  <trk>
    <name>Morning run</name>
    <trkseg>
      <trkpt lat="59.3293" lon="18.0686"><time>2026-05-01T07:00:00Z</time></trkpt>
      <trkpt lat="59.3320" lon="18.0700"><time>2026-05-01T07:01:30Z</time></trkpt>
    </trkseg>
    <trkseg>
      <trkpt lat="59.3350" lon="18.0720"></trkpt>
      <trkpt lat="59.3380" lon="18.0750"><time>2026-05-01T07:04:10Z</time></trkpt>
    </trkseg>
  </trk>
</gpx>"#;

    #[test]
    fn summarizes_a_track() {
        let summary = summarize_gpx(RUN.as_bytes()).unwrap();
        assert_eq!(summary.points, 4);
        assert_eq!(summary.elapsed.num_seconds(), 250);
        assert_eq!(summary.started_at.to_rfc3339(), "2026-05-01T07:00:00+00:00");
        assert!(summary.distance_m > 900.0 && summary.distance_m < 1200.0);
    }

    #[test]
    fn untimed_tracks_are_rejected() {
        let points = vec![
            TrackPoint {
                latitude: 0.0,
                longitude: 0.0,
                time: None,
            },
            TrackPoint {
                latitude: 0.0,
                longitude: 0.001,
                time: None,
            },
        ];
        assert!(matches!(summarize(&points), Err(ActivityError::TooFewPoints)));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            summarize_gpx(b"<not-gpx/>"),
            Err(ActivityError::Parse(_))
        ));
    }
}
