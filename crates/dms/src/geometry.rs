//! Facial geometry signals from face-mesh landmarks

use serde::{Deserialize, Serialize};

use crate::DmsError;

/// Left eye points p1..p6 (outer corner, upper lid x2, inner corner, lower lid x2)
pub const LEFT_EYE_INDICES: [usize; 6] = [362, 385, 387, 263, 373, 380];

/// Right eye points p1..p6
pub const RIGHT_EYE_INDICES: [usize; 6] = [33, 160, 158, 133, 153, 144];

/// Inner lip top, inner lip bottom, left corner, right corner
pub const MOUTH_INDICES: [usize; 4] = [13, 14, 78, 308];

/// Smallest denominator used in aspect ratios
const MIN_SPAN: f64 = 1e-6;

/// Normalized image-space point
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Image-plane distance (depth ignored)
    pub fn distance(&self, other: &Landmark) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// One detected face
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceObservation {
    pub landmarks: Vec<Landmark>,
    /// Row-major 4x4 head transform, rotation in the upper-left 3x3
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<[f64; 16]>,
}

/// Per-frame scalar signals
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameSignals {
    pub ear: f64,
    pub mar: f64,
    /// Degrees, positive looking down
    pub pitch: f64,
    /// Degrees
    pub yaw: f64,
}

/// Head pose (Euler angles, degrees)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

/// Number of landmarks a face must carry for signal extraction
pub fn required_landmarks() -> usize {
    LEFT_EYE_INDICES
        .iter()
        .chain(RIGHT_EYE_INDICES.iter())
        .chain(MOUTH_INDICES.iter())
        .max()
        .map_or(0, |max| max + 1)
}

/// Compute all frame signals for a face
pub fn extract_signals(face: &FaceObservation) -> Result<FrameSignals, DmsError> {
    let landmarks = &face.landmarks;

    let left = eye_aspect_ratio(landmarks, &LEFT_EYE_INDICES);
    let right = eye_aspect_ratio(landmarks, &RIGHT_EYE_INDICES);
    let mar = mouth_aspect_ratio(landmarks);

    let (Some(left), Some(right), Some(mar)) = (left, right, mar) else {
        return Err(DmsError::KeypointsMissing {
            required: required_landmarks(),
            found: landmarks.len(),
        });
    };

    let pose = face.transform.as_ref().map(head_pose).unwrap_or_default();

    Ok(FrameSignals {
        ear: finite_or_zero((left + right) / 2.0),
        mar: finite_or_zero(mar),
        pitch: pose.pitch,
        yaw: pose.yaw,
    })
}

/// Eye aspect ratio: (|p2-p6| + |p3-p5|) / (2 |p1-p4|).
///
/// Returns `None` if an index is outside the landmark set.
pub fn eye_aspect_ratio(landmarks: &[Landmark], indices: &[usize; 6]) -> Option<f64> {
    let p = |i: usize| landmarks.get(indices[i]);
    let (p1, p2, p3, p4, p5, p6) = (p(0)?, p(1)?, p(2)?, p(3)?, p(4)?, p(5)?);

    let vertical = p2.distance(p6) + p3.distance(p5);
    let horizontal = p1.distance(p4).max(MIN_SPAN);
    Some(vertical / (2.0 * horizontal))
}

/// Mouth aspect ratio: inner-lip opening over mouth width
pub fn mouth_aspect_ratio(landmarks: &[Landmark]) -> Option<f64> {
    let p = |i: usize| landmarks.get(MOUTH_INDICES[i]);
    let (top, bottom, left, right) = (p(0)?, p(1)?, p(2)?, p(3)?);

    Some(top.distance(bottom) / left.distance(right).max(MIN_SPAN))
}

/// Decompose R = Rz(roll) * Ry(yaw) * Rx(pitch) from a row-major 4x4 transform
pub fn head_pose(matrix: &[f64; 16]) -> HeadPose {
    let r = |row: usize, col: usize| matrix[row * 4 + col];

    let yaw = (-r(2, 0)).clamp(-1.0, 1.0).asin();
    let pitch = r(2, 1).atan2(r(2, 2));
    let roll = r(1, 0).atan2(r(0, 0));

    HeadPose {
        pitch: finite_or_zero(pitch.to_degrees()),
        yaw: finite_or_zero(yaw.to_degrees()),
        roll: finite_or_zero(roll.to_degrees()),
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A face with open eyes, closed mouth and every other point at the origin
    pub(crate) fn synthetic_face(eye_open: f64, mouth_open: f64) -> FaceObservation {
        let mut landmarks = vec![Landmark::default(); 478];

        for (indices, cx) in [(LEFT_EYE_INDICES, 0.65), (RIGHT_EYE_INDICES, 0.35)] {
            // eye width 0.1, lids +-eye_open/2 * width
            let half = eye_open * 0.1 / 2.0;
            landmarks[indices[0]] = Landmark::new(cx - 0.05, 0.4, 0.0);
            landmarks[indices[3]] = Landmark::new(cx + 0.05, 0.4, 0.0);
            landmarks[indices[1]] = Landmark::new(cx - 0.02, 0.4 - half, 0.0);
            landmarks[indices[2]] = Landmark::new(cx + 0.02, 0.4 - half, 0.0);
            landmarks[indices[5]] = Landmark::new(cx - 0.02, 0.4 + half, 0.0);
            landmarks[indices[4]] = Landmark::new(cx + 0.02, 0.4 + half, 0.0);
        }

        // mouth width 0.2
        landmarks[78] = Landmark::new(0.4, 0.7, 0.0);
        landmarks[308] = Landmark::new(0.6, 0.7, 0.0);
        landmarks[13] = Landmark::new(0.5, 0.7 - mouth_open * 0.1, 0.0);
        landmarks[14] = Landmark::new(0.5, 0.7 + mouth_open * 0.1, 0.0);

        FaceObservation {
            landmarks,
            transform: None,
        }
    }

    pub(crate) fn rotation(pitch_deg: f64, yaw_deg: f64) -> [f64; 16] {
        let (sp, cp) = pitch_deg.to_radians().sin_cos();
        let (sy, cy) = yaw_deg.to_radians().sin_cos();
        // Ry(yaw) * Rx(pitch)
        [
            cy, sy * sp, sy * cp, 0.0, //
            0.0, cp, -sp, 0.0, //
            -sy, cy * sp, cy * cp, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ]
    }

    #[test]
    fn test_ear_matches_opening() {
        let face = synthetic_face(0.3, 0.0);
        let signals = extract_signals(&face).unwrap();
        assert!((signals.ear - 0.3).abs() < 1e-9);
        assert_eq!(signals.mar, 0.0);
    }

    #[test]
    fn test_mar_matches_opening() {
        let face = synthetic_face(0.3, 0.8);
        let signals = extract_signals(&face).unwrap();
        // opening 0.16 over width 0.2
        assert!((signals.mar - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_eye_is_finite() {
        let landmarks = vec![Landmark::new(0.5, 0.5, 0.0); 478];
        let ear = eye_aspect_ratio(&landmarks, &LEFT_EYE_INDICES).unwrap();
        assert_eq!(ear, 0.0);

        let mut landmarks = landmarks;
        landmarks[LEFT_EYE_INDICES[1]] = Landmark::new(0.5, 0.6, 0.0);
        let ear = eye_aspect_ratio(&landmarks, &LEFT_EYE_INDICES).unwrap();
        assert!(ear.is_finite());
        assert!(ear > 1000.0);
    }

    #[test]
    fn test_missing_landmarks() {
        let face = FaceObservation {
            landmarks: vec![Landmark::default(); 100],
            transform: None,
        };
        match extract_signals(&face) {
            Err(DmsError::KeypointsMissing { required, found }) => {
                assert_eq!(required, 388);
                assert_eq!(found, 100);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_identity_pose() {
        let mut identity = [0.0; 16];
        for i in 0..4 {
            identity[i * 4 + i] = 1.0;
        }
        assert_eq!(head_pose(&identity), HeadPose::default());
    }

    #[test]
    fn test_pose_decomposition() {
        let pose = head_pose(&rotation(30.0, -50.0));
        assert!((pose.pitch - 30.0).abs() < 1e-9);
        assert!((pose.yaw + 50.0).abs() < 1e-9);
        assert!(pose.roll.abs() < 1e-9);
    }

    #[test]
    fn test_pose_from_transform() {
        let mut face = synthetic_face(0.3, 0.0);
        face.transform = Some(rotation(-10.0, 20.0));
        let signals = extract_signals(&face).unwrap();
        assert!((signals.pitch + 10.0).abs() < 1e-9);
        assert!((signals.yaw - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_matrix() {
        let mut matrix = [0.0; 16];
        matrix[8] = f64::NAN;
        let pose = head_pose(&matrix);
        assert_eq!(pose.yaw, 0.0);
    }
}
