use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::blob::BlobId;

/// Emotion labels the prediction service can return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expression {
    Angry,
    Disgust,
    Fear,
    Happy,
    Neutral,
    Sad,
    Surprise,
}

impl Expression {
    pub const ALL: [Expression; 7] = [
        Expression::Angry,
        Expression::Disgust,
        Expression::Fear,
        Expression::Happy,
        Expression::Neutral,
        Expression::Sad,
        Expression::Surprise,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Expression::Angry => "Angry",
            Expression::Disgust => "Disgust",
            Expression::Fear => "Fear",
            Expression::Happy => "Happy",
            Expression::Neutral => "Neutral",
            Expression::Sad => "Sad",
            Expression::Surprise => "Surprise",
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Expression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Expression::ALL
            .iter()
            .copied()
            .find(|e| e.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown expression '{}'", s))
    }
}

/// Whether a result came from the service or was synthesized locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    Service,
    /// Produced while the service was unreachable; not a real prediction
    Placeholder,
}

/// Emotion label plus confidence, immutable once produced
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    expression: Expression,
    confidence: f32,
    provenance: Provenance,
}

impl PredictionResult {
    /// Build a service result; confidence must be finite and within [0, 1]
    pub fn new(expression: Expression, confidence: f32) -> Option<Self> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return None;
        }

        Some(Self {
            expression,
            confidence,
            provenance: Provenance::Service,
        })
    }

    /// Stand-in result for degraded connectivity.
    ///
    /// Derived from the blob identity so the same image always yields the same
    /// placeholder. Confidence lands in [0.5, 1.0).
    pub fn placeholder(blob: BlobId) -> Self {
        let bytes = blob.as_uuid().as_bytes();
        let expression = Expression::ALL[bytes[0] as usize % Expression::ALL.len()];
        let spread = u16::from_le_bytes([bytes[1], bytes[2]]) as f32 / 65536.0;

        Self {
            expression,
            confidence: 0.5 + spread * 0.5,
            provenance: Provenance::Placeholder,
        }
    }

    pub fn expression(&self) -> Expression {
        self.expression
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    pub fn is_placeholder(&self) -> bool {
        self.provenance == Provenance::Placeholder
    }

    /// Confidence rounded to a whole percentage for display
    pub fn confidence_percent(&self) -> u8 {
        (self.confidence * 100.0).round() as u8
    }
}
