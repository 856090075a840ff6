use serde::{Deserialize, Serialize};

/// Single most likely class, returned by v1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelPrediction {
    pub label: u32,
}

/// One class with its probability, returned by v2.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassConfidence {
    pub label: u32,
    pub confidence: f32,
}

/// Version-shaped prediction. Untagged, so the JSON stored in the cache is
/// exactly the payload placed under `"prediction"` in responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prediction {
    Label(LabelPrediction),
    Distribution(Vec<ClassConfidence>),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction: Prediction,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VersionsResponse {
    pub versions: Vec<VersionEntry>,
    pub latest: u8,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VersionEntry {
    pub version: u8,
    pub prefix: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidationErrorResponse {
    pub detail: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn label_prediction_serializes_as_plain_object() {
        let prediction = Prediction::Label(LabelPrediction { label: 2 });
        assert_eq!(serde_json::to_value(&prediction).unwrap(), json!({"label": 2}));
    }

    #[test]
    fn cached_json_deserializes_into_matching_shape() {
        let label: Prediction = serde_json::from_str(r#"{"label": 1}"#).unwrap();
        assert_eq!(label, Prediction::Label(LabelPrediction { label: 1 }));

        let distribution: Prediction =
            serde_json::from_str(r#"[{"label": 0, "confidence": 0.96}, {"label": 1, "confidence": 0.04}]"#)
                .unwrap();
        match distribution {
            Prediction::Distribution(entries) => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].label, 0);
                assert!((entries[0].confidence - 0.96).abs() < 1e-6);
            }
            other => panic!("Expected distribution, got {:?}", other),
        }
    }
}
