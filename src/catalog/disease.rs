use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    None,
    Medium,
    MediumHigh,
    High,
}

/// Descriptive card shown next to a prediction.
#[derive(Debug, Clone, Serialize)]
pub struct DiseaseInfo {
    pub label: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub severity: Severity,
    /// Display color as `#RRGGBB`.
    pub color: &'static str,
    pub recommendations: &'static [&'static str],
}

static DISEASES: [DiseaseInfo; 5] = [
    DiseaseInfo {
        label: "Healthy",
        name: "Healthy Plant",
        description: "The plant shows no visible signs of disease.",
        severity: Severity::None,
        color: "#4CAF50",
        recommendations: &[
            "Continue the current care plan",
            "Keep monitoring regularly",
            "Prevent pest entry",
        ],
    },
    DiseaseInfo {
        label: "Mosaic",
        name: "Mosaic Virus",
        description: "Viral disease that produces mosaic patterns on the leaves.",
        severity: Severity::Medium,
        color: "#FF9800",
        recommendations: &[
            "Remove infected plants",
            "Control insect vectors",
            "Use resistant varieties",
            "Disinfect tools",
        ],
    },
    DiseaseInfo {
        label: "RedRot",
        name: "Red Rot",
        description: "Fungal disease that rots stalks and leaves.",
        severity: Severity::High,
        color: "#F44336",
        recommendations: &[
            "Apply an appropriate fungicide",
            "Improve soil drainage",
            "Reduce excess moisture",
            "Remove infected residue",
        ],
    },
    DiseaseInfo {
        label: "Rust",
        name: "Common Rust",
        description: "Fungal disease that produces rust-colored pustules.",
        severity: Severity::MediumHigh,
        color: "#FF5722",
        recommendations: &[
            "Apply a systemic fungicide",
            "Improve air circulation",
            "Rotate crops",
            "Watch for humid weather",
        ],
    },
    DiseaseInfo {
        label: "Yellow",
        name: "Yellowing",
        description: "Symptom of nutrient deficiency or water stress.",
        severity: Severity::Medium,
        color: "#FFC107",
        recommendations: &[
            "Test the soil",
            "Check irrigation",
            "Apply nitrogen fertilizer",
            "Check soil pH",
        ],
    },
];

impl DiseaseInfo {
    /// Look up the card for a label. Unknown labels get the Healthy card.
    pub fn for_label(label: &str) -> &'static DiseaseInfo {
        DISEASES
            .iter()
            .find(|d| d.label == label)
            .unwrap_or(&DISEASES[0])
    }

    pub fn all() -> &'static [DiseaseInfo] {
        &DISEASES
    }
}
