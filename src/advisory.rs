//! Rule-based crop and disease evaluators.
//!
//! These are deterministic lookup tables evaluated locally, not model
//! inference. Their outputs become the payloads queued for later sync when
//! the device is offline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdvisoryError {
    #[error("validation error: {0}")]
    Validation(String),
}

/// Soil test values entered on the advisory form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoilSample {
    pub ph: f64,
    pub nitrogen: f64,
    pub phosphorus: f64,
    pub potassium: f64,
    pub location: String,
}

impl SoilSample {
    pub fn new(
        ph: f64,
        nitrogen: f64,
        phosphorus: f64,
        potassium: f64,
        location: impl Into<String>,
    ) -> Result<Self, AdvisoryError> {
        if !(0.0..=14.0).contains(&ph) || ph.is_nan() {
            return Err(AdvisoryError::Validation(format!(
                "pH must be between 0 and 14, got {ph}"
            )));
        }
        for (name, value) in [
            ("nitrogen", nitrogen),
            ("phosphorus", phosphorus),
            ("potassium", potassium),
        ] {
            if value < 0.0 || value.is_nan() {
                return Err(AdvisoryError::Validation(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }
        let location = location.into();
        if location.trim().is_empty() {
            return Err(AdvisoryError::Validation("location is required".into()));
        }
        Ok(Self {
            ph,
            nitrogen,
            phosphorus,
            potassium,
            location,
        })
    }
}

impl Default for SoilSample {
    fn default() -> Self {
        Self {
            ph: 7.0,
            nitrogen: 50.0,
            phosphorus: 30.0,
            potassium: 40.0,
            location: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Season {
    Summer,
    Monsoon,
    Winter,
}

impl Season {
    /// Season for a calendar month (1..=12). Months 3-5 are Summer, 6-9
    /// Monsoon, everything else Winter.
    pub fn for_month(month: u8) -> Result<Self, AdvisoryError> {
        match month {
            3..=5 => Ok(Season::Summer),
            6..=9 => Ok(Season::Monsoon),
            1 | 2 | 10..=12 => Ok(Season::Winter),
            _ => Err(AdvisoryError::Validation(format!(
                "month must be 1..=12, got {month}"
            ))),
        }
    }
}

/// Local weather snapshot paired with a soil sample when evaluating rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub temperature: f64,
    pub humidity: f64,
    pub rainfall: f64,
    pub season: Season,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropRecommendation {
    pub crop: String,
    pub confidence: u8,
    pub reasons: Vec<String>,
    pub fertilizer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pesticide: Option<String>,
    pub practices: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Evaluates the fixed advisory rule table over soil and weather ranges.
/// Results are sorted by confidence, highest first. An empty result means
/// no rule matched, not an error.
pub fn recommend_crops(soil: &SoilSample, weather: &WeatherSnapshot) -> Vec<CropRecommendation> {
    let mut recommendations = Vec::new();

    if (6.0..=7.5).contains(&soil.ph) && weather.rainfall > 50.0 {
        recommendations.push(CropRecommendation {
            crop: "Rice".into(),
            confidence: 85,
            reasons: strings(&[
                "Optimal pH range (6.0-7.5)",
                "Sufficient rainfall for paddy cultivation",
                "Good nitrogen levels",
            ]),
            fertilizer: "NPK 20-10-10".into(),
            pesticide: None,
            practices: strings(&[
                "Maintain water level 2-5cm in field",
                "Transplant 25-day old seedlings",
                "Apply organic matter before planting",
            ]),
        });
    }

    if (6.0..=7.5).contains(&soil.ph) && weather.season == Season::Winter {
        recommendations.push(CropRecommendation {
            crop: "Wheat".into(),
            confidence: 80,
            reasons: strings(&[
                "Suitable pH for wheat cultivation",
                "Winter season is ideal",
                "Adequate phosphorus levels",
            ]),
            fertilizer: "DAP and Urea".into(),
            pesticide: None,
            practices: strings(&[
                "Sow seeds at 2-3cm depth",
                "Irrigation at crown root initiation",
                "Weed control after 30-35 days",
            ]),
        });
    }

    if (6.0..=7.0).contains(&soil.ph) && soil.potassium > 35.0 {
        recommendations.push(CropRecommendation {
            crop: "Tomato".into(),
            confidence: 75,
            reasons: strings(&[
                "Good pH range for tomatoes",
                "Sufficient potassium content",
                "Favorable weather conditions",
            ]),
            fertilizer: "NPK 19-19-19".into(),
            pesticide: Some("Neem oil for pest control".into()),
            practices: strings(&[
                "Provide support structures",
                "Regular pruning and training",
                "Drip irrigation recommended",
            ]),
        });
    }

    if soil.nitrogen > 40.0 && weather.temperature > 20.0 {
        recommendations.push(CropRecommendation {
            crop: "Maize".into(),
            confidence: 70,
            reasons: strings(&[
                "Good nitrogen availability",
                "Suitable temperature range",
                "Well-drained soil conditions",
            ]),
            fertilizer: "Urea and SSP".into(),
            pesticide: None,
            practices: strings(&[
                "Plant spacing: 60cm x 20cm",
                "Side dressing with nitrogen",
                "Harvest at physiological maturity",
            ]),
        });
    }

    recommendations.sort_by(|a, b| b.confidence.cmp(&a.confidence));
    recommendations
}

// ============================================================================
// Disease detection
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiseaseSeverity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentPlan {
    pub chemical: Vec<String>,
    pub organic: Vec<String>,
    pub preventive: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseaseFinding {
    pub disease: String,
    pub confidence: u8,
    pub severity: DiseaseSeverity,
    pub description: String,
    pub symptoms: Vec<String>,
    pub causes: Vec<String>,
    pub treatments: TreatmentPlan,
}

fn disease_table() -> Vec<DiseaseFinding> {
    vec![
        DiseaseFinding {
            disease: "Late Blight".into(),
            confidence: 85,
            severity: DiseaseSeverity::High,
            description: "A serious fungal disease that affects tomatoes and potatoes, causing dark spots on leaves.".into(),
            symptoms: strings(&[
                "Dark, water-soaked spots on leaves",
                "Brown lesions with fuzzy white growth",
                "Yellowing and wilting of leaves",
                "Fruit rot in severe cases",
            ]),
            causes: strings(&[
                "High humidity (>90%)",
                "Cool temperatures (15-20\u{b0}C)",
                "Overhead irrigation",
                "Poor air circulation",
            ]),
            treatments: TreatmentPlan {
                chemical: strings(&[
                    "Copper-based fungicides (Bordeaux mixture)",
                    "Metalaxyl + Mancozeb sprays",
                    "Chlorothalonil applications",
                ]),
                organic: strings(&[
                    "Neem oil spray (3-5ml per liter)",
                    "Baking soda solution (1 tsp per liter)",
                    "Milk spray (1:10 ratio with water)",
                    "Copper soap applications",
                ]),
                preventive: strings(&[
                    "Improve ventilation around plants",
                    "Avoid overhead watering",
                    "Remove infected plant debris",
                    "Rotate crops annually",
                ]),
            },
        },
        DiseaseFinding {
            disease: "Powdery Mildew".into(),
            confidence: 78,
            severity: DiseaseSeverity::Medium,
            description: "A common fungal disease that appears as white powdery spots on leaves and stems.".into(),
            symptoms: strings(&[
                "White powdery coating on leaves",
                "Yellowing of affected areas",
                "Stunted growth",
                "Leaf curling and distortion",
            ]),
            causes: strings(&[
                "High humidity with dry conditions",
                "Poor air circulation",
                "Overcrowding of plants",
                "Stress from drought or overwatering",
            ]),
            treatments: TreatmentPlan {
                chemical: strings(&[
                    "Sulfur-based fungicides",
                    "Propiconazole sprays",
                    "Myclobutanil applications",
                ]),
                organic: strings(&[
                    "Neem oil (2-3ml per liter)",
                    "Potassium bicarbonate spray",
                    "Milk and water solution (1:9)",
                    "Garlic and onion extract",
                ]),
                preventive: strings(&[
                    "Ensure good air circulation",
                    "Avoid overhead irrigation",
                    "Plant resistant varieties",
                    "Regular monitoring and early intervention",
                ]),
            },
        },
        DiseaseFinding {
            disease: "Bacterial Leaf Spot".into(),
            confidence: 72,
            severity: DiseaseSeverity::Low,
            description: "A bacterial infection causing small, dark spots on leaves with yellow halos.".into(),
            symptoms: strings(&[
                "Small dark spots with yellow halos",
                "Leaf yellowing and dropping",
                "Reduced fruit quality",
                "Stem cankers in severe cases",
            ]),
            causes: strings(&[
                "Warm, humid conditions",
                "Water splash from irrigation",
                "Wounded plant tissue",
                "Infected seeds or transplants",
            ]),
            treatments: TreatmentPlan {
                chemical: strings(&[
                    "Copper hydroxide sprays",
                    "Streptomycin applications",
                    "Fixed copper fungicides",
                ]),
                organic: strings(&[
                    "Copper soap spray",
                    "Hydrogen peroxide solution (3%)",
                    "Compost tea applications",
                    "Essential oil mixtures",
                ]),
                preventive: strings(&[
                    "Use certified disease-free seeds",
                    "Avoid working in wet fields",
                    "Implement crop rotation",
                    "Remove and destroy infected plants",
                ]),
            },
        },
    ]
}

/// Mock detection: picks an entry from the fixed disease table, keyed by a
/// hash of the image name so repeated submissions of the same photo report
/// the same finding.
pub fn detect_disease(image_name: &str) -> DiseaseFinding {
    let mut table = disease_table();
    let hash: usize = image_name.bytes().fold(0usize, |acc, b| {
        acc.wrapping_mul(31).wrapping_add(b as usize)
    });
    let index = hash % table.len();
    table.swap_remove(index)
}
