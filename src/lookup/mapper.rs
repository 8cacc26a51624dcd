//! Candidate record to nutrition facts.

use super::{CandidateRecord, NutritionFacts, Origin};

pub const NUTRIENT_ENERGY_KCAL: u32 = 1008;
pub const NUTRIENT_PROTEIN: u32 = 1003;
pub const NUTRIENT_CARBOHYDRATE: u32 = 1005;
pub const NUTRIENT_TOTAL_FAT: u32 = 1004;

/// The database reports nutrients per 100 g.
pub const REFERENCE_SERVING_SIZE: &str = "100";
pub const REFERENCE_SERVING_UNIT: &str = "g";

/// Map macronutrients; unknown codes are ignored, missing ones stay 0.
pub fn to_nutrition_facts(record: &CandidateRecord, confidence: f64) -> NutritionFacts {
    let mut facts = NutritionFacts {
        external_id: record.external_id.clone(),
        product_name: record.description.clone(),
        serving_size: REFERENCE_SERVING_SIZE.to_string(),
        serving_size_unit: REFERENCE_SERVING_UNIT.to_string(),
        calories: 0.0,
        protein_g: 0.0,
        carbohydrate_g: 0.0,
        total_fat_g: 0.0,
        confidence,
        origin: Origin::ExternalDb,
        cached_at: None,
    };

    for sample in &record.nutrient_samples {
        match sample.nutrient_code {
            NUTRIENT_ENERGY_KCAL => facts.calories = sample.value,
            NUTRIENT_PROTEIN => facts.protein_g = sample.value,
            NUTRIENT_CARBOHYDRATE => facts.carbohydrate_g = sample.value,
            NUTRIENT_TOTAL_FAT => facts.total_fat_g = sample.value,
            _ => {}
        }
    }
    facts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::{NutrientSample, SourceType};

    fn record(samples: &[(u32, f64)]) -> CandidateRecord {
        CandidateRecord {
            external_id: "12345".into(),
            description: "Whole Milk".into(),
            source_type: SourceType::Survey,
            nutrient_samples: samples
                .iter()
                .map(|&(nutrient_code, value)| NutrientSample { nutrient_code, value })
                .collect(),
        }
    }

    #[test]
    fn maps_all_macros() {
        let facts = to_nutrition_facts(
            &record(&[(1008, 149.0), (1003, 7.7), (1005, 11.7), (1004, 7.9)]),
            92.5,
        );
        assert_eq!(facts.external_id, "12345");
        assert_eq!(facts.product_name, "Whole Milk");
        assert_eq!(facts.serving_size, "100");
        assert_eq!(facts.serving_size_unit, "g");
        assert_eq!(facts.calories, 149.0);
        assert_eq!(facts.protein_g, 7.7);
        assert_eq!(facts.carbohydrate_g, 11.7);
        assert_eq!(facts.total_fat_g, 7.9);
        assert_eq!(facts.confidence, 92.5);
        assert_eq!(facts.origin, Origin::ExternalDb);
        assert!(facts.cached_at.is_none());
    }

    #[test]
    fn missing_codes_default_to_zero_and_unknown_are_ignored() {
        let facts = to_nutrition_facts(&record(&[(1008, 52.0), (1005, 14.0), (2000, 10.4)]), 85.0);
        assert_eq!(facts.calories, 52.0);
        assert_eq!(facts.carbohydrate_g, 14.0);
        assert_eq!(facts.protein_g, 0.0);
        assert_eq!(facts.total_fat_g, 0.0);
    }
}
