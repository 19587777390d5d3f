//! Canonical record types produced by the recovery pipeline.
//!
//! These shapes are the stable contract other systems (reporting, norm
//! comparison, storage) consume. Every field is always present: scalars are
//! empty strings when unknown, never `null`, so downstream consumers stay
//! type-stable regardless of what the model returned.

use serde::{Deserialize, Serialize};

/// One measured water-quality quantity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterParameter {
    /// Label as printed on the form (usually Russian).
    pub name: String,
    /// Measured magnitude. Always finite; `0.0` when the model gave nothing usable.
    pub value: f64,
    /// Unit of measure, opaque to the pipeline.
    pub unit: String,
    /// Regulatory limit quoted on the form, if any.
    pub threshold_limit: Option<f64>,
    /// Lowercase ASCII merge/dedup key (`ph`, `iron`, `hardness`, …).
    pub code: String,
}

/// One page's, or one merged document's, extracted analysis.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterAnalysisRecord {
    pub blank_number: String,
    pub analysis_date: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub object_address: String,
    /// Well, borehole, mains supply, …
    pub intake_type: String,
    pub appearance: String,
    pub sample_date: String,
    pub test_date: String,
    /// Extraction order, not sorted.
    pub parameters: Vec<WaterParameter>,
    /// Free-text model commentary.
    pub notes: String,
}

impl WaterAnalysisRecord {
    /// Borrow the scalar descriptive fields in canonical order.
    pub fn scalar_fields(&self) -> [&str; 9] {
        [
            &self.blank_number,
            &self.analysis_date,
            &self.customer_name,
            &self.customer_phone,
            &self.object_address,
            &self.intake_type,
            &self.appearance,
            &self.sample_date,
            &self.test_date,
        ]
    }

    /// Mutable access to the scalar fields, same order as [`Self::scalar_fields`].
    pub(crate) fn scalar_fields_mut(&mut self) -> [&mut String; 9] {
        [
            &mut self.blank_number,
            &mut self.analysis_date,
            &mut self.customer_name,
            &mut self.customer_phone,
            &mut self.object_address,
            &mut self.intake_type,
            &mut self.appearance,
            &mut self.sample_date,
            &mut self.test_date,
        ]
    }

    /// `true` when nothing at all was recovered.
    pub fn is_empty(&self) -> bool {
        self.scalar_fields().iter().all(|s| s.is_empty())
            && self.parameters.is_empty()
            && self.notes.is_empty()
    }
}
