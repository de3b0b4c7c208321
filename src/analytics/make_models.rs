use serde::{Deserialize, Serialize};

use super::{mean, round2};
use crate::pipeline::storage::GroupTally;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStatistics {
    pub model: String,
    pub count: usize,
    pub average_electric_range: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MakeModelsResponse {
    pub make: String,
    pub total_models: usize,
    pub most_popular_model: String,
    pub most_popular_count: usize,
    pub models: Vec<ModelStatistics>,
}

/// Per-model statistics for one make from its per-model tallies; `None` when empty
pub fn model_statistics(make: &str, by_model: &[GroupTally]) -> Option<MakeModelsResponse> {
    let mut models: Vec<ModelStatistics> = by_model
        .iter()
        .map(|t| ModelStatistics {
            model: t.part(0).to_string(),
            count: t.count,
            average_electric_range: round2(mean(t.range_sum, t.count)),
        })
        .collect();
    models.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.model.cmp(&b.model)));

    let (most_popular_model, most_popular_count) = models
        .first()
        .map(|top| (top.model.clone(), top.count))?;
    Some(MakeModelsResponse {
        make: make.to_string(),
        total_models: models.len(),
        most_popular_model,
        most_popular_count,
        models,
    })
}
