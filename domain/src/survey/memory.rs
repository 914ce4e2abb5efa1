//! Memory plan: which earlier answers a question gets to see

use super::error::SurveyError;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryPlan {
    /// focal question name -> prior question names, in survey order
    data: BTreeMap<String, Vec<String>>,
}

impl MemoryPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every question remembers every question before it
    pub fn full_memory(order: &[String]) -> Self {
        Self::lagged_memory(order, usize::MAX)
    }

    /// Every question remembers the `lags` questions before it
    pub fn lagged_memory(order: &[String], lags: usize) -> Self {
        let mut data = BTreeMap::new();
        for (i, focal) in order.iter().enumerate().skip(1) {
            let start = i.saturating_sub(lags);
            data.insert(focal.clone(), order[start..i].to_vec());
        }
        Self { data }
    }

    pub fn add_single_memory(
        &mut self,
        order: &[String],
        focal: &str,
        prior: &str,
    ) -> Result<(), SurveyError> {
        let focal_idx = position(order, focal)?;
        let prior_idx = position(order, prior)?;
        if prior_idx >= focal_idx {
            return Err(SurveyError::InvalidMemory {
                focal: focal.to_string(),
                prior: prior.to_string(),
            });
        }
        let entry = self.data.entry(focal.to_string()).or_default();
        if !entry.iter().any(|p| p == prior) {
            entry.push(prior.to_string());
            entry.sort_by_key(|name| order.iter().position(|n| n == name));
        }
        Ok(())
    }

    pub fn add_memory_collection(
        &mut self,
        order: &[String],
        focal: &str,
        priors: &[&str],
    ) -> Result<(), SurveyError> {
        for prior in priors {
            self.add_single_memory(order, focal, prior)?;
        }
        Ok(())
    }

    /// Prior questions visible to `focal`, in survey order
    pub fn visible_to(&self, focal: &str) -> &[String] {
        self.data.get(focal).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.data.values().all(Vec::is_empty)
    }
}

fn position(order: &[String], name: &str) -> Result<usize, SurveyError> {
    order
        .iter()
        .position(|n| n == name)
        .ok_or_else(|| SurveyError::UnknownQuestion(name.to_string()))
}
