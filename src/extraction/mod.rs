//! Line-item extraction.
//!
//! Every modality engine turns a document into an unordered collection of
//! [`RawLineItem`]s. Engines are pure: no I/O beyond the bytes they are handed.

pub mod tabular;
pub mod text;

pub use tabular::TabularExtractor;
pub use text::TextExtractor;

use crate::error::{FinancialHealthError, Result};
use crate::schema::{CurrencyUnit, Modality, PeriodId, RawLineItem, SourceDocument};
use log::debug;

#[derive(Debug, Clone, Default)]
pub struct ExtractionContext {
    /// Period assigned to values whose document carries no period information
    pub default_period: Option<PeriodId>,
    pub default_unit: CurrencyUnit,
}

impl ExtractionContext {
    pub fn new(default_period: Option<PeriodId>, default_unit: CurrencyUnit) -> Self {
        Self {
            default_period,
            default_unit,
        }
    }
}

pub trait LineItemExtractor: Send + Sync {
    fn modality(&self) -> Modality;

    /// Returns whatever items the engine can identify. An empty result is not an error
    /// here; [`extract`] turns it into `EmptyDocument`.
    fn extract_items(
        &self,
        document: &SourceDocument,
        context: &ExtractionContext,
    ) -> Result<Vec<RawLineItem>>;
}

pub fn extractor_for(modality: Modality) -> &'static dyn LineItemExtractor {
    match modality {
        Modality::Tabular => &TabularExtractor,
        Modality::Text => &TextExtractor,
    }
}

/// Extracts line items from one document using the engine for its declared modality.
pub fn extract(document: &SourceDocument, context: &ExtractionContext) -> Result<Vec<RawLineItem>> {
    let extractor = extractor_for(document.modality);
    let items = extractor.extract_items(document, context)?;

    if items.is_empty() {
        return Err(FinancialHealthError::EmptyDocument {
            document: document.name.clone(),
        });
    }

    debug!(
        "Extracted {} line items from '{}' ({:?})",
        items.len(),
        document.name,
        document.modality
    );
    Ok(items)
}
