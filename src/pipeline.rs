use crate::assembler::{FinancialStatement, StatementAssembler, StatementFlag};
use crate::benchmarks::{compare_to_industry, BenchmarkComparison, IndustryProfile};
use crate::config::EngineConfig;
use crate::error::{FinancialHealthError, Result};
use crate::extraction::{extract, ExtractionContext};
use crate::mapper::{AccountMapper, MappedItem};
use crate::narrative::{
    build_payload, fallback_narrative, NarrativeGenerator, NarrativeOutcome, NarrativePayload,
    NarrativeSource, PayloadContext,
};
use crate::ratios::{compute_ratios, RatioResult};
use crate::schema::{PeriodId, RawLineItem, SourceDocument};
use crate::scoring::{HealthScore, HealthScoreAggregator};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Everything needed for one assessment run.
#[derive(Debug, Clone)]
pub struct AssessmentRequest {
    pub entity_id: String,
    pub documents: Vec<SourceDocument>,
    /// Period for documents that carry no period information
    pub default_period: Option<PeriodId>,
    pub industry: Option<String>,
    pub locale: Option<String>,
    /// Stamped onto the score as `computed_at`
    pub assessed_at: DateTime<Utc>,
}

impl AssessmentRequest {
    pub fn new(entity_id: impl Into<String>, assessed_at: DateTime<Utc>) -> Self {
        Self {
            entity_id: entity_id.into(),
            documents: Vec::new(),
            default_period: None,
            industry: None,
            locale: None,
            assessed_at,
        }
    }

    pub fn with_document(mut self, document: SourceDocument) -> Self {
        self.documents.push(document);
        self
    }

    pub fn with_default_period(mut self, period: PeriodId) -> Self {
        self.default_period = Some(period);
        self
    }

    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }
}

/// A document that was skipped because it could not be read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentWarning {
    pub document: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub statement: FinancialStatement,
    pub flags: Vec<StatementFlag>,
    pub unmapped: Vec<RawLineItem>,
    /// Values that lost a conflict for the same account and period
    pub superseded: Vec<MappedItem>,
    pub warnings: Vec<DocumentWarning>,
    pub ratios: Vec<RatioResult>,
    pub score: HealthScore,
    pub benchmarks: Vec<BenchmarkComparison>,
    pub payload: NarrativePayload,
    pub narrative: NarrativeOutcome,
}

/// Runs assessments. Holds nothing but the shared, read-only configuration, so one engine
/// can serve any number of concurrent runs.
#[derive(Debug, Clone)]
pub struct AssessmentEngine {
    config: Arc<EngineConfig>,
}

impl AssessmentEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn extract_all(
        &self,
        request: &AssessmentRequest,
    ) -> Result<(Vec<RawLineItem>, Vec<DocumentWarning>)> {
        let context = ExtractionContext::new(request.default_period, self.config.default_unit.clone());
        let mut raw_items = Vec::new();
        let mut warnings = Vec::new();
        let mut next_ordinal = 0u64;

        for document in &request.documents {
            match extract(document, &context) {
                Ok(items) => {
                    let base = next_ordinal;
                    for mut item in items {
                        item.source.ordinal += base;
                        next_ordinal = next_ordinal.max(item.source.ordinal + 1);
                        raw_items.push(item);
                    }
                }
                Err(e) if e.is_document_level() => {
                    warn!("Skipping document '{}': {}", document.name, e);
                    warnings.push(DocumentWarning {
                        document: document.name.clone(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Ok((raw_items, warnings))
    }

    /// Scores the submitted documents. The narrative is the deterministic template; use
    /// [`AssessmentEngine::assess_with_narrative`] to involve a narrative service.
    pub fn assess(&self, request: &AssessmentRequest) -> Result<Assessment> {
        info!(
            "Assessing '{}' from {} document(s)",
            request.entity_id,
            request.documents.len()
        );
        let config = self.config.as_ref();

        let (raw_items, warnings) = self.extract_all(request)?;
        let insufficient = || FinancialHealthError::InsufficientData {
            documents: request.documents.len(),
        };
        if raw_items.is_empty() {
            return Err(insufficient());
        }
        debug!("Extracted {} raw line items", raw_items.len());

        let mapping = AccountMapper::new(config).map(raw_items);
        let (statement, flags) = match StatementAssembler::new(config)
            .assemble(&request.entity_id, &mapping.mapped)
        {
            Ok(assembled) => assembled,
            Err(FinancialHealthError::NoPeriodsFound) => return Err(insufficient()),
            Err(e) => return Err(e),
        };

        let ratios = compute_ratios(&statement);
        let score = HealthScoreAggregator::new(config).aggregate(&ratios, request.assessed_at);

        let benchmarks = match (IndustryProfile::lookup(request.industry.as_deref()), score.period) {
            (Some(profile), Some(period)) => compare_to_industry(&profile, &ratios, period),
            _ => Vec::new(),
        };

        let payload = build_payload(
            &statement,
            &score,
            &flags,
            &PayloadContext {
                industry: request.industry.as_deref(),
                locale: request.locale.as_deref(),
                unmapped_items: mapping.unmapped.len(),
                benchmarks: &benchmarks,
                max_chars: config.narrative.max_narrative_chars,
            },
        );
        let narrative = NarrativeOutcome {
            text: fallback_narrative(&payload),
            source: NarrativeSource::Template,
            attempts: 0,
            fallback_reason: None,
        };

        info!(
            "Assessment for '{}' complete: score {:.1}, {} flag(s), {} unmapped item(s)",
            request.entity_id,
            score.composite,
            flags.len(),
            mapping.unmapped.len()
        );

        Ok(Assessment {
            statement,
            flags,
            unmapped: mapping.unmapped,
            superseded: mapping.superseded,
            warnings,
            ratios,
            score,
            benchmarks,
            payload,
            narrative,
        })
    }

    /// Like [`AssessmentEngine::assess`], then asks the generator for a narrative. The
    /// score is settled before the service is called and never depends on it.
    pub async fn assess_with_narrative(
        &self,
        request: &AssessmentRequest,
        generator: &NarrativeGenerator,
    ) -> Result<Assessment> {
        let mut assessment = self.assess(request)?;
        assessment.narrative = generator.narrate(&assessment.payload).await;
        Ok(assessment)
    }

    /// Runs independent assessments concurrently; results keep the request order.
    pub async fn assess_many(
        &self,
        requests: &[AssessmentRequest],
        generator: &NarrativeGenerator,
    ) -> Vec<Result<Assessment>> {
        join_all(
            requests
                .iter()
                .map(|request| self.assess_with_narrative(request, generator)),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Modality;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 9, 0, 0).unwrap()
    }

    fn engine() -> AssessmentEngine {
        AssessmentEngine::new(EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_unreadable_documents_become_warnings() {
        let request = AssessmentRequest::new("acme", at())
            .with_document(SourceDocument::tabular(
                "balance.csv",
                "Account,FY2023\nCurrent Assets,200000\nCurrent Liabilities,100000\n",
            ))
            .with_document(SourceDocument::new("scan.txt", vec![0xff, 0xfe, 0x00], Modality::Text));

        let assessment = engine().assess(&request).unwrap();
        assert_eq!(assessment.warnings.len(), 1);
        assert_eq!(assessment.warnings[0].document, "scan.txt");
        assert_eq!(assessment.score.computed_at, at());
    }

    #[test]
    fn test_nothing_extractable_is_insufficient() {
        let request = AssessmentRequest::new("acme", at())
            .with_document(SourceDocument::text("notes.txt", "Nothing to see here.\n"));
        let err = engine().assess(&request).unwrap_err();
        assert!(matches!(err, FinancialHealthError::InsufficientData { documents: 1 }));
    }

    #[test]
    fn test_nothing_mappable_is_insufficient() {
        let request = AssessmentRequest::new("acme", at()).with_document(SourceDocument::tabular(
            "misc.csv",
            "Account,FY2023\nDirectors' loan waiver,5000\n",
        ));
        let err = engine().assess(&request).unwrap_err();
        assert!(matches!(err, FinancialHealthError::InsufficientData { .. }));
    }

    #[test]
    fn test_ordinals_are_unique_across_documents() {
        let engine = engine();
        let request = AssessmentRequest::new("acme", at())
            .with_document(SourceDocument::tabular("a.csv", "Account,FY2023\nRevenue,100\n"))
            .with_document(SourceDocument::tabular("b.csv", "Account,FY2023\nSales,90\n"));
        let (items, _) = engine.extract_all(&request).unwrap();
        let ordinals: Vec<u64> = items.iter().map(|i| i.source.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1]);

        // equal confidence: the later document wins and the conflict is flagged
        let assessment = engine.assess(&request).unwrap();
        assert!(assessment
            .flags
            .iter()
            .any(|f| matches!(f, StatementFlag::AmbiguousMapping { .. })));
        assert_eq!(
            assessment
                .statement
                .value(crate::chart_of_accounts::CanonicalAccount::Revenue, PeriodId::annual(2023)),
            Some(90.0)
        );
        assert_eq!(assessment.superseded.len(), 1);
        assert_eq!(assessment.superseded[0].value, 100.0);
        assert_eq!(assessment.superseded[0].source.document, "a.csv");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = EngineConfig {
            confidence_floor: 2.0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            AssessmentEngine::new(config),
            Err(FinancialHealthError::InvalidConfig(_))
        ));
    }
}
