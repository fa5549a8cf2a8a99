//! # Financial Health Engine
//!
//! Turns heterogeneous financial statements submitted by small and medium enterprises
//! (CSV exports, text layers of PDF statements) into a canonical statement, a fixed
//! catalog of financial ratios and a weighted 0-100 health score with an explicit
//! confidence figure.
//!
//! ## Pipeline
//!
//! - **Extraction**: modality engines turn each document into raw line items
//! - **Mapping**: labels resolve to a fixed taxonomy of canonical accounts
//! - **Assembly**: one canonical statement per entity, with structural flags
//! - **Ratios**: liquidity, profitability, leverage and efficiency ratios per period
//! - **Scoring**: category sub-scores, a composite score, confidence and risk level
//! - **Narrative**: a statement-free payload for an external text generator, with a
//!   deterministic template fallback
//!
//! Data quality problems never abort a run. They surface as flags, completeness markers
//! and document warnings alongside the score.
//!
//! ## Example
//!
//! ```rust,ignore
//! use financial_health_engine::*;
//! use chrono::Utc;
//!
//! let engine = AssessmentEngine::new(EngineConfig::default())?;
//! let request = AssessmentRequest::new("acme-ltd", Utc::now())
//!     .with_industry("retail")
//!     .with_document(SourceDocument::tabular(
//!         "balance_sheet.csv",
//!         "Account,FY2023\nTotal current assets,200000\nTotal current liabilities,100000\n",
//!     ));
//!
//! let assessment = engine.assess(&request)?;
//! println!("{:.1} ({:?})", assessment.score.composite, assessment.score.risk_level);
//! ```

pub mod assembler;
pub mod benchmarks;
pub mod chart_of_accounts;
pub mod config;
pub mod error;
pub mod extraction;
pub mod mapper;
pub mod narrative;
pub mod pipeline;
pub mod ratios;
pub mod schema;
pub mod scoring;
pub mod utils;

pub use assembler::{FinancialStatement, StatementAssembler, StatementFlag};
pub use benchmarks::{compare_to_industry, BenchmarkComparison, BenchmarkStatus, IndustryProfile};
pub use chart_of_accounts::{CanonicalAccount, ChartOfAccounts, StatementSection};
pub use config::{CategoryWeights, EngineConfig, NarrativeConfig};
pub use error::{FinancialHealthError, Result};
pub use extraction::{extract, ExtractionContext, LineItemExtractor};
pub use mapper::{AccountMapper, MappedItem, MappingOutcome, MatchKind};
pub use narrative::{
    build_payload, consume_narrative, fallback_narrative, DisabledNarrativeService,
    NarrativeGenerator, NarrativeOutcome, NarrativePayload, NarrativeService, NarrativeSource,
    PayloadContext,
};
pub use pipeline::{Assessment, AssessmentEngine, AssessmentRequest, DocumentWarning};
pub use ratios::{compute_ratios, Completeness, RatioCategory, RatioResult};
pub use schema::*;
pub use scoring::{
    BenchmarkPoint, CategoryScore, HealthScore, HealthScoreAggregator, RiskLevel, ScoreStatus,
};

#[cfg(feature = "openai")]
pub use narrative::OpenAiNarrativeService;
