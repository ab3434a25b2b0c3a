//! End-to-end analysis: orchestrate, check, persist, index.
//!
//! Guardrails and validation annotate the judgment and never block it.
//! Validation is skipped for chat answers. The embedding step
//! after persistence is best effort: a failure is logged and the case stays
//! stored without a vector.

use std::sync::Arc;
use tracing::{info, warn};
use verdict_core::{
    AnalysisTrace, CaseId, CaseSubmission, GuardrailEvaluator, GuardrailOutcome, Judgment,
    JudgmentSink, Mode,
};
use verdict_core::guardrails::DEFAULT_MIN_LENGTH;

use crate::config::RuntimeConfig;
use crate::orchestrator::AgentOrchestrator;
use crate::retrieval::SimilarityRetriever;
use crate::RuntimeError;

/// One unit of work for the pipeline.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub input_text: String,
    pub context: Option<String>,
    pub mode: Mode,
    /// Owning group, stored with the case for later visibility checks.
    pub group: String,
}

impl AnalysisRequest {
    pub fn new(input_text: impl Into<String>, mode: Mode) -> Self {
        Self {
            input_text: input_text.into(),
            context: None,
            mode,
            group: "default".to_string(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineResult {
    pub case_id: CaseId,
    pub judgment: Judgment,
    pub trace: AnalysisTrace,
    pub outcome: GuardrailOutcome,
    pub validation: GuardrailOutcome,
    /// Whether an embedding was attached to the stored case.
    pub embedded: bool,
}

pub struct Pipeline {
    orchestrator: AgentOrchestrator,
    guardrails: GuardrailEvaluator,
    validation: GuardrailEvaluator,
    retriever: SimilarityRetriever,
    sink: Arc<dyn JudgmentSink>,
}

impl Pipeline {
    pub fn new(
        orchestrator: AgentOrchestrator,
        retriever: SimilarityRetriever,
        sink: Arc<dyn JudgmentSink>,
    ) -> Self {
        Self {
            orchestrator,
            guardrails: GuardrailEvaluator::default(),
            validation: GuardrailEvaluator::validation(DEFAULT_MIN_LENGTH),
            retriever,
            sink,
        }
    }

    pub fn from_config(config: &RuntimeConfig, sink: Arc<dyn JudgmentSink>) -> Result<Self, RuntimeError> {
        Ok(Self::new(
            AgentOrchestrator::from_config(config)?,
            SimilarityRetriever::from_config(config)?,
            sink,
        )
        .with_guardrails(GuardrailEvaluator::guardrails(config.guardrails.min_length))
        .with_validation(GuardrailEvaluator::validation(config.guardrails.min_length)))
    }

    pub fn with_guardrails(mut self, guardrails: GuardrailEvaluator) -> Self {
        self.guardrails = guardrails;
        self
    }

    pub fn with_validation(mut self, validation: GuardrailEvaluator) -> Self {
        self.validation = validation;
        self
    }

    pub fn orchestrator(&self) -> &AgentOrchestrator {
        &self.orchestrator
    }

    pub fn retriever(&self) -> &SimilarityRetriever {
        &self.retriever
    }

    /// Run one request through every stage.
    ///
    /// Only orchestration and persistence failures are returned as errors.
    pub async fn process(&self, request: &AnalysisRequest) -> Result<PipelineResult, RuntimeError> {
        let agent = self
            .orchestrator
            .run(&request.input_text, request.context.as_deref(), request.mode)
            .await?;

        let outcome = self.guardrails.evaluate_judgment(&agent.judgment);
        if !outcome.is_pass() {
            // details may quote the offending text; log the status only
            warn!(status = %outcome.status, "guardrail flagged judgment");
        }
        let validation = self.validation.validate_judgment(&agent.judgment, request.mode);
        if !validation.is_pass() {
            warn!(status = %validation.status, "validation flagged judgment");
        }

        let case_id = self.sink.persist(CaseSubmission {
            input_text: request.input_text.clone(),
            context: request.context.clone(),
            group: request.group.clone(),
            mode: request.mode,
            judgment: agent.judgment.clone(),
            trace: agent.trace.clone(),
            outcome: outcome.clone(),
            validation: validation.clone(),
        })?;

        let embedded = self
            .index_case(case_id, &request.input_text, &agent.judgment)
            .await;

        info!(
            case_id = %case_id,
            score = ?agent.judgment.score,
            status = %outcome.status,
            validation = %validation.status,
            iterations = agent.trace.total_iterations,
            fallback = agent.is_fallback(),
            embedded,
            "case processed"
        );

        Ok(PipelineResult {
            case_id,
            judgment: agent.judgment,
            trace: agent.trace,
            outcome,
            validation,
            embedded,
        })
    }

    async fn index_case(&self, id: CaseId, input: &str, judgment: &Judgment) -> bool {
        let vector = match self.retriever.embed_case(input, judgment).await {
            Ok(Some(vector)) => vector,
            Ok(None) => return false,
            Err(err) => {
                warn!(case_id = %id, error = %err, "embedding failed, case stored without vector");
                return false;
            }
        };

        match self.sink.attach_embedding(id, vector) {
            Ok(()) => true,
            Err(err) => {
                warn!(case_id = %id, error = %err, "failed to attach embedding");
                false
            }
        }
    }
}
