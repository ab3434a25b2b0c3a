//! End-to-end scenarios over scripted backends.

use serde_json::json;
use std::sync::Arc;
use verdict_core::{
    visible_to_all, CaseLookup, CaseRecord, GuardrailEvaluator, GuardrailStatus, IterationAction,
    Mode, RiskBand, ToolRegistry, TraceOutcome, MANUAL_REVIEW_REQUIRED, MAX_ITERATIONS_EXCEEDED,
};
use verdict_runtime::testing::{LetterEmbedder, ScriptedProvider};
use verdict_runtime::{
    AgentConfig, AgentOrchestrator, AnalysisRequest, InMemoryCaseStore, Pipeline, ProviderAdapter,
    RetrievalConfig, RetryPolicy, SimilarityQuery, SimilarityRetriever,
};

fn orchestrator(provider: ScriptedProvider, config: AgentConfig) -> AgentOrchestrator {
    AgentOrchestrator::new(
        ProviderAdapter::new(Arc::new(provider), RetryPolicy::none()),
        ToolRegistry::with_defaults(),
        config,
    )
}

#[tokio::test]
async fn happy_path_single_iteration() {
    let reply = json!({
        "score": 15,
        "label": "LOW",
        "categories": [],
        "reasoning": "Recurring rent payment to the same landlord; amount and timing match prior months."
    });
    let agent = orchestrator(
        ScriptedProvider::new(vec![ScriptedProvider::text(reply.to_string())]),
        AgentConfig::default(),
    );

    let outcome = agent
        .run("Rent payment for October", None, Mode::Analysis)
        .await
        .unwrap();

    assert_eq!(outcome.judgment.score, Some(15));
    assert_eq!(outcome.trace.total_iterations, 1);
    assert_eq!(outcome.trace.outcome, Some(TraceOutcome::Normal));
    assert_eq!(outcome.judgment.tools_used, Some(vec![]));

    let verdict = GuardrailEvaluator::default().evaluate_judgment(&outcome.judgment);
    assert_eq!(verdict.status, GuardrailStatus::Pass);
}

#[tokio::test]
async fn consulting_payment_passes_with_default_config() {
    let config = AgentConfig::default();
    assert_eq!(config.max_iterations, 8);

    let reply = json!({
        "score": 12,
        "label": "LOW",
        "categories": [],
        "reasoning": "Standard payment for professional consulting services; no sanctions, PEP or structuring indicators."
    });
    let provider = ScriptedProvider::new(vec![ScriptedProvider::text(reply.to_string())]);
    let agent = orchestrator(provider, config);

    let outcome = agent
        .run("Payment for consulting services to Ahmed Hassan", None, Mode::Analysis)
        .await
        .unwrap();

    assert_eq!(outcome.trace.total_iterations, 1);
    assert_eq!(outcome.trace.outcome, Some(TraceOutcome::Normal));
    assert!(outcome.trace.tool_calls.is_empty());
    assert_eq!(outcome.judgment.score, Some(12));
    assert_eq!(outcome.judgment.band(), Some(RiskBand::Low));

    let verdict = GuardrailEvaluator::default().evaluate_judgment(&outcome.judgment);
    assert_eq!(verdict.status, GuardrailStatus::Pass);
}

#[tokio::test]
async fn sanctions_hit_drives_critical_judgment() {
    let provider = ScriptedProvider::new(vec![
        Ok(ScriptedProvider::tool_call(
            "call_1",
            "check_sanctions_list",
            json!({"entity_name": "Ahmed Ivanov"}),
        )),
        ScriptedProvider::text(
            json!({
                "score": 92,
                "label": "CRITICAL",
                "categories": ["SANCTIONS_MATCH"],
                "reasoning": "Beneficiary is an exact match on the OFAC SDN list for terrorist financing; the transaction must be blocked."
            })
            .to_string(),
        ),
    ]);
    let agent = orchestrator(provider, AgentConfig::default());

    let outcome = agent
        .run("Transfer 5,000 USD to Ahmed Ivanov", None, Mode::Analysis)
        .await
        .unwrap();

    let score = outcome.judgment.score.unwrap();
    assert!(score >= 76);
    assert_eq!(outcome.judgment.band(), Some(RiskBand::Critical));
    assert_eq!(outcome.trace.total_iterations, 2);
    assert_eq!(outcome.trace.tool_calls.len(), 1);
    assert_eq!(outcome.trace.tool_calls[0].result.as_ref().unwrap()["recommendation"], "BLOCK_TRANSACTION");
    assert_eq!(
        outcome.judgment.tools_used,
        Some(vec!["check_sanctions_list".to_string()])
    );

    let verdict = GuardrailEvaluator::default().evaluate_judgment(&outcome.judgment);
    assert_eq!(verdict.status, GuardrailStatus::Pass);
}

#[tokio::test]
async fn leaked_email_is_flagged_but_judgment_kept() {
    let reply = json!({
        "score": 30,
        "categories": ["UNUSUAL_COUNTERPARTY"],
        "reasoning": "The sender john.doe@example.com has no prior history with this counterparty, moderate concern."
    });
    let agent = orchestrator(
        ScriptedProvider::new(vec![ScriptedProvider::text(reply.to_string())]),
        AgentConfig::default(),
    );

    let outcome = agent.run("Payment from new sender", None, Mode::Analysis).await.unwrap();
    let verdict = GuardrailEvaluator::default().evaluate_judgment(&outcome.judgment);

    assert_eq!(verdict.status, GuardrailStatus::FailPiiLeakage);
    assert_eq!(outcome.judgment.score, Some(30));
}

#[tokio::test]
async fn non_convergence_synthesizes_fallback() {
    let provider = ScriptedProvider::repeating(ScriptedProvider::tool_call(
        "call_x",
        "check_sanctions_list",
        json!({"entity_name": "Ahmed Ivanov"}),
    ));
    let config = AgentConfig {
        max_iterations: 4,
        ..AgentConfig::default()
    };
    let agent = orchestrator(provider, config);

    let outcome = agent
        .run("Transfer to Ahmed Ivanov", None, Mode::Analysis)
        .await
        .unwrap();

    assert!(outcome.is_fallback());
    assert_eq!(outcome.trace.total_iterations, 4);
    assert_eq!(outcome.trace.error.as_deref(), Some(MAX_ITERATIONS_EXCEEDED));
    assert!(outcome
        .judgment
        .categories
        .contains(&MANUAL_REVIEW_REQUIRED.to_string()));
    assert!(outcome.judgment.categories.contains(&"SANCTIONS_MATCH".to_string()));
    assert_eq!(outcome.judgment.score, Some(90));
    assert!(outcome
        .trace
        .iterations
        .iter()
        .all(|i| i.action == IterationAction::ToolCalls));
}

#[tokio::test]
async fn chat_fallback_has_no_score() {
    let provider = ScriptedProvider::repeating(ScriptedProvider::tool_call(
        "call_x",
        "calculate",
        json!({"expression": "2 + 2"}),
    ));
    let agent = orchestrator(
        provider,
        AgentConfig {
            max_iterations: 2,
            ..AgentConfig::default()
        },
    );

    let outcome = agent.run("What is 2 + 2?", None, Mode::Chat).await.unwrap();

    assert!(outcome.is_fallback());
    assert_eq!(outcome.judgment.score, None);
    assert!(outcome.judgment.categories.is_empty());
    assert_eq!(outcome.trace.mode, "agent_chat");
}

#[tokio::test]
async fn retrieval_disabled_returns_empty_trace() {
    let retriever = SimilarityRetriever::new(
        Arc::new(LetterEmbedder::new()),
        RetrievalConfig {
            enabled: false,
            ..RetrievalConfig::default()
        },
    );
    let store = InMemoryCaseStore::new();
    let judgment = verdict_core::Judgment::chat("anything");

    let (matches, trace) = retriever
        .find_similar(
            &store,
            &SimilarityQuery::new("anything", &judgment),
            Some(3),
            Some(0.3),
            &visible_to_all,
        )
        .await;

    assert!(matches.is_empty());
    assert!(!trace.enabled);
    assert!(trace.error.is_none());
}

#[tokio::test]
async fn pipeline_then_similarity_respects_visibility() {
    let reply = |reasoning: &str| {
        ScriptedProvider::text(
            json!({"score": 20, "categories": [], "reasoning": reasoning}).to_string(),
        )
    };
    let provider = ScriptedProvider::new(vec![
        reply("Cash deposit at the branch, matches the customer's weekly takings pattern."),
        reply("Cash deposit at the branch, in line with the usual weekly takings."),
        reply("Cash deposit at the branch, consistent with weekly takings for a bakery."),
    ]);

    let store = Arc::new(InMemoryCaseStore::new());
    let retriever = SimilarityRetriever::new(
        Arc::new(LetterEmbedder::new()),
        RetrievalConfig {
            min_similarity: 0.5,
            ..RetrievalConfig::default()
        },
    );
    let pipeline = Pipeline::new(
        orchestrator(provider, AgentConfig::default()),
        retriever,
        store.clone(),
    );

    let first = pipeline
        .process(&AnalysisRequest::new("Cash deposit 2,400 EUR", Mode::Analysis).with_group("retail"))
        .await
        .unwrap();
    let second = pipeline
        .process(&AnalysisRequest::new("Cash deposit 2,350 EUR", Mode::Analysis).with_group("retail"))
        .await
        .unwrap();
    pipeline
        .process(&AnalysisRequest::new("Cash deposit 2,500 EUR", Mode::Analysis).with_group("private"))
        .await
        .unwrap();
    assert_eq!(store.indexed(), 3);

    let record = store.get(first.case_id).unwrap();
    let retail_only = |r: &CaseRecord| r.group == "retail";

    let (matches, trace) = pipeline
        .retriever()
        .find_similar(store.as_ref(), &SimilarityQuery::from(&record), None, None, &retail_only)
        .await;

    assert_eq!(trace.candidates_fetched, 3);
    assert_eq!(trace.after_self_exclusion, 2);
    assert_eq!(trace.after_visibility, 1);
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].case_id, second.case_id);
    assert!(matches[0].similarity >= 50.0 && matches[0].similarity <= 100.0);
}
