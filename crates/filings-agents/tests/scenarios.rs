//! End-to-end tests of the orchestration loop.
//!
//! Each test scripts the model's replies and backs the tool registry with
//! static or in-memory services, then checks the resulting `Answer` together
//! with what each backend was asked.

use std::sync::Arc;
use std::time::Duration;

use filings_agents::registry::{RegistrySettings, ToolRegistry};
use filings_agents::test_support::{
    article, fixed_timestamp, passage, CallLog, ScriptedModel, StaticMarket, StaticRetrieval,
    STATIC_SEARCH_URL,
};
use filings_agents::{AgentError, Orchestrator};
use filings_models::{
    Answer, Attribution, DocumentInput, OrchestratorConfig, PageText, RetrievalConfig,
    StopReason,
};
use filings_retrieval::{PassageIndex, PassageStore, RetrievalService};
use tokio_util::sync::CancellationToken;

const TOTAL_ASSETS_QUERY: &str = "What were Barclays' total assets in 2020?";

struct Harness {
    model: Arc<ScriptedModel>,
    retrieval: Arc<StaticRetrieval>,
    market: Arc<StaticMarket>,
    orchestrator: Orchestrator,
}

fn harness(
    model: ScriptedModel,
    retrieval: StaticRetrieval,
    market: StaticMarket,
    config: OrchestratorConfig,
) -> Harness {
    let model = Arc::new(model);
    let retrieval = Arc::new(retrieval);
    let market = Arc::new(market);
    let registry = ToolRegistry::new(
        retrieval.clone(),
        market.clone(),
        RegistrySettings::default(),
    );
    let orchestrator = Orchestrator::new(
        model.clone(),
        Arc::new(registry),
        config,
        Duration::from_secs(5),
    );
    Harness {
        model,
        retrieval,
        market,
        orchestrator,
    }
}

fn barclays_page_47() -> filings_models::Passage {
    passage(
        "barclays_2020_ar",
        2020,
        47,
        0.91,
        "Consolidated balance sheet as at 31 December 2020. Total assets £1,349bn.",
    )
}

fn barclays_report() -> DocumentInput {
    DocumentInput {
        document_id: "barclays_2020_ar".to_string(),
        year: 2020,
        source: "barclays_2020_ar.txt".to_string(),
        pages: vec![
            PageText {
                page: 3,
                text: "Chairman's letter on a difficult year for customers".to_string(),
            },
            PageText {
                page: 47,
                text: "Consolidated balance sheet (statement of financial position) as at \
                       31 December 2020. Total assets £1,349bn."
                    .to_string(),
            },
        ],
    }
}

fn without_session_id(answer: &Answer) -> (String, Vec<Attribution>, bool, StopReason, u32, u32) {
    (
        answer.answer_text.clone(),
        answer.attributions.clone(),
        answer.incomplete,
        answer.stop_reason,
        answer.turns,
        answer.tool_calls,
    )
}

#[tokio::test]
async fn scenario_total_assets_query_is_expanded() {
    let h = harness(
        ScriptedModel::new([
            "TOOL_CALL: rag_query {\"query\": \"Barclays total assets 2020\"}",
            "Barclays reported total assets of £1,349bn (barclays_2020_ar (2020), page 47).",
        ]),
        StaticRetrieval::new(vec![barclays_page_47()]),
        StaticMarket::new(),
        OrchestratorConfig::default(),
    );

    let answer = h.orchestrator.answer(TOTAL_ASSETS_QUERY).await.unwrap();

    let searches = h.retrieval.searches();
    assert_eq!(searches.len(), 1);
    assert!(searches[0].starts_with("Barclays total assets 2020"));
    assert!(searches[0].contains("balance sheet"));
    assert!(searches[0].contains("statement of financial position"));

    assert_eq!(
        answer.attributions,
        vec![Attribution::document("barclays_2020_ar", 2020, 47)]
    );
    assert_eq!(answer.stop_reason, StopReason::FinalAnswer);
    assert!(!answer.incomplete);
    assert_eq!(answer.turns, 2);
    assert_eq!(answer.tool_calls, 1);
    assert!(h.market.calls().is_empty());
}

#[tokio::test]
async fn scenario_total_assets_against_real_index() {
    let index = PassageIndex::new(
        PassageStore::open_in_memory().unwrap(),
        &RetrievalConfig::default(),
    );
    index.ingest(barclays_report()).await.unwrap();

    let model = Arc::new(ScriptedModel::new([
        "TOOL_CALL: rag_query {\"query\": \"Barclays total assets 2020\"}",
        "Total assets were £1,349bn.",
    ]));
    let registry = ToolRegistry::new(
        Arc::new(index),
        Arc::new(StaticMarket::new()),
        RegistrySettings::default(),
    );
    let orchestrator = Orchestrator::new(
        model.clone(),
        Arc::new(registry),
        OrchestratorConfig::default(),
        Duration::from_secs(5),
    );

    let answer = orchestrator.answer(TOTAL_ASSETS_QUERY).await.unwrap();

    // Page 3 shares only the company and year with the query and falls
    // under the relevance threshold.
    assert_eq!(
        answer.attributions,
        vec![Attribution::document("barclays_2020_ar", 2020, 47)]
    );
    let transcripts = model.transcripts();
    let tool_message = &transcripts[1].last().unwrap().content;
    assert!(tool_message.contains("Total assets £1,349bn"));
    assert!(tool_message.ends_with("Sources:\n- barclays_2020_ar (2020), page 47"));
}

#[tokio::test]
async fn scenario_empty_retrieval_falls_back_to_market_search() {
    let h = harness(
        ScriptedModel::new([
            "TOOL_CALL: rag_query {\"query\": \"Barclays total assets\"}",
            "The reports are not indexed; recent coverage mentions Barclays' results.",
        ]),
        StaticRetrieval::empty(),
        StaticMarket::new().with_articles(vec![article(
            "a1",
            "Barclays beats forecasts",
            "Full-year profit rose.",
            Some("2021-02-18T07:00:00Z"),
        )]),
        OrchestratorConfig::default(),
    );

    let answer = h.orchestrator.answer(TOTAL_ASSETS_QUERY).await.unwrap();

    assert_eq!(h.market.calls(), vec!["search:Barclays"]);
    assert_eq!(
        answer.attributions,
        vec![Attribution::source(STATIC_SEARCH_URL, fixed_timestamp())]
    );
    assert_eq!(answer.tool_calls, 2);

    let second_call = &h.model.transcripts()[1];
    assert!(second_call
        .iter()
        .any(|m| m.content.starts_with("Result of `search_plc`")));
    // Fallback articles are indexed for later retrieval.
    assert_eq!(h.retrieval.ingested()[0].document_id, "ft_a1");
}

#[tokio::test]
async fn fallback_runs_at_most_once_per_session() {
    let h = harness(
        ScriptedModel::new([
            "TOOL_CALL: rag_query {\"query\": \"Barclays total assets\"}",
            "TOOL_CALL: rag_query {\"query\": \"Barclays balance sheet\"}",
            "Not found in the reports.",
        ]),
        StaticRetrieval::empty(),
        StaticMarket::new(),
        OrchestratorConfig::default(),
    );

    let answer = h.orchestrator.answer(TOTAL_ASSETS_QUERY).await.unwrap();
    assert_eq!(h.retrieval.searches().len(), 2);
    assert_eq!(h.market.calls().len(), 1);
    assert_eq!(answer.tool_calls, 3);
}

#[tokio::test]
async fn no_fallback_for_non_figure_questions_or_when_disabled() {
    let h = harness(
        ScriptedModel::new([
            "TOOL_CALL: rag_query {\"query\": \"climate strategy\"}",
            "Nothing relevant was found.",
        ]),
        StaticRetrieval::empty(),
        StaticMarket::new(),
        OrchestratorConfig::default(),
    );
    h.orchestrator
        .answer("What does Barclays say about climate strategy?")
        .await
        .unwrap();
    assert!(h.market.calls().is_empty());

    let h = harness(
        ScriptedModel::new([
            "TOOL_CALL: rag_query {\"query\": \"total assets\"}",
            "Nothing relevant was found.",
        ]),
        StaticRetrieval::empty(),
        StaticMarket::new(),
        OrchestratorConfig {
            market_fallback: false,
            ..OrchestratorConfig::default()
        },
    );
    h.orchestrator.answer(TOTAL_ASSETS_QUERY).await.unwrap();
    assert!(h.market.calls().is_empty());
}

#[tokio::test]
async fn scenario_misspelled_tool_gets_corrective_message() {
    let h = harness(
        ScriptedModel::new([
            "TOOL_CALL: rag_querry {\"query\": \"total assets\"}",
            "TOOL_CALL: rag_query {\"query\": \"total assets\"}",
            "Total assets were £1,349bn (barclays_2020_ar (2020), page 47).",
        ]),
        StaticRetrieval::new(vec![barclays_page_47()]),
        StaticMarket::new(),
        OrchestratorConfig::default(),
    );

    let answer = h.orchestrator.answer(TOTAL_ASSETS_QUERY).await.unwrap();

    let transcripts = h.model.transcripts();
    let correction = &transcripts[1].last().unwrap().content;
    assert!(correction.starts_with("Unknown tool 'rag_querry'. Available tools:"));
    assert!(correction.contains("rag_query"));
    assert!(correction.contains("get_shareholders"));

    assert_eq!(answer.turns, 3);
    assert_eq!(answer.tool_calls, 1);
    assert_eq!(answer.stop_reason, StopReason::FinalAnswer);
    assert_eq!(
        answer.attributions,
        vec![Attribution::document("barclays_2020_ar", 2020, 47)]
    );
}

#[tokio::test]
async fn scenario_unreachable_model_fails_without_tool_calls() {
    let h = harness(
        ScriptedModel::unreachable(),
        StaticRetrieval::new(vec![barclays_page_47()]),
        StaticMarket::new(),
        OrchestratorConfig::default(),
    );

    match h.orchestrator.answer(TOTAL_ASSETS_QUERY).await {
        Err(AgentError::ModelUnavailable { attempts, detail }) => {
            assert_eq!(attempts, 2);
            assert!(detail.contains("connection refused"));
        }
        other => panic!("expected ModelUnavailable, got {other:?}"),
    }
    assert_eq!(h.model.call_count(), 2);
    assert!(h.retrieval.searches().is_empty());
    assert!(h.market.calls().is_empty());
}

#[tokio::test]
async fn scenario_turn_limit_returns_incomplete_answer_with_evidence() {
    let reply = "TOOL_CALL: rag_query {\"query\": \"total assets\"}";
    let h = harness(
        ScriptedModel::repeating(reply),
        StaticRetrieval::new(vec![barclays_page_47()]),
        StaticMarket::new(),
        OrchestratorConfig {
            max_turns: 2,
            ..OrchestratorConfig::default()
        },
    );

    let answer = h.orchestrator.answer(TOTAL_ASSETS_QUERY).await.unwrap();

    assert!(answer.incomplete);
    assert_eq!(answer.stop_reason, StopReason::TurnLimitExceeded);
    assert_eq!(answer.answer_text, reply);
    assert_eq!(answer.turns, 2);
    assert_eq!(answer.tool_calls, 2);
    assert_eq!(
        answer.attributions,
        vec![Attribution::document("barclays_2020_ar", 2020, 47)]
    );
    assert!(answer.is_grounded());
}

#[tokio::test]
async fn model_calls_never_exceed_max_turns() {
    for max_turns in [0, 1, 3, 5] {
        let h = harness(
            ScriptedModel::repeating("TOOL_CALL: rag_query {\"query\": \"assets\"}"),
            StaticRetrieval::empty(),
            StaticMarket::new(),
            OrchestratorConfig {
                max_turns,
                market_fallback: false,
            },
        );
        let answer = h.orchestrator.answer("Barclays assets").await.unwrap();
        let expected = max_turns.max(1);
        assert_eq!(h.model.call_count(), expected as usize, "max_turns = {max_turns}");
        assert_eq!(answer.turns, expected);
        assert!(answer.incomplete);
    }
}

#[tokio::test]
async fn report_questions_search_reports_before_market_data() {
    let log = CallLog::new();
    let h = harness(
        ScriptedModel::new([
            "TOOL_CALL: search_plc {\"company_name\": \"Barclays\"}",
            "Barclays' total assets were £1,349bn.",
        ])
        .with_log(log.clone()),
        StaticRetrieval::new(vec![barclays_page_47()]).with_log(log.clone()),
        StaticMarket::new().with_log(log.clone()),
        OrchestratorConfig::default(),
    );

    let answer = h.orchestrator.answer(TOTAL_ASSETS_QUERY).await.unwrap();

    let retrieval_at = log.position("retrieval:search:").unwrap();
    let market_at = log.position("market:search:").unwrap();
    assert!(retrieval_at < market_at, "log: {:?}", log.entries());
    assert!(h.retrieval.searches()[0].contains("balance sheet"));
    assert_eq!(answer.tool_calls, 2);
    assert_eq!(
        answer.attributions,
        vec![Attribution::document("barclays_2020_ar", 2020, 47)]
    );
}

#[tokio::test]
async fn requested_market_search_replaces_the_fallback() {
    let h = harness(
        ScriptedModel::new([
            "TOOL_CALL: search_plc {\"company_name\": \"Barclays\"}",
            "TOOL_CALL: rag_query {\"query\": \"Barclays balance sheet\"}",
            "Recent coverage does not give the figure.",
        ]),
        StaticRetrieval::empty(),
        StaticMarket::new(),
        OrchestratorConfig::default(),
    );

    let answer = h.orchestrator.answer(TOTAL_ASSETS_QUERY).await.unwrap();

    assert_eq!(h.retrieval.searches().len(), 2);
    assert_eq!(h.market.calls(), vec!["search:Barclays"]);
    assert_eq!(answer.tool_calls, 3);
}

#[tokio::test]
async fn market_questions_go_straight_to_market_data() {
    let h = harness(
        ScriptedModel::new([
            "TOOL_CALL: get_shareholders {\"ticker\": \"BARC:LSE\"}",
            "No holders were listed.",
        ]),
        StaticRetrieval::empty(),
        StaticMarket::new(),
        OrchestratorConfig::default(),
    );

    h.orchestrator
        .answer("Who are the largest holders of BARC:LSE?")
        .await
        .unwrap();
    assert!(h.retrieval.searches().is_empty());
    assert_eq!(h.market.calls(), vec!["shareholders:BARC:LSE"]);
}

#[tokio::test]
async fn shareholder_questions_skip_report_search() {
    let h = harness(
        ScriptedModel::new([
            "TOOL_CALL: get_shareholders {\"ticker\": \"BARC:LSE\"}",
            "No holders were listed.",
        ]),
        StaticRetrieval::empty(),
        StaticMarket::new(),
        OrchestratorConfig::default(),
    );

    let answer = h
        .orchestrator
        .answer("Who are Barclays' major shareholders?")
        .await
        .unwrap();
    assert!(h.retrieval.searches().is_empty());
    assert_eq!(h.market.calls(), vec!["shareholders:BARC:LSE"]);
    assert_eq!(answer.tool_calls, 1);
}

#[tokio::test]
async fn market_failure_is_reported_to_the_model() {
    let h = harness(
        ScriptedModel::new([
            "TOOL_CALL: get_shareholders(ticker=\"BARC:LSE\")",
            "Shareholder data is unavailable right now.",
        ]),
        StaticRetrieval::empty(),
        StaticMarket::rate_limited(),
        OrchestratorConfig::default(),
    );

    let answer = h
        .orchestrator
        .answer("Who are the largest holders of BARC:LSE?")
        .await
        .unwrap();

    let transcripts = h.model.transcripts();
    let failure = &transcripts[1].last().unwrap().content;
    assert!(failure.contains("failed (rate_limited)"));
    assert_eq!(answer.answer_text, "Shareholder data is unavailable right now.");
    assert!(answer.attributions.is_empty());
}

#[tokio::test]
async fn identical_sessions_produce_identical_answers() {
    let run = || async {
        let h = harness(
            ScriptedModel::new([
                "**TOOL_CALL:** rag_query {\"query\": \"Barclays total assets\"}",
                "£1,349bn (barclays_2020_ar (2020), page 47).",
            ]),
            StaticRetrieval::new(vec![barclays_page_47()]),
            StaticMarket::new(),
            OrchestratorConfig::default(),
        );
        let answer = h.orchestrator.answer(TOTAL_ASSETS_QUERY).await.unwrap();
        (without_session_id(&answer), h.retrieval.searches())
    };

    assert_eq!(run().await, run().await);
}

#[tokio::test]
async fn cancelled_before_start() {
    let h = harness(
        ScriptedModel::repeating("never used"),
        StaticRetrieval::empty(),
        StaticMarket::new(),
        OrchestratorConfig::default(),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = h
        .orchestrator
        .answer_with_cancel(TOTAL_ASSETS_QUERY, &cancel)
        .await;
    assert!(matches!(outcome, Err(AgentError::Cancelled)));
}

#[tokio::test]
async fn cancellation_interrupts_a_slow_model_call() {
    let h = harness(
        ScriptedModel::repeating("late").with_delay(Duration::from_secs(30)),
        StaticRetrieval::empty(),
        StaticMarket::new(),
        OrchestratorConfig::default(),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        h.orchestrator.answer_with_cancel(TOTAL_ASSETS_QUERY, &cancel),
    )
    .await
    .expect("cancellation should end the query promptly");
    assert!(matches!(outcome, Err(AgentError::Cancelled)));
}
