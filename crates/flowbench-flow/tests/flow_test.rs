mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{chain, FakeServices};
use flowbench_flow::{resolve_workflow, FlowError, RunController, RunEvent, RunState};
use flowbench_protocol::{LogLevel, NodeKind, Workflow};
use pretty_assertions::assert_eq;
use tokio::sync::{mpsc, Notify};

fn outputs(entries: &[flowbench_protocol::LogEntry]) -> Vec<&str> {
    entries.iter().map(|e| e.output.as_str()).collect()
}

#[tokio::test]
async fn llm_chain_completes_with_three_entries() -> anyhow::Result<()> {
    let (workflow, ids) = chain(vec![(NodeKind::Llm, vec![("userMessage", "Hi")])]);
    let services = Arc::new(FakeServices::replying("Hello"));
    let controller = RunController::new(services.clone());

    let report = controller.run(&workflow).await?;

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(
        outputs(&report.entries),
        vec!["Flow started with 3 nodes", "Hello", "Flow completed successfully"]
    );
    assert_eq!(report.entries[1].node_id.as_ref(), Some(&ids[1]));
    assert_eq!(report.entries[1].level, LogLevel::Success);
    assert_eq!(services.calls(), vec!["generate:Hi"]);
    assert_eq!(controller.state().await, RunState::Completed);
    assert_eq!(controller.log().await, report.entries);
    Ok(())
}

#[tokio::test]
async fn start_to_end_logs_marker_and_completion() -> anyhow::Result<()> {
    let (workflow, ids) = chain(vec![]);
    let controller = RunController::new(Arc::new(FakeServices::echoing()));

    let report = controller.run(&workflow).await?;

    assert!(report.succeeded());
    assert_eq!(
        outputs(&report.entries),
        vec!["Flow started with 2 nodes", "Flow completed successfully"]
    );
    assert_eq!(report.entries[0].node_id.as_ref(), Some(&ids[0]));
    assert_eq!(report.entries[1].node_id.as_ref(), Some(&ids[1]));
    Ok(())
}

#[tokio::test]
async fn remote_failure_halts_before_end() -> anyhow::Result<()> {
    let (workflow, ids) = chain(vec![(NodeKind::Llm, vec![("userMessage", "Hi")])]);
    let controller = RunController::new(Arc::new(FakeServices::failing(500, "Model overloaded")));

    let report = controller.run(&workflow).await?;

    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.entries.len(), 2);
    let failed = &report.entries[1];
    assert_eq!(failed.node_id.as_ref(), Some(&ids[1]));
    assert!(failed.is_error());
    assert_eq!(failed.output, "Error: HTTP error 500: Model overloaded");
    assert!(report
        .entries
        .iter()
        .all(|e| e.node_id.as_ref() != Some(&ids[2])));
    Ok(())
}

#[tokio::test]
async fn failure_stops_every_later_node() -> anyhow::Result<()> {
    let (workflow, ids) = chain(vec![
        (NodeKind::Llm, vec![("userMessage", "one")]),
        (NodeKind::Llm, vec![("userMessage", "two")]),
        (NodeKind::Llm, vec![("userMessage", "three")]),
    ]);
    let services = Arc::new(FakeServices::with_generate(|req| {
        if req.user_message == "two" {
            Err(flowbench_services::ServiceError::Timeout(60))
        } else {
            Ok(req.user_message.clone())
        }
    }));
    let controller = RunController::new(services.clone());

    let report = controller.run(&workflow).await?;

    // Start marker, "one", failing "two"
    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.entries.len(), 3);
    assert_eq!(report.entries[2].node_id.as_ref(), Some(&ids[2]));
    assert_eq!(report.entries[2].output, "Error: Request timed out after 60 seconds");
    assert_eq!(services.calls(), vec!["generate:one", "generate:two"]);
    Ok(())
}

#[tokio::test]
async fn missing_parameter_fails_without_remote_call() -> anyhow::Result<()> {
    let (workflow, _) = chain(vec![(NodeKind::Llm, vec![])]);
    let services = Arc::new(FakeServices::echoing());
    let controller = RunController::new(services.clone());

    let report = controller.run(&workflow).await?;

    assert_eq!(report.state, RunState::Failed);
    assert_eq!(
        report.entries[1].output,
        "Error: Missing required parameter: userMessage"
    );
    assert!(services.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn graphs_without_start_or_end_emit_one_diagnostic() -> anyhow::Result<()> {
    let controller = RunController::new(Arc::new(FakeServices::echoing()));

    let mut no_start = Workflow::new();
    no_start.add_node(NodeKind::End, "End");
    let mut no_end = Workflow::new();
    no_end.add_node(NodeKind::Start, "Start");
    let mut two_starts = Workflow::new();
    two_starts.add_node(NodeKind::Start, "A");
    two_starts.add_node(NodeKind::Start, "B");
    two_starts.add_node(NodeKind::End, "End");

    for workflow in [no_start, no_end, two_starts, Workflow::new()] {
        let report = controller.run(&workflow).await?;
        assert_eq!(report.state, RunState::Failed);
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].node_id, None);
        assert!(report.entries[0].is_error());
    }
    Ok(())
}

#[tokio::test]
async fn disconnected_chain_never_runs() -> anyhow::Result<()> {
    let (mut workflow, ids) = chain(vec![(NodeKind::Llm, vec![("userMessage", "main")])]);
    let stray = workflow.add_node(NodeKind::Llm, "Stray");
    workflow.set_parameter(&stray, "userMessage", "stray")?;
    let sink = workflow.add_node(NodeKind::Output, "Sink");
    workflow.connect(&stray, &sink)?;

    let services = Arc::new(FakeServices::echoing());
    let controller = RunController::new(services.clone());
    let report = controller.run(&workflow).await?;

    assert!(report.succeeded());
    let logged: Vec<_> = report.entries.iter().filter_map(|e| e.node_id.clone()).collect();
    assert_eq!(logged, ids);
    assert_eq!(services.calls(), vec!["generate:main"]);
    Ok(())
}

#[tokio::test]
async fn every_executable_kind_runs_in_order() -> anyhow::Result<()> {
    let (workflow, _) = chain(vec![
        (NodeKind::Input, vec![("value", "rust")]),
        (
            NodeKind::WebScraping,
            vec![("url", "https://example.com"), ("instruction", "title")],
        ),
        (NodeKind::EmbeddingGenerator, vec![("text", "Rust is fast")]),
        (NodeKind::SimilaritySearch, vec![("query", "fast languages")]),
        (NodeKind::Memory, vec![]),
        (NodeKind::Tool, vec![]),
        (NodeKind::StructuredOutput, vec![]),
        (NodeKind::TextNote, vec![("text", "remember this")]),
        (NodeKind::Output, vec![]),
    ]);
    let services = Arc::new(FakeServices::echoing());
    let controller = RunController::new(services.clone());

    let report = controller.run(&workflow).await?;

    assert!(report.succeeded());
    assert_eq!(report.entries.len(), 11);
    assert_eq!(report.entries[1].output, "Input: rust");
    assert!(report.entries[2].output.contains("Example Domain"));
    assert!(report.entries[3].output.contains("ID: vec-42"));
    assert!(report.entries[4].output.starts_with("Found 1 matches"));
    assert_eq!(
        services.calls(),
        vec![
            "extract:https://example.com",
            "embed:4",
            "search:fast languages"
        ]
    );
    Ok(())
}

#[tokio::test]
async fn next_run_clears_previous_log() -> anyhow::Result<()> {
    let controller = RunController::new(Arc::new(FakeServices::replying("Hello")));
    let (ok, _) = chain(vec![(NodeKind::Llm, vec![("userMessage", "Hi")])]);

    controller.run(&ok).await?;
    assert_eq!(controller.log().await.len(), 3);

    let report = controller.run(&Workflow::new()).await?;
    assert_eq!(report.entries.len(), 1);
    assert_eq!(controller.log().await.len(), 1);

    controller.clear_log().await?;
    assert!(controller.log().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn second_run_is_rejected_while_busy() -> anyhow::Result<()> {
    let gate = Arc::new(Notify::new());
    let services = Arc::new(FakeServices::replying("done").gated(gate.clone()));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let controller = RunController::new(services).with_events(tx);
    let (workflow, ids) = chain(vec![(NodeKind::Llm, vec![("userMessage", "slow")])]);

    let background = {
        let controller = controller.clone();
        let workflow = workflow.clone();
        tokio::spawn(async move { controller.run(&workflow).await })
    };

    // Wait until the LLM node is executing
    while let Some(event) = rx.recv().await {
        if matches!(&event, RunEvent::NodeStarted { node_id, .. } if *node_id == ids[1]) {
            break;
        }
    }
    assert_eq!(controller.state().await, RunState::Running);
    assert_eq!(controller.run(&workflow).await.err(), Some(FlowError::RunInProgress));
    assert_eq!(controller.clear_log().await, Err(FlowError::RunInProgress));

    gate.notify_one();
    let report = background.await??;
    assert!(report.succeeded());
    assert_eq!(report.entries.len(), 3);
    Ok(())
}

#[tokio::test]
async fn events_mirror_the_log() -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let controller = RunController::new(Arc::new(FakeServices::replying("Hello"))).with_events(tx);
    let (workflow, ids) = chain(vec![(NodeKind::Llm, vec![("userMessage", "Hi")])]);

    let report = controller.run(&workflow).await?;
    drop(controller);

    let mut states = Vec::new();
    let mut entries = Vec::new();
    let mut started = Vec::new();
    while let Some(event) = rx.recv().await {
        match event {
            RunEvent::StateChanged(state) => states.push(state),
            RunEvent::EntryAppended(entry) => entries.push(entry),
            RunEvent::NodeStarted { node_id, .. } => started.push(node_id),
        }
    }

    assert_eq!(
        states,
        vec![RunState::Resolving, RunState::Running, RunState::Completed]
    );
    assert_eq!(entries, report.entries);
    assert_eq!(started, ids);
    Ok(())
}

#[tokio::test]
async fn cancelled_run_settles_and_allows_the_next_one() -> anyhow::Result<()> {
    let gate = Arc::new(Notify::new());
    let services = Arc::new(FakeServices::replying("done").gated(gate.clone()));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let controller = RunController::new(services).with_events(tx);
    let (workflow, _) = chain(vec![(NodeKind::Llm, vec![("userMessage", "slow")])]);

    let cancelled = tokio::time::timeout(Duration::from_millis(50), controller.run(&workflow)).await;
    assert!(cancelled.is_err());
    assert_eq!(controller.state().await, RunState::Failed);
    controller.clear_log().await?;

    let mut last_state = None;
    while let Ok(event) = rx.try_recv() {
        if let RunEvent::StateChanged(state) = event {
            last_state = Some(state);
        }
    }
    assert_eq!(last_state, Some(RunState::Failed));

    gate.notify_one();
    let report = controller.run(&workflow).await?;
    assert!(report.succeeded());
    assert_eq!(report.entries.len(), 3);
    Ok(())
}

#[tokio::test]
async fn prompts_reach_the_service_verbatim() -> anyhow::Result<()> {
    let prompt = "  code:\n    indented\n";
    let (workflow, _) = chain(vec![(NodeKind::Llm, vec![("userMessage", prompt)])]);
    let services = Arc::new(FakeServices::echoing());
    let controller = RunController::new(services.clone());

    let report = controller.run(&workflow).await?;

    assert!(report.succeeded());
    assert_eq!(services.calls(), vec![format!("generate:{}", prompt)]);
    Ok(())
}

#[tokio::test]
async fn serialized_graph_resolves_identically() -> anyhow::Result<()> {
    let (mut workflow, _) = chain(vec![
        (NodeKind::Input, vec![]),
        (NodeKind::Llm, vec![("userMessage", "Hi")]),
    ]);
    workflow.add_node(NodeKind::TextNote, "Loose note");

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("flow.json");
    workflow.save(&path)?;
    let restored = Workflow::load(&path)?;

    let before: Vec<_> = resolve_workflow(&workflow)?.into_iter().cloned().collect();
    let reloaded: Vec<_> = resolve_workflow(&restored)?.into_iter().cloned().collect();
    assert_eq!(before, reloaded);
    assert_eq!(restored, workflow);
    Ok(())
}
