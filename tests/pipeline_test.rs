//! Pipeline Integration Tests
//!
//! Screening, evaluation and execution driven by a scripted model against
//! real and recording capabilities.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use common::{screening_reply, spawn_backend, RecordingCapability, ScriptedModel};
use serde_json::json;
use storebot::{
    evaluate, execute, screen, AssistantReply, Capability, CapabilityDeclaration, CapabilityFilter,
    CapabilityRegistry, Category, ExecutionContext, ExecutionRequest, PipelineError, ToolCall,
};
use tempfile::TempDir;

fn builtin() -> CapabilityRegistry {
    CapabilityRegistry::builtin(&CapabilityFilter::default())
}

fn website_only(registry: &CapabilityRegistry) -> Vec<CapabilityDeclaration> {
    registry.declarations_for(&["set_website_availability"])
}

#[tokio::test]
async fn test_turn_website_offline() {
    let (endpoint, hits) = spawn_backend(StatusCode::OK).await;
    let registry = builtin();
    let candidates = website_only(&registry);
    let args = json!({
        "is_website_online": "false",
        "offline_until": "",
        "offline_message": "Back tomorrow at 5am"
    });

    let model = ScriptedModel::replying(vec![
        screening_reply("modification", "set_website_availability", args.clone()),
        AssistantReply::calls(vec![ToolCall::new("call_1", "set_website_availability", args)]),
        AssistantReply::text("Your website is now offline until 5am tomorrow."),
    ]);

    let screening = screen(&model, "gpt-test", "Turn my website offline", &candidates)
        .await
        .unwrap();
    assert_eq!(screening.category, Some(Category::Modification));
    assert_eq!(
        screening.recommended_capability.as_deref(),
        Some("set_website_availability")
    );

    let evaluation = evaluate(&registry, &screening, &[Category::Modification]).unwrap();
    let names = evaluation.capability_names();
    let context = ExecutionContext::new("store-77", "Bearer token-abc", &endpoint);

    let outcome = execute(
        &model,
        "gpt-test",
        &registry,
        ExecutionRequest {
            system_instructions: None,
            request: "Turn my website offline",
            declarations: &evaluation.declarations,
            capability_names: &names,
            context: &context,
        },
    )
    .await
    .unwrap();

    assert_eq!(outcome.answer, "Your website is now offline until 5am tomorrow.");
    assert_eq!(outcome.capability.as_deref(), Some("set_website_availability"));

    let hits = hits.lock().clone();
    assert_eq!(hits.len(), 1);
    let hit = &hits[0];
    assert_eq!(hit.store_id, "store-77");
    assert_eq!(hit.authorization.as_deref(), Some("Bearer token-abc"));
    assert_eq!(hit.passport.as_deref(), Some("1"));
    assert_eq!(hit.form["online"], "false");
    assert_eq!(hit.form["online_msg"], "Back tomorrow at 5am");
    assert!(hit.form["online_closed_till"].ends_with("05:00:00"));

    // The capability result is fed back before the final round
    let final_round = &model.requests()[2];
    let tool_message = serde_json::to_value(&final_round.messages[3]).unwrap();
    assert_eq!(tool_message["role"], "tool");
    assert!(tool_message["content"].as_str().unwrap().contains("\"success\""));
}

#[tokio::test]
async fn test_weather_question_is_unsupported() {
    let registry = builtin();
    let candidates = website_only(&registry);
    let model = ScriptedModel::replying(vec![screening_reply("irrelevant", "null", json!(null))]);

    let screening = screen(&model, "gpt-test", "What is the weather today?", &candidates)
        .await
        .unwrap();
    assert_eq!(screening.category, Some(Category::Irrelevant));
    assert_eq!(screening.recommended_capability.as_deref(), Some(""));

    let err = evaluate(&registry, &screening, &[Category::Modification]).unwrap_err();
    assert!(matches!(err, PipelineError::UnsupportedCategory(Category::Irrelevant)));
}

#[tokio::test]
async fn test_list_files_scenario() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("menu.pdf"), "menu").unwrap();
    let existing = dir.path().to_string_lossy().to_string();
    let missing = dir.path().join("nope").to_string_lossy().to_string();

    let registry = builtin();
    let handler = registry.handler("list_files").unwrap();
    let context = ExecutionContext::default();

    let args = context.merge_into(json!({"directory": existing}).as_object().unwrap().clone());
    let result = handler.invoke(args, &context).await.unwrap();
    assert_eq!(result["status"], "success");
    assert_eq!(result["message"]["files"], json!(["menu.pdf"]));

    let args = context.merge_into(json!({"directory": missing}).as_object().unwrap().clone());
    let result = handler.invoke(args, &context).await.unwrap();
    assert_eq!(result["status"], "error");
    assert!(result["message"]["error"].is_string());
}

#[tokio::test]
async fn test_exactly_one_invocation_with_context() {
    let recorder = RecordingCapability::new("record");
    let bystander = RecordingCapability::new("bystander");
    let registry = CapabilityRegistry::from_capabilities(vec![
        recorder.clone() as Arc<dyn Capability>,
        bystander.clone(),
    ]);
    let declarations = registry.declarations_for(&["record"]);
    let names = vec!["record".to_string()];
    let context = ExecutionContext::new("s1", "Bearer t1", "http://backend.local");

    let model = ScriptedModel::replying(vec![
        AssistantReply::calls(vec![ToolCall::new("c1", "record", json!({"value": "x"}))]),
        AssistantReply::text("Recorded."),
    ]);

    execute(
        &model,
        "gpt-test",
        &registry,
        ExecutionRequest {
            system_instructions: Some("Use the record capability."),
            request: "Record x",
            declarations: &declarations,
            capability_names: &names,
            context: &context,
        },
    )
    .await
    .unwrap();

    let calls = recorder.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["value"], "x");
    assert_eq!(calls[0]["config"]["store_id"], "s1");
    assert_eq!(calls[0]["config"]["authorization_header"], "Bearer t1");
    assert_eq!(calls[0]["config"]["endpoint"], "http://backend.local");
    assert!(bystander.calls().is_empty());

    // Only the validated declaration is offered
    let first_round = &model.requests()[0];
    assert_eq!(first_round.tools.len(), 1);
    assert_eq!(first_round.tools[0]["function"]["name"], "record");
}

#[test]
fn test_empty_request_and_candidates() {
    let registry = builtin();
    let candidates = registry.declarations();
    let model = ScriptedModel::new(vec![]);

    for request in ["", "   "] {
        let err = tokio_test::block_on(screen(&model, "m", request, &candidates)).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyRequest));

        let err = tokio_test::block_on(screen(&model, "m", request, &[])).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyRequest));
    }

    let err = tokio_test::block_on(screen(&model, "m", "Turn my website offline", &[])).unwrap_err();
    assert!(matches!(err, PipelineError::NoCapabilities));

    let names: Vec<String> = Vec::new();
    let context = ExecutionContext::default();
    let err = tokio_test::block_on(execute(
        &model,
        "m",
        &registry,
        ExecutionRequest {
            system_instructions: None,
            request: "Turn my website offline",
            declarations: &[],
            capability_names: &names,
            context: &context,
        },
    ))
    .unwrap_err();
    assert!(matches!(err, PipelineError::NoCapabilities));

    assert!(model.requests().is_empty());
}

#[test]
fn test_category_checked_before_capability() {
    let registry = builtin();
    for category in Category::ALL {
        if category == Category::Modification {
            continue;
        }
        let screening = storebot::ScreeningResult {
            category: Some(category),
            recommended_capability: Some("does_not_exist".to_string()),
            ..Default::default()
        };
        let err = evaluate(&registry, &screening, &[Category::Modification]).unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedCategory(c) if c == category));
    }
}
