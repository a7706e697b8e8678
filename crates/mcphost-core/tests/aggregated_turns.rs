//! Conversations routed across several discovered backends, driven through
//! the public API only.

use std::sync::Arc;
use std::time::Duration;

use mcphost_core::discovery::StaticResolver;
use mcphost_core::engine::{ChannelSink, ChatEvent, DoneReason};
use mcphost_core::logging::NoOpLogger;
use mcphost_core::providers::{MockProvider, MockReply};
use mcphost_core::tools::{AggregatedRouter, LocalBackend, LocalConnector, ToolRouter};
use mcphost_core::{CancellationToken, HostConfig, HostContext, Logger, Tool};
use serde_json::json;

fn logger() -> Arc<dyn Logger> {
    Arc::new(NoOpLogger::new())
}

struct Cluster {
    clock: Arc<LocalBackend>,
    weather: Arc<LocalBackend>,
    router: Arc<AggregatedRouter>,
}

async fn cluster() -> Cluster {
    let clock = Arc::new(LocalBackend::new("10.0.0.1:7000").with_fixed("time_now", "12:00"));
    let weather = Arc::new(LocalBackend::new("10.0.0.2:7000").with_tool(
        Tool::new("forecast", "Forecast for a city"),
        |args| match args.get("city").and_then(|c| c.as_str()) {
            Some(city) => Ok(format!("sunny in {city}")),
            None => Err("city is required".to_string()),
        },
    ));

    let connector = Arc::new(LocalConnector::new());
    connector.register(clock.clone());
    connector.register(weather.clone());

    let resolver = Arc::new(
        StaticResolver::new()
            .with_instance("tools", "10.0.0.1:7000")
            .with_instance("tools", "10.0.0.2:7000"),
    );

    let router = AggregatedRouter::connect(
        vec!["tools".to_string()],
        resolver,
        connector,
        Duration::from_secs(60),
        logger(),
    )
    .await;

    Cluster {
        clock,
        weather,
        router,
    }
}

#[tokio::test]
async fn test_tool_calls_reach_their_owning_backend() {
    let cluster = cluster().await;
    let provider = MockProvider::scripted(
        vec![
            MockReply::tool_call("c1", "forecast", json!({"city": "Oslo"})),
            MockReply::tool_call("c2", "time_now", json!({})),
            MockReply::text("Sunny at noon."),
        ],
        logger(),
    );
    let host = HostContext::with_parts(
        HostConfig::default(),
        Arc::new(provider),
        cluster.router.clone(),
        logger(),
    );

    let catalog: Vec<String> = host.router().catalog().into_iter().map(|t| t.name).collect();
    assert_eq!(catalog, vec!["forecast".to_string(), "time_now".to_string()]);

    let (sink, mut events) = ChannelSink::new();
    let outcome = host
        .engine()
        .stream_chat(&CancellationToken::new(), "trip", "weather and time?", &sink)
        .await
        .unwrap();

    assert_eq!(outcome.reason, DoneReason::Completed);
    assert_eq!(outcome.rounds, 2);
    assert_eq!(outcome.text, "Sunny at noon.");
    assert_eq!(cluster.weather.call_count(), 1);
    assert_eq!(cluster.clock.call_count(), 1);

    let mut results = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ChatEvent::ToolResult { name, result, .. } = event {
            results.push((name, result));
        }
    }
    assert_eq!(
        results,
        vec![
            ("forecast".to_string(), "sunny in Oslo".to_string()),
            ("time_now".to_string(), "12:00".to_string()),
        ]
    );

    host.shutdown().await;
    assert!(cluster.router.is_closed());
    assert_eq!(cluster.clock.close_count(), 1);
    assert_eq!(cluster.weather.close_count(), 1);
}

#[tokio::test]
async fn test_backend_failure_is_visible_to_the_model() {
    let cluster = cluster().await;
    let provider = Arc::new(MockProvider::scripted(
        vec![
            MockReply::tool_call("c1", "forecast", json!({})),
            MockReply::text("I need a city."),
        ],
        logger(),
    ));
    let host = HostContext::with_parts(
        HostConfig::default(),
        provider.clone(),
        cluster.router.clone(),
        logger(),
    );

    let reply = host.engine().chat("c", "forecast please").await.unwrap();
    assert_eq!(reply, "I need a city.");

    let history = host.engine().history("c");
    assert!(history[2].content.starts_with("tool error: "));
    assert!(history[2].content.contains("city is required"));

    host.shutdown().await;
}
