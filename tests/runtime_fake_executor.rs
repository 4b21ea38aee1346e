// tests/runtime_fake_executor.rs

mod common;

use std::error::Error;
use std::path::Path;
use std::sync::{Arc, Mutex};

use common::{init_tracing, instance_at, loader_for, path, FakeExecutor, RecordingLifecycle};

use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Duration};

use jobtree::config::JobLoader;
use jobtree::engine::{CoreRuntime, Engine, EngineEvent, Runtime};
use jobtree::exec::SupervisorRequest;
use jobtree::expr::KleeneEvaluator;
use jobtree::fs::mock::MockFileSystem;
use jobtree::types::{LogicalValue, NodeResult};

type TestResult = Result<(), Box<dyn Error>>;

const DOC: &str = "/jobs/root.toml";

const CHAIN: &str = r#"
[config]
settle_delay = "0ms"

[job]
name = "Chain"
expression = "a | b"

[[node]]
id = "a"
checker = { plugin = "constant", args = { value = "false" } }

[[node]]
id = "b"
checker = { plugin = "constant", args = { value = "true" } }
trigger = { on = ["false"], source = "a" }
"#;

fn engine() -> (Arc<MockFileSystem>, Engine) {
    let (fs, loader) = loader_for(&[(DOC, CHAIN)]);
    let loaded = loader.load(Path::new(DOC), true, false).unwrap();
    let engine = Engine::new(
        loaded,
        DOC,
        Arc::new(loader),
        Arc::new(RecordingLifecycle::new()),
    )
    .unwrap();
    (fs, engine)
}

#[tokio::test]
async fn a_false_result_fires_the_listening_node() -> TestResult {
    init_tracing();
    let (_fs, engine) = engine();
    let (a, b) = {
        let tree = engine.tree().lock().await;
        (instance_at(&tree, "root/main/a"), instance_at(&tree, "root/main/b"))
    };

    let (rt_tx, rt_rx) = mpsc::channel::<EngineEvent>(16);
    let requests = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(rt_tx.clone(), requests.clone());

    rt_tx
        .send(EngineEvent::NodeResult {
            instance: a,
            result: NodeResult::new(LogicalValue::False),
        })
        .await?;
    rt_tx.send(EngineEvent::ShutdownRequested).await?;

    let core = CoreRuntime::new(Arc::new(KleeneEvaluator));
    let runtime = Runtime::new(core, engine.clone(), rt_tx, rt_rx, executor);

    match timeout(Duration::from_secs(3), runtime.run()).await {
        Ok(result) => result?,
        Err(_) => panic!("runtime did not finish within 3 seconds"),
    }

    let requests = requests.lock().unwrap().clone();
    assert!(requests.iter().any(|r| matches!(
        r,
        SupervisorRequest::Fire { instance, event } if *instance == b && event.event == "false" && event.source == "a"
    )));
    let stopped: Vec<_> = requests
        .iter()
        .filter_map(|r| match r {
            SupervisorRequest::Stop(i) => Some(*i),
            _ => None,
        })
        .collect();
    assert_eq!(stopped, vec![a, b]);

    let tree = engine.tree().lock().await;
    let a = tree.node(tree.find(&path("root/main/a")).unwrap())?;
    assert_eq!(a.value(), LogicalValue::False);
    Ok(())
}

#[tokio::test]
async fn reload_requests_are_applied_while_running() -> TestResult {
    init_tracing();
    let (fs, engine) = engine();

    let (rt_tx, rt_rx) = mpsc::channel::<EngineEvent>(16);
    let requests = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(rt_tx.clone(), requests.clone());
    let core = CoreRuntime::new(Arc::new(KleeneEvaluator));
    let runtime = Runtime::new(core, engine.clone(), rt_tx.clone(), rt_rx, executor);
    let handle = tokio::spawn(runtime.run());

    fs.add_file(DOC, CHAIN.replace("a | b", "a & b"));
    rt_tx
        .send(EngineEvent::ReloadRequested {
            origin: path("root/main"),
        })
        .await?;

    let reloaded = timeout(Duration::from_secs(3), async {
        loop {
            {
                let tree = engine.tree().lock().await;
                let main = tree.find(&path("root/main")).and_then(|k| tree.get(k));
                if main.is_some_and(|n| n.config.expression.as_deref() == Some("a & b")) {
                    break;
                }
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(reloaded.is_ok(), "reload was not applied");

    rt_tx.send(EngineEvent::ShutdownRequested).await?;
    timeout(Duration::from_secs(3), handle).await???;
    Ok(())
}
