//! Integration coverage for plugin dependency resolution driving real capability
//! registration and service startup, and for model-dispatcher fallback across providers.

mod init_logging;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use agent_runtime::registry::{Service, ServiceError, ServiceFactory};
use agent_runtime::{ModelType, Plugin, Runtime};

struct CounterService {
    stopped: Arc<AtomicBool>,
}

#[async_trait]
impl Service for CounterService {
    fn service_type(&self) -> &str {
        "counter"
    }
    fn capability_description(&self) -> &str {
        "counts things"
    }
    async fn stop(&self) -> Result<(), ServiceError> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// **Scenario**: a diamond of plugin dependencies (`top` depends on `left`/`right`, both of
/// which depend on `base`) resolves in an order where `base`'s service is running by the
/// time `initialize()` returns, and every plugin's `init` saw the runtime with `base`'s
/// capabilities already registered.
#[tokio::test]
async fn diamond_dependency_drives_real_service_start() {
    let rt = Arc::new(Runtime::new(HashMap::new()).unwrap());
    let stopped = Arc::new(AtomicBool::new(false));
    let init_order = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));

    let base = Plugin::new("base").with_service(ServiceFactory::new("counter", {
        let stopped = stopped.clone();
        move |_rt| {
            let stopped = stopped.clone();
            async move { Ok(Arc::new(CounterService { stopped }) as Arc<dyn Service>) }
        }
    }));

    let mk_dependent = |name: &'static str, deps: Vec<&'static str>| {
        let init_order = init_order.clone();
        Plugin::new(name)
            .with_dependencies(deps.into_iter().map(String::from).collect())
            .with_init(move |_rt| {
                let init_order = init_order.clone();
                async move {
                    init_order.lock().unwrap().push(name.to_string());
                    Ok(())
                }
            })
    };

    rt.register_plugin(base);
    rt.register_plugin(mk_dependent("left", vec!["base"]));
    rt.register_plugin(mk_dependent("right", vec!["base"]));
    rt.register_plugin(mk_dependent("top", vec!["left", "right"]));

    rt.initialize().await.expect("dependency resolution and init should succeed");

    assert!(rt.get_service("counter").is_some(), "base's service should be running after initialize()");

    let order = init_order.lock().unwrap().clone();
    let pos = |n: &str| order.iter().position(|x| x == n).unwrap();
    assert!(pos("left") < pos("top"));
    assert!(pos("right") < pos("top"));

    rt.shutdown().await;
    assert!(stopped.load(Ordering::SeqCst), "service should be stopped on shutdown");
}

/// **Scenario**: two `TEXT_LARGE` handlers are registered, a higher-priority one that always
/// fails and a lower-priority fallback that succeeds. `use_model` tries the higher-priority
/// handler first, observes its failure, and falls back — never retrying the failed handler.
#[tokio::test]
async fn model_dispatcher_falls_back_to_lower_priority_handler_on_failure() {
    let rt = Runtime::new_for_test();
    let high_priority_attempts = Arc::new(AtomicUsize::new(0));

    {
        let attempts = high_priority_attempts.clone();
        rt.register_model(ModelType::TextLarge, "flaky-provider", 10, move |_rt, _params| {
            let attempts = attempts.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err("simulated provider outage".to_string())
            }
        });
    }
    rt.register_model(ModelType::TextLarge, "stable-provider", 0, |_rt, _params| async move {
        Ok(Value::String("fallback response".to_string()))
    });

    let result = rt.use_model(ModelType::TextLarge, Value::Null).await.unwrap();
    assert_eq!(result, Value::String("fallback response".to_string()));
    assert_eq!(high_priority_attempts.load(Ordering::SeqCst), 1, "the failed handler must not be retried");
}

/// **Scenario**: when every handler for a model type fails, `use_model` surfaces the last
/// error rather than silently returning something.
#[tokio::test]
async fn model_dispatcher_surfaces_error_when_every_handler_fails() {
    let rt = Runtime::new_for_test();
    rt.register_model(ModelType::TextSmall, "only-provider", 0, |_rt, _params| async move {
        Err("unauthorized".to_string())
    });

    let err = rt.use_model(ModelType::TextSmall, Value::Null).await.unwrap_err();
    assert!(err.to_string().contains("unauthorized"));
}
