//! Integration tests for activation, deactivation, and snapshot swaps.

mod helpers;

use std::sync::Arc;

use serde_json::json;

use datahub_core::ErrorKind;
use datahub_core::config::HookOrder;
use datahub_plugin::prelude::*;

use helpers::{TestApp, TestPlugin, allow_users, config, echo, payload};

fn show_plugin(name: &'static str) -> Arc<dyn Plugin> {
    TestPlugin::new(
        name,
        vec![Capability::Actions, Capability::AuthRules],
        move |r| {
            r.action("show", echo(name))?.auth_rule("show", allow_users())?;
            Ok(())
        },
    )
}

fn link_plugin(name: &'static str) -> Arc<dyn Plugin> {
    TestPlugin::new(name, vec![Capability::Actions], move |r| {
        r.chain_action(
            "show",
            Arc::new(FnActionLink::new(move |ctx, payload, next| {
                Box::pin(async move {
                    let mut out = next.run(ctx, payload).await?;
                    if let Some(obj) = out.as_object_mut() {
                        obj.insert(format!("via_{name}"), json!(true));
                    }
                    Ok(out)
                })
            })),
        )?;
        Ok(())
    })
}

fn catalog_plugins() -> Vec<Arc<dyn Plugin>> {
    vec![
        show_plugin("a"),
        show_plugin("b"),
        show_plugin("c"),
        link_plugin("wrap"),
    ]
}

#[tokio::test]
async fn test_deactivation_removes_contributions() {
    let app = TestApp::start(catalog_plugins(), config(&["a", "wrap", "b"])).await;
    assert_eq!(app.sources("show"), vec!["wrap", "b"]);

    app.manager.deactivate("wrap").await.unwrap();
    assert_eq!(app.sources("show"), vec!["b"]);

    app.manager.deactivate("b").await.unwrap();
    assert_eq!(app.sources("show"), vec!["a"]);

    let out = app.dispatch_as("ann", "show", payload(json!({}))).await.unwrap();
    assert_eq!(out, json!({"served_by": "a"}));
}

#[tokio::test]
async fn test_old_snapshot_stays_valid_after_rebuild() {
    let app = TestApp::start(catalog_plugins(), config(&["a", "wrap"])).await;

    let before = app.manager.snapshot();
    let old_plan = before.actions().resolve("show").unwrap();
    let generation = before.generation();

    app.manager.deactivate("wrap").await.unwrap();

    let after = app.manager.snapshot();
    assert_eq!(after.generation(), generation + 1);
    assert_eq!(old_plan.sources(), vec!["wrap", "a"]);
    assert_eq!(after.actions().resolve("show").unwrap().sources(), vec!["a"]);

    // Dispatching through the old snapshot still runs the old chain.
    let mut ctx = CallContext::for_principal(Principal::user("ann"));
    let out = before
        .dispatch("show", &mut ctx, payload(json!({})))
        .await
        .unwrap();
    assert_eq!(out["via_wrap"], json!(true));

    let out = app.dispatch_as("ann", "show", payload(json!({}))).await.unwrap();
    assert!(out.get("via_wrap").is_none());
}

#[tokio::test]
async fn test_reactivation_moves_plugin_to_the_end() {
    let app = TestApp::start(catalog_plugins(), config(&["b", "c"])).await;
    assert_eq!(app.sources("show"), vec!["c"]);

    app.manager.deactivate("b").await.unwrap();
    app.manager.activate(&["b".to_string()]).await.unwrap();

    let snapshot = app.manager.snapshot();
    let orders: Vec<(String, u32)> = snapshot
        .plugins()
        .ordered()
        .iter()
        .map(|e| (e.name().to_string(), e.load_order()))
        .collect();
    assert_eq!(orders, vec![("c".to_string(), 1), ("b".to_string(), 2)]);
    assert_eq!(app.sources("show"), vec!["b"]);
}

#[tokio::test]
async fn test_invalid_activation_leaves_registry_untouched() {
    let sneaky = TestPlugin::new("sneaky", vec![Capability::Actions], |r| {
        r.auth_rule("show", allow_users())?;
        Ok(())
    });
    let mut plugins = catalog_plugins();
    plugins.push(sneaky);

    let app = TestApp::start(plugins, config(&["a"])).await;
    let generation = app.manager.snapshot().generation();

    let err = app.manager.activate(&["a".to_string()]).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Configuration);

    let err = app.manager.activate(&["ghost".to_string()]).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Configuration);

    let err = app
        .manager
        .activate(&["sneaky".to_string()])
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Configuration);
    assert!(err.message.contains("sneaky"));

    assert_eq!(app.manager.snapshot().generation(), generation);
    assert!(!app.manager.is_active("sneaky"));
    assert_eq!(app.sources("show"), vec!["a"]);
}

#[tokio::test]
async fn test_dispatch_during_reconfiguration_sees_whole_snapshot() {
    let app = TestApp::start(catalog_plugins(), config(&["a", "wrap", "b"])).await;

    let dispatches = futures::future::join_all((0..32).map(|_| {
        app.dispatch_as("ann", "show", payload(json!({})))
    }));
    let reconfigure = async {
        app.manager.deactivate("wrap").await.unwrap();
        app.manager.deactivate("b").await.unwrap();
    };

    let (results, ()) = tokio::join!(dispatches, reconfigure);

    for out in results {
        let out = out.unwrap();
        // The link and its terminal come from one snapshot, never a mix.
        match out["served_by"].as_str() {
            Some("b") => {}
            Some("a") => assert!(out.get("via_wrap").is_none()),
            other => panic!("unexpected terminal {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_hook_order_is_configured_per_point() {
    let recorder = |name: &'static str| {
        TestPlugin::new(
            name,
            vec![
                Capability::Hooks(HookPoint::Dataset),
                Capability::Hooks(HookPoint::ServerLifecycle),
            ],
            move |r| {
                let handler = Arc::new(FnHook::new(move |_, _, payload| {
                    let mut next = payload.clone();
                    let seen = next.entry("seen").or_insert_with(|| json!([]));
                    if let Some(items) = seen.as_array_mut() {
                        items.push(json!(name));
                    }
                    Ok(HookAction::ContinueWith(next))
                }));
                r.subscribe(HookPoint::Dataset, handler.clone())?
                    .subscribe(HookPoint::ServerLifecycle, handler)?;
                Ok(())
            },
        )
    };

    let mut cfg = config(&["first", "second", "third"]);
    cfg.hook_order
        .insert("server_lifecycle".to_string(), HookOrder::Reverse);
    let app = TestApp::start(
        vec![recorder("first"), recorder("second"), recorder("third")],
        cfg,
    )
    .await;

    let mut ctx = CallContext::new();
    let dataset = app
        .manager
        .notify(&mut ctx, &HookPoint::Dataset, events::AFTER_CREATE, Payload::new())
        .await
        .unwrap();
    assert_eq!(dataset["seen"], json!(["first", "second", "third"]));

    let shutdown = app
        .manager
        .notify(
            &mut ctx,
            &HookPoint::ServerLifecycle,
            events::SERVER_SHUTDOWN,
            Payload::new(),
        )
        .await
        .unwrap();
    assert_eq!(shutdown["seen"], json!(["third", "second", "first"]));
}

#[tokio::test]
async fn test_failing_hook_stops_remaining_observers() {
    let observer = |name: &'static str, fail: bool| {
        TestPlugin::new(name, vec![Capability::Hooks(HookPoint::Dataset)], move |r| {
            r.subscribe(
                HookPoint::Dataset,
                Arc::new(FnHook::new(move |_, _, payload| {
                    if fail {
                        return Err(AppError::internal(format!("{name} exploded")));
                    }
                    let mut next = payload.clone();
                    next.insert(name.to_string(), json!(true));
                    Ok(HookAction::ContinueWith(next))
                })),
            )?;
            Ok(())
        })
    };

    let app = TestApp::start(
        vec![
            observer("one", false),
            observer("two", true),
            observer("three", false),
        ],
        config(&["one", "two", "three"]),
    )
    .await;

    let err = app
        .manager
        .notify(
            &mut CallContext::new(),
            &HookPoint::Dataset,
            events::AFTER_UPDATE,
            Payload::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Internal);
    assert_eq!(err.message, "two exploded");

    app.manager.deactivate("two").await.unwrap();
    let out = app
        .manager
        .notify(
            &mut CallContext::new(),
            &HookPoint::Dataset,
            events::AFTER_UPDATE,
            Payload::new(),
        )
        .await
        .unwrap();
    assert_eq!(out.get("one"), Some(&json!(true)));
    assert_eq!(out.get("three"), Some(&json!(true)));
}

#[tokio::test]
async fn test_dropped_dispatch_releases_snapshot_binding() {
    let slow = TestPlugin::new(
        "slow",
        vec![Capability::Actions, Capability::AuthRules],
        |r| {
            r.action(
                "harvest_run",
                Arc::new(FnAction::new(|_, _| {
                    Box::pin(async move {
                        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
                        Ok(json!("harvested"))
                    })
                })),
            )?
            .auth_rule("harvest_run", allow_users())?;
            Ok(())
        },
    );
    let mut plugins = catalog_plugins();
    plugins.push(slow);
    let app = TestApp::start(plugins, config(&["a", "slow"])).await;

    let mut ctx = CallContext::for_principal(Principal::user("ann"));
    let timed_out = tokio::time::timeout(
        std::time::Duration::from_millis(20),
        app.manager.dispatch("harvest_run", &mut ctx, Payload::new()),
    )
    .await;
    assert!(timed_out.is_err());
    assert_eq!(ctx.snapshot().unwrap_err().kind, ErrorKind::Internal);

    app.manager.deactivate("a").await.unwrap();

    let err = ctx.dispatch("show", Payload::new()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Internal);
    let err = app
        .manager
        .dispatch("show", &mut ctx, Payload::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownOperation);
}
