//! Integration tests for action resolution, chaining, and the auth gate.

mod helpers;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::join_all;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use datahub_core::config::Precedence;
use datahub_core::{AppError, ErrorKind};
use datahub_plugin::prelude::*;

use helpers::{TestApp, TestPlugin, Trail, allow_anyone, allow_users, config, echo, payload};

fn replacement_plugin(name: &'static str) -> Arc<dyn Plugin> {
    TestPlugin::new(
        name,
        vec![Capability::Actions, Capability::AuthRules],
        move |r| {
            r.action("show", echo(name))?.auth_rule("show", allow_users())?;
            Ok(())
        },
    )
}

#[tokio::test]
async fn test_last_loaded_replacement_wins() {
    let app = TestApp::start(
        vec![replacement_plugin("a"), replacement_plugin("b")],
        config(&["a", "b"]),
    )
    .await;

    assert_eq!(app.sources("show"), vec!["b"]);
    let out = app.dispatch_as("ann", "show", payload(json!({}))).await.unwrap();
    assert_eq!(out["served_by"], json!("b"));
}

#[tokio::test]
async fn test_configured_order_decides_precedence() {
    let app = TestApp::start(
        vec![replacement_plugin("a"), replacement_plugin("b")],
        config(&["b", "a"]),
    )
    .await;

    let out = app.dispatch_as("ann", "show", payload(json!({}))).await.unwrap();
    assert_eq!(out["served_by"], json!("a"));
}

#[tokio::test]
async fn test_links_run_in_load_order_around_terminal() {
    let trail: Trail = Arc::default();

    let mut plugins = vec![replacement_plugin("core")];
    for label in ["outer", "middle", "inner"] {
        let trail = Arc::clone(&trail);
        plugins.push(TestPlugin::new(label, vec![Capability::Actions], move |r| {
            r.chain_action("show", helpers::tracing_link(label, &trail))?;
            Ok(())
        }));
    }

    let app = TestApp::start(plugins, config(&["core", "outer", "middle", "inner"])).await;
    assert_eq!(app.sources("show"), vec!["outer", "middle", "inner", "core"]);

    let out = app.dispatch_as("ann", "show", payload(json!({"id": 1}))).await.unwrap();

    assert_eq!(
        *trail.lock().unwrap(),
        vec![
            "enter outer",
            "enter middle",
            "enter inner",
            "leave inner",
            "leave middle",
            "leave outer"
        ]
    );
    // Each link saw the result of the link closer to the terminal.
    assert_eq!(out["trail"], json!(["inner", "middle", "outer"]));
    assert_eq!(out["served_by"], json!("core"));
}

#[tokio::test]
async fn test_link_over_replacement_scenario() {
    let a = TestPlugin::new(
        "A",
        vec![Capability::Actions, Capability::AuthRules],
        |r| {
            r.action(
                "show",
                Arc::new(FnAction::new(|_, payload| {
                    Box::pin(async move {
                        let mut out = payload;
                        out.insert("name".to_string(), json!("x"));
                        Ok(Value::Object(out))
                    })
                })),
            )?
            .auth_rule("show", allow_users())?;
            Ok(())
        },
    );
    let b = TestPlugin::new("B", vec![Capability::Actions], |r| {
        r.chain_action(
            "show",
            Arc::new(FnActionLink::new(|ctx, payload, next| {
                Box::pin(async move { next.run(ctx, payload).await })
            })),
        )?;
        Ok(())
    });

    let app = TestApp::start(vec![a, b], config(&["A", "B"])).await;

    assert_eq!(app.sources("show"), vec!["B", "A"]);
    let out = app.dispatch_as("ann", "show", payload(json!({"id": 7}))).await.unwrap();
    assert_eq!(out, json!({"id": 7, "name": "x"}));
}

#[tokio::test]
async fn test_link_substitutes_inner_error() {
    let core = TestPlugin::new(
        "core",
        vec![Capability::Actions, Capability::AuthRules],
        |r| {
            r.action(
                "package_show",
                Arc::new(FnAction::new(|_, _| {
                    Box::pin(async { Err(AppError::not_found("Dataset not found")) })
                })),
            )?
            .auth_rule("package_show", allow_anyone())?;
            Ok(())
        },
    );
    let fallback = TestPlugin::new("fallback", vec![Capability::Actions], |r| {
        r.chain_action(
            "package_show",
            Arc::new(FnActionLink::new(|ctx, payload, next| {
                Box::pin(async move {
                    match next.run(ctx, payload).await {
                        Err(e) if e.is(ErrorKind::NotFound) => Ok(json!({"placeholder": true})),
                        other => other,
                    }
                })
            })),
        )?;
        Ok(())
    });
    let passthrough = TestPlugin::new("passthrough", vec![Capability::Actions], |r| {
        r.chain_action(
            "package_show",
            Arc::new(FnActionLink::new(|ctx, payload, next| {
                Box::pin(async move { next.run(ctx, payload).await })
            })),
        )?;
        Ok(())
    });

    let with_fallback = TestApp::start(
        vec![Arc::clone(&core), fallback, Arc::clone(&passthrough)],
        config(&["core", "fallback"]),
    )
    .await;
    let out = with_fallback
        .dispatch_anonymous("package_show", payload(json!({})))
        .await
        .unwrap();
    assert_eq!(out, json!({"placeholder": true}));

    // Without a catching link the error reaches the caller unchanged.
    let plain = TestApp::start(vec![core, passthrough], config(&["core", "passthrough"])).await;
    let err = plain
        .dispatch_anonymous("package_show", payload(json!({})))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(err.message, "Dataset not found");
}

#[tokio::test]
async fn test_short_circuit_skips_terminal() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let core = TestPlugin::new(
        "core",
        vec![Capability::Actions, Capability::AuthRules],
        move |r| {
            let counted = Arc::clone(&counted);
            r.action(
                "package_search",
                Arc::new(FnAction::new(move |_, _| {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Box::pin(async { Ok(json!({"count": 0, "source": "db"})) })
                })),
            )?
            .auth_rule("package_search", allow_anyone())?;
            Ok(())
        },
    );
    let cache = TestPlugin::new("cache", vec![Capability::Actions], |r| {
        r.chain_action(
            "package_search",
            Arc::new(FnActionLink::new(|ctx, payload, next| {
                Box::pin(async move {
                    if payload.get("q") == Some(&json!("cached")) {
                        return Ok(json!({"count": 3, "source": "cache"}));
                    }
                    next.run(ctx, payload).await
                })
            })),
        )?;
        Ok(())
    });

    let app = TestApp::start(vec![core, cache], config(&["core", "cache"])).await;

    let hit = app
        .dispatch_anonymous("package_search", payload(json!({"q": "cached"})))
        .await
        .unwrap();
    assert_eq!(hit["source"], json!("cache"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let miss = app
        .dispatch_anonymous("package_search", payload(json!({"q": "water"})))
        .await
        .unwrap();
    assert_eq!(miss["source"], json!("db"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

fn rule_plugin(name: &'static str, allowed: bool) -> Arc<dyn Plugin> {
    TestPlugin::new(name, vec![Capability::AuthRules], move |r| {
        r.auth_rule(
            "package_update",
            Arc::new(FnAuthRule::new(move |_, _| {
                if allowed {
                    AuthDecision::allow()
                } else {
                    AuthDecision::deny(format!("{name} denies package_update"))
                }
            })),
        )?;
        Ok(())
    })
}

fn update_plugin(calls: &Arc<AtomicUsize>) -> Arc<dyn Plugin> {
    let calls = Arc::clone(calls);
    TestPlugin::new("core", vec![Capability::Actions], move |r| {
        let calls = Arc::clone(&calls);
        r.action(
            "package_update",
            Arc::new(FnAction::new(move |_, payload| {
                calls.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move { Ok(Value::Object(payload)) })
            })),
        )?;
        Ok(())
    })
}

#[tokio::test]
async fn test_first_wins_auth_namespace() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut cfg = config(&["core", "strict", "lenient"]);
    cfg.auth_precedence = Precedence::FirstWins;

    let app = TestApp::start(
        vec![
            update_plugin(&calls),
            rule_plugin("strict", false),
            rule_plugin("lenient", true),
        ],
        cfg,
    )
    .await;

    let err = app
        .dispatch_as("ann", "package_update", payload(json!({})))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Authorization);
    assert_eq!(err.message, "strict denies package_update");

    // Actions still resolve last-wins.
    assert_eq!(
        app.manager.snapshot().actions().resolve("package_update").unwrap().sources(),
        vec!["core"]
    );
}

#[tokio::test]
async fn test_denied_call_never_reaches_terminal() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = TestApp::start(
        vec![update_plugin(&calls), rule_plugin("strict", false)],
        config(&["core", "strict"]),
    )
    .await;

    let mut ctx = CallContext::for_principal(Principal::user("ann"));
    let decision = app
        .manager
        .check("package_update", &mut ctx, &payload(json!({})))
        .await
        .unwrap();
    assert!(!decision.allowed);

    let err = app
        .dispatch_as("ann", "package_update", payload(json!({"id": 1})))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Authorization);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // Sysadmins bypass rules that do not opt into checking them.
    let mut admin = CallContext::for_principal(Principal::sysadmin("root"));
    app.manager
        .dispatch("package_update", &mut admin, payload(json!({"id": 1})))
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_auth_rule_is_unknown_operation() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = TestApp::start(vec![update_plugin(&calls)], config(&["core"])).await;

    let err = app
        .dispatch_as("ann", "package_update", payload(json!({})))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownOperation);
    assert_eq!(err.message, "Unknown auth operation 'package_update'");
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let err = app
        .dispatch_as("ann", "package_purge", payload(json!({})))
        .await
        .unwrap_err();
    assert_eq!(err.message, "Unknown action operation 'package_purge'");
}

#[tokio::test]
async fn test_auth_link_wraps_rule() {
    let calls = Arc::new(AtomicUsize::new(0));
    let blocklist = TestPlugin::new("blocklist", vec![Capability::AuthRules], |r| {
        #[derive(Debug)]
        struct Blocklist;

        #[async_trait]
        impl AuthLink for Blocklist {
            async fn check(
                &self,
                ctx: &mut CallContext,
                payload: &Payload,
                next: AuthNext<'_>,
            ) -> AppResult<AuthDecision> {
                if ctx.actor() == Some("mallory") {
                    return Ok(AuthDecision::deny("User is blocked"));
                }
                next.run(ctx, payload).await
            }
        }

        r.chain_auth_rule("package_update", Arc::new(Blocklist))?;
        Ok(())
    });

    let app = TestApp::start(
        vec![update_plugin(&calls), rule_plugin("open", true), blocklist],
        config(&["core", "open", "blocklist"]),
    )
    .await;

    let err = app
        .dispatch_as("mallory", "package_update", payload(json!({})))
        .await
        .unwrap_err();
    assert_eq!(err.message, "User is blocked");

    app.dispatch_as("ann", "package_update", payload(json!({})))
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_validation_runs_before_chain() {
    #[derive(Debug)]
    struct RequireName;

    #[async_trait]
    impl PayloadValidator for RequireName {
        async fn validate(&self, _ctx: &CallContext, payload: Payload) -> AppResult<Payload> {
            match payload.get("name").and_then(Value::as_str) {
                Some(name) => {
                    let mut out = payload.clone();
                    out.insert("name".to_string(), json!(name.to_lowercase()));
                    Ok(out)
                }
                None => Err(AppError::validation("name: Missing value")),
            }
        }
    }

    let core = TestPlugin::new(
        "core",
        vec![Capability::Actions, Capability::AuthRules],
        |r| {
            r.action("package_create", echo("core"))?
                .validator("package_create", Arc::new(RequireName))?
                .auth_rule("package_create", allow_users())?;
            Ok(())
        },
    );
    let trail: Trail = Arc::default();
    let link_trail = Arc::clone(&trail);
    let audit = TestPlugin::new("audit", vec![Capability::Actions], move |r| {
        r.chain_action("package_create", helpers::tracing_link("audit", &link_trail))?;
        Ok(())
    });

    let app = TestApp::start(vec![core, audit], config(&["core", "audit"])).await;

    let out = app
        .dispatch_as("ann", "package_create", payload(json!({"name": "Rivers"})))
        .await
        .unwrap();
    assert_eq!(out["name"], json!("rivers"));

    let err = app
        .dispatch_as("ann", "package_create", payload(json!({})))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(err.message, "name: Missing value");
    assert_eq!(trail.lock().unwrap().len(), 2);

    // A trusted payload skips the validator.
    let mut ctx = CallContext::for_principal(Principal::user("ann")).trusted();
    let out = app
        .manager
        .dispatch("package_create", &mut ctx, payload(json!({"name": "Rivers"})))
        .await
        .unwrap();
    assert_eq!(out["name"], json!("Rivers"));
}

#[tokio::test]
async fn test_context_changes_visible_to_caller() {
    let core = TestPlugin::new(
        "core",
        vec![Capability::Actions, Capability::AuthRules],
        |r| {
            r.action(
                "package_patch",
                Arc::new(FnAction::new(|ctx, _| {
                    let seen = ctx.extra("audited").cloned();
                    Box::pin(async move { Ok(json!({ "audited": seen })) })
                })),
            )?
            .auth_rule("package_patch", allow_users())?;
            Ok(())
        },
    );
    let audit = TestPlugin::new("audit", vec![Capability::Actions], |r| {
        r.chain_action(
            "package_patch",
            Arc::new(FnActionLink::new(|ctx, payload, next| {
                Box::pin(async move {
                    ctx.set_extra("audited", json!(true));
                    next.run(ctx, payload).await
                })
            })),
        )?;
        Ok(())
    });

    let app = TestApp::start(vec![core, audit], config(&["core", "audit"])).await;

    let mut ctx = CallContext::for_principal(Principal::user("ann")).with_extra("origin", json!("api"));
    let out = app
        .manager
        .dispatch("package_patch", &mut ctx, payload(json!({})))
        .await
        .unwrap();

    assert_eq!(out, json!({"audited": true}));
    assert_eq!(ctx.extra("audited"), Some(&json!(true)));
    assert_eq!(ctx.extra("origin"), Some(&json!("api")));
}

#[tokio::test]
async fn test_concurrent_dispatches_use_own_context() {
    let app = TestApp::start(
        vec![replacement_plugin("a"), replacement_plugin("b")],
        config(&["a", "b"]),
    )
    .await;

    let calls = (0..64).map(|i| {
        let app = &app;
        async move {
            let user = format!("user-{i}");
            let mut ctx = CallContext::for_principal(Principal::user(&user));
            let out = app
                .manager
                .dispatch("show", &mut ctx, payload(json!({ "n": i })))
                .await
                .unwrap();
            (i, out)
        }
    });

    for (i, out) in join_all(calls).await {
        assert_eq!(out["n"], json!(i));
        assert_eq!(out["served_by"], json!("b"));
    }
}

#[tokio::test]
async fn test_cancellation_stops_chain() {
    let calls = Arc::new(AtomicUsize::new(0));
    let canceller = TestPlugin::new("canceller", vec![Capability::Actions], |r| {
        r.chain_action(
            "package_update",
            Arc::new(FnActionLink::new(|ctx, payload, next| {
                Box::pin(async move {
                    ctx.cancellation().cancel();
                    next.run(ctx, payload).await
                })
            })),
        )?;
        Ok(())
    });

    let app = TestApp::start(
        vec![update_plugin(&calls), rule_plugin("open", true), canceller],
        config(&["core", "open", "canceller"]),
    )
    .await;

    let err = app
        .dispatch_as("ann", "package_update", payload(json!({})))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Cancelled);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let token = CancellationToken::new();
    token.cancel();
    let mut ctx = CallContext::for_principal(Principal::user("ann")).with_cancellation(token);
    let err = app
        .manager
        .dispatch("package_update", &mut ctx, payload(json!({})))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Cancelled);
}

#[tokio::test]
async fn test_ignore_auth_for_internal_calls() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = TestApp::start(
        vec![update_plugin(&calls), rule_plugin("strict", false)],
        config(&["core", "strict"]),
    )
    .await;

    let mut ctx = CallContext::new().ignoring_auth();
    app.manager
        .dispatch("package_update", &mut ctx, payload(json!({})))
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
