// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Integration tests for request dispatch and page rendering.
//!
//! These tests drive whole requests through the engine with an in-memory
//! transport and inspect the emitted wire output.

use std::fs;
use std::sync::{Arc, Mutex};

use luap::{Engine, EngineConfig, LuapError, MemoryFileStore, MemoryTransport, Next};
use mlua::Value;
use tempfile::tempdir;

/// Create an engine over an in-memory site rooted at `/site`
fn site(files: &[(&str, &str)]) -> (MemoryFileStore, Engine) {
    site_with(EngineConfig::new("/site"), files)
}

fn site_with(config: EngineConfig, files: &[(&str, &str)]) -> (MemoryFileStore, Engine) {
    let store = MemoryFileStore::new();
    for (path, content) in files {
        store.add_file(format!("/site/pages/{}", path), *content);
    }
    let engine = Engine::new(config, Arc::new(store.clone())).unwrap();
    (store, engine)
}

fn request(engine: &Engine, transport: MemoryTransport) -> String {
    let transport = Arc::new(transport);
    engine.handle_request(transport.clone()).unwrap();
    transport.output()
}

fn get(engine: &Engine, path: &str) -> String {
    request(engine, MemoryTransport::new().with_param("SCRIPT_NAME", path))
}

fn body(output: &str) -> &str {
    output.split_once("\r\n\r\n").map(|(_, body)| body).unwrap_or("")
}

#[test]
fn test_literal_page_round_trips() {
    let source = "<!DOCTYPE html>\n<p>It's \"quoted\" \\ text</p>\n\n  indented\n";
    let (_, engine) = site(&[("plain.html", source)]);
    assert_eq!(body(&get(&engine, "/plain.html")), source);
}

#[test]
fn test_script_only_page() {
    let (_, engine) = site(&[("x.html", "<?js echo('X'); ?>")]);
    assert_eq!(body(&get(&engine, "/x.html")), "X");
}

#[test]
fn test_echo_block() {
    let (_, engine) = site(&[("two.html", "<?= 1+1 ?>")]);
    let output = get(&engine, "/two.html");
    assert_eq!(body(&output), "2");
    assert!(output.starts_with("Status: 200 OK\r\nContent-Type: text/html\r\nContent-Length: 1\r\n"));
}

#[test]
fn test_unterminated_tag_is_reported() {
    let (store, engine) = site(&[("bad.html", "<p>before</p><?js echo('never')")]);
    let output = get(&engine, "/bad.html");
    assert!(body(&output).starts_with("<pre>page render error in /site/pages/bad.html"));
    assert!(body(&output).contains("missing closing of script tag"));
    assert!(!body(&output).contains("before"));
    assert!(store.content("/site/cache/pages/bad.html").is_none());
}

#[test]
fn test_second_render_is_served_from_cache() {
    // Without the memory layer every render goes through the stored artifact.
    let config = EngineConfig::new("/site").with_memory_cache(0);
    let (store, engine) = site_with(config, &[("a.html", "hi")]);
    assert_eq!(body(&get(&engine, "/a.html")), "hi");
    assert_eq!(store.content("/site/cache/pages/a.html").as_deref(), Some("echo('hi');"));

    // An artifact newer than its source is used as is.
    store.add_file("/site/cache/pages/a.html", "echo('from cache');");
    assert_eq!(body(&get(&engine, "/a.html")), "from cache");

    // Touching the source makes the artifact stale.
    store.touch("/site/pages/a.html");
    assert_eq!(body(&get(&engine, "/a.html")), "hi");
    assert_eq!(store.content("/site/cache/pages/a.html").as_deref(), Some("echo('hi');"));
}

#[test]
fn test_edited_source_is_recompiled() {
    let (store, engine) = site(&[("a.html", "old")]);
    assert_eq!(body(&get(&engine, "/a.html")), "old");
    store.add_file("/site/pages/a.html", "new");
    assert_eq!(body(&get(&engine, "/a.html")), "new");
}

#[test]
fn test_include_stack_is_balanced_after_errors() {
    let (_, engine) = site(&[
        (
            "index.html",
            "<?js include('parts/bad.html') ?>[<?js include('parts/ok.html') ?>]",
        ),
        ("parts/bad.html", "<?js error('boom') ?>"),
        ("parts/ok.html", "ok"),
    ]);
    let body = body(&get(&engine, "/")).to_string();
    assert!(body.contains("boom"), "{}", body);
    assert!(body.ends_with("[ok]"), "{}", body);
}

#[test]
fn test_nested_includes_resolve_relative_to_current_page() {
    let (_, engine) = site(&[
        ("index.html", "<?js include('blog/list.html') ?>"),
        ("blog/list.html", "list:<?js include('item.html') ?>"),
        ("blog/item.html", "item"),
    ]);
    assert_eq!(body(&get(&engine, "/")), "list:item");
}

#[test]
fn test_include_once_runs_target_once() {
    let (_, engine) = site(&[
        (
            "index.html",
            "<?js includeOnce('lib.html'); includeOnce('lib.html'); include('part.html') ?>",
        ),
        ("lib.html", "L"),
        ("part.html", "<?js includeOnce('./lib.html') ?>P"),
    ]);
    assert_eq!(body(&get(&engine, "/")), "LP");
}

#[test]
fn test_exit_in_include_stops_everything() {
    let (_, engine) = site(&[
        ("index.html", "a<?js include('middle.html') ?>d"),
        ("middle.html", "b<?js include('inner.html') ?>never"),
        ("inner.html", "c<?js exit() ?>never"),
    ]);
    let output = get(&engine, "/");
    assert!(output.starts_with("Status: 200 OK\r\n"));
    assert_eq!(body(&output), "abc");
}

#[test]
fn test_include_halt_reports_then_stops() {
    let (_, engine) = site(&[
        ("index.html", "a<?js include('missing.html', true) ?>b"),
    ]);
    let body = body(&get(&engine, "/")).to_string();
    assert_eq!(body, "a<pre>page not found: /site/pages/missing.html</pre>");
}

#[test]
fn test_missing_page_default_report() {
    let (_, engine) = site(&[]);
    let output = get(&engine, "/missing.html");
    assert!(output.starts_with("Status: 200 OK\r\n"));
    assert_eq!(body(&output), "<pre>page not found: /site/pages/missing.html</pre>");
}

#[test]
fn test_missing_page_custom_error_handler() {
    let (_, mut engine) = site(&[]);
    engine.set_error_handler(|req, err| {
        assert!(matches!(err, LuapError::PageNotFound(_)));
        req.response_status(404, Some("Not Found"))?;
        req.echo("nothing here");
        Ok(())
    });
    let output = get(&engine, "/missing.html");
    assert!(output.starts_with("Status: 404 Not Found\r\n"));
    assert_eq!(body(&output), "nothing here");
}

#[test]
fn test_error_handler_failure_is_appended() {
    let (_, mut engine) = site(&[]);
    engine.set_error_handler(|_, _| Err(LuapError::handler("handler broke")));
    let output = get(&engine, "/missing.html");
    assert_eq!(
        body(&output),
        "error in error handler: handler error: handler broke. \
         Original error: page not found: /site/pages/missing.html"
    );
}

#[test]
fn test_cleared_error_handler_restores_default_report() {
    let (_, mut engine) = site(&[]);
    engine.set_error_handler(|req, _| {
        req.echo("custom");
        Ok(())
    });
    assert_eq!(body(&get(&engine, "/missing.html")), "custom");

    engine.clear_error_handler();
    assert_eq!(
        body(&get(&engine, "/missing.html")),
        "<pre>page not found: /site/pages/missing.html</pre>"
    );
}

#[test]
fn test_exit_bypasses_error_handler() {
    let (_, mut engine) = site(&[("stop.html", "kept<?js exit() ?>dropped")]);
    let calls = Arc::new(Mutex::new(0));
    let seen = calls.clone();
    engine.set_error_handler(move |_, _| {
        *seen.lock().unwrap() += 1;
        Ok(())
    });
    assert_eq!(body(&get(&engine, "/stop.html")), "kept");
    assert_eq!(*calls.lock().unwrap(), 0);
}

#[test]
fn test_error_handler_sees_page_stack() {
    let (_, mut engine) = site(&[
        ("index.html", "<?js include('inner.html') ?>"),
        ("inner.html", "<?js error('deep') ?>"),
    ]);
    engine.set_error_handler(|req, _| {
        let frames: Vec<String> = req
            .page_stack()
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        req.echo(&frames.join(" > "));
        Ok(())
    });
    assert_eq!(
        body(&get(&engine, "/")),
        "/site/pages/index.html > /site/pages/inner.html"
    );
}

#[test]
fn test_get_headers_hyphenates_names() {
    let (_, engine) = site(&[(
        "h.html",
        "<?js local h = getHeaders() ?><?= h['X-Custom-Id'] ?>|<?= getHeader('x-custom-id') ?>",
    )]);
    let output = request(
        &engine,
        MemoryTransport::new()
            .with_param("SCRIPT_NAME", "/h.html")
            .with_param("HTTP_X_CUSTOM_ID", "42")
            .with_param("REMOTE_ADDR", "127.0.0.1"),
    );
    assert_eq!(body(&output), "42|42");
}

#[test]
fn test_params_headers_and_accessors() {
    let (_, engine) = site(&[(
        "shop/cart.html",
        "<?js setHeader('Content-Type', 'text/plain'); setHeader('X-Items', 3) ?>\
         <?= getParam('item') ?>,<?= getParams().qty ?>,<?= getRequestMethod() ?>,<?= url('pay.html') ?>",
    )]);
    let output = request(
        &engine,
        MemoryTransport::new()
            .with_param("SCRIPT_NAME", "/shop/cart.html")
            .with_param("QUERY_STRING", "item=tea%20pot&qty=2")
            .with_param("REQUEST_METHOD", "GET"),
    );
    assert!(output.contains("Content-Type: text/plain\r\n"));
    assert!(output.contains("X-Items: 3\r\n"));
    assert!(!output.contains("text/html"));
    assert_eq!(body(&output), "tea pot,2,GET,/shop/pay.html");
}

#[test]
fn test_primitives_are_restored_after_render() {
    let (_, engine) = site(&[("p.html", "<?js echo = nil ?>")]);
    engine.lua().globals().set("getParam", "host").unwrap();
    get(&engine, "/p.html");
    let globals = engine.lua().globals();
    assert!(globals.get::<Value>("echo").unwrap().is_nil());
    assert!(globals.get::<Value>("getServerName").unwrap().is_nil());
    assert_eq!(globals.get::<String>("getParam").unwrap(), "host");
}

#[test]
fn test_handler_chain_stops_on_stop() {
    let (_, mut engine) = site(&[("blog/post.html", "page")]);
    engine.add_request_handler("Blog", |req| {
        req.echo("blog,");
        Ok(Next::Continue)
    });
    engine.add_request_handler("BlogPost", |req| {
        req.echo("post");
        Ok(Next::Stop)
    });
    engine.add_request_controller(|req| {
        req.echo(",controller");
        Ok(Next::Continue)
    });
    assert_eq!(body(&get(&engine, "/blog/post.html")), "blog,post");
}

#[test]
fn test_controllers_run_after_default_in_order() {
    let (_, mut engine) = site(&[("about.html", "about")]);
    engine.add_request_handler("About", |req| {
        req.echo("1");
        Ok(Next::Continue)
    });
    engine.add_request_controller(|req| {
        req.echo("2");
        Ok(Next::Continue)
    });
    engine.add_request_controller(|req| {
        req.echo("3");
        Ok(Next::Stop)
    });
    engine.add_request_controller(|req| {
        req.echo("4");
        Ok(Next::Continue)
    });
    let output = get(&engine, "/about.html");
    assert_eq!(body(&output), "123");
    assert!(!output.contains("Content-Type"));
}

#[test]
fn test_unhandled_request_renders_page_after_controllers() {
    let (_, mut engine) = site(&[("about.html", "about")]);
    engine.add_request_controller(|req| {
        req.set_header("X-Seen", "yes");
        Ok(Next::Continue)
    });
    let output = get(&engine, "/about.html");
    assert!(output.contains("X-Seen: yes\r\n"));
    assert_eq!(body(&output), "about");
}

#[test]
fn test_failing_handler_is_reported() {
    let (_, mut engine) = site(&[("api.html", "page")]);
    engine.add_request_handler("Api", |req| {
        req.response_status(500, None)?;
        Err(LuapError::handler("database unavailable"))
    });
    let output = get(&engine, "/api.html");
    assert!(output.starts_with("Status: 500\r\n"));
    assert_eq!(body(&output), "<pre>handler error: database unavailable</pre>");
}

#[test]
fn test_error_text_is_html_escaped() {
    let (_, engine) = site(&[("e.html", "<?js error('<script>') ?>")]);
    let body = body(&get(&engine, "/e.html")).to_string();
    assert!(body.contains("&lt;script&gt;"), "{}", body);
    assert!(!body.contains("<script>"));
}

#[test]
fn test_page_roots_and_resolvers() {
    let (store, mut engine) = site(&[]);
    store.add_file("/docs/guide.html", "guide");
    store.add_file("/generated/report.html", "report");
    engine.add_page_root("/manual", "/docs");
    engine.add_page_resolver("/reports", |page| {
        page.ends_with("latest").then(|| "/generated/report.html".into())
    });
    assert_eq!(body(&get(&engine, "/manual/guide.html")), "guide");
    assert_eq!(body(&get(&engine, "/reports/latest")), "report");
    assert_eq!(
        body(&get(&engine, "/reports/old")),
        "<pre>page not found: /site/pages/reports/old</pre>"
    );
}

#[test]
fn test_pages_outside_server_root_get_their_own_artifacts() {
    let config = EngineConfig::new("/site").with_memory_cache(0);
    let (store, engine) = site_with(
        config,
        &[(
            "index.html",
            "<?js include('/srv/a.html') ?>|<?js include('/site/srv/a.html') ?>",
        )],
    );
    store.add_file("/srv/a.html", "OUTSIDE");
    store.add_file("/site/srv/a.html", "INSIDE");

    assert_eq!(body(&get(&engine, "/index.html")), "OUTSIDE|INSIDE");
    assert_eq!(body(&get(&engine, "/index.html")), "OUTSIDE|INSIDE");
    assert!(store.content("/site/cache/_abs/srv/a.html").is_some());
    assert!(store.content("/site/cache/srv/a.html").is_some());
}

#[test]
fn test_concurrent_requests_keep_their_own_primitives() {
    let (_, engine) = site(&[(
        "slow.html",
        "<?js for i = 1, 2000 do end ?>X<?= getParam('id') ?>",
    )]);
    let engine = Arc::new(engine);

    let workers: Vec<_> = (0..4)
        .map(|id| {
            let engine = engine.clone();
            std::thread::spawn(move || {
                let mut wrong = Vec::new();
                for _ in 0..100 {
                    let transport = MemoryTransport::new()
                        .with_param("SCRIPT_NAME", "/slow.html")
                        .with_param("QUERY_STRING", format!("id={}", id));
                    let output = request(&engine, transport);
                    let expected = format!("X{}", id);
                    if body(&output) != expected {
                        wrong.push(body(&output).to_string());
                    }
                }
                wrong
            })
        })
        .collect();

    for worker in workers {
        let wrong = worker.join().unwrap();
        assert!(wrong.is_empty(), "mixed responses: {:?}", wrong);
    }
}

#[test]
fn test_json_module_in_pages() {
    let (_, engine) = site(&[(
        "data.html",
        "<?js setHeader('Content-Type', 'application/json') ?><?= json.encode({ ok = true }) ?>",
    )]);
    let output = get(&engine, "/data.html");
    assert!(output.contains("Content-Type: application/json\r\n"));
    assert_eq!(body(&output), r#"{"ok":true}"#);
}

#[test]
fn test_local_filesystem_site() {
    let temp_dir = tempdir().unwrap();
    let root = temp_dir.path();
    fs::create_dir_all(root.join("pages/docs")).unwrap();
    fs::write(root.join("pages/index.html"), "<h1><?= 'Home' ?></h1>\n").unwrap();
    fs::write(root.join("pages/docs/index.html"), "<?js include('../footer.html') ?>").unwrap();
    fs::write(root.join("pages/footer.html"), "footer").unwrap();

    let engine = Engine::with_local_store(EngineConfig::new(root)).unwrap();
    assert_eq!(body(&get(&engine, "/")), "<h1>Home</h1>\n");
    assert_eq!(body(&get(&engine, "/docs/")), "footer");

    assert!(root.join("cache/pages/index.html").is_file());
    assert!(root.join("cache/pages/docs/index.html").is_file());
    assert!(root.join("cache/pages/footer.html").is_file());
}
