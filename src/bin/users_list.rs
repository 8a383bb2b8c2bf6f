use std::{cell::RefCell, path::PathBuf, rc::Rc, time::Duration};

use ammo::{app::{App, AppConfig},
           event_loop::EventLoop,
           flow::each_in_sequence,
           logging::{init_logging, LogConfig},
           record::records_of,
           sequence::{Controller, Sequence},
           storage::{FileStorage, MemoryStorage},
           template::template,
           transport::{FileTransport, HttpRequest, Transport},
           util::getenv_or};
use ammo_dom::{Document, NodeId, Selector};
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use itertools::Itertools;
use serde_json::{json, Value};
use tracing::{error, info, warn};

const APP_NAME: &str = "users-list";

const PAGE: &str = r#"<div class="container" data-app="users-list"></div>"#;

const USER_TEMPLATE: &str = r#"
<li class="user" (key:name)>
    <img class="user-image" src="{{thumbnail}}" alt="user-image">
    <span class="user-name">{{name}}</span>
</li>"#;

const BACKGROUND: &str = "#f5f5f5";
const HIGHLIGHT: &str = "#ffe28a";
const NAME_COLORS: [&str; 2] = ["#633374", "#ee9c77"];

#[derive(clap::Parser, Debug)]
/// Builds the South Park users list page step by step, then prints
/// the resulting HTML.
struct Args {
    /// Directory holding users.json; default from the AMMO_DATA env var, or demo/data
    #[clap(long)]
    data: Option<PathBuf>,

    /// Mirror the store into this JSON file instead of memory
    #[clap(long)]
    storage: Option<PathBuf>,

    /// Don't actually wait for timers and simulated latency
    #[clap(long)]
    fast: bool,

    /// Log more, repeat for even more
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

type Dom = Rc<RefCell<Document>>;

fn app_element(dom: &Document) -> Result<NodeId> {
    dom.query_first(dom.root(), &Selector::any().with_attr_eq("data-app", APP_NAME))
        .ok_or_else(|| anyhow!("no element with data-app={APP_NAME:?}"))
}

fn find(dom: &Document, selector: Selector) -> Result<NodeId> {
    let app = app_element(dom)?;
    dom.query_first(app, &selector)
        .ok_or_else(|| anyhow!("no element matching {selector:?}"))
}

fn render_users_list(dom: &mut Document) -> Result<Value> {
    let target = app_element(dom)?;
    let ul = dom.create_element("ul");
    dom.set_attribute(ul, "class", "users")?;
    dom.append_child(target, ul)?;
    Ok(Value::Null)
}

fn render_console(dom: &mut Document) -> Result<Value> {
    let target = app_element(dom)?;
    dom.append_html(target, r#"<div class="console" title="console">
        <h1 class="console-title">South Park Characters</h1>
        <textarea class="console-log" readonly></textarea>
    </div>"#)?;
    Ok(Value::Null)
}

fn render_user_items(dom: &mut Document, users: &Value) -> Result<Value> {
    let users = users.as_array().map(Vec::as_slice).unwrap_or(&[]);
    let ul = find(dom, Selector::tag("ul").with_class("users"))?;
    template(USER_TEMPLATE, &records_of(users))?.render(dom, ul)?;
    Ok(Value::Null)
}

fn append_to_console(dom: &mut Document, text: &Value) -> Result<Value> {
    let text = text.as_str().unwrap_or_default();
    info!("{}", text.trim_end());
    let log = find(dom, Selector::tag("textarea").with_class("console-log"))?;
    let mut content = dom.text_content(log);
    content.push_str(text);
    dom.set_text_content(log, &content)?;
    Ok(Value::Null)
}

fn install_nodes(app: &App, dom: &Dom, transport: FileTransport) -> Result<()> {
    let (d1, d2, d3, d4) = (dom.clone(), dom.clone(), dom.clone(), dom.clone());
    app.configure("renderers")?
        .node("renderUsersList",
              move |_, _, reply| reply.send(render_users_list(&mut d1.borrow_mut())))
        .node("renderConsole",
              move |_, _, reply| reply.send(render_console(&mut d2.borrow_mut())))
        .node("renderUsers",
              move |_, users, reply| reply.send(render_user_items(&mut d3.borrow_mut(), &users)))
        .configure("actions")?
        .node("log",
              move |_, text, reply| reply.send(append_to_console(&mut d4.borrow_mut(), &text)))
        .node("getUsers", move |_, _, reply| {
            transport.fetch(HttpRequest::get("./users.json"),
                            move |r| reply.send(r.context("fetching users")))
        });
    Ok(())
}

fn log(app: &App, text: impl Into<String>) {
    if let Err(e) = app.call_node_sync("actions", "log", Value::String(text.into())) {
        warn!("{e}");
    }
}

fn render_users(app: &App) {
    let users = app.get_store_data("users").unwrap_or_else(|| json!([]));
    if let Err(e) = app.call_node_sync("renderers", "renderUsers", users) {
        error!("{e}");
    }
}

/// Append `batch` to the users kept in the store.
fn add_users(app: &App, batch: Value) {
    let added = app.update_store("users", |users| {
        let mut users = users.as_array().cloned().unwrap_or_default();
        users.extend(batch.as_array().cloned().unwrap_or_default());
        Value::Array(users)
    });
    if added.is_none() {
        warn!("store key \"users\" is not registered");
    }
}

/// Fetch the users and resolve `c` with those in `from..to`; a failed
/// fetch is logged and resolves with no users.
fn fetch_slice(app: &App, c: Controller, from: usize, to: usize) {
    let r = app.call_node("actions", "getUsers", Value::Null, move |r| match r {
        Ok(Value::Array(users)) =>
            c.resolve(Value::Array(users.into_iter().skip(from).take(to - from).collect())),
        Ok(other) => {
            error!("getUsers: expected an array, got {other}");
            c.resolve(json!([]))
        }
        Err(e) => {
            error!("{e:#}");
            c.resolve(json!([]))
        }
    });
    if let Err(e) = r {
        error!("{e}");
    }
}

fn style_all(dom: &Dom, class: &str, property: &str, value: impl Fn(usize) -> &'static str) {
    let mut dom = dom.borrow_mut();
    let nodes = match app_element(&dom) {
        Ok(app) => dom.query_all(app, &Selector::any().with_class(class)),
        Err(e) => {
            warn!("{e}");
            return
        }
    };
    for (i, node) in nodes.into_iter().enumerate() {
        if let Err(e) = dom.set_style(node, property, value(i)) {
            warn!("{e}");
        }
    }
}

fn highlight(dom: &Dom, lp: &EventLoop, c: Controller) {
    let users = match app_element(&dom.borrow()) {
        Ok(el) => dom.borrow().query_all(el, &Selector::any().with_class("user")),
        Err(e) => {
            error!("{e}");
            return c.resolve(Value::Null)
        }
    };
    let (dom1, lp1) = (dom.clone(), lp.clone());
    let (dom2, lp2) = (dom.clone(), lp.clone());
    let r = each_in_sequence(
        users,
        move |done, user, index| {
            let dom = dom1.clone();
            lp1.set_timeout(Duration::from_millis(300), move || {
                style_all(&dom, "user", "background-color", |_| BACKGROUND);
                if let Err(e) = dom.borrow_mut().set_style(user, "background-color", HIGHLIGHT) {
                    warn!("user {index}: {e}");
                }
                done.done();
            });
        },
        move || {
            lp2.set_timeout(Duration::from_millis(300), move || {
                style_all(&dom2, "user", "background-color", |_| BACKGROUND);
            });
            c.resolve(Value::Null)
        });
    if let Err(e) = r {
        error!("{e}");
    }
}

/// The steps after the first batch of users is on the page.
fn more_users(app: &App, dom: &Dom, lp: &EventLoop) -> Sequence {
    let (a1, a2, a3, a4, a5, a6, a7) =
        (app.clone(), app.clone(), app.clone(), app.clone(), app.clone(), app.clone(), app.clone());
    let (l1, l2, l3, l4) = (lp.clone(), lp.clone(), lp.clone(), lp.clone());
    let (dom1, dom2) = (dom.clone(), dom.clone());
    Sequence::new()
        .chain(move |c| fetch_slice(&a1, c, 2, 6))
        .chain(move |mut c| {
            let batch = c.take_response().value.unwrap_or_else(|| json!([]));
            log(&a2, "4. Wait for 2 seconds and then update the users list.\n");
            l1.set_timeout(Duration::from_secs(2), move || {
                add_users(&a2, batch);
                render_users(&a2);
                log(&a2, "5. Users list is updated.\n");
                c.resolve(Value::Null)
            });
        })
        .chain(move |c| fetch_slice(&a3, c, 6, 12))
        .chain(move |mut c| {
            let batch = c.take_response().value.unwrap_or_else(|| json!([]));
            log(&a4, "6. Wait for 1 second and then update the users list again.\n");
            l2.set_timeout(Duration::from_secs(1), move || {
                add_users(&a4, batch);
                render_users(&a4);
                log(&a4, "7. Users list is updated again.\n");
                c.resolve(Value::Null)
            });
        })
        .chain(move |c| {
            log(&a5, "8. Wait for 1 second and then color the user names.\n");
            l3.set_timeout(Duration::from_secs(1), move || {
                style_all(&dom1, "user-name", "color", |i| NAME_COLORS[i % 2]);
                log(&a5, "9. Even names are purple, odd names are orange.\n");
                c.resolve(Value::Null)
            });
        })
        .chain(move |c| {
            let data = a6.get_store_data("users").unwrap_or_else(|| json!([]));
            log(&a6, format!("10. Store data: {}\n",
                             serde_json::to_string_pretty(&data).unwrap_or_default()));
            let lengths = a6.get_store("users")
                .map(|entry| entry.values().iter()
                     .map(|v| v.value.as_array().map_or(0, Vec::len))
                     .join(", "))
                .unwrap_or_default();
            log(&a6, format!("11. Store history lengths: {lengths}\n"));
            c.resolve(Value::Null)
        })
        .chain(move |c| {
            log(&a7, "12. Highlight each user in turn.\n");
            highlight(&dom2, &l4, c)
        })
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&LogConfig::from_verbosity(args.verbose))?;

    let data = match args.data {
        Some(data) => data,
        None => getenv_or("AMMO_DATA", Some("demo/data"))?.into(),
    };
    let lp = if args.fast { EventLoop::new_virtual() } else { EventLoop::new() };
    let dom: Dom = Rc::new(RefCell::new(Document::parse(PAGE)?));
    let transport = FileTransport::new(&data, &lp).with_latency(Duration::from_millis(250));

    let config = AppConfig::from_value(json!({"name": APP_NAME, "users": []}))?;
    let app = App::new(config)?;
    app.schema("default");
    match &args.storage {
        Some(path) => app.sync_storage(APP_NAME, FileStorage::new(path)),
        None => app.sync_storage(APP_NAME, MemoryStorage::new()),
    };
    install_nodes(&app, &dom, transport)?;

    let (a1, a2) = (app.clone(), app.clone());
    let (dom1, lp1) = (dom.clone(), lp.clone());
    let main_sequence = Sequence::new()
        .chain(move |c| fetch_slice(&a1, c, 0, 2))
        .chain(move |mut c| {
            let batch = c.take_response().value.unwrap_or_else(|| json!([]));
            for renderer in ["renderConsole", "renderUsersList"] {
                if let Err(e) = a2.call_node_sync("renderers", renderer, Value::Null) {
                    error!("{e}");
                }
            }
            log(&a2, "1. DOM is ready.\n");
            log(&a2, "2. Users are fetched.\n");
            log(&a2, format!("3. First users: {batch}\n"));
            add_users(&a2, batch);
            render_users(&a2);
            let rest = more_users(&a2, &dom1, &lp1);
            if let Err(e) = rest.execute() {
                error!("{e}");
            }
            c.resolve(Value::Null)
        });
    main_sequence.execute()?;

    let ran = lp.run();
    info!("event loop finished after {ran} callbacks, at {:?}", lp.now());
    let dom = dom.borrow();
    println!("{}", dom.outer_html(app_element(&dom)?));
    Ok(())
}
