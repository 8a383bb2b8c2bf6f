//! ammo: a small templating/data-binding engine with per-item
//! identity and in-place updates, an app micro-framework (node
//! registry plus append-only store), and helpers for running
//! asynchronous steps in order on a single-threaded event loop.

pub mod boxed_error;
pub mod util;
pub mod time_util;
pub mod logging;
pub mod http_request_method;

pub mod record;
pub mod markup;
pub mod compile;
pub mod dom;
pub mod template;
pub mod interpolate;

pub mod storage;
pub mod store;
pub mod event_loop;
pub mod sequence;
pub mod flow;
pub mod transport;
pub mod app;

pub mod contacts;

pub use app::{App, AppConfig, AppError, Apps, Reply};
pub use compile::{compile, CompiledFragment};
pub use dom::DomEngine;
pub use event_loop::EventLoop;
pub use interpolate::interpolate;
pub use markup::{parse, MalformedTemplateError, MalformedTemplateErrorKind, ParsedTemplate};
pub use record::Record;
pub use sequence::{Controller, Response, Sequence, SequenceError, SequenceStatus};
pub use store::{Store, StoreEntry};
pub use template::{template, Template, UpdateOutcome};
