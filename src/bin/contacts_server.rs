use std::{io::Read, sync::Arc, thread};

use ammo::{contacts::{handle, Contacts},
           http_request_method::HttpRequestMethod,
           logging::{init_logging, LogConfig},
           util::getenv_or};
use anyhow::{anyhow, Result};
use clap::Parser;
use tiny_http::{Header, Request, Response, Server};
use tracing::{debug, info, warn};

const DEFAULT_LISTEN: &str = "127.0.0.1:3006";

#[derive(clap::Parser, Debug)]
/// Demo server keeping a list of contacts in memory:
/// `GET /contacts` lists them, `POST /contacts` adds to them.
struct Args {
    /// Address to listen on; default from the LISTEN env var, or 127.0.0.1:3006
    #[clap(long)]
    listen: Option<String>,

    /// Log more, repeat for even more
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn json_header() -> Result<Header> {
    Header::from_bytes(&b"Content-Type"[..], &b"application/json; charset=utf-8"[..])
        .map_err(|()| anyhow!("invalid header"))
}

fn serve(contacts: &Contacts, mut request: Request, header: Header) {
    let url = request.url().to_string();
    let method = match HttpRequestMethod::from_str(request.method().as_str()) {
        Ok(m) => m,
        Err(e) => {
            debug!("{url}: {e}");
            let response = Response::from_string(r#"{"status":"error","message":"Method not allowed."}"#)
                .with_status_code(405)
                .with_header(header);
            if let Err(e) = request.respond(response) {
                warn!("{url}: could not send response: {e}");
            }
            return
        }
    };
    let content_type = request.headers().iter()
        .find(|h| h.field.equiv("Content-Type"))
        .map(|h| h.value.as_str().to_string());
    let mut body = Vec::new();
    if let Err(e) = request.as_reader().read_to_end(&mut body) {
        warn!("{method} {url}: reading body: {e}");
        return
    }

    let r = handle(contacts, method, &url, content_type.as_deref(), &body);
    info!("{method} {url} -> {}", r.status);
    let response = Response::from_string(r.body.to_string())
        .with_status_code(r.status)
        .with_header(header);
    if let Err(e) = request.respond(response) {
        warn!("{method} {url}: could not send response: {e}");
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&LogConfig::from_verbosity(args.verbose))?;

    let listen = match args.listen {
        Some(listen) => listen,
        None => getenv_or("LISTEN", Some(DEFAULT_LISTEN))?,
    };
    let server = Server::http(&listen)
        .map_err(|e| anyhow!("can't listen on {listen:?}: {e}"))?;
    info!("contacts server listening on http://{listen}");

    let contacts = Arc::new(Contacts::new());
    let header = json_header()?;
    for request in server.incoming_requests() {
        let contacts = contacts.clone();
        let header = header.clone();
        thread::spawn(move || serve(&contacts, request, header));
    }
    Ok(())
}
