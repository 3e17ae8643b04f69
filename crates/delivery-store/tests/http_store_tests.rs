//! HttpStore against a scripted HTTP server on a loopback port.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use delivery_store::{
    Collection, Error, HttpStore, HttpStoreConfig, KvContainer, ObjectRef, RemoteObject,
    RemoteStore, SimpleRecord,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

#[derive(Debug, Clone)]
struct Received {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl Received {
    fn line(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

/// Answers each request with whatever `respond` returns and keeps a log.
struct ScriptedServer {
    url: String,
    received: Arc<Mutex<Vec<Received>>>,
}

impl ScriptedServer {
    fn start<F>(mut respond: F) -> Self
    where
        F: FnMut(&Received) -> (u16, String) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&received);

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let Some(request) = read_request(&stream) else {
                    continue;
                };
                let (status, body) = respond(&request);
                log.lock().unwrap().push(request);
                let response = format!(
                    "HTTP/1.1 {status} Scripted\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });

        Self { url, received }
    }

    fn store(&self) -> HttpStore {
        self.store_with(|_| {})
    }

    fn store_with(&self, tweak: impl FnOnce(&mut HttpStoreConfig)) -> HttpStore {
        let mut config = HttpStoreConfig::new(&self.url, "delivery");
        config.timeout = Duration::from_secs(5);
        config.retry_max_elapsed = Duration::from_secs(5);
        tweak(&mut config);
        HttpStore::new(config).unwrap()
    }

    fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }

    fn lines(&self) -> Vec<String> {
        self.received().iter().map(Received::line).collect()
    }
}

fn read_request(stream: &TcpStream) -> Option<Received> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).ok()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let mut headers = Vec::new();
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).ok()?;
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
    }

    let length = headers
        .iter()
        .find(|(name, _)| name == "content-length")
        .and_then(|(_, value)| value.parse().ok())
        .unwrap_or(0);
    let mut body = vec![0; length];
    reader.read_exact(&mut body).ok()?;

    Some(Received {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

fn ok(body: Value) -> (u16, String) {
    (200, body.to_string())
}

fn status(code: u16) -> (u16, String) {
    (code, String::new())
}

fn web_role() -> RemoteObject {
    RemoteObject::Record(SimpleRecord {
        collection: Collection::Roles,
        name: "web".into(),
        body: json!({ "name": "web", "run_list": ["recipe[nginx]"] }),
    })
}

fn bar_listing() -> Value {
    json!({
        "bar": {
            "versions": [
                { "version": "1.0.0" },
                { "version": "2.0.0" }
            ]
        }
    })
}

#[test]
fn missing_record_is_not_found() {
    let server = ScriptedServer::start(|_| status(404));

    let err = server
        .store()
        .load(&ObjectRef::record(Collection::Roles, "web"))
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(server.lines(), vec!["GET /roles/web"]);
}

#[test]
fn requests_carry_user_and_token() {
    let server = ScriptedServer::start(|_| ok(json!({ "name": "web" })));
    let store = server.store_with(|config| config.token = Some("s3cret".into()));

    store
        .load(&ObjectRef::record(Collection::Roles, "web"))
        .unwrap();

    let request = &server.received()[0];
    assert_eq!(request.header("x-ops-userid"), Some("delivery"));
    assert_eq!(request.header("authorization"), Some("Bearer s3cret"));
    assert_eq!(request.header("accept"), Some("application/json"));
}

#[test]
fn loaded_record_keeps_body() {
    let server = ScriptedServer::start(|_| ok(json!({ "name": "web", "description": "v2" })));

    let loaded = server
        .store()
        .load(&ObjectRef::record(Collection::Roles, "web"))
        .unwrap();

    match loaded {
        RemoteObject::Record(record) => assert_eq!(record.body["description"], "v2"),
        other => panic!("expected a record, got {other:?}"),
    }
}

#[test]
fn server_error_is_retried() {
    let attempts = AtomicUsize::new(0);
    let server = ScriptedServer::start(move |_| {
        if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            status(503)
        } else {
            ok(json!({ "name": "web" }))
        }
    });

    server
        .store()
        .load(&ObjectRef::record(Collection::Roles, "web"))
        .unwrap();

    assert_eq!(server.lines(), vec!["GET /roles/web", "GET /roles/web"]);
}

#[test]
fn persistent_server_error_gives_up() {
    let server = ScriptedServer::start(|_| status(500));
    let store = server.store_with(|config| config.retry_max_elapsed = Duration::from_secs(1));

    let err = store
        .load(&ObjectRef::record(Collection::Roles, "web"))
        .unwrap_err();

    assert!(matches!(err, Error::Status { status: 500, .. }));
    assert!(server.lines().len() >= 2);
}

#[test]
fn client_error_fails_without_retry() {
    let server = ScriptedServer::start(|_| status(403));

    let err = server.store().save(&web_role()).unwrap_err();

    assert!(matches!(err, Error::Status { status: 403, .. }));
    assert!(!err.is_not_found());
    assert_eq!(server.lines(), vec!["PUT /roles/web"]);
}

#[test]
fn record_save_creates_when_missing() {
    let server = ScriptedServer::start(|request| match request.method.as_str() {
        "PUT" => status(404),
        _ => (201, json!({ "uri": "roles/web" }).to_string()),
    });

    server.store().save(&web_role()).unwrap();

    let received = server.received();
    assert_eq!(server.lines(), vec!["PUT /roles/web", "POST /roles"]);
    assert_eq!(received[1].json()["run_list"], json!(["recipe[nginx]"]));
}

#[test]
fn existing_container_is_accepted() {
    let server = ScriptedServer::start(|_| status(409));

    server
        .store()
        .save(&RemoteObject::Container(KvContainer {
            name: "alerts".into(),
            ..Default::default()
        }))
        .unwrap();

    let received = server.received();
    assert_eq!(server.lines(), vec!["POST /data"]);
    assert_eq!(received[0].json(), json!({ "name": "alerts" }));
}

#[test]
fn item_save_adds_id() {
    let server = ScriptedServer::start(|_| ok(json!({})));

    server
        .store()
        .save(&RemoteObject::Item(delivery_store::KvContainerItem {
            container: "alerts".into(),
            key: "high".into(),
            payload: json!({ "level": 3 }),
        }))
        .unwrap();

    let received = server.received();
    assert_eq!(server.lines(), vec!["PUT /data/alerts/high"]);
    assert_eq!(received[0].json(), json!({ "id": "high", "level": 3 }));
}

#[test]
fn destroying_all_versions_continues_past_missing_one() {
    let server = ScriptedServer::start(|request| match request.line().as_str() {
        "GET /cookbooks/bar" => ok(bar_listing()),
        "DELETE /cookbooks/bar/1.0.0?purge=true" => status(404),
        _ => ok(json!({})),
    });

    server
        .store()
        .destroy(&ObjectRef::unit("bar", None))
        .unwrap();

    assert_eq!(
        server.lines(),
        vec![
            "GET /cookbooks/bar",
            "DELETE /cookbooks/bar/1.0.0?purge=true",
            "DELETE /cookbooks/bar/2.0.0?purge=true",
        ]
    );
}

#[test]
fn destroying_all_versions_stops_on_server_refusal() {
    let server = ScriptedServer::start(|request| match request.line().as_str() {
        "GET /cookbooks/bar" => ok(bar_listing()),
        _ => status(403),
    });

    let err = server
        .store()
        .destroy(&ObjectRef::unit("bar", None))
        .unwrap_err();

    assert!(matches!(err, Error::Status { status: 403, .. }));
    assert_eq!(server.lines().len(), 2);
}

#[test]
fn destroying_unlisted_unit_is_not_found() {
    let server = ScriptedServer::start(|_| status(404));

    let err = server
        .store()
        .destroy(&ObjectRef::unit("bar", None))
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(server.lines(), vec!["GET /cookbooks/bar"]);
}

#[test]
fn destroying_unit_with_empty_listing_is_not_found() {
    let server = ScriptedServer::start(|_| ok(json!({ "bar": { "versions": [] } })));

    let err = server
        .store()
        .destroy(&ObjectRef::unit("bar", None))
        .unwrap_err();

    assert!(err.is_not_found());
}

#[test]
fn container_listing_becomes_item_keys() {
    let server = ScriptedServer::start(|_| {
        ok(json!({ "high": "http://chef/data/alerts/high", "low": "http://chef/data/alerts/low" }))
    });

    let loaded = server
        .store()
        .load(&ObjectRef::container("alerts"))
        .unwrap();

    match loaded {
        RemoteObject::Container(container) => {
            assert_eq!(
                container.items.into_iter().collect::<Vec<_>>(),
                vec!["high", "low"]
            );
        }
        other => panic!("expected a container, got {other:?}"),
    }
}
