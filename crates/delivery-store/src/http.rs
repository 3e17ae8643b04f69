//! Blocking JSON REST client for a configuration server

use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::Method;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde_json::{Map, Value, json};

use crate::object::{
    Collection, KvContainer, KvContainerItem, ObjectRef, PackagedUnit, RemoteObject, SimpleRecord,
    UnitFile,
};
use crate::{Error, RemoteStore, Result};

const USER_HEADER: &str = "X-Ops-UserId";

/// Connection settings for [`HttpStore`].
#[derive(Debug, Clone)]
pub struct HttpStoreConfig {
    /// Base URL, e.g. `https://chef.example.com/organizations/ops`
    pub server_url: String,
    /// Client name sent with every request
    pub user: String,
    /// Bearer token, if the server wants one
    pub token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
    /// Total time spent retrying transient failures before giving up
    pub retry_max_elapsed: Duration,
}

impl HttpStoreConfig {
    pub fn new(server_url: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            user: user.into(),
            token: None,
            timeout: Duration::from_secs(60),
            retry_max_elapsed: Duration::from_secs(30),
        }
    }
}

/// [`RemoteStore`] backed by a configuration server's REST API.
///
/// Transport errors and 5xx answers are retried with exponential backoff;
/// 404 becomes [`Error::NotFound`]; any other failure status is returned
/// immediately.
pub struct HttpStore {
    client: Client,
    config: HttpStoreConfig,
}

impl HttpStore {
    pub fn new(config: HttpStoreConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let user = HeaderValue::from_str(&config.user)
            .map_err(|e| Error::invalid(&config.user, format!("bad user header: {e}")))?;
        headers.insert(USER_HEADER, user);

        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.server_url.trim_end_matches('/'), path)
    }

    /// Send one request with retries. Returns the decoded body, or `None`
    /// when the server answered with an empty body.
    fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Option<Value>> {
        let url = self.url(path);
        let policy = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(self.config.retry_max_elapsed))
            .build();

        let attempt = || -> std::result::Result<Option<Value>, backoff::Error<Error>> {
            let mut request = self.client.request(method.clone(), &url);
            if let Some(token) = self.config.token.as_deref() {
                request = request.bearer_auth(token);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().map_err(|e| {
                tracing::debug!("{} {} failed: {}", method, url, e);
                backoff::Error::transient(Error::Transport(e))
            })?;

            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(backoff::Error::permanent(Error::not_found(path)));
            }
            let text = response
                .text()
                .map_err(|e| backoff::Error::transient(Error::Transport(e)))?;
            if !status.is_success() {
                let err = Error::Status {
                    method: method.to_string(),
                    url: url.clone(),
                    status: status.as_u16(),
                    message: text,
                };
                return Err(if status.is_server_error() {
                    tracing::debug!("{}, retrying", err);
                    backoff::Error::transient(err)
                } else {
                    backoff::Error::permanent(err)
                });
            }
            if text.trim().is_empty() {
                return Ok(None);
            }
            serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| backoff::Error::permanent(Error::Json(e)))
        };

        backoff::retry(policy, attempt).map_err(|e| match e {
            backoff::Error::Permanent(err) => err,
            backoff::Error::Transient { err, .. } => err,
        })
    }

    fn get(&self, path: &str) -> Result<Value> {
        Ok(self.send(Method::GET, path, None)?.unwrap_or(Value::Null))
    }

    /// PUT to the object, falling back to POST on its collection when the
    /// object does not exist yet.
    fn upsert(&self, object_path: &str, collection_path: &str, body: &Value) -> Result<()> {
        match self.send(Method::PUT, object_path, Some(body)) {
            Err(e) if e.is_not_found() => {
                tracing::debug!("{} missing, creating", object_path);
                self.send(Method::POST, collection_path, Some(body))?;
                Ok(())
            }
            other => other.map(|_| ()),
        }
    }

    fn unit_versions(&self, name: &str) -> Result<Vec<String>> {
        let listing = self.get(&format!("cookbooks/{name}"))?;
        Ok(versions_from_listing(name, &listing))
    }
}

impl RemoteStore for HttpStore {
    fn load(&self, target: &ObjectRef) -> Result<RemoteObject> {
        match target {
            ObjectRef::Record { collection, name } => {
                let body = self.get(&target.to_string())?;
                Ok(RemoteObject::Record(SimpleRecord {
                    collection: *collection,
                    name: name.clone(),
                    body,
                }))
            }
            ObjectRef::Unit { name, version } => {
                let version = match version {
                    Some(v) => v.clone(),
                    None => latest_version(self.unit_versions(name)?)
                        .ok_or_else(|| Error::not_found(target))?,
                };
                let body = self.get(&format!("cookbooks/{name}/{version}"))?;
                unit_from_body(name, &version, &body).map(RemoteObject::Unit)
            }
            ObjectRef::Container { name } => {
                let body = self.get(&target.to_string())?;
                Ok(RemoteObject::Container(KvContainer {
                    name: name.clone(),
                    items: object_keys(&body),
                }))
            }
            ObjectRef::Item { container, key } => {
                let payload = self.get(&target.to_string())?;
                Ok(RemoteObject::Item(KvContainerItem {
                    container: container.clone(),
                    key: key.clone(),
                    payload,
                }))
            }
        }
    }

    fn save(&self, object: &RemoteObject) -> Result<()> {
        match object {
            RemoteObject::Record(record) => {
                let path = object.reference().to_string();
                self.upsert(&path, record.collection.as_str(), &record.body)
            }
            RemoteObject::Unit(unit) => {
                let path = object.reference().to_string();
                self.send(Method::PUT, &path, Some(&unit_body(unit)))?;
                Ok(())
            }
            RemoteObject::Container(container) => {
                let body = json!({ "name": container.name });
                match self.send(Method::POST, Collection::DataBags.as_str(), Some(&body)) {
                    // Already exists
                    Err(Error::Status { status: 409, .. }) => Ok(()),
                    other => other.map(|_| ()),
                }
            }
            RemoteObject::Item(item) => {
                let path = object.reference().to_string();
                let mut payload = item.payload.clone();
                if let Value::Object(map) = &mut payload {
                    map.entry("id").or_insert_with(|| Value::String(item.key.clone()));
                }
                self.upsert(&path, &format!("data/{}", item.container), &payload)
            }
        }
    }

    fn destroy(&self, target: &ObjectRef) -> Result<()> {
        match target {
            ObjectRef::Unit {
                name,
                version: None,
            } => {
                let versions = self.unit_versions(name)?;
                if versions.is_empty() {
                    return Err(Error::not_found(target));
                }
                for version in versions {
                    let path = format!("cookbooks/{name}/{version}?purge=true");
                    match self.send(Method::DELETE, &path, None) {
                        Err(e) if e.is_not_found() => {
                            tracing::debug!("cookbooks/{}/{} already gone", name, version);
                        }
                        other => {
                            other?;
                        }
                    }
                }
                Ok(())
            }
            ObjectRef::Unit {
                version: Some(_), ..
            } => {
                self.send(Method::DELETE, &format!("{target}?purge=true"), None)?;
                Ok(())
            }
            _ => {
                self.send(Method::DELETE, &target.to_string(), None)?;
                Ok(())
            }
        }
    }

    fn list(&self, collection: Collection) -> Result<Vec<String>> {
        let body = self.get(collection.as_str())?;
        Ok(object_keys(&body).into_iter().collect())
    }
}

fn object_keys(body: &Value) -> std::collections::BTreeSet<String> {
    body.as_object()
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default()
}

/// Request body for uploading one unit version.
fn unit_body(unit: &PackagedUnit) -> Value {
    let files: Vec<Value> = unit
        .files
        .iter()
        .map(|f| {
            json!({
                "path": f.path,
                "checksum": f.checksum,
                "content": STANDARD.encode(&f.content),
            })
        })
        .collect();

    json!({
        "name": format!("{}-{}", unit.name, unit.version),
        "cookbook_name": unit.name,
        "version": unit.version,
        "metadata": unit.metadata,
        "files": files,
    })
}

fn unit_from_body(name: &str, version: &str, body: &Value) -> Result<PackagedUnit> {
    let target = ObjectRef::unit(name, Some(version.to_string()));
    let mut files = Vec::new();
    for file in body
        .get("files")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
    {
        let field = |key: &str| {
            file.get(key)
                .and_then(Value::as_str)
                .ok_or_else(|| Error::invalid(&target, format!("file entry without {key}")))
        };
        let content = STANDARD
            .decode(field("content")?)
            .map_err(|e| Error::invalid(&target, format!("bad file content: {e}")))?;
        files.push(UnitFile {
            path: field("path")?.to_string(),
            checksum: field("checksum")?.to_string(),
            content,
        });
    }

    Ok(PackagedUnit {
        name: name.to_string(),
        version: version.to_string(),
        metadata: body
            .get("metadata")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new())),
        files,
    })
}

/// Versions listed by `GET cookbooks/<name>`.
fn versions_from_listing(name: &str, listing: &Value) -> Vec<String> {
    listing
        .get(name)
        .and_then(|entry| entry.get("versions"))
        .and_then(Value::as_array)
        .map(|versions| {
            versions
                .iter()
                .filter_map(|v| v.get("version").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Highest dotted-numeric version; non-numeric segments sort as zero.
fn latest_version(versions: Vec<String>) -> Option<String> {
    let key = |v: &String| -> Vec<u64> {
        v.split('.').map(|s| s.parse().unwrap_or(0)).collect()
    };
    versions.into_iter().max_by(|a, b| key(a).cmp(&key(b)))
}
