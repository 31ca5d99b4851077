//! In-memory fake of the GCS JSON API endpoints the object store calls
//!
//! Objects live in a shared map so tests can seed and inspect the bucket.

use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use wiremock::{matchers::any, Mock, MockServer, Request, Respond, ResponseTemplate};

use super::test_data::tokens;

type Objects = Arc<Mutex<BTreeMap<String, Vec<u8>>>>;

pub struct MockGcsServer {
    pub server: MockServer,
    bucket: String,
    objects: Objects,
    fail_uploads: Arc<AtomicBool>,
    fail_copies: Arc<AtomicBool>,
}

impl MockGcsServer {
    pub async fn start(bucket: &str) -> Self {
        let server = MockServer::start().await;
        let objects: Objects = Arc::new(Mutex::new(BTreeMap::new()));
        let fail_uploads = Arc::new(AtomicBool::new(false));
        let fail_copies = Arc::new(AtomicBool::new(false));

        Mock::given(any())
            .respond_with(GcsResponder {
                bucket: bucket.to_string(),
                objects: objects.clone(),
                fail_uploads: fail_uploads.clone(),
                fail_copies: fail_copies.clone(),
            })
            .mount(&server)
            .await;

        Self {
            server,
            bucket: bucket.to_string(),
            objects,
            fail_uploads,
            fail_copies,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn put(&self, key: &str, content: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), content.to_vec());
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.keys()
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect()
    }

    /// Make uploads answer 503
    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    /// Make rewrite (copy) calls answer 503
    pub fn fail_copies(&self, fail: bool) {
        self.fail_copies.store(fail, Ordering::SeqCst);
    }
}

struct GcsResponder {
    bucket: String,
    objects: Objects,
    fail_uploads: Arc<AtomicBool>,
    fail_copies: Arc<AtomicBool>,
}

fn decode(segment: &str) -> String {
    segment.replace("%2F", "/").replace("%2f", "/")
}

fn query(req: &Request, name: &str) -> Option<String> {
    req.url
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.to_string())
}

fn not_found() -> ResponseTemplate {
    ResponseTemplate::new(404).set_body_json(json!({ "error": { "code": 404, "message": "No such object" } }))
}

impl Respond for GcsResponder {
    fn respond(&self, req: &Request) -> ResponseTemplate {
        let authorized = req
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == format!("Bearer {}", tokens::GCS_TOKEN))
            .unwrap_or(false);
        if !authorized {
            return ResponseTemplate::new(401);
        }

        let segments: Vec<String> = req
            .url
            .path_segments()
            .map(|s| s.map(decode).collect())
            .unwrap_or_default();
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        let method = req.method.as_str();
        let mut objects = self.objects.lock().unwrap();

        match (method, segments.as_slice()) {
            ("POST", ["upload", "storage", "v1", "b", bucket, "o"]) if *bucket == self.bucket => {
                if self.fail_uploads.load(Ordering::SeqCst) {
                    return ResponseTemplate::new(503);
                }
                let Some(name) = query(req, "name") else {
                    return ResponseTemplate::new(400);
                };
                objects.insert(name.clone(), req.body.clone());
                ResponseTemplate::new(200).set_body_json(json!({ "name": name, "bucket": self.bucket }))
            }
            ("GET", ["storage", "v1", "b", bucket, "o"]) if *bucket == self.bucket => {
                let prefix = query(req, "prefix").unwrap_or_default();
                let items: Vec<_> = objects
                    .keys()
                    .filter(|k| k.starts_with(&prefix))
                    .map(|k| json!({ "name": k }))
                    .collect();
                ResponseTemplate::new(200).set_body_json(json!({ "items": items }))
            }
            ("GET", ["storage", "v1", "b", bucket, "o", key]) if *bucket == self.bucket => {
                match objects.get(*key) {
                    Some(content) if query(req, "alt").as_deref() == Some("media") => {
                        ResponseTemplate::new(200).set_body_bytes(content.clone())
                    }
                    Some(content) => ResponseTemplate::new(200)
                        .set_body_json(json!({ "name": key, "size": content.len().to_string() })),
                    None => not_found(),
                }
            }
            ("POST", ["storage", "v1", "b", src_bucket, "o", src, "rewriteTo", "b", dst_bucket, "o", dst])
                if *src_bucket == self.bucket && *dst_bucket == self.bucket =>
            {
                if self.fail_copies.load(Ordering::SeqCst) {
                    return ResponseTemplate::new(503);
                }
                match objects.get(*src).cloned() {
                    Some(content) => {
                        objects.insert(dst.to_string(), content);
                        ResponseTemplate::new(200).set_body_json(json!({ "done": true }))
                    }
                    None => not_found(),
                }
            }
            ("DELETE", ["storage", "v1", "b", bucket, "o", key]) if *bucket == self.bucket => {
                match objects.remove(*key) {
                    Some(_) => ResponseTemplate::new(204),
                    None => not_found(),
                }
            }
            _ => ResponseTemplate::new(400),
        }
    }
}
