// This file is part of Stormwatch, an event-triggered storm video recorder.
// Copyright (C) 2026 The Stormwatch Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! The HTTP control surface: live preview, capture statistics, clip
//! browsing/retrieval/deletion, and runtime settings.

use crate::camera::{Camera, Property};
use crate::clip::ClipId;
use crate::json;
use crate::library::{Library, THUMB_EXT, VIDEO_EXT};
use base::clock::Clocks;
use core::borrow::Borrow;
use http::header::{self, HeaderValue};
use http::method::Method;
use http::{status::StatusCode, Request, Response};
use hyper::Body;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use url::form_urlencoded;

/// A decoded request path.
#[derive(Debug, Eq, PartialEq)]
enum Path {
    Dashboard,     // "/"
    LivePreview,   // "/live.jpeg"
    Stats,         // "/stats"
    Clips,         // "/clips"
    Clip(String),  // "/clips/<file>"
    Settings,      // "/settings"
    NotFound,
}

impl Path {
    /// Matches the path component of a request URI; query parameters play no
    /// part in routing.
    fn decode(path: &str) -> Self {
        match path {
            "/" => return Path::Dashboard,
            "/live.jpeg" => return Path::LivePreview,
            "/stats" => return Path::Stats,
            "/clips" => return Path::Clips,
            "/settings" => return Path::Settings,
            _ => {}
        }
        if let Some(rest) = path.strip_prefix("/clips/") {
            if !rest.is_empty() {
                return Path::Clip(rest.to_owned());
            }
        }
        Path::NotFound
    }
}

/// What a failed handler bails out with: a status code plus a short
/// plain-text explanation. Errors stay in this form until the top of
/// `serve`, so handlers get a working `?` operator without thinking about
/// response plumbing.
#[derive(Debug)]
struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    fn new<M: Into<String>>(status: StatusCode, message: M) -> Self {
        HttpError {
            status,
            message: message.into(),
        }
    }

    fn not_found<M: Into<String>>(message: M) -> Self {
        HttpError::new(StatusCode::NOT_FOUND, message)
    }

    fn method_not_allowed(expected: &str) -> Self {
        HttpError::new(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("{} expected", expected),
        )
    }

    fn internal<E: Into<failure::Error>>(err: E) -> Self {
        HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, err.into().to_string())
    }

    fn into_response(self) -> Response<Body> {
        let mut resp = Response::new(Body::from(self.message));
        *resp.status_mut() = self.status;
        resp.headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        resp
    }
}

type ResponseResult = Result<Response<Body>, HttpError>;

/// A 200 response carrying the given content type.
fn ok_response<B: Into<Body>>(mime: &'static str, body: B) -> Response<Body> {
    let mut resp = Response::new(body.into());
    resp.headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(mime));
    resp
}

fn serve_json<T: serde::ser::Serialize>(out: &T) -> ResponseResult {
    let body = serde_json::to_string(out).map_err(HttpError::internal)?;
    Ok(ok_response("application/json", body))
}

pub struct Service<C: Clocks + Clone> {
    camera: Arc<Camera<C>>,
    library: Arc<Library>,
}

impl<C: Clocks + Clone> Service<C> {
    pub fn new(camera: Arc<Camera<C>>, library: Arc<Library>) -> Self {
        Service { camera, library }
    }

    /// Entry point for hyper. Were this to return `Err`, hyper would sever
    /// the connection without telling the client anything, so every failure
    /// is rendered into a response here instead; only `serve_inner` and the
    /// handlers below deal in `HttpError`.
    pub async fn serve(
        self: Arc<Self>,
        req: Request<Body>,
    ) -> Result<Response<Body>, std::convert::Infallible> {
        let p = Path::decode(req.uri().path());
        debug!("{} {} -> {:?}", req.method(), req.uri(), p);
        Ok(self
            .serve_inner(req, p)
            .await
            .unwrap_or_else(HttpError::into_response))
    }

    async fn serve_inner(self: Arc<Self>, req: Request<Body>, p: Path) -> ResponseResult {
        match p {
            Path::Dashboard => self.dashboard(&req),
            Path::LivePreview => self.live_preview(&req),
            Path::Stats => self.stats(&req),
            Path::Clips => self.clips(&req),
            Path::Clip(name) => self.clip(&req, &name).await,
            Path::Settings => self.settings(&req),
            Path::NotFound => Err(HttpError::not_found("no such endpoint")),
        }
    }

    fn dashboard(&self, req: &Request<Body>) -> ResponseResult {
        require_get(req)?;
        Ok(ok_response(
            "text/html; charset=utf-8",
            include_str!("../ui/index.html"),
        ))
    }

    fn live_preview(&self, req: &Request<Body>) -> ResponseResult {
        require_get(req)?;
        Ok(ok_response("image/jpeg", self.camera.preview()))
    }

    fn stats(&self, req: &Request<Body>) -> ResponseResult {
        require_get(req)?;
        serve_json(&json::Stats::from(self.camera.status()))
    }

    fn clips(&self, req: &Request<Body>) -> ResponseResult {
        require_get(req)?;
        let clips: Vec<json::ClipEntry> = self
            .library
            .list_clips()
            .into_iter()
            .map(|stem| {
                let title = match ClipId::parse(&stem) {
                    Ok(id) => id.timestamp().to_owned(),
                    Err(_) => stem.clone(),
                };
                json::ClipEntry {
                    title,
                    video: format!("/clips/{}.{}", stem, VIDEO_EXT),
                    thumbnail: format!("/clips/{}.{}", stem, THUMB_EXT),
                }
            })
            .collect();
        serve_json(&clips)
    }

    async fn clip(&self, req: &Request<Body>, name: &str) -> ResponseResult {
        match *req.method() {
            Method::GET | Method::HEAD => self.get_clip(name).await,
            Method::DELETE => self.delete_clip(name),
            _ => Err(HttpError::method_not_allowed("GET, HEAD, or DELETE")),
        }
    }

    async fn get_clip(&self, name: &str) -> ResponseResult {
        let path = self
            .library
            .clip_path(name)
            .ok_or_else(|| HttpError::not_found("no such clip"))?;
        let body = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HttpError::not_found("no such clip")
            } else {
                HttpError::internal(e)
            }
        })?;
        let mime = if name.ends_with(THUMB_EXT) {
            "image/jpeg"
        } else {
            "video/mp4"
        };
        Ok(ok_response(mime, body))
    }

    fn delete_clip(&self, raw_id: &str) -> ResponseResult {
        // An id that doesn't decode is indistinguishable from an absent clip.
        let id = match ClipId::parse(raw_id) {
            Ok(id) => id,
            Err(e) => {
                warn!("rejecting clip deletion for undecodable id: {}", e);
                return Err(HttpError::not_found("no such clip"));
            }
        };
        if self.library.delete_clip(id.id()) {
            Ok(ok_response("application/json", "{}"))
        } else {
            Err(HttpError::not_found("no such clip"))
        }
    }

    fn settings(&self, req: &Request<Body>) -> ResponseResult {
        match *req.method() {
            Method::GET | Method::HEAD => self.get_settings(),
            Method::POST => self.post_settings(req),
            _ => Err(HttpError::method_not_allowed("GET, HEAD, or POST")),
        }
    }

    fn get_settings(&self) -> ResponseResult {
        let mut settings = BTreeMap::new();
        for &p in &Property::ALL {
            settings.insert(p.as_str(), self.camera.get_property(p));
        }
        serve_json(&settings)
    }

    /// Applies every recognized property present in the query string, then
    /// arms the worker's reload. Unrecognized keys are silently ignored.
    fn post_settings(&self, req: &Request<Body>) -> ResponseResult {
        if let Some(q) = req.uri().query() {
            for (key, value) in form_urlencoded::parse(q.as_bytes()) {
                let (key, value): (&str, &str) = (key.borrow(), value.borrow());
                let property = match Property::parse(key) {
                    Some(p) => p,
                    None => continue,
                };
                match value.parse::<f64>() {
                    Ok(v) => self.camera.set_property(property, v),
                    Err(_) => warn!("ignoring unparseable value for {}: {:?}", key, value),
                }
            }
        }
        self.camera.apply_property_change();
        Ok(ok_response("application/json", "{}"))
    }
}

fn require_get(req: &Request<Body>) -> Result<(), HttpError> {
    match *req.method() {
        Method::GET | Method::HEAD => Ok(()),
        _ => Err(HttpError::method_not_allowed("GET or HEAD")),
    }
}

#[cfg(test)]
mod tests {
    use super::{Path, Service};
    use crate::camera::Camera;
    use crate::library::Library;
    use crate::testutil;
    use base::clock::RealClocks;
    use futures::future::FutureExt;
    use std::path::PathBuf;
    use std::sync::Arc;

    #[test]
    fn paths() {
        assert_eq!(Path::decode("/"), Path::Dashboard);
        assert_eq!(Path::decode("/live.jpeg"), Path::LivePreview);
        assert_eq!(Path::decode("/stats"), Path::Stats);
        assert_eq!(Path::decode("/clips"), Path::Clips);
        assert_eq!(
            Path::decode("/clips/aGVsbG8=.mp4"),
            Path::Clip("aGVsbG8=.mp4".to_owned())
        );
        assert_eq!(Path::decode("/settings"), Path::Settings);
        assert_eq!(Path::decode("/clips/"), Path::NotFound);
        assert_eq!(Path::decode("/junk"), Path::NotFound);
        assert_eq!(Path::decode("/live.jpeg/x"), Path::NotFound);
    }

    struct Server {
        base_url: String,
        library_dir: PathBuf,
        handle: Option<std::thread::JoinHandle<()>>,
        shutdown_tx: Option<futures::channel::oneshot::Sender<()>>,
        _tmpdir: tempfile::TempDir,
    }

    impl Server {
        fn new() -> Server {
            let tmpdir = tempfile::tempdir().unwrap();
            let library_dir = tmpdir.path().join("videolib");
            let library = Arc::new(Library::new(&library_dir).unwrap());
            let camera = Arc::new(Camera::new(RealClocks::new(), library.clone()));
            let service = Arc::new(Service::new(camera, library));
            let make_svc = hyper::service::make_service_fn(move |_conn| {
                futures::future::ok::<_, std::convert::Infallible>(hyper::service::service_fn({
                    let s = Arc::clone(&service);
                    move |req| Arc::clone(&s).serve(req)
                }))
            });
            let (shutdown_tx, shutdown_rx) = futures::channel::oneshot::channel::<()>();
            let (tx, rx) = std::sync::mpsc::channel();
            let handle = std::thread::spawn(move || {
                let addr = ([127, 0, 0, 1], 0).into();
                let rt = tokio::runtime::Runtime::new().unwrap();
                let srv = {
                    let _guard = rt.enter();
                    hyper::server::Server::bind(&addr)
                        .tcp_nodelay(true)
                        .serve(make_svc)
                };
                let addr = srv.local_addr(); // learn which ephemeral port the OS picked.
                tx.send(addr).unwrap();
                rt.block_on(srv.with_graceful_shutdown(shutdown_rx.map(|_| ())))
                    .unwrap();
            });
            let addr = rx.recv().unwrap();
            Server {
                base_url: format!("http://{}:{}", addr.ip(), addr.port()),
                library_dir,
                handle: Some(handle),
                shutdown_tx: Some(shutdown_tx),
                _tmpdir: tmpdir,
            }
        }

        /// Plants a fake clip pair directly in the library directory,
        /// returning its id stem.
        fn plant_clip(&self, timestamp: &str) -> String {
            let stem = base64::encode(timestamp);
            std::fs::write(self.library_dir.join(format!("{}.mp4", stem)), b"video").unwrap();
            std::fs::write(self.library_dir.join(format!("{}.jpeg", stem)), b"thumb").unwrap();
            stem
        }
    }

    impl Drop for Server {
        fn drop(&mut self) {
            self.shutdown_tx.take().unwrap().send(()).unwrap();
            self.handle.take().unwrap().join().unwrap()
        }
    }

    #[tokio::test]
    async fn dashboard_and_unknown_paths() {
        testutil::init();
        let s = Server::new();
        let cli = reqwest::Client::new();

        let resp = cli.get(&format!("{}/", &s.base_url)).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert!(resp.text().await.unwrap().contains("<html"));

        let resp = cli
            .get(&format!("{}/junk", &s.base_url))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stats_without_camera() {
        testutil::init();
        let s = Server::new();
        let stats: serde_json::Value = reqwest::Client::new()
            .get(&format!("{}/stats", &s.base_url))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stats["width"], 0);
        assert_eq!(stats["nominalFPS"], 0.);
        assert_eq!(stats["measuredFPS"], 0.);
    }

    #[tokio::test]
    async fn preview_placeholder_is_jpeg() {
        testutil::init();
        let s = Server::new();
        let resp = reqwest::Client::new()
            .get(&format!("{}/live.jpeg", &s.base_url))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(resp.headers()[reqwest::header::CONTENT_TYPE], "image/jpeg");
        let body = resp.bytes().await.unwrap();
        assert_eq!(&body[0..2], &[0xff, 0xd8]);
    }

    #[tokio::test]
    async fn settings_round_trip() {
        testutil::init();
        let s = Server::new();
        let cli = reqwest::Client::new();

        let resp = cli
            .post(&format!(
                "{}/settings?trigger_threshold=42.0&bogus=1",
                &s.base_url
            ))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(resp.text().await.unwrap(), "{}");

        let settings: serde_json::Value = cli
            .get(&format!("{}/settings", &s.base_url))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(settings["trigger_threshold"], 42.);
        assert_eq!(settings["edge_detection_seconds"], 2.);
        assert!(settings.get("bogus").is_none());
    }

    #[tokio::test]
    async fn clip_listing_and_fetch() {
        testutil::init();
        let s = Server::new();
        let cli = reqwest::Client::new();

        let clips: serde_json::Value = cli
            .get(&format!("{}/clips", &s.base_url))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(clips.as_array().unwrap().len(), 0);

        let stem = s.plant_clip("2026-08-01T14:23:05.123456");
        let clips: serde_json::Value = cli
            .get(&format!("{}/clips", &s.base_url))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let entry = &clips.as_array().unwrap()[0];
        assert_eq!(entry["title"], "2026-08-01T14:23:05.123456");
        assert_eq!(entry["video"], format!("/clips/{}.mp4", stem));

        let resp = cli
            .get(&format!("{}{}", &s.base_url, entry["thumbnail"].as_str().unwrap()))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(resp.headers()[reqwest::header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(&resp.bytes().await.unwrap()[..], b"thumb");
    }

    #[tokio::test]
    async fn clip_path_traversal_rejected() {
        testutil::init();
        let s = Server::new();
        let resp = reqwest::Client::new()
            .get(&format!("{}/clips/..%2Fetc%2Fpasswd", &s.base_url))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn clip_deletion() {
        testutil::init();
        let s = Server::new();
        let cli = reqwest::Client::new();
        let stem = s.plant_clip("2026-08-01T14:23:05.123456");

        let resp = cli
            .delete(&format!("{}/clips/{}", &s.base_url, stem))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);

        // Gone now, and an undecodable id is equally absent.
        let resp = cli
            .delete(&format!("{}/clips/{}", &s.base_url, stem))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
        let resp = cli
            .delete(&format!("{}/clips/notbase64!", &s.base_url))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn wrong_method() {
        testutil::init();
        let s = Server::new();
        let resp = reqwest::Client::new()
            .post(&format!("{}/stats", &s.base_url))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);
    }
}
