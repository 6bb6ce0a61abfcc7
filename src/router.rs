//! Routing and request dispatch.
//!
//! This module provides the HTTP plumbing for the application:
//!
//! - Method- and path-based routing with `:param` segments
//! - Global pre-middleware, route-specific middleware and post-middleware
//! - Per-request console logging and hand-off to the [`RequestLogger`]
//!
//! Connections are served by axum; every request is funnelled through a
//! single fallback into [`Router::handle`], which is also what tests call.
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router as AxumRouter;
use axum::extract::{ConnectInfo, Request};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use futures::FutureExt;
use futures::future::BoxFuture;
use log::{error, info, warn};
use serde::Serialize;
use tokio::net::TcpListener;

use crate::auth::{Claims, JwtKeys};
use crate::orm::Db;
use crate::request_log::{self, RequestLogger};
use crate::settings::Settings;

/// Largest request body accepted.
pub const BODY_LIMIT: usize = 50 * 1024 * 1024;

/// Default bound on reading a request body and on running its handler.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared services handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Db>,
    pub settings: Arc<Settings>,
    pub jwt: Arc<JwtKeys>,
    pub request_logger: Option<RequestLogger>,
}

impl AppState {
    pub fn new(db: Arc<Db>, settings: Settings) -> Self {
        let jwt = Arc::new(JwtKeys::new(&settings.jwt_secret));
        AppState {
            db,
            settings: Arc::new(settings),
            jwt,
            request_logger: None,
        }
    }

    pub fn with_request_logger(mut self, logger: RequestLogger) -> Self {
        self.request_logger = Some(logger);
        self
    }
}

/// Represents the outcome of an HTTP handler.
#[derive(Debug, Clone)]
pub struct Response {
    pub status_code: u16,
    pub body: String,
    pub headers: HashMap<String, String>,
}

impl Response {
    /// Construct a new HTTP 200 response with a text body.
    pub fn ok(body: impl Into<String>) -> Self {
        Response {
            status_code: 200,
            body: body.into(),
            headers: HashMap::new(),
        }
    }

    pub fn no_content() -> Self {
        Response {
            status_code: 204,
            body: String::new(),
            headers: HashMap::new(),
        }
    }

    /// Construct a new HTTP 404 "not found" response.
    pub fn not_found() -> Self {
        Response {
            status_code: 404,
            body: "404 Not Found".to_string(),
            headers: HashMap::new(),
        }
    }

    pub fn method_not_allowed() -> Self {
        Response {
            status_code: 405,
            body: "405 Method Not Allowed".to_string(),
            headers: HashMap::new(),
        }
    }

    pub fn payload_too_large() -> Self {
        Response {
            status_code: 413,
            body: "413 Payload Too Large".to_string(),
            headers: HashMap::new(),
        }
    }

    pub fn request_timeout() -> Self {
        Response {
            status_code: 408,
            body: "408 Request Timeout".to_string(),
            headers: HashMap::new(),
        }
    }

    pub fn service_unavailable() -> Self {
        Response {
            status_code: 503,
            body: "503 Service Unavailable".to_string(),
            headers: HashMap::new(),
        }
    }

    pub fn internal_error() -> Self {
        Response {
            status_code: 500,
            body: "500 Internal Server Error".to_string(),
            headers: HashMap::new(),
        }
    }

    /// Construct a new HTTP JSON response.
    /// Accepts any serde-serializable payload, status, and custom headers.
    pub fn json<T: Serialize>(
        data: T,
        status_code: u16,
        mut headers: HashMap<String, String>,
    ) -> Self {
        headers.insert(
            "Content-Type".to_string(),
            "application/json; charset=utf-8".to_string(),
        );
        match serde_json::to_string(&data) {
            Ok(body) => Response {
                status_code,
                body,
                headers,
            },
            Err(_) => Response {
                status_code: 500,
                body: "{\"error\": \"Serialization failed\"}".to_string(),
                headers,
            },
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_string(), value.into());
        self
    }
}

/// Holds metadata about the current HTTP request and its extracted path parameters.
/// Middleware and handlers can modify/read this context.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub params: HashMap<String, String>,
    /// Header names are stored lower-cased.
    pub headers: HashMap<String, String>,
    pub body: String,
    pub remote_addr: Option<SocketAddr>,
    /// Set by the bearer-token middleware.
    pub claims: Option<Claims>,
    pub start_time: Option<Instant>,
}

impl RequestContext {
    pub fn new(method: &str, path: &str) -> Self {
        RequestContext {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Path plus query string, as requested.
    pub fn url(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }
}

/// Async handler for an HTTP route.
pub type Handler = Arc<dyn Fn(RequestContext, AppState) -> BoxFuture<'static, Response> + Send + Sync>;

/// Synchronous pre-processing middleware executed before the handler.
/// If a middleware returns Some(Response), request handling stops and this response is sent.
pub type Middleware = Arc<dyn Fn(&mut RequestContext) -> Option<Response> + Send + Sync>;

/// Post-processing middleware executed after the handler, including for
/// responses produced by a pre-middleware.
pub type PostMiddleware = Arc<dyn Fn(&RequestContext, Response) -> Response + Send + Sync>;

pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(RequestContext, AppState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(
        move |ctx: RequestContext, state: AppState| -> BoxFuture<'static, Response> {
            f(ctx, state).boxed()
        },
    )
}

pub fn middleware<F>(f: F) -> Middleware
where
    F: Fn(&mut RequestContext) -> Option<Response> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn post_middleware<F>(f: F) -> PostMiddleware
where
    F: Fn(&RequestContext, Response) -> Response + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Represents a registered HTTP route and its associated handler + middleware.
#[derive(Clone)]
pub struct Route {
    pub method: String,
    pub path_pattern: String,
    pub handler: Handler,
    pub middlewares: Vec<Middleware>,
}

/// The main application router.
#[derive(Clone, Default)]
pub struct Router {
    pub routes: Vec<Route>,
    pub middlewares: Vec<Middleware>,
    pub post_middlewares: Vec<PostMiddleware>,
    pub app_state: Option<AppState>,
    /// `None` disables the bound.
    pub request_timeout: Option<Duration>,
}

impl Router {
    /// Create a new, empty application router bounded by [`REQUEST_TIMEOUT`].
    pub fn new() -> Self {
        Router {
            request_timeout: Some(REQUEST_TIMEOUT),
            ..Router::default()
        }
    }

    /// Register a route with method, path pattern, handler, and any route-specific middleware.
    pub fn add_route(
        &mut self,
        method: &str,
        path_pattern: &str,
        handler: Handler,
        middlewares: Vec<Middleware>,
    ) {
        self.routes.push(Route {
            method: method.to_ascii_uppercase(),
            path_pattern: path_pattern.to_string(),
            handler,
            middlewares,
        });
    }

    /// Add a global pre-middleware to be run before all HTTP handlers.
    pub fn add_middleware(&mut self, middleware: Middleware) {
        self.middlewares.push(middleware);
    }

    /// Add a post-middleware to be run after each HTTP handler.
    pub fn add_post_middleware(&mut self, middleware: PostMiddleware) {
        self.post_middlewares.push(middleware);
    }

    pub fn set_app_state(&mut self, state: AppState) {
        self.app_state = Some(state);
    }

    pub fn set_request_timeout(&mut self, timeout: Option<Duration>) {
        self.request_timeout = timeout;
    }

    /// Run one request through the middleware chain and the matching route.
    pub async fn handle(&self, mut ctx: RequestContext) -> Response {
        let started = Instant::now();
        ctx.start_time = Some(started);

        let mut response = match self.request_timeout {
            Some(limit) => {
                let outcome = tokio::time::timeout(limit, self.dispatch(&mut ctx)).await;
                outcome.unwrap_or_else(|_| {
                    warn!("{} {} exceeded {:?}", ctx.method, ctx.path, limit);
                    Response::service_unavailable()
                })
            }
            None => self.dispatch(&mut ctx).await,
        };
        for post_middleware in &self.post_middlewares {
            response = (post_middleware)(&ctx, response);
        }

        request_log::log_request(&ctx, response.status_code, started.elapsed());
        if let Some(logger) = self
            .app_state
            .as_ref()
            .and_then(|s| s.request_logger.as_ref())
        {
            if let Err(e) = logger.log(request_log::entry_for(&ctx, &response)).await {
                warn!("Request log entry dropped: {}", e);
            }
        }

        response
    }

    async fn dispatch(&self, ctx: &mut RequestContext) -> Response {
        for middleware in &self.middlewares {
            if let Some(response) = (middleware)(&mut *ctx) {
                return response;
            }
        }

        let Some(state) = self.app_state.clone() else {
            error!("App state not set in Router");
            return Response::internal_error();
        };

        let mut path_matched = false;
        for route in &self.routes {
            let Some(params) = match_path(&route.path_pattern, &ctx.path) else {
                continue;
            };
            if route.method != ctx.method {
                path_matched = true;
                continue;
            }
            ctx.params = params;

            for middleware in &route.middlewares {
                if let Some(response) = (middleware)(&mut *ctx) {
                    return response;
                }
            }
            return (route.handler)(ctx.clone(), state).await;
        }

        if path_matched {
            Response::method_not_allowed()
        } else {
            Response::not_found()
        }
    }

    /// Bind `addr` and serve until Ctrl-C.
    pub async fn run(self, addr: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let router = Arc::new(self);
        let app = AxumRouter::new().fallback(
            move |ConnectInfo(remote): ConnectInfo<SocketAddr>, request: Request| {
                let router = router.clone();
                async move { router.serve_request(request, remote).await }
            },
        );

        let listener = TcpListener::bind(addr).await?;
        info!("🚀 Server is running on http://{}", addr);
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;
        info!("HTTP server stopped");
        Ok(())
    }

    async fn serve_request(&self, request: Request, remote: SocketAddr) -> axum::response::Response {
        let (parts, body) = request.into_parts();
        let read = axum::body::to_bytes(body, BODY_LIMIT);
        let read = match self.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, read).await {
                Ok(read) => read,
                Err(_) => return into_axum(Response::request_timeout()),
            },
            None => read.await,
        };
        let body = match read {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(_) => return into_axum(Response::payload_too_large()),
        };

        let mut ctx = RequestContext::new(parts.method.as_str(), parts.uri.path()).with_body(body);
        ctx.query = parts.uri.query().map(str::to_string);
        ctx.remote_addr = Some(remote);
        for (name, value) in &parts.headers {
            if let Ok(value) = value.to_str() {
                ctx.headers.insert(name.as_str().to_string(), value.to_string());
            }
        }

        into_axum(self.handle(ctx).await)
    }
}

fn into_axum(response: Response) -> axum::response::Response {
    let status =
        StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut out = (status, response.body).into_response();
    for (name, value) in response.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            out.headers_mut().insert(name, value);
        }
    }
    out
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

#[macro_export]
macro_rules! route {
    ($router:expr, $( $method:ident $path:expr => { $handler:expr $(, $middleware:expr )* } ),* $(,)?) => {
        $(
            $router.add_route(
                stringify!($method),
                $path,
                $crate::router::handler($handler),
                vec![$($middleware),*]
            );
        )*
    };
}

/// Matches a path pattern (e.g. `/foo/:id`) against a real path,
/// extracting parameters into a HashMap if matched, or None if not.
pub fn match_path(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern_parts: Vec<&str> = pattern.trim_matches('/').split('/').collect();
    let path_parts: Vec<&str> = path.trim_matches('/').split('/').collect();

    if pattern_parts.len() != path_parts.len() {
        return None;
    }

    let mut params = HashMap::new();

    for (p, a) in pattern_parts.iter().zip(path_parts.iter()) {
        if let Some(name) = p.strip_prefix(':') {
            params.insert(name.to_string(), a.to_string());
        } else if p != a {
            return None;
        }
    }

    Some(params)
}
