//! Gateway server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{FromRef, Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use validator::Validate;
use warden_core::store::with_deadline;
use warden_core::{
    Config, CredentialStore, Identity, Login, NewPost, Post, PostId, PostStore, Role, SledStore,
    StoreError, UserId,
};

use crate::GatewayError;
use crate::auth::{
    AuthError, AuthPipeline, AuthorizationGate, BasicAuth, IssuedToken, RequireAuth, RoleResolver,
    TokenCodec, require_basic,
};
use crate::cache::IdentityCache;
use crate::middleware::{LimiterStats, RateLimiter, rate_limit};

/// Static facts about the running service.
#[derive(Debug, Clone)]
pub struct ServiceMeta {
    /// Deployment environment label.
    pub env: String,
    /// Crate version.
    pub version: &'static str,
    /// Upper bound on a single store call made by a handler.
    pub store_timeout: Duration,
}

/// Gateway server state shared across handlers.
#[derive(Clone, FromRef)]
pub struct GatewayState {
    /// Bearer authentication.
    pub pipeline: Arc<AuthPipeline>,
    /// Owner-or-role authorization.
    pub gate: Arc<AuthorizationGate>,
    /// Basic credential for operational routes.
    pub basic: Arc<BasicAuth>,
    /// Request rate limiter.
    pub limiter: Arc<RateLimiter>,
    /// Password verification for token issuance.
    pub credentials: Arc<dyn CredentialStore>,
    /// Post persistence.
    pub posts: Arc<dyn PostStore>,
    /// Service metadata.
    pub meta: Arc<ServiceMeta>,
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("pipeline", &self.pipeline)
            .field("limiter", &self.limiter)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// Gateway server.
#[derive(Debug)]
pub struct Gateway {
    config: Config,
    state: GatewayState,
}

/// Builder for constructing a Gateway with its dependencies.
#[derive(Debug, Default)]
pub struct GatewayBuilder {
    config: Config,
    store: Option<SledStore>,
}

impl GatewayBuilder {
    /// Create a new builder with default config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set gateway configuration.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Use an already opened store instead of opening one under the data dir.
    #[must_use]
    pub fn with_store(mut self, store: SledStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the gateway.
    ///
    /// # Errors
    ///
    /// Returns error if the config is invalid or the store cannot be opened.
    pub fn build(self) -> Result<Gateway, GatewayError> {
        let config = self.config;
        config
            .validate()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        let store = match self.store {
            Some(store) => store,
            None => {
                let data_dir = config.store.data_dir();
                std::fs::create_dir_all(&data_dir).map_err(|e| {
                    GatewayError::Config(format!("Failed to create data dir: {e}"))
                })?;
                SledStore::open(&data_dir)
                    .map_err(|e| GatewayError::Server(format!("Failed to open store: {e}")))?
            }
        };
        let store = Arc::new(store);
        let timeout = config.store.timeout();

        let codec = Arc::new(TokenCodec::from_config(&config.auth.token));
        let identities = IdentityCache::new(
            store.clone(),
            config.cache.enabled,
            config.cache.max_entries,
            timeout,
        );

        let state = GatewayState {
            pipeline: Arc::new(AuthPipeline::new(codec, identities)),
            gate: Arc::new(AuthorizationGate::new(RoleResolver::new(
                store.clone(),
                timeout,
            ))),
            basic: Arc::new(BasicAuth::from_config(&config.auth.basic)),
            limiter: Arc::new(RateLimiter::from_config(&config.rate_limiter)),
            credentials: store.clone(),
            posts: store,
            meta: Arc::new(ServiceMeta {
                env: config.server.env.clone(),
                version: env!("CARGO_PKG_VERSION"),
                store_timeout: timeout,
            }),
        };

        Ok(Gateway { config, state })
    }
}

impl Gateway {
    /// Shared state, for callers embedding the router.
    #[must_use]
    pub const fn state(&self) -> &GatewayState {
        &self.state
    }

    /// Build the HTTP router.
    ///
    /// Every route passes the rate limiter before anything else runs.
    pub fn router(&self) -> Router {
        let state = self.state.clone();

        let operational = Router::new()
            .route("/debug/vars", get(debug_vars_handler))
            .route_layer(middleware::from_fn_with_state(
                state.basic.clone(),
                require_basic,
            ));

        let api = Router::new()
            .route("/health", get(health_handler))
            .route("/authentication/token", post(token_handler))
            .route("/users/{id}", get(get_user_handler))
            .route("/posts", post(create_post_handler))
            .route(
                "/posts/{id}",
                get(get_post_handler)
                    .patch(update_post_handler)
                    .delete(delete_post_handler),
            )
            .merge(operational);

        let mut app = Router::new()
            .nest("/v1", api)
            .layer(middleware::from_fn_with_state(
                state.limiter.clone(),
                rate_limit,
            ))
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                self.config.server.request_timeout(),
            ))
            .layer(TraceLayer::new_for_http());

        if self.config.server.cors {
            app = app.layer(CorsLayer::permissive());
        }

        app.with_state(state)
    }

    /// Run the gateway until Ctrl-C or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns error if the listener cannot be bound or the server fails.
    pub async fn run(&self) -> Result<(), GatewayError> {
        let addr: SocketAddr = self
            .config
            .server
            .addr
            .parse()
            .map_err(|e| GatewayError::Config(format!("Invalid listen address: {e}")))?;

        let listener = TcpListener::bind(addr).await?;
        tracing::info!(
            addr = %listener.local_addr()?,
            env = %self.state.meta.env,
            "Gateway listening"
        );

        let sweeper = tokio::spawn(sweep(
            self.state.clone(),
            self.config.rate_limiter.sweep_interval(),
        ));

        let app = self.router();
        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        sweeper.abort();
        tracing::info!("Gateway stopped");
        result.map_err(|e| GatewayError::Server(e.to_string()))
    }
}

/// Periodically drop idle limiter keys and expired cache entries.
async fn sweep(state: GatewayState, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let keys = state.limiter.purge_expired();
        let identities = state.pipeline.identities().purge_expired();
        if keys > 0 || identities > 0 {
            tracing::debug!(keys, identities, "swept expired entries");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Ctrl+C received, shutting down"),
        () = terminate => tracing::info!("SIGTERM received, shutting down"),
    }
}

/// Handler errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Authentication or authorization failure.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The request payload is invalid.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The addressed resource does not exist.
    #[error("not found")]
    NotFound,
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => Self::NotFound,
            other => Self::Auth(AuthError::TransientFailure(other)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Auth(e) => e.into_response(),
            Self::BadRequest(detail) => {
                tracing::debug!(%detail, "bad request");
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": detail, "code": "bad_request" })),
                )
                    .into_response()
            }
            Self::NotFound => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "not found", "code": "not_found" })),
            )
                .into_response(),
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    env: String,
    version: &'static str,
}

async fn health_handler(State(meta): State<Arc<ServiceMeta>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        env: meta.env.clone(),
        version: meta.version,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DebugVars {
    rate_limiter: LimiterStats,
    identity_cache: CacheVars,
}

#[derive(Debug, Serialize)]
struct CacheVars {
    enabled: bool,
    entries: usize,
}

async fn debug_vars_handler(
    State(limiter): State<Arc<RateLimiter>>,
    State(pipeline): State<Arc<AuthPipeline>>,
) -> Json<DebugVars> {
    let cache = pipeline.identities();
    Json(DebugVars {
        rate_limiter: limiter.stats(),
        identity_cache: CacheVars {
            enabled: cache.is_enabled(),
            entries: cache.len(),
        },
    })
}

/// Login payload. Exactly one of `username` or `email` must be set.
#[derive(Debug, Deserialize, Validate)]
struct TokenRequest {
    #[validate(length(min = 1, max = 100))]
    username: Option<String>,
    #[validate(email, length(max = 255))]
    email: Option<String>,
    #[validate(length(min = 3, max = 72))]
    password: String,
}

impl TokenRequest {
    fn login(&self) -> ApiResult<Login> {
        match (&self.username, &self.email) {
            (Some(username), None) => Ok(Login::Username(username.clone())),
            (None, Some(email)) => Ok(Login::Email(email.clone())),
            _ => Err(ApiError::BadRequest(
                "provide exactly one of username or email".to_string(),
            )),
        }
    }
}

async fn token_handler(
    State(state): State<GatewayState>,
    Json(payload): Json<TokenRequest>,
) -> ApiResult<(StatusCode, Json<IssuedToken>)> {
    payload
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let login = payload.login()?;

    let identity = with_deadline(
        state.meta.store_timeout,
        state.credentials.verify_password(&login, &payload.password),
    )
    .await
    .map_err(|e| match e {
        StoreError::InvalidCredentials | StoreError::NotFound => {
            ApiError::Auth(AuthError::InvalidCredential)
        }
        other => ApiError::from(other),
    })?;

    let issued = state.pipeline.codec().issue_for(identity.id)?;
    tracing::info!(user_id = %identity.id, "issued token");
    Ok((StatusCode::CREATED, Json(issued)))
}

async fn get_user_handler(
    State(pipeline): State<Arc<AuthPipeline>>,
    RequireAuth(_caller): RequireAuth,
    Path(id): Path<u64>,
) -> ApiResult<Json<Identity>> {
    let identity = pipeline.identities().get(UserId(id)).await?;
    if !identity.active {
        return Err(ApiError::NotFound);
    }
    Ok(Json(identity))
}

#[derive(Debug, Deserialize, Validate)]
struct CreatePostRequest {
    #[validate(length(min = 1, max = 100))]
    title: String,
    #[validate(length(min = 1, max = 1000))]
    content: String,
}

#[derive(Debug, Deserialize, Validate)]
struct UpdatePostRequest {
    #[validate(length(min = 1, max = 100))]
    title: Option<String>,
    #[validate(length(min = 1, max = 1000))]
    content: Option<String>,
}

async fn create_post_handler(
    State(state): State<GatewayState>,
    RequireAuth(caller): RequireAuth,
    Json(payload): Json<CreatePostRequest>,
) -> ApiResult<(StatusCode, Json<Post>)> {
    payload
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let post = with_deadline(
        state.meta.store_timeout,
        state.posts.create(NewPost {
            user_id: caller.id,
            title: payload.title,
            content: payload.content,
        }),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn load_post(state: &GatewayState, id: u64) -> ApiResult<Post> {
    Ok(with_deadline(state.meta.store_timeout, state.posts.get_by_id(PostId(id))).await?)
}

async fn get_post_handler(
    State(state): State<GatewayState>,
    RequireAuth(_caller): RequireAuth,
    Path(id): Path<u64>,
) -> ApiResult<Json<Post>> {
    load_post(&state, id).await.map(Json)
}

async fn update_post_handler(
    State(state): State<GatewayState>,
    RequireAuth(caller): RequireAuth,
    Path(id): Path<u64>,
    Json(payload): Json<UpdatePostRequest>,
) -> ApiResult<Json<Post>> {
    payload
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let mut post = load_post(&state, id).await?;
    state.gate.authorize(&caller, &post, Role::MODERATOR).await?;

    if let Some(title) = payload.title {
        post.title = title;
    }
    if let Some(content) = payload.content {
        post.content = content;
    }

    let post = with_deadline(state.meta.store_timeout, state.posts.update(post)).await?;
    Ok(Json(post))
}

async fn delete_post_handler(
    State(state): State<GatewayState>,
    RequireAuth(caller): RequireAuth,
    Path(id): Path<u64>,
) -> ApiResult<StatusCode> {
    let post = load_post(&state, id).await?;
    state.gate.authorize(&caller, &post, Role::ADMIN).await?;

    with_deadline(state.meta.store_timeout, state.posts.delete(post.id)).await?;
    tracing::info!(post_id = %post.id, user_id = %caller.id, "deleted post");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, header};
    use base64::{Engine, engine::general_purpose::STANDARD};
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;
    use warden_core::NewUser;

    struct Harness {
        _dir: TempDir,
        store: SledStore,
        router: Router,
    }

    fn harness_with(mut config: Config) -> Harness {
        let dir = TempDir::new().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        config.auth.token.secret = Some("test-secret".to_string());
        let gateway = GatewayBuilder::new()
            .with_config(config)
            .with_store(store.clone())
            .build()
            .unwrap();
        Harness {
            _dir: dir,
            store,
            router: gateway.router(),
        }
    }

    fn harness() -> Harness {
        let mut config = Config::default();
        config.rate_limiter.enabled = false;
        harness_with(config)
    }

    impl Harness {
        fn user(&self, name: &str, role: &str) -> Identity {
            self.store
                .create_user(&NewUser {
                    username: name.to_string(),
                    email: format!("{name}@example.com"),
                    password: "correct horse".to_string(),
                    role: role.to_string(),
                })
                .unwrap()
        }

        async fn send(
            &self,
            method: Method,
            uri: &str,
            auth: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(auth) = auth {
                builder = builder.header(header::AUTHORIZATION, auth);
            }
            let request = match body {
                Some(body) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };

            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, value)
        }

        async fn login(&self, username: &str) -> String {
            let (status, body) = self
                .send(
                    Method::POST,
                    "/v1/authentication/token",
                    None,
                    Some(json!({ "username": username, "password": "correct horse" })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
            format!("Bearer {}", body["token"].as_str().unwrap())
        }
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness();
        let (status, body) = h.send(Method::GET, "/v1/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["env"], "dev");
    }

    #[tokio::test]
    async fn test_debug_vars_requires_basic() {
        let h = harness();
        let (status, body) = h.send(Method::GET, "/v1/debug/vars", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "invalid_credential");

        let auth = format!("Basic {}", STANDARD.encode("admin:admin"));
        let (status, body) = h
            .send(Method::GET, "/v1/debug/vars", Some(&auth), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["identityCache"]["enabled"], false);
    }

    #[tokio::test]
    async fn test_token_login_failures_are_generic() {
        let h = harness();
        h.user("alice", Role::USER);

        let (status, body) = h
            .send(
                Method::POST,
                "/v1/authentication/token",
                None,
                Some(json!({ "username": "alice", "password": "wrong password" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "error": "unauthorized", "code": "invalid_credential" }));

        let (status, _) = h
            .send(
                Method::POST,
                "/v1/authentication/token",
                None,
                Some(json!({ "username": "nobody", "password": "correct horse" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = h
            .send(
                Method::POST,
                "/v1/authentication/token",
                None,
                Some(json!({ "password": "correct horse" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "bad_request");
    }

    #[tokio::test]
    async fn test_bearer_required() {
        let h = harness();
        let (status, body) = h.send(Method::GET, "/v1/users/1", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "missing_credential");

        let (status, body) = h
            .send(Method::GET, "/v1/users/1", Some("Bearer nope"), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "invalid_credential");
    }

    #[tokio::test]
    async fn test_get_user() {
        let h = harness();
        let alice = h.user("alice", Role::USER);
        let token = h.login("alice").await;

        let (status, body) = h
            .send(Method::GET, &format!("/v1/users/{}", alice.id), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "alice");
        assert!(body.get("password_hash").is_none());

        let (status, _) = h
            .send(Method::GET, "/v1/users/999999", Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_disabled_user_not_listed() {
        let h = harness();
        h.user("alice", Role::USER);
        let bob = h.user("bob", Role::USER);
        let token = h.login("alice").await;

        h.store.set_active(bob.id, false).unwrap();
        let (status, body) = h
            .send(Method::GET, &format!("/v1/users/{}", bob.id), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "not_found");
    }

    #[tokio::test]
    async fn test_requests_through_identity_cache() {
        let mut config = Config::default();
        config.rate_limiter.enabled = false;
        config.cache.enabled = true;
        let h = harness_with(config);
        let alice = h.user("alice", Role::USER);
        let token = h.login("alice").await;
        let uri = format!("/v1/users/{}", alice.id);

        for _ in 0..3 {
            let (status, body) = h.send(Method::GET, &uri, Some(&token), None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["username"], "alice");
        }

        let auth = format!("Basic {}", STANDARD.encode("admin:admin"));
        let (status, body) = h
            .send(Method::GET, "/v1/debug/vars", Some(&auth), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["identityCache"]["enabled"], true);
        assert_eq!(body["identityCache"]["entries"], 1);
    }

    #[tokio::test]
    async fn test_post_lifecycle_with_roles() {
        let h = harness();
        h.user("alice", Role::USER);
        h.user("bob", Role::USER);
        h.user("mod", Role::MODERATOR);
        h.user("root", Role::ADMIN);
        let alice = h.login("alice").await;
        let bob = h.login("bob").await;
        let moderator = h.login("mod").await;
        let admin = h.login("root").await;

        let (status, post) = h
            .send(
                Method::POST,
                "/v1/posts",
                Some(&alice),
                Some(json!({ "title": "hello", "content": "world" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let uri = format!("/v1/posts/{}", post["id"]);

        let (status, _) = h.send(Method::GET, &uri, Some(&bob), None).await;
        assert_eq!(status, StatusCode::OK);

        let edit = json!({ "title": "edited" });
        let (status, body) = h
            .send(Method::PATCH, &uri, Some(&bob), Some(edit.clone()))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "forbidden");

        let (status, body) = h
            .send(Method::PATCH, &uri, Some(&alice), Some(edit.clone()))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "edited");
        assert_eq!(body["content"], "world");

        let (status, _) = h
            .send(Method::PATCH, &uri, Some(&moderator), Some(edit))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = h.send(Method::DELETE, &uri, Some(&moderator), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = h.send(Method::DELETE, &uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = h.send(Method::GET, &uri, Some(&alice), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_disabled_account_token_rejected() {
        let h = harness();
        let alice = h.user("alice", Role::USER);
        let token = h.login("alice").await;

        h.store.set_active(alice.id, false).unwrap();
        let (status, body) = h
            .send(Method::GET, &format!("/v1/users/{}", alice.id), Some(&token), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "invalid_credential");
    }

    #[tokio::test]
    async fn test_rate_limit_applies_before_routing() {
        let mut config = Config::default();
        config.rate_limiter.requests_per_window = 2;
        config.rate_limiter.window_secs = 60;
        let h = harness_with(config);

        for _ in 0..2 {
            let (status, _) = h.send(Method::GET, "/v1/health", None, None).await;
            assert_eq!(status, StatusCode::OK);
        }

        let request = Request::builder()
            .uri("/v1/users/1")
            .body(Body::empty())
            .unwrap();
        let response = h.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = response.headers()[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((1..=60).contains(&retry_after));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = Config::default();
        config.rate_limiter.requests_per_window = 0;
        let dir = TempDir::new().unwrap();
        let result = GatewayBuilder::new()
            .with_config(config)
            .with_store(SledStore::open(dir.path()).unwrap())
            .build();
        assert!(matches!(result, Err(GatewayError::Config(_))));
    }
}
