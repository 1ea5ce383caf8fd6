#![allow(clippy::needless_for_each)]

#[allow(unused_imports)]
use crate::mdoc::handlers::{
    health::{__path_check, __path_health},
    user::{__path_user_add, __path_user_pwd_reset},
};
use crate::{
    auth::{
        session::login_cookie, source_addresses, AuthDecision, AuthError, AuthOutcome,
        AuthRequest, CachedLookup, DigestAuthenticator, IgnoreAuth, UserKind,
    },
    cache::Sweeper,
    users::UserStore,
};
use anyhow::Result;
use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, request_id::PropagateRequestIdLayer, services::ServeDir,
    set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{debug_span, error, info, Span};
use ulid::Ulid;
use utoipa::OpenApi;

pub mod handlers;

const FAVICON: &str = "/favicon.ico";

#[derive(OpenApi)]
#[openapi(
    paths(check, health, user_add, user_pwd_reset),
    components(
        schemas(handlers::health::Health, handlers::user::UserForm, handlers::user::PasswordForm)
    ),
    tags(
        (name = "mdoc", description = "Document server with HTTP digest authentication"),
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

pub type Authenticator = DigestAuthenticator<CachedLookup<UserStore>>;

/// Who passed the digest check, available to handlers as an extension.
#[derive(Clone, Debug)]
pub struct Identity {
    pub username: String,
    pub kind: UserKind,
}

#[derive(Clone)]
pub struct AppState {
    auth: Arc<Authenticator>,
    ignore: Arc<IgnoreAuth>,
    auth_enabled: bool,
    dump: bool,
}

impl AppState {
    /// Authentication on, empty allow-list, no request dumps.
    #[must_use]
    pub fn new(auth: Authenticator) -> Self {
        Self {
            auth: Arc::new(auth),
            ignore: Arc::new(IgnoreAuth::default()),
            auth_enabled: true,
            dump: false,
        }
    }

    #[must_use]
    pub fn with_ignore(mut self, ignore: IgnoreAuth) -> Self {
        self.ignore = Arc::new(ignore);
        self
    }

    #[must_use]
    pub fn with_auth_enabled(mut self, enabled: bool) -> Self {
        self.auth_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_dump(mut self, dump: bool) -> Self {
        self.dump = dump;
        self
    }

    #[must_use]
    pub fn auth(&self) -> &Authenticator {
        &self.auth
    }

    #[must_use]
    pub fn users(&self) -> &UserStore {
        self.auth.lookup().inner()
    }
}

/// Build the application router; static files come from `public_dir`.
/// Responses are gzip-compressed when the client accepts it.
pub fn router(state: AppState, public_dir: &Path) -> Router {
    Router::new()
        .route("/user/add", post(handlers::user_add))
        .route("/user/pwd/reset", post(handlers::user_pwd_reset))
        .fallback_service(ServeDir::new(public_dir))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .route("/check", get(handlers::check))
        .route("/health", get(handlers::health).options(handlers::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}

/// Serve `app` on `listen` until ctrl-c, then stop the cache sweeper.
///
/// # Errors
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn new(listen: &str, app: Router, sweeper: Sweeper) -> Result<()> {
    let listener = TcpListener::bind(listen).await?;

    info!("Listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", err);
        }
        info!("Gracefully shutdown");
    })
    .await?;

    sweeper.shutdown().await;

    Ok(())
}

async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    if state.dump {
        info!(
            "{} {} {:?} {:?}",
            request.method(),
            request.uri(),
            request.version(),
            request.headers()
        );
    }

    let path = request.uri().path();
    if !state.auth_enabled || path == FAVICON || state.ignore.is_ignored(path) {
        return next.run(request).await;
    }

    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let target = request
        .uri()
        .path_and_query()
        .map_or_else(|| path.to_string(), ToString::to_string);

    let mut auth_request = AuthRequest::new(request.method().as_str(), target)
        .with_addresses(source_addresses(remote, request.headers()));
    if let Some(value) = header_str(&request, header::AUTHORIZATION) {
        auth_request = auth_request.with_authorization(value);
    }
    if let Some(value) = header_str(&request, header::COOKIE) {
        auth_request = auth_request.with_cookie(value);
    }

    let decision = match state.auth.check_auth(&auth_request).await {
        Ok(decision) => decision,
        Err(err) => return internal_error(&err),
    };

    match decision.outcome {
        AuthOutcome::Ok => {
            if let (Some(username), Some(kind)) = (decision.username.clone(), decision.kind) {
                request.extensions_mut().insert(Identity { username, kind });
            }
            let mut response = next.run(request).await;
            decorate(&mut response, &decision, &state);
            response
        }
        AuthOutcome::NeedLogin | AuthOutcome::BadPassword => challenge(&decision),
        AuthOutcome::TooManyFailures(count) => (
            StatusCode::FORBIDDEN,
            format!("Too many login failures: {count}"),
        )
            .into_response(),
    }
}

fn header_str(request: &Request, name: HeaderName) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn challenge(decision: &AuthDecision) -> Response {
    let mut response = StatusCode::UNAUTHORIZED.into_response();
    if let Some(value) = decision
        .challenge
        .as_ref()
        .and_then(|challenge| HeaderValue::from_str(&challenge.to_string()).ok())
    {
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, value);
    }
    response
}

fn decorate(response: &mut Response, decision: &AuthDecision, state: &AppState) {
    if let Some(value) = decision
        .auth_info
        .as_deref()
        .and_then(|info| HeaderValue::from_str(info).ok())
    {
        response
            .headers_mut()
            .insert(HeaderName::from_static("authentication-info"), value);
    }

    if let (Some(username), Some(token)) = (&decision.username, &decision.session_token) {
        let cookie = login_cookie(username, token, state.auth.config().session_ttl());
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
}

fn internal_error(err: &AuthError) -> Response {
    error!("authentication failed: {}", err);
    (StatusCode::INTERNAL_SERVER_ERROR, "System internal error").into_response()
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    let path = request.uri().path();
    let request_id = headers
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", path, request_id)
}
