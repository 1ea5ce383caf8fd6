//! Admin-only account management.

use crate::auth::UserKind;
use crate::mdoc::{AppState, Identity};
use crate::users::UserError;
use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::IntoResponse,
    Form,
};
use serde::Deserialize;
use tracing::{info, warn};
use utoipa::ToSchema;

const INTERNAL_ERROR: &str = "System internal error";

#[derive(ToSchema, Deserialize, Debug)]
pub struct UserForm {
    username: String,
    /// Stored as given; clients send `H(username:realm:password)`.
    passwd: String,
    #[serde(default)]
    nickname: String,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct PasswordForm {
    username: String,
    passwd: String,
}

fn require_admin(identity: Option<&Identity>) -> Result<&Identity, (StatusCode, &'static str)> {
    match identity {
        Some(identity) if identity.kind == UserKind::Admin => Ok(identity),
        _ => Err((StatusCode::FORBIDDEN, "Admin required")),
    }
}

#[utoipa::path(
    post,
    path= "/user/add",
    request_body(content = UserForm, content_type = "application/x-www-form-urlencoded"),
    responses (
        (status = 200, description = "User created", body = String),
        (status = 400, description = "Missing username or passwd", body = String),
        (status = 401, description = "Digest login required"),
        (status = 403, description = "Caller is not an admin or the user exists", body = String),
    ),
    tag = "user",
)]
pub async fn user_add(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
    Form(form): Form<UserForm>,
) -> impl IntoResponse {
    let admin = match require_admin(identity.as_deref()) {
        Ok(admin) => admin,
        Err(rejection) => return rejection,
    };
    if form.username.is_empty() || form.passwd.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing username or passwd");
    }

    match state
        .users()
        .add_user(&form.username, &form.passwd, &form.nickname, UserKind::Standard)
        .await
    {
        Ok(()) => {
            info!("{} added by {}", form.username, admin.username);
            (StatusCode::OK, "OK")
        }
        Err(UserError::AlreadyExists(_)) => (StatusCode::FORBIDDEN, "User already exist."),
        Err(err) => {
            warn!("Failed to add user: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
    }
}

#[utoipa::path(
    post,
    path= "/user/pwd/reset",
    request_body(content = PasswordForm, content_type = "application/x-www-form-urlencoded"),
    responses (
        (status = 200, description = "Password replaced", body = String),
        (status = 401, description = "Digest login required"),
        (status = 403, description = "Caller is not an admin", body = String),
        (status = 404, description = "No such user", body = String),
    ),
    tag = "user",
)]
pub async fn user_pwd_reset(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
    Form(form): Form<PasswordForm>,
) -> impl IntoResponse {
    let admin = match require_admin(identity.as_deref()) {
        Ok(admin) => admin,
        Err(rejection) => return rejection,
    };
    if form.passwd.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing username or passwd");
    }

    match state.users().reset_password(&form.username, &form.passwd).await {
        Ok(()) => {
            state.auth().invalidate_user(&form.username).await;
            info!("password of {} reset by {}", form.username, admin.username);
            (StatusCode::OK, "OK")
        }
        Err(UserError::NotFound(_)) => (StatusCode::NOT_FOUND, "User not found."),
        Err(err) => {
            warn!("Failed to reset password: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
    }
}
