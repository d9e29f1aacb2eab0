use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::SecondsFormat;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{parse_role, validate_email, validate_name, validate_password, validate_plan};
use crate::auth::{hash_password, verify_password, verify_unknown_account, AuthError};
use crate::config::AuthConfig;
use crate::db::{
    ActiveSession, AuthResponse, LoginRequest, NewUser, RegisterRequest, RegisterResponse,
    ResendVerificationRequest, SubscriptionRequest, User, UserEnvelope, UserResponse,
    VerifyEmailRequest,
};
use crate::store::StoreError;
use crate::AppState;

/// Authenticated caller, placed in request extensions by [`session_middleware`]
#[derive(Debug, Clone)]
pub struct CurrentSession {
    pub session: ActiveSession,
    pub user: User,
}

/// Session cookie carrying `token`, living as long as the idle window
fn session_cookie(config: &AuthConfig, token: String) -> Cookie<'static> {
    Cookie::build((config.session_cookie_name.clone(), token))
        .path("/")
        .http_only(true)
        .secure(false)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(
            i64::try_from(config.inactivity_window_secs).unwrap_or(i64::MAX),
        ))
        .build()
}

fn cleared_cookie(config: &AuthConfig) -> Cookie<'static> {
    Cookie::build((config.session_cookie_name.clone(), ""))
        .path("/")
        .http_only(true)
        .secure(false)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::ZERO)
        .build()
}

/// Extract the session token from request headers. A bearer token wins over
/// the session cookie.
pub fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        if let Some(scheme) = value.get(..7) {
            if scheme.eq_ignore_ascii_case("bearer ") {
                let token = value[7..].trim();
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }

    CookieJar::from_headers(headers)
        .get(cookie_name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// Best-effort client address: proxy headers first, then the peer address
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("X-Forwarded-For")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip;
    }

    if let Some(ip) = headers
        .get("X-Real-IP")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string()).unwrap_or_default()
}

fn auth_response(user: &User, active: &ActiveSession) -> AuthResponse {
    AuthResponse {
        user: UserResponse::from(user),
        session_expires_at: active
            .session
            .expires_at
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        session_token: active.token.clone(),
    }
}

/// Attach a freshly issued code to an error, when codes are exposed
fn with_verification_code(state: &AppState, err: ApiError, code: Option<String>) -> ApiError {
    match code {
        Some(code) if state.config.auth.expose_verification_code => err
            .with_detail("verificationCode", code)
            .with_detail("verificationValid", state.verification.ttl_minutes()),
        _ => err,
    }
}

/// Resolve the session of every protected request and keep its cookie fresh
pub async fn session_middleware(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_config = &state.config.auth;
    let token = extract_session_token(request.headers(), &auth_config.session_cookie_name);

    let result = match token {
        Some(token) => state.sessions.authenticate(&token).await,
        None => Err(AuthError::Unauthenticated),
    };

    match result {
        Ok((session, user)) => {
            let cookie = session_cookie(auth_config, session.token.clone());
            request
                .extensions_mut()
                .insert(CurrentSession { session, user });
            let response = next.run(request).await;
            (jar.add(cookie), response).into_response()
        }
        Err(err @ (AuthError::Unauthenticated | AuthError::SessionExpired)) => {
            (jar.add(cleared_cookie(auth_config)), ApiError::from(err)).into_response()
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}

/// Register a new account and issue its first verification code
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let email = request.email.trim().to_lowercase();
    let plan = request
        .plan
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or("starter")
        .to_string();

    let mut errors = ValidationErrorBuilder::new();
    errors.check("companyName", validate_name(&request.company_name, "Company name"));
    errors.check("email", validate_email(&email));
    errors.check(
        "password",
        validate_password(&request.password, state.config.auth.min_password_length),
    );
    errors.check("plan", validate_plan(&plan));
    let role = match parse_role(request.role.as_deref()) {
        Ok(role) => Some(role),
        Err(message) => {
            errors.add("role", message);
            None
        }
    };
    errors.finish()?;
    let role = role.unwrap_or_default();

    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(ApiError::conflict("Account already exists"));
    }

    let password_hash = hash_password(&request.password)?;
    let user = state
        .store
        .create_user(
            NewUser {
                company_name: request.company_name.trim().to_string(),
                email,
                password_hash,
                subscription: plan,
                role,
            },
            state.clock.now(),
        )
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => ApiError::conflict("Account already exists"),
            other => ApiError::from(other),
        })?;

    let code = state.verification.issue_code(&user.id).await?;
    tracing::info!(user_id = %user.id, role = %user.role, "Registered account");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: UserResponse::from(&user),
            verification_code: state.config.auth.expose_verification_code.then_some(code),
        }),
    ))
}

/// Best-effort reissue while another error is being reported
async fn reissue_code(state: &AppState, user_id: &str) -> Option<String> {
    match state.verification.issue_code(user_id).await {
        Ok(code) => Some(code),
        Err(e) => {
            tracing::warn!(user_id = %user_id, "Failed to reissue verification code: {}", e);
            None
        }
    }
}

/// Login endpoint
pub async fn login(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    let email = request.email.trim().to_lowercase();
    let user = match state.store.find_user_by_email(&email).await? {
        Some(user) if verify_password(&user.password_hash, &request.password) => user,
        Some(_) => return Err(ApiError::unauthorized("Incorrect email or password")),
        None => {
            verify_unknown_account(&request.password);
            return Err(ApiError::unauthorized("Incorrect email or password"));
        }
    };

    if !user.verified {
        let code = reissue_code(&state, &user.id).await;
        return Err(with_verification_code(
            &state,
            ApiError::forbidden("Email not verified"),
            code,
        ));
    }

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();
    let ip = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    let active = state.sessions.create_session(&user, user_agent, &ip).await?;

    let cookie = session_cookie(&state.config.auth, active.token.clone());
    Ok((jar.add(cookie), Json(auth_response(&user, &active))))
}

/// Redeem a verification code
pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerifyEmailRequest>,
) -> Result<Json<UserEnvelope>, ApiError> {
    let email = request.email.trim().to_lowercase();
    let code = request.code.trim();
    if code.is_empty() {
        return Err(ApiError::validation_field("code", "Verification code is required"));
    }

    let user = state
        .store
        .find_user_by_email(&email)
        .await?
        .ok_or_else(|| ApiError::not_found("Account not found"))?;

    match state.verification.redeem(&user, code).await {
        Ok(user) => Ok(Json(UserEnvelope {
            user: UserResponse::from(&user),
        })),
        Err(AuthError::CodeExpired) => {
            let fresh = reissue_code(&state, &user.id).await;
            Err(with_verification_code(
                &state,
                ApiError::from(AuthError::CodeExpired),
                fresh,
            ))
        }
        Err(e) => Err(e.into()),
    }
}

/// Issue a new code, unless the account is already verified
pub async fn resend_verification(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResendVerificationRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let email = request.email.trim().to_lowercase();
    let user = state
        .store
        .find_user_by_email(&email)
        .await?
        .ok_or_else(|| ApiError::not_found("Account not found"))?;

    if user.verified {
        return Ok(Json(RegisterResponse {
            user: UserResponse::from(&user),
            verification_code: None,
        }));
    }

    let code = state.verification.issue_code(&user.id).await?;
    Ok(Json(RegisterResponse {
        user: UserResponse::from(&user),
        verification_code: state.config.auth.expose_verification_code.then_some(code),
    }))
}

/// Destroy the presented session, if any, and clear the cookie
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, Json<serde_json::Value>), ApiError> {
    let auth_config = &state.config.auth;
    if let Some(token) = extract_session_token(&headers, &auth_config.session_cookie_name) {
        state.sessions.destroy(&token).await?;
    }

    Ok((
        jar.add(cleared_cookie(auth_config)),
        Json(json!({ "status": "logged out" })),
    ))
}

/// Current user and session expiry
pub async fn me(Extension(current): Extension<CurrentSession>) -> Json<AuthResponse> {
    Json(auth_response(&current.user, &current.session))
}

pub async fn update_subscription(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
    Json(request): Json<SubscriptionRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let plan = request.plan.trim();
    validate_plan(plan).map_err(|e| ApiError::validation_field("plan", e))?;

    let now = state.clock.now();
    state
        .store
        .update_subscription(&current.user.id, plan, now)
        .await?;

    let mut user = current.user;
    user.subscription = plan.to_string();
    user.updated_at = now;
    tracing::info!(user_id = %user.id, plan = %plan, "Subscription updated");

    Ok(Json(auth_response(&user, &current.session)))
}
