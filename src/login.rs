use axum::{
    Form,
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Deserialize;
use std::sync::Arc;

use crate::app::{AppState, render_login};
use crate::session::{SessionHandle, SessionStore};

/// Name of the cookie carrying the session id
pub const SESSION_COOKIE: &str = "session";

/// Credential data posted by the login form
#[derive(Debug, Deserialize)]
pub struct UserCredentials {
    /// Username typed by the operator
    pub username: String,

    /// Password in plaintext (only transmitted, never stored)
    pub password: String,
}

/// Query string of the login page
#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    /// Message shown above the form, e.g. after a session expired
    pub error: Option<String>,
}

/// Resolve the live session referenced by the request's cookie
///
/// # Returns
/// * `Option<SessionHandle>` - The session if the cookie names a live one
pub fn current_session(state: &AppState, jar: &CookieJar) -> Option<SessionHandle> {
    jar.get(SESSION_COOKIE)
        .and_then(|cookie| state.sessions.get(cookie.value()))
}

fn session_cookie(value: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, value);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie
}

/// Forget expired sessions and purge the files they staged
///
/// # Returns
/// * `usize` - Number of sessions swept
pub async fn sweep_expired_sessions(state: &AppState) -> usize {
    let expired = state.sessions.sweep_expired();
    for id in &expired {
        let removed = state.workflow.staging().purge(id).await;
        log::info!("Session {} expired ({} staged files removed)", id, removed);
    }
    expired.len()
}

/// Serve the login page
///
/// Operators who already hold a live session are sent straight to the extractor page.
pub async fn serve_login_page(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<LoginQuery>,
) -> Response {
    if current_session(&state, &jar).is_some() {
        return Redirect::to("/").into_response();
    }

    render_login(&state, StatusCode::OK, query.error.as_deref())
}

/// Handle user login requests
///
/// Checks the posted credentials against the configured pair. On success a
/// new session is stored and its id set as a cookie; on failure the login
/// page is shown again with "Invalid username or password".
///
/// # Arguments
/// * `state` - Shared application state
/// * `jar` - Cookie jar for storing the session cookie
/// * `credentials` - Form data containing the username and password
///
/// # Returns
/// * `Response` - Redirect to the extractor page if successful, or the login page with an error
pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(credentials): Form<UserCredentials>,
) -> Response {
    if current_session(&state, &jar).is_some() {
        return Redirect::to("/").into_response();
    }

    sweep_expired_sessions(&state).await;

    let mut session = SessionStore::fresh();
    match state
        .workflow
        .login(&mut session, &credentials.username, &credentials.password)
    {
        Ok(()) => {
            let cookie = session_cookie(session.id.clone());
            state.sessions.insert(session);
            (jar.add(cookie), Redirect::to("/")).into_response()
        }
        Err(e) => render_login(&state, e.status_code(), Some(&e.to_string())),
    }
}

/// Handle user logout
///
/// Purges the session's staged files, forgets the session and clears the cookie.
pub async fn handle_logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Some(handle) = state.sessions.remove(cookie.value()) {
            let mut session = handle.lock().await;
            state.workflow.logout(&mut session).await;
        }
    }

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Redirect::to("/login")).into_response()
}

/// Authentication middleware
///
/// Lets the request through with its [`SessionHandle`] attached as an
/// extension, or redirects to the login page.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(handle) = current_session(&state, &jar) {
        request.extensions_mut().insert(handle);
        return next.run(request).await;
    }

    if jar.get(SESSION_COOKIE).is_some() {
        let message = "Your session has expired. Please log in again.";
        return Redirect::to(&format!("/login?error={}", urlencoding::encode(message)))
            .into_response();
    }

    Redirect::to("/login").into_response()
}
