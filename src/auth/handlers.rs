use askama::Template;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Redirect, Response};
use axum::Form;
use serde::Deserialize;

use crate::auth::{accounts, session};
use crate::config::AuthConfig;
use crate::error::AppResult;
use crate::extractors::MaybeUser;
use crate::routes::home::Html;
use crate::state::AppState;
use crate::store::StoreError;

// -- Templates --

#[derive(Template)]
#[template(path = "pages/login.html")]
pub struct LoginTemplate {
    pub username: String,
    pub error: Option<String>,
    pub notice: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/signup.html")]
pub struct SignupTemplate {
    pub username: String,
    pub error: Option<String>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CredentialsForm {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, Default)]
pub struct LoginQuery {
    pub registered: Option<String>,
}

// -- Cookie helpers --

fn session_cookie(auth: &AuthConfig, token: &str) -> String {
    let max_age_secs = auth.session_hours * 3600;
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        auth.cookie_name, token, max_age_secs
    )
}

fn clear_session_cookie(auth: &AuthConfig) -> String {
    format!(
        "{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0",
        auth.cookie_name
    )
}

// -- Signup --

/// GET /signup
pub async fn signup_page(MaybeUser(user): MaybeUser) -> Response {
    if user.is_some() {
        return Redirect::to("/posts").into_response();
    }
    Html(SignupTemplate {
        username: String::new(),
        error: None,
    })
    .into_response()
}

/// POST /signup: create the account, then send the user to log in
pub async fn signup(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let result = accounts::register(
        &conn,
        &form.username,
        &form.password,
        state.config.auth.bcrypt_cost,
    );

    let (status, error) = match result {
        Ok(()) => {
            tracing::info!(username = %form.username.trim(), "Account created");
            return Ok(Redirect::to("/login?registered=1").into_response());
        }
        Err(StoreError::Conflict(_)) => (StatusCode::CONFLICT, "Username already exists".to_string()),
        Err(StoreError::Invalid(msg)) => (StatusCode::BAD_REQUEST, msg),
        Err(e) => return Err(e.into()),
    };

    Ok((
        status,
        Html(SignupTemplate {
            username: form.username,
            error: Some(error),
        }),
    )
        .into_response())
}

// -- Login / logout --

/// GET /login
pub async fn login_page(
    MaybeUser(user): MaybeUser,
    Query(query): Query<LoginQuery>,
) -> Response {
    if user.is_some() {
        return Redirect::to("/posts").into_response();
    }
    let notice = query
        .registered
        .map(|_| "Account created. You can log in now.".to_string());
    Html(LoginTemplate {
        username: String::new(),
        error: None,
        notice,
    })
    .into_response()
}

/// POST /login: verify credentials and start a session
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>,
) -> AppResult<Response> {
    let conn = state.db.get()?;

    match accounts::verify_credentials(&conn, &form.username, &form.password)? {
        Some(username) => {
            let token =
                session::create_session(&conn, &username, state.config.auth.session_hours)?;
            tracing::info!(%username, "User logged in");

            Ok((
                AppendHeaders([(header::SET_COOKIE, session_cookie(&state.config.auth, &token))]),
                Redirect::to("/posts"),
            )
                .into_response())
        }
        None => {
            tracing::warn!(username = %form.username.trim(), "Failed login attempt");
            Ok((
                StatusCode::UNAUTHORIZED,
                Html(LoginTemplate {
                    username: form.username,
                    error: Some("Invalid username or password".into()),
                    notice: None,
                }),
            )
                .into_response())
        }
    }
}

/// POST /logout
pub async fn logout(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
) -> AppResult<Response> {
    if let Some(user) = user {
        let conn = state.db.get()?;
        session::delete_session(&conn, &user.session.token)?;
        tracing::info!(username = %user.username, "User logged out");
    }

    Ok((
        AppendHeaders([(header::SET_COOKIE, clear_session_cookie(&state.config.auth))]),
        Redirect::to("/login"),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_uses_configured_name_and_lifetime() {
        let auth = AuthConfig {
            cookie_name: "board".into(),
            session_hours: 2,
            bcrypt_cost: 4,
        };
        assert_eq!(
            session_cookie(&auth, "tok"),
            "board=tok; HttpOnly; SameSite=Strict; Path=/; Max-Age=7200"
        );
        assert!(clear_session_cookie(&auth).starts_with("board=;"));
        assert!(clear_session_cookie(&auth).ends_with("Max-Age=0"));
    }

    #[test]
    fn login_page_escapes_prefilled_username() {
        let page = LoginTemplate {
            username: "<script>".into(),
            error: Some("Invalid username or password".into()),
            notice: None,
        }
        .render()
        .unwrap();
        assert!(page.contains("&lt;script&gt;"));
        assert!(page.contains("Invalid username or password"));
    }
}
