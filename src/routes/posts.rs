use askama::Template;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use chrono::{NaiveDateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rusqlite::Connection;
use serde::Deserialize;

use crate::auth::session;
use crate::db::models::{Attachment, Post};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::routes::home::Html;
use crate::state::AppState;
use crate::store::posts::{self, NewPost};
use crate::store::{comments, StoreError};

// --- View structs ---

pub struct PostView {
    pub id: i64,
    pub author: String,
    pub title: String,
    pub content: String,
    pub date: String,
    pub likes: i64,
    pub liked: bool,
    pub has_file: bool,
    pub is_image: bool,
    pub file_name: String,
    pub can_edit: bool,
    pub comments: Vec<CommentView>,
}

pub struct CommentView {
    pub author: String,
    pub comment: String,
    pub date: String,
}

// --- Templates ---

#[derive(Template)]
#[template(path = "pages/board.html")]
pub struct BoardTemplate {
    pub username: String,
    pub query: String,
    pub posts: Vec<PostView>,
}

#[derive(Template)]
#[template(path = "pages/compose.html")]
pub struct ComposeTemplate {
    pub username: String,
    pub title: String,
    pub content: String,
    pub accept: String,
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/edit.html")]
pub struct EditTemplate {
    pub username: String,
    pub post_id: i64,
    pub title: String,
    pub content: String,
    pub error: Option<String>,
}

// --- Forms ---

#[derive(Deserialize, Default)]
pub struct BoardQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Deserialize)]
pub struct EditForm {
    pub title: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Deserialize)]
pub struct CommentForm {
    pub comment: String,
}

/// Fields of the multipart composer form.
#[derive(Default)]
struct ComposeForm {
    title: String,
    content: String,
    attachment: Option<Attachment>,
}

impl ComposeForm {
    async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = ComposeForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "title" => form.title = field.text().await?,
                "content" => form.content = field.text().await?,
                "file" => {
                    let file_name = base_name(field.file_name().unwrap_or_default()).to_string();
                    let data = field.bytes().await?;
                    // Browsers submit an unnamed part when no file is chosen
                    if !file_name.is_empty() {
                        form.attachment = Some(Attachment {
                            file_name,
                            data: data.to_vec(),
                        });
                    }
                }
                _ => {}
            }
        }

        Ok(form)
    }
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(board_page).post(create_post))
        .route("/posts/new", get(compose_page))
        .route("/posts/edit", post(save_edit))
        .route("/posts/edit/cancel", post(cancel_edit))
        .route("/posts/{id}/edit", post(start_edit))
        .route("/posts/{id}/delete", post(delete_post))
        .route("/posts/{id}/like", post(toggle_like))
        .route("/posts/{id}/comments", post(add_comment))
        .route("/posts/{id}/file", get(attachment_inline))
        .route("/posts/{id}/file/download", get(attachment_download))
}

fn back_to_board(post_id: i64) -> Response {
    Redirect::to(&format!("/posts#post-{post_id}")).into_response()
}

// --- Handlers ---

/// GET /posts: the board, or the editor while the session is editing a post
async fn board_page(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Query(query): Query<BoardQuery>,
) -> AppResult<Response> {
    let Some(user) = user else {
        return Ok(Redirect::to("/login").into_response());
    };

    let conn = state.db.get()?;

    if let Some(post_id) = user.session.edit_post_id {
        let post = posts::get(&conn, post_id)?;
        return Ok(Html(EditTemplate {
            username: user.username,
            post_id,
            title: post.title,
            content: post.content,
            error: None,
        })
        .into_response());
    }

    let found = posts::search(posts::list(&conn)?, &query.q);
    let views = found
        .into_iter()
        .map(|post| post_view(&conn, post, &user.username))
        .collect::<AppResult<Vec<_>>>()?;

    Ok(Html(BoardTemplate {
        username: user.username,
        query: query.q,
        posts: views,
    })
    .into_response())
}

/// GET /posts/new
async fn compose_page(State(state): State<AppState>, MaybeUser(user): MaybeUser) -> Response {
    match user {
        Some(user) => Html(ComposeTemplate {
            username: user.username,
            title: String::new(),
            content: String::new(),
            accept: state.config.uploads.accept_attr(),
            error: None,
        })
        .into_response(),
        None => Redirect::to("/login").into_response(),
    }
}

/// POST /posts: multipart: title, content, optional file
async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<Response> {
    let ComposeForm {
        title,
        content,
        attachment,
    } = ComposeForm::read(multipart).await?;

    let compose_error = |title: String, content: String, msg: String| {
        (
            StatusCode::BAD_REQUEST,
            Html(ComposeTemplate {
                username: user.username.clone(),
                title,
                content,
                accept: state.config.uploads.accept_attr(),
                error: Some(msg),
            }),
        )
            .into_response()
    };

    if let Some(file) = &attachment {
        if !state.config.uploads.accepts(&file.file_name) {
            let msg = format!(
                "Only {} files can be attached",
                state.config.uploads.allowed_extensions.join(", ")
            );
            return Ok(compose_error(title, content, msg));
        }
    }

    let conn = state.db.get()?;
    let created = posts::create(
        &conn,
        NewPost {
            author: &user.username,
            title: &title,
            content: &content,
            attachment,
        },
    );

    match created {
        Ok(id) => {
            tracing::info!(post_id = id, author = %user.username, "Post created");
            Ok(back_to_board(id))
        }
        Err(StoreError::Invalid(msg)) => Ok(compose_error(title, content, msg)),
        Err(e) => Err(e.into()),
    }
}

/// POST /posts/{id}/edit: enter edit mode for one of your own posts
async fn start_edit(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    posts::authorize(&conn, id, &user.username)?;
    session::begin_edit(&conn, &user.session.token, id)?;
    Ok(Redirect::to("/posts").into_response())
}

/// POST /posts/edit: save the post the session is editing
async fn save_edit(
    State(state): State<AppState>,
    user: CurrentUser,
    Form(form): Form<EditForm>,
) -> AppResult<Response> {
    let post_id = user
        .session
        .edit_post_id
        .ok_or_else(|| AppError::BadRequest("No post is being edited".into()))?;

    let conn = state.db.get()?;
    match posts::update(&conn, post_id, &user.username, &form.title, &form.content) {
        Ok(()) => {}
        Err(StoreError::Invalid(msg)) => {
            return Ok((
                StatusCode::BAD_REQUEST,
                Html(EditTemplate {
                    username: user.username,
                    post_id,
                    title: form.title,
                    content: form.content,
                    error: Some(msg),
                }),
            )
                .into_response());
        }
        Err(e) => return Err(e.into()),
    }

    session::end_edit(&conn, &user.session.token)?;
    tracing::info!(post_id, editor = %user.username, "Post updated");
    Ok(back_to_board(post_id))
}

/// POST /posts/edit/cancel
async fn cancel_edit(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    session::end_edit(&conn, &user.session.token)?;
    Ok(Redirect::to("/posts").into_response())
}

/// POST /posts/{id}/delete
async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let mut conn = state.db.get()?;
    posts::delete(&mut conn, id, &user.username)?;
    tracing::info!(post_id = id, author = %user.username, "Post deleted");
    Ok(Redirect::to("/posts").into_response())
}

/// POST /posts/{id}/like
async fn toggle_like(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let mut conn = state.db.get()?;
    let like = posts::toggle_like(&mut conn, id, &user.username)?;
    tracing::debug!(post_id = id, liked = like.liked, likes = like.likes, "Like toggled");
    Ok(back_to_board(id))
}

/// POST /posts/{id}/comments
async fn add_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Form(form): Form<CommentForm>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    comments::add(&conn, id, &user.username, &form.comment)?;
    Ok(back_to_board(id))
}

/// GET /posts/{id}/file: images render inline, anything else downloads
async fn attachment_inline(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    serve_attachment(&state, id, false)
}

/// GET /posts/{id}/file/download
async fn attachment_download(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    serve_attachment(&state, id, true)
}

fn serve_attachment(state: &AppState, id: i64, download: bool) -> AppResult<Response> {
    let conn = state.db.get()?;
    let file = posts::attachment(&conn, id)?.ok_or(AppError::NotFound)?;

    let mime = mime_guess::from_path(&file.file_name).first_or_octet_stream();
    let disposition = if download || !is_image(&file.file_name) {
        "attachment"
    } else {
        "inline"
    };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime.as_ref().to_string()),
            (
                header::CONTENT_DISPOSITION,
                content_disposition(disposition, &file.file_name),
            ),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
        ],
        file.data,
    )
        .into_response())
}

// --- View helpers ---

fn post_view(conn: &Connection, post: Post, viewer: &str) -> AppResult<PostView> {
    let liked = posts::liked_by(conn, post.id, viewer)?;
    let comments = comments::list(conn, post.id)?
        .into_iter()
        .map(|c| CommentView {
            author: c.author,
            comment: c.comment,
            date: parse_and_format_time(&c.date),
        })
        .collect();

    let has_file = post.has_attachment();
    let file_name = post.file_name.unwrap_or_default();

    Ok(PostView {
        id: post.id,
        can_edit: post.author == viewer,
        author: post.author,
        title: post.title,
        content: post.content,
        date: parse_and_format_time(&post.date),
        likes: post.likes,
        liked,
        has_file,
        is_image: has_file && is_image(&file_name),
        file_name,
        comments,
    })
}

fn is_image(file_name: &str) -> bool {
    mime_guess::from_path(file_name)
        .first()
        .map(|m| m.type_() == mime_guess::mime::IMAGE)
        .unwrap_or(false)
}

/// Strip any directory part some browsers send with the file name.
fn base_name(file_name: &str) -> &str {
    file_name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(file_name)
}

/// Bytes left unescaped in an RFC 5987 `filename*` value.
const RFC5987_ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// `Content-Disposition` value with an ASCII fallback name and the RFC 5987
/// UTF-8 form for everything else.
fn content_disposition(kind: &str, file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let encoded = utf8_percent_encode(file_name, RFC5987_ATTR_CHAR);
    format!("{kind}; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

// --- Time formatting ---

fn parse_and_format_time(db_time: &str) -> String {
    NaiveDateTime::parse_from_str(db_time, "%Y-%m-%d %H:%M:%S")
        .map(|dt| format_relative_time(&dt))
        .unwrap_or_else(|_| db_time.to_string())
}

pub fn format_relative_time(dt: &NaiveDateTime) -> String {
    let now = Utc::now().naive_utc();
    let diff = now.signed_duration_since(*dt);

    if diff.num_seconds() < 60 {
        return "just now".to_string();
    }

    let minutes = diff.num_minutes();
    if minutes < 60 {
        return format!("{}m ago", minutes);
    }

    let hours = diff.num_hours();
    if hours < 24 {
        return format!("{}h ago", hours);
    }

    let days = diff.num_days();
    if days < 7 {
        return format!("{}d ago", days);
    }

    dt.format("%Y-%m-%d %H:%M").to_string()
}

// --- Tests ---
