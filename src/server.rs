use askama_axum::Template;
use axum::{
    extract::{multipart::MultipartError, Form, FromRequest, Multipart, Query, Request, State},
    http::header,
    response::{IntoResponse, Json, Redirect, Response},
    routing::get,
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::auth::SessionId;
use crate::probe;
use crate::web::{
    self, ActionOutcome, ActionResponse, AppState, DeviceAction, PageQuery, PostForm,
    StatusResponse,
};

pub const SESSION_COOKIE: &str = "wakedeck_session";

pub async fn start(state: AppState, port: u16) -> anyhow::Result<()> {
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(show_page).post(handle_post))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    error: Option<String>,
    site_key: String,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    device_name: String,
    online: bool,
    remote_viewer_url: Option<String>,
}

fn session_id(jar: &CookieJar) -> Option<SessionId> {
    jar.get(SESSION_COOKIE)
        .map(|cookie| SessionId::from(cookie.value()))
}

fn session_cookie(id: &SessionId) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id.as_str().to_owned()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

fn login_page(state: &AppState, error: Option<String>) -> LoginTemplate {
    LoginTemplate {
        error,
        site_key: state.captcha_site_key.to_string(),
    }
}

async fn show_page(
    State(state): State<AppState>,
    jar: CookieJar,
    query: Option<Query<PageQuery>>,
) -> Response {
    let session = session_id(&jar);
    // Malformed query strings fall through to the plain page.
    let query = query.map(|Query(q)| q).unwrap_or_default();

    if query.logout.is_some() {
        state.auth.logout(session.as_ref()).await;
        let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
        return (jar, Redirect::to("/")).into_response();
    }

    match query.action.as_deref() {
        Some("rdp") => return rdp_download(&state),
        Some("status") => return device_status(&state).await.into_response(),
        _ => {}
    }

    if !state.auth.is_authenticated(session.as_ref()).await {
        return login_page(&state, None).into_response();
    }

    let net = &state.network;
    let online = probe::probe(
        &net.tcping_address,
        net.tcping_port,
        state.server.page_probe_timeout(),
    )
    .await;

    DashboardTemplate {
        device_name: net.device_name.clone(),
        online,
        remote_viewer_url: net.remote_viewer_url().map(str::to_string),
    }
    .into_response()
}

async fn handle_post(
    State(state): State<AppState>,
    jar: CookieJar,
    request: Request,
) -> Response {
    let session = session_id(&jar);
    let form = read_post_form(&state, request).await;

    if form.login.is_some() {
        return match state
            .auth
            .login(
                session.as_ref(),
                &form.username,
                &form.password,
                &form.captcha_token,
            )
            .await
        {
            Ok(id) => (jar.add(session_cookie(&id)), Redirect::to("/")).into_response(),
            Err(e) => login_page(&state, Some(e.to_string())).into_response(),
        };
    }

    let outcome = if !state.auth.is_authenticated(session.as_ref()).await {
        debug!("rejected unauthenticated action '{}'", form.action);
        ActionOutcome::AuthenticationRequired
    } else {
        match DeviceAction::parse(&form.action) {
            Some(action) => state.perform(action).await,
            None => ActionOutcome::InvalidAction,
        }
    };

    Json(ActionResponse::from(outcome)).into_response()
}

/// Decodes the POST body as urlencoded or multipart form data. Anything that
/// cannot be decoded yields an empty form, so the caller still answers with a
/// JSON result.
async fn read_post_form(state: &AppState, request: Request) -> PostForm {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    if is_multipart {
        let parsed = match Multipart::from_request(request, state).await {
            Ok(multipart) => multipart_form(multipart).await,
            Err(e) => {
                debug!("rejected multipart body: {}", e);
                return PostForm::default();
            }
        };
        return parsed.unwrap_or_else(|e| {
            debug!("malformed multipart body: {}", e);
            PostForm::default()
        });
    }

    match Form::<PostForm>::from_request(request, state).await {
        Ok(Form(form)) => form,
        Err(e) => {
            debug!("rejected form body: {}", e);
            PostForm::default()
        }
    }
}

async fn multipart_form(mut multipart: Multipart) -> Result<PostForm, MultipartError> {
    let mut form = PostForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        let value = field.text().await?;
        match name.as_str() {
            "login" => form.login = Some(value),
            "username" => form.username = value,
            "password" => form.password = value,
            "g-recaptcha-response" => form.captcha_token = value,
            "action" => form.action = value,
            _ => {}
        }
    }
    Ok(form)
}

async fn device_status(state: &AppState) -> Json<StatusResponse> {
    let net = &state.network;
    let status = probe::probe(
        &net.tcping_address,
        net.tcping_port,
        state.server.status_probe_timeout(),
    )
    .await;
    Json(StatusResponse { status })
}

fn rdp_download(state: &AppState) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/x-rdp"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"remote.rdp\"",
            ),
        ],
        web::rdp_descriptor(&state.network.rdp_target()),
    )
        .into_response()
}
