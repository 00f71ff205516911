//! The catalog page: server-rendered markup plus the form endpoints that
//! carry user input back into the selection controller and the chat.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::{
    extract::{Form, Query, State},
    response::{Html, Redirect},
    routing::{get, post},
    Router,
};
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogStore, ProductId};
use crate::chat::{ChatMessage, Transcript};
use crate::render::{self, ViewState, ALL_CATEGORIES};
use crate::routine::{self, RoutineClient, SYSTEM_PROMPT};
use crate::selection::{Effect, Input, Key, SelectionController};

const LOADING_ROUTINE: &str = "Generating routine…";
const LOADING_REPLY: &str = "Thinking…";
const BUSY: &str = "Still working on the previous request. Please wait for it to finish.";

/// Everything one page session owns. Lives until the process exits.
#[derive(Debug, Default)]
pub struct Session {
    catalog: CatalogStore,
    load_error: Option<String>,
    controller: SelectionController,
    transcript: Transcript,
    /// What the model has seen so far, for follow-up questions
    history: Vec<ChatMessage>,
    in_flight: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the catalog, keeping a failure as the page's empty-state message.
    pub async fn load_catalog(&mut self, source: &str) {
        match self.catalog.load(source).await {
            Ok(_) => self.load_error = None,
            Err(e) => {
                warn!("catalog load failed: {e}");
                self.load_error = Some(e.to_string());
            }
        }
    }

    fn render(&self, category: &str) -> String {
        let category = if category.is_empty() { ALL_CATEGORIES } else { category };
        let view = ViewState {
            selection: self.controller.selection(),
            expanded: self.controller.expanded(),
            category,
            in_flight: self.in_flight,
        };
        render::page(
            &self.catalog,
            self.load_error.as_deref(),
            self.transcript.entries(),
            &view,
        )
    }
}

/// Shared by every request the page server handles, whichever browser sent it.
#[derive(Clone)]
pub struct PageState {
    session: Arc<Mutex<Session>>,
    client: Arc<RoutineClient>,
}

impl PageState {
    pub fn new(session: Session, client: RoutineClient) -> Self {
        PageState {
            session: Arc::new(Mutex::new(session)),
            client: Arc::new(client),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks a model call as running. Dropping it, finished or not, clears the
/// loading placeholder and the in-flight flag.
struct InFlight {
    session: Arc<Mutex<Session>>,
    token: u64,
}

impl InFlight {
    fn begin(state: &PageState, session: &mut Session, loading_text: &str) -> Self {
        session.in_flight = true;
        let token = session.transcript.begin_loading(loading_text);
        InFlight {
            session: state.session.clone(),
            token,
        }
    }

    /// Swap the placeholder for the reply; the flag clears on drop.
    fn finish(self, reply: ChatMessage) {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        session.transcript.end_loading(self.token);
        session.transcript.push(reply);
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        session.transcript.end_loading(self.token);
        session.in_flight = false;
    }
}

pub async fn run(listen: &str, state: PageState) -> anyhow::Result<()> {
    let app = build_router(state);
    let addr: SocketAddr = listen.parse()?;
    info!("catalog page on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}

pub fn build_router(state: PageState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/events", post(event))
        .route("/generate", post(generate_handler))
        .route("/chat", post(chat_handler))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct PageQuery {
    #[serde(default)]
    category: String,
}

#[derive(Debug, Deserialize)]
struct EventForm {
    kind: String,
    id: ProductId,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    nested: bool,
    #[serde(default)]
    category: String,
}

impl EventForm {
    fn input(&self) -> Option<Input> {
        let id = self.id;
        match self.kind.as_str() {
            "click" | "toggle" => Some(Input::CardClick {
                id,
                nested_control: self.nested,
            }),
            "key" => Some(Input::CardKey {
                id,
                key: Key::parse(self.key.as_deref().unwrap_or_default()),
                nested_control: self.nested,
            }),
            "expand" => Some(Input::ExpandClick { id }),
            "remove" => Some(Input::RemoveClick { id }),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatForm {
    #[serde(default)]
    message: String,
    #[serde(default)]
    category: String,
}

fn back_to(category: &str) -> Redirect {
    if category.is_empty() || category == ALL_CATEGORIES {
        return Redirect::to("/");
    }
    match Url::parse_with_params("http://page.local/", &[("category", category)]) {
        Ok(url) => Redirect::to(&format!("/?{}", url.query().unwrap_or_default())),
        Err(_) => Redirect::to("/"),
    }
}

async fn index(State(state): State<PageState>, Query(query): Query<PageQuery>) -> Html<String> {
    Html(state.lock().render(&query.category))
}

async fn event(State(state): State<PageState>, Form(form): Form<EventForm>) -> Redirect {
    match form.input() {
        Some(input) => {
            let mut session = state.lock();
            match session.controller.handle(input) {
                Some(Effect::SelectionChanged { id, selected }) => debug!(
                    id,
                    selected,
                    selection = ?session.controller.selection().ids(),
                    "selection changed"
                ),
                Some(Effect::ExpandChanged { id, expanded }) => debug!(id, expanded, "expand toggled"),
                None => debug!(?input, "input ignored"),
            }
        }
        None => warn!(kind = %form.kind, "unknown event kind"),
    }
    back_to(&form.category)
}

async fn generate_handler(State(state): State<PageState>, Form(query): Form<PageQuery>) -> Redirect {
    generate(&state).await;
    back_to(&query.category)
}

async fn chat_handler(State(state): State<PageState>, Form(form): Form<ChatForm>) -> Redirect {
    follow_up(&state, &form.message).await;
    back_to(&form.category)
}

/// Build a routine from the current selection and append the outcome to the
/// transcript. Never fails: every error ends up as a transcript entry.
pub async fn generate(state: &PageState) {
    let (request, guard) = {
        let mut session = state.lock();
        if session.in_flight {
            session.transcript.push(ChatMessage::assistant(BUSY));
            return;
        }

        let request = match routine::build_request(session.controller.selection(), &session.catalog) {
            Ok(request) => request,
            Err(e) => {
                session.transcript.push(ChatMessage::assistant(e.to_string()));
                return;
            }
        };

        session.transcript.push(ChatMessage::user(format!(
            "Generate routine for {} products...",
            request.product_count
        )));
        let guard = InFlight::begin(state, &mut session, LOADING_ROUTINE);
        (request, guard)
    };

    info!(products = request.product_count, "generating routine");
    let result = state.client.send(&request.messages).await;

    if let Ok(reply) = &result {
        let mut history = request.messages.clone();
        history.push(ChatMessage::assistant(reply.clone()));
        state.lock().history = history;
    }
    guard.finish(ChatMessage::assistant(routine::display_text(result)));
}

/// Send a free-text question along with the conversation so far.
pub async fn follow_up(state: &PageState, question: &str) {
    let question = question.trim();
    if question.is_empty() {
        return;
    }

    let (messages, guard) = {
        let mut session = state.lock();
        if session.in_flight {
            session.transcript.push(ChatMessage::assistant(BUSY));
            return;
        }

        let mut messages = if session.history.is_empty() {
            vec![ChatMessage::system(SYSTEM_PROMPT)]
        } else {
            session.history.clone()
        };
        messages.push(ChatMessage::user(question));

        session.transcript.push(ChatMessage::user(question));
        let guard = InFlight::begin(state, &mut session, LOADING_REPLY);
        (messages, guard)
    };

    let result = state.client.send(&messages).await;

    if let Ok(reply) = &result {
        let mut session = state.lock();
        session.history = messages;
        session.history.push(ChatMessage::assistant(reply.clone()));
    }
    guard.finish(ChatMessage::assistant(routine::display_text(result)));
}
