//! Shell actions: what the UI triggers and what it renders back.
//!
//! Every action issues its call through the injected `Bridge`, settles it,
//! and renders one block of text. Nothing here is fatal: failures become
//! lines on screen and entries in the log.

use crate::bridge::Bridge;
use crate::commands::{self, CallOutcome, Post};

/// A user action read from the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Greet(String),
    ListPosts,
    CheckCache,
    CreatePost { title: String, text: String },
    UpdatePost { id: i32, title: String, text: String },
    DeletePost(i32),
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  greet <name>
  posts
  ping
  create <title> | <text>
  update <id> <title> | <text>
  delete <id>
  help
  quit";

impl Action {
    /// Parse one input line. Returns a usage hint on bad input.
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        match verb {
            "greet" => Ok(Action::Greet(rest.to_string())),
            "posts" => Ok(Action::ListPosts),
            "ping" => Ok(Action::CheckCache),
            "create" => {
                let (title, text) = split_title_text(rest)?;
                Ok(Action::CreatePost { title, text })
            }
            "update" => {
                let (id, rest) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| "usage: update <id> <title> | <text>".to_string())?;
                let id = parse_id(id)?;
                let (title, text) = split_title_text(rest.trim())?;
                Ok(Action::UpdatePost { id, title, text })
            }
            "delete" => Ok(Action::DeletePost(parse_id(rest)?)),
            "help" | "?" => Ok(Action::Help),
            "quit" | "exit" => Ok(Action::Quit),
            "" => Err(String::new()),
            other => Err(format!("unknown command '{other}' (try 'help')")),
        }
    }
}

fn parse_id(raw: &str) -> Result<i32, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("'{}' is not a post id", raw.trim()))
}

fn split_title_text(raw: &str) -> Result<(String, String), String> {
    let (title, text) = raw
        .split_once('|')
        .ok_or_else(|| "expected '<title> | <text>'".to_string())?;
    Ok((title.trim().to_string(), text.trim().to_string()))
}

// ─── App ─────────────────────────────────────────────────────────────────────

/// The shell's action handlers, sharing one bridge.
#[derive(Clone)]
pub struct App {
    bridge: Bridge,
}

impl App {
    pub fn new(bridge: Bridge) -> Self {
        Self { bridge }
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// Run one action to settlement and render the result.
    pub async fn handle(&self, action: Action) -> String {
        match action {
            Action::Greet(name) => self.greet(&name).await,
            Action::ListPosts => self.load_posts().await,
            Action::CheckCache => self.check_cache().await,
            Action::CreatePost { title, text } => self.create_post(&title, &text).await,
            Action::UpdatePost { id, title, text } => self.update_post(id, &title, &text).await,
            Action::DeletePost(id) => self.delete_post(id).await,
            Action::Help => HELP.to_string(),
            Action::Quit => String::new(),
        }
    }

    pub async fn greet(&self, name: &str) -> String {
        match commands::greet(&self.bridge, name).await {
            Ok(greeting) => greeting,
            Err(e) => format!("Unexpected error: {e}"),
        }
    }

    pub async fn load_posts(&self) -> String {
        render(commands::get_all_posts(&self.bridge).await, |posts| match posts {
            Some(posts) if !posts.is_empty() => {
                let lines: Vec<String> = posts.iter().map(render_post).collect();
                format!("Fetched {} posts:\n{}", posts.len(), lines.join("\n"))
            }
            _ => "No posts".to_string(),
        })
    }

    pub async fn check_cache(&self) -> String {
        render(commands::check_redis_connection(&self.bridge).await, |status| {
            format!("Redis Status: {}", status.unwrap_or_else(|| "ok".into()))
        })
    }

    pub async fn create_post(&self, title: &str, text: &str) -> String {
        render(commands::create_post(&self.bridge, title, text).await, |post| match post {
            Some(post) => format!("Created {}", render_post(&post)),
            None => "Created".to_string(),
        })
    }

    pub async fn update_post(&self, id: i32, title: &str, text: &str) -> String {
        render(commands::update_post(&self.bridge, id, title, text).await, |post| match post {
            Some(post) => format!("Updated {}", render_post(&post)),
            None => format!("Updated #{id}"),
        })
    }

    pub async fn delete_post(&self, id: i32) -> String {
        render(commands::delete_post(&self.bridge, id).await, |_| format!("Deleted #{id}"))
    }
}

fn render_post(post: &Post) -> String {
    format!("#{} {}: {}", post.id, post.title, post.text)
}

/// Business failures and transport failures render differently.
fn render<T>(outcome: CallOutcome<T>, on_success: impl FnOnce(Option<T>) -> String) -> String {
    match outcome {
        CallOutcome::Completed(data) => on_success(data),
        CallOutcome::Rejected { message } => {
            format!("Error: {}", message.unwrap_or_else(|| "unknown error".into()))
        }
        CallOutcome::Failed(e) => format!("Unexpected error: {e}"),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
