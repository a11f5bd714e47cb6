use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::event::{Event, EventHandler, Gesture};
use crate::keymap;
use crate::mutation::{Coordinator, MutationId, Settled, Ticket};
use crate::remote::RemoteAck;
use crate::tree::node::NodeId;
use crate::view::row::{Row, SearchScope};

/// How long a notification stays visible.
pub const NOTIFICATION_TTL: Duration = Duration::from_secs(3);

/// A parsed shell line. Paths are relative to the current folder unless
/// they start with `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Cd(String),
    Up,
    Ls,
    Find(String),
    Cut(String),
    Paste,
    Deselect,
    Drop { source: String, target: String },
    Mkdir(String),
    Rm(String),
    Rename { path: String, name: String },
    Upload { parent: String, name: String, body: Vec<u8> },
    /// Read a local file and upload it into `parent`.
    UploadFile { file: PathBuf, parent: String },
    Refresh,
    Quit,
}

/// Parse one shell line. An empty line lists the current folder.
pub fn parse_command(line: &str) -> Result<Command> {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Ok(Command::Ls);
    };
    let args: Vec<&str> = parts.collect();
    let arg = |i: usize| {
        args.get(i)
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::UnknownCommand(format!("{}: missing argument", verb)))
    };

    let command = match verb {
        "cd" => Command::Cd(arg(0)?),
        ".." => Command::Up,
        "ls" => Command::Ls,
        "find" => Command::Find(args.join(" ")),
        "cut" => Command::Cut(arg(0)?),
        "paste" => Command::Paste,
        "deselect" => Command::Deselect,
        "drop" => Command::Drop {
            source: arg(0)?,
            target: arg(1)?,
        },
        "mkdir" => Command::Mkdir(arg(0)?),
        "rm" => Command::Rm(arg(0)?),
        "rename" => Command::Rename {
            path: arg(0)?,
            name: arg(1)?,
        },
        "upload" => Command::UploadFile {
            file: PathBuf::from(arg(0)?),
            parent: arg(1).unwrap_or_else(|_| ".".to_string()),
        },
        "refresh" => Command::Refresh,
        "quit" | "exit" => Command::Quit,
        other => return Err(AppError::UnknownCommand(other.to_string())),
    };
    Ok(command)
}

/// Per-container context: owns the coordinator (and through it the tree),
/// the selection, and the notification line.
pub struct Session {
    coordinator: Coordinator,
    scope: SearchScope,
    selected: Option<NodeId>,
    notification: Option<(String, Instant)>,
    events: mpsc::UnboundedSender<Event>,
    should_quit: bool,
}

impl Session {
    pub fn new(
        coordinator: Coordinator,
        scope: SearchScope,
        events: mpsc::UnboundedSender<Event>,
    ) -> Self {
        Self {
            coordinator,
            scope,
            selected: None,
            notification: None,
            events,
            should_quit: false,
        }
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn rows(&self) -> Vec<Row> {
        self.coordinator.rows(self.scope, Utc::now())
    }

    /// `/`-joined path of the current folder.
    pub fn location(&self) -> String {
        let store = self.coordinator.store();
        format!("/{}", store.path_segments(store.current_node()).join("/"))
    }

    pub fn selected(&self) -> Option<NodeId> {
        self.selected
    }

    pub fn select(&mut self, node: Option<NodeId>) {
        self.selected = node;
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn notification(&self) -> Option<&str> {
        self.notification.as_ref().map(|(msg, _)| msg.as_str())
    }

    pub fn set_notification(&mut self, msg: String) {
        self.notification = Some((msg, Instant::now()));
    }

    pub fn take_notification(&mut self) -> Option<String> {
        self.notification.take().map(|(msg, _)| msg)
    }

    /// Drop the notification once it has been shown long enough.
    pub fn clear_expired_notification(&mut self) {
        if let Some((_, ref created)) = self.notification {
            if created.elapsed() > NOTIFICATION_TTL {
                self.notification = None;
            }
        }
    }

    /// Handle one event. Errors end up in the notification line unless
    /// they are silent.
    pub async fn handle_event(&mut self, event: Event) {
        let result = match event {
            Event::Key(key) => match keymap::map_key(key, self.selected) {
                Some(gesture) => self.apply(gesture).await,
                None => Ok(()),
            },
            Event::Line(line) => match parse_command(&line) {
                Ok(command) => self.run(command).await,
                Err(err) => Err(err),
            },
            Event::Gesture(gesture) => self.apply(gesture).await,
            Event::Settled { id, result } => {
                self.settle(id, result).await;
                Ok(())
            }
        };
        if let Err(err) = result {
            self.report(err);
        }
    }

    /// Pump events until no mutation is in flight, returning the outcomes.
    pub async fn settle_all(&mut self, events: &mut EventHandler) -> Vec<Settled> {
        let mut outcomes = Vec::new();
        while self.coordinator.in_flight() > 0 {
            match events.next().await {
                Some(Event::Settled { id, result }) => outcomes.push(self.settle(id, result).await),
                Some(other) => self.handle_event(other).await,
                None => break,
            }
        }
        outcomes
    }

    fn report(&mut self, err: AppError) {
        if err.is_silent() {
            debug!(error = %err, "ignored gesture");
            return;
        }
        self.set_notification(err.to_string());
    }

    /// Settle one mutation, then run a refresh that was waiting on it.
    async fn settle(&mut self, id: MutationId, result: Result<RemoteAck>) -> Settled {
        let outcome = self.coordinator.settle(id, result);
        if let Settled::RolledBack { kind, reason, .. } = &outcome {
            self.set_notification(format!("Could not {}: {}", kind.label(), reason));
        }
        if self.coordinator.refresh_due() {
            if let Err(err) = self.refresh().await {
                self.report(err);
            }
        }
        self.drop_stale_selection();
        outcome
    }

    async fn refresh(&mut self) -> Result<()> {
        match self.coordinator.refresh().await? {
            Some(entries) => info!(entries, "session refreshed"),
            None => info!("session refresh waits for pending mutations"),
        }
        self.drop_stale_selection();
        Ok(())
    }

    fn drop_stale_selection(&mut self) {
        if self
            .selected
            .is_some_and(|node| !self.coordinator.store().contains(node))
        {
            self.selected = None;
        }
    }

    /// Send the remote half of `ticket` off; its result comes back as
    /// [`Event::Settled`].
    fn launch(&self, ticket: Ticket) {
        let work = self.coordinator.remote_work(ticket);
        let tx = self.events.clone();
        tokio::spawn(async move {
            let (id, result) = work.await;
            if tx.send(Event::Settled { id, result }).is_err() {
                debug!(%id, "session gone before mutation settled");
            }
        });
    }

    /// Resolve and run a shell command, returning its error instead of
    /// reporting it.
    pub async fn run(&mut self, command: Command) -> Result<()> {
        let command = match command {
            Command::UploadFile { file, parent } => {
                let name = file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| AppError::InvalidPath(file.display().to_string()))?;
                let body = tokio::fs::read(&file).await?;
                Command::Upload { parent, name, body }
            }
            other => other,
        };
        match self.resolve_command(command)? {
            Some(gesture) => self.apply(gesture).await,
            None => Ok(()),
        }
    }

    fn resolve_command(&self, command: Command) -> Result<Option<Gesture>> {
        let gesture = match command {
            Command::Cd(path) => Gesture::Open(self.resolve(&path)?),
            Command::Up => Gesture::Back,
            Command::Ls => return Ok(None),
            Command::Find(query) => Gesture::Search(query),
            Command::Cut(path) => Gesture::Cut(self.resolve(&path)?),
            Command::Paste => Gesture::Paste,
            Command::Deselect => match self.coordinator.cut_buffer().get() {
                Some(entry) => Gesture::Deselect(entry.node),
                None => return Ok(None),
            },
            Command::Drop { source, target } => Gesture::Drop {
                source: self.resolve(&source)?,
                target: self.resolve(&target)?,
            },
            Command::Mkdir(path) => {
                let (parent, name) = self.split_parent(&path)?;
                Gesture::CreateFolder { parent, name }
            }
            Command::Rm(path) => Gesture::Delete(self.resolve(&path)?),
            Command::Rename { path, name } => Gesture::Rename {
                node: self.resolve(&path)?,
                name,
            },
            Command::Upload { parent, name, body } => Gesture::Upload {
                parent: self.resolve(&parent)?,
                name,
                body,
            },
            Command::UploadFile { file, .. } => {
                return Err(AppError::InvalidPath(file.display().to_string()))
            }
            Command::Refresh => Gesture::Refresh,
            Command::Quit => Gesture::Quit,
        };
        Ok(Some(gesture))
    }

    /// Resolve a shell path against the current folder.
    fn resolve(&self, path: &str) -> Result<NodeId> {
        let store = self.coordinator.store();
        let mut segments: Vec<&str> = if path.starts_with('/') {
            Vec::new()
        } else {
            store.path_segments(store.current_node())
        };
        for part in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
            if part == ".." {
                segments.pop();
            } else {
                segments.push(part);
            }
        }
        store
            .resolve(&segments)
            .ok_or_else(|| AppError::NotFound(path.to_string()))
    }

    fn split_parent(&self, path: &str) -> Result<(NodeId, String)> {
        let trimmed = path.trim_end_matches('/');
        match trimmed.rsplit_once('/') {
            Some((dir, name)) => {
                let dir = if dir.is_empty() { "/" } else { dir };
                Ok((self.resolve(dir)?, name.to_string()))
            }
            None => Ok((self.coordinator.store().current_node(), trimmed.to_string())),
        }
    }

    /// Apply a gesture. Mutating gestures edit the tree right away and
    /// launch their remote call.
    pub async fn apply(&mut self, gesture: Gesture) -> Result<()> {
        match gesture {
            Gesture::Open(node) => {
                self.coordinator.store_mut().enter(node)?;
                self.selected = None;
            }
            Gesture::Back => {
                let left = self.coordinator.store().current_node();
                self.coordinator.store_mut().go_back();
                self.selected = Some(left).filter(|n| *n != self.coordinator.store().root());
            }
            Gesture::SelectNext => self.move_selection(true),
            Gesture::SelectPrevious => self.move_selection(false),
            Gesture::Search(query) => {
                self.coordinator.store_mut().set_search_query(&query);
                self.selected = None;
            }
            Gesture::Cut(node) => self.coordinator.cut(node)?,
            Gesture::Paste => {
                let ticket = self.coordinator.begin_paste()?;
                self.launch(ticket);
            }
            Gesture::Deselect(node) => {
                self.coordinator.deselect(node);
                self.selected = None;
            }
            Gesture::Drop { source, target } => {
                let ticket = self.coordinator.begin_drop(source, target)?;
                self.launch(ticket);
            }
            Gesture::CreateFolder { parent, name } => {
                let ticket = self.coordinator.begin_create_folder(parent, &name)?;
                self.launch(ticket);
            }
            Gesture::Upload { parent, name, body } => {
                let ticket = self.coordinator.begin_upload(parent, &name, body)?;
                self.launch(ticket);
            }
            Gesture::Delete(node) => {
                let ticket = self.coordinator.begin_delete(node)?;
                self.launch(ticket);
            }
            Gesture::Rename { node, name } => {
                let ticket = self.coordinator.begin_rename(node, &name)?;
                self.launch(ticket);
            }
            Gesture::Refresh => self.refresh().await?,
            Gesture::Quit => self.should_quit = true,
        }
        Ok(())
    }

    fn move_selection(&mut self, forward: bool) {
        let rows = self.rows();
        if rows.is_empty() {
            self.selected = None;
            return;
        }
        let position = self
            .selected
            .and_then(|node| rows.iter().position(|r| r.id == node));
        let index = match (position, forward) {
            (None, true) => 0,
            (None, false) => rows.len() - 1,
            (Some(i), true) => (i + 1).min(rows.len() - 1),
            (Some(i), false) => i.saturating_sub(1),
        };
        self.selected = Some(rows[index].id);
    }
}
