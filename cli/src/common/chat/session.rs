//! # Sierra Chat Session
//!
//! File: cli/src/common/chat/session.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! The chat widget as a small state machine. It is either `Closed` or `Open`:
//!
//! - `toggle` opens a closed widget (posting the greeting) or closes an open one.
//! - `close` always closes, silently.
//! - `send` posts the user's message at once and schedules the bot's reply
//!   after a fixed delay.
//!
//! ## Reply Scheduling
//!
//! Replies are not fired from ad-hoc timers. Each `send` pushes a
//! `Scheduled` entry carrying its own deadline (`now + delay`) onto a channel
//! drained by one scheduler task. Because every delay has the same length, the
//! deadlines arrive in non-decreasing order, so the scheduler sleeps until
//! each deadline in turn and replies come out in submission order. Closing
//! the widget does not cancel replies that are already scheduled.
//!
//! Every message, user or bot, goes into the shared transcript and is also
//! pushed to the rendered-message feed returned by `ChatSession::new`.
//!
use super::rules::ResponseMatcher;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default typing delay before a bot reply appears.
pub const DEFAULT_REPLY_DELAY: Duration = Duration::from_millis(500);

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Bot,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Bot => write!(f, "bot"),
        }
    }
}

/// One line of the chat transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
}

impl ChatMessage {
    fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            sender,
            text: text.into(),
        }
    }
}

/// Visibility of the widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetState {
    Closed,
    Open,
}

/// Work items for the scheduler task.
enum Scheduled {
    Reply { due: Instant, text: String },
    Flush(oneshot::Sender<()>),
}

type Transcript = Arc<Mutex<Vec<ChatMessage>>>;

/// Appends to the transcript and forwards to the rendered feed.
fn post(transcript: &Transcript, feed: &mpsc::UnboundedSender<ChatMessage>, message: ChatMessage) {
    match transcript.lock() {
        Ok(mut messages) => messages.push(message.clone()),
        Err(poisoned) => poisoned.into_inner().push(message.clone()),
    }
    // A dropped receiver only means nobody is rendering; the transcript still has it.
    let _ = feed.send(message);
}

/// # Chat Session (`ChatSession`)
///
/// One open chat widget instance and its in-memory transcript. Must be
/// created inside a Tokio runtime, as it spawns the reply scheduler.
pub struct ChatSession {
    state: WidgetState,
    matcher: Arc<ResponseMatcher>,
    transcript: Transcript,
    feed: mpsc::UnboundedSender<ChatMessage>,
    queue: mpsc::UnboundedSender<Scheduled>,
    reply_delay: Duration,
}

impl ChatSession {
    /// # Create Session (`new`)
    ///
    /// Builds a closed widget and spawns its reply scheduler.
    ///
    /// ## Returns
    ///
    /// The session plus the receiving end of the rendered-message feed. Every
    /// message appended to the transcript is also delivered there, in order.
    pub fn new(
        matcher: Arc<ResponseMatcher>,
        reply_delay: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<ChatMessage>) {
        let (feed, rendered) = mpsc::unbounded_channel();
        let (queue, scheduled) = mpsc::unbounded_channel();
        let transcript: Transcript = Arc::new(Mutex::new(Vec::new()));

        tokio::spawn(run_scheduler(scheduled, transcript.clone(), feed.clone()));

        let session = Self {
            state: WidgetState::Closed,
            matcher,
            transcript,
            feed,
            queue,
            reply_delay,
        };
        (session, rendered)
    }

    pub fn state(&self) -> WidgetState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == WidgetState::Open
    }

    /// Opens a closed widget (posting the greeting) or closes an open one.
    pub fn toggle(&mut self) {
        match self.state {
            WidgetState::Closed => {
                self.state = WidgetState::Open;
                let greeting = self.matcher.greeting().to_string();
                post(&self.transcript, &self.feed, ChatMessage::new(Sender::Bot, greeting));
            }
            WidgetState::Open => self.state = WidgetState::Closed,
        }
    }

    pub fn close(&mut self) {
        self.state = WidgetState::Closed;
    }

    /// # Send Message (`send`)
    ///
    /// Posts the trimmed user message and schedules the matched bot reply.
    /// Blank input, or input while the widget is closed, is ignored without
    /// touching the transcript or the matcher.
    ///
    /// ## Returns
    ///
    /// `true` if the message was accepted.
    pub fn send(&mut self, input: &str) -> bool {
        let message = input.trim();
        if message.is_empty() || !self.is_open() {
            return false;
        }

        post(&self.transcript, &self.feed, ChatMessage::new(Sender::User, message));

        let reply = self.matcher.respond(message).to_string();
        let due = Instant::now() + self.reply_delay;
        if self.queue.send(Scheduled::Reply { due, text: reply }).is_err() {
            warn!("Chat reply scheduler has stopped; reply dropped");
        }
        true
    }

    /// Waits until every reply scheduled so far has been posted.
    pub async fn flush(&self) {
        let (done, waiter) = oneshot::channel();
        if self.queue.send(Scheduled::Flush(done)).is_ok() {
            let _ = waiter.await;
        }
    }

    /// Snapshot of the transcript so far.
    pub fn messages(&self) -> Vec<ChatMessage> {
        match self.transcript.lock() {
            Ok(messages) => messages.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Drains scheduled replies in order, sleeping until each one is due.
async fn run_scheduler(
    mut scheduled: mpsc::UnboundedReceiver<Scheduled>,
    transcript: Transcript,
    feed: mpsc::UnboundedSender<ChatMessage>,
) {
    while let Some(item) = scheduled.recv().await {
        match item {
            Scheduled::Reply { due, text } => {
                tokio::time::sleep_until(due).await;
                post(&transcript, &feed, ChatMessage::new(Sender::Bot, text));
            }
            Scheduled::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Chat reply scheduler finished");
}
