//! # Sierra Chat Command
//!
//! File: cli/src/commands/chat/mod.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! Terminal front end for the hotel chat assistant. Two modes:
//!
//! - **One-shot**: `sierra chat "What rooms do you have?"` prints the matched
//!   reply and exits.
//! - **Interactive**: with no message, the widget opens (greeting first) and
//!   every line read from stdin is sent. Bot replies appear after the typing
//!   delay, in the order the questions were asked.
//!
//! Interactive input understands a few commands:
//!
//! | Input     | Effect                                  |
//! |-----------|-----------------------------------------|
//! | `/toggle` | open or close the widget                |
//! | `/close`  | close the widget                        |
//! | `/quit`   | wait for pending replies, then exit     |
//!
//! End of input behaves like `/quit`.
//!
use crate::common::chat::{ChatMessage, ChatSession, ResponseMatcher, Sender, DEFAULT_REPLY_DELAY};
use crate::core::error::Result;
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// # Chat Command Arguments (`ChatArgs`)
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Ask a single question and print the reply. Omit for an interactive session.
    pub message: Option<String>,

    /// Typing delay before each bot reply, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_REPLY_DELAY.as_millis() as u64)]
    pub delay_ms: u64,

    /// TOML file with a replacement rule table.
    #[arg(long, value_name = "FILE")]
    pub rules: Option<PathBuf>,
}

/// What a line of interactive input asks for.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Toggle,
    Close,
    Quit,
    Message(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    match line.trim() {
        "/toggle" => Input::Toggle,
        "/close" => Input::Close,
        "/quit" => Input::Quit,
        _ => Input::Message(line),
    }
}

fn render(message: &ChatMessage) -> String {
    match message.sender {
        Sender::User => format!("You: {}", message.text),
        Sender::Bot => format!("Sierra: {}", message.text),
    }
}

/// # Handle Chat Command (`handle_chat`)
///
/// ## Errors
///
/// Fails if the rules file cannot be read or is invalid, or if stdin cannot
/// be read.
pub async fn handle_chat(args: ChatArgs) -> Result<()> {
    let matcher = match &args.rules {
        Some(path) => ResponseMatcher::load(path)?,
        None => ResponseMatcher::hotel(),
    };

    if let Some(message) = &args.message {
        debug!("One-shot chat question: {}", message);
        let reply = matcher.respond(message);
        if reply == matcher.fallback() {
            debug!("No rule matched; answering with the fallback");
        }
        println!("{}", reply);
        return Ok(());
    }

    run_interactive(Arc::new(matcher), Duration::from_millis(args.delay_ms)).await
}

async fn run_interactive(matcher: Arc<ResponseMatcher>, delay: Duration) -> Result<()> {
    let (mut chat, rendered) = ChatSession::new(matcher, delay);
    let printer = tokio::spawn(print_feed(rendered));

    chat.toggle();
    info!("Chat opened; /toggle, /close and /quit are available");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .context("Failed to read chat input")?
    {
        match parse_input(&line) {
            Input::Toggle => {
                chat.toggle();
                debug!("Chat widget is now {:?}", chat.state());
            }
            Input::Close => chat.close(),
            Input::Quit => break,
            Input::Message(text) => {
                if !chat.send(text) && !text.trim().is_empty() {
                    eprintln!("(chat is closed, type /toggle to open it)");
                }
            }
        }
    }

    chat.flush().await;
    // Dropping the session closes the feed once the scheduler drains.
    drop(chat);
    printer.await.context("Chat printer task failed")?;
    Ok(())
}

async fn print_feed(mut rendered: mpsc::UnboundedReceiver<ChatMessage>) {
    while let Some(message) = rendered.recv().await {
        println!("{}", render(&message));
    }
}
