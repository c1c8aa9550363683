use crate::api::HttpChatApi;
use crate::config::Config;
use crate::events::ChatEvent;
use crate::model::{Message, MessageId};
use crate::session::ChatSession;
use crate::stream::StreamState;
use crate::transport::{Delivery, DeliveryReceiver, WsTransport};
use colored::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{self, Instant};
use tracing::warn;

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Text(String),
    List,
    Find(String),
    Open(i64),
    Leave,
    Older,
    New(i64),
    Group { name: String, participant_ids: Vec<i64> },
    Hide(i64),
    React(i64, String),
    Edit(i64, String),
    Delete(i64),
    Search(String),
    Typing,
    Help,
    Quit,
    Invalid(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    let Some(command) = line.strip_prefix('/') else {
        return Input::Text(line.to_string());
    };
    let mut parts = command.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or_default().trim();

    let id = |s: &str| s.parse::<i64>().ok();
    let id_and_text = |s: &str| -> Option<(i64, String)> {
        let mut it = s.splitn(2, char::is_whitespace);
        let id = it.next().and_then(|v| v.parse::<i64>().ok())?;
        let text = it.next().unwrap_or_default().trim().to_string();
        (!text.is_empty()).then_some((id, text))
    };

    let parsed = match name {
        "list" => Some(Input::List),
        "find" => Some(Input::Find(rest.to_string())),
        "open" => id(rest).map(Input::Open),
        "leave" => Some(Input::Leave),
        "older" => Some(Input::Older),
        "new" => id(rest).map(Input::New),
        "group" => {
            let mut it = rest.splitn(2, char::is_whitespace);
            let name = it.next().unwrap_or_default().to_string();
            let participant_ids: Option<Vec<i64>> = it
                .next()
                .unwrap_or_default()
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(|s| s.parse().ok())
                .collect();
            participant_ids
                .filter(|_| !name.is_empty())
                .map(|participant_ids| Input::Group { name, participant_ids })
        }
        "hide" => id(rest).map(Input::Hide),
        "react" => id_and_text(rest).map(|(id, emoji)| Input::React(id, emoji)),
        "edit" => id_and_text(rest).map(|(id, text)| Input::Edit(id, text)),
        "delete" => id(rest).map(Input::Delete),
        "search" => Some(Input::Search(rest.to_string())),
        "typing" => Some(Input::Typing),
        "help" => Some(Input::Help),
        "quit" | "exit" => Some(Input::Quit),
        _ => None,
    };
    parsed.unwrap_or_else(|| Input::Invalid(line.to_string()))
}

/// Interactive chat client: one event loop over stdin, broker deliveries,
/// the typing deadline and Ctrl+C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let api = Arc::new(HttpChatApi::new(&config)?);
    let mut session = ChatSession::new(config.clone(), api);

    println!("{}", "💬 ChatLink".bright_cyan().bold());
    println!("   Signed in as {}", session.user().name.cyan());

    let mut deliveries =
        match WsTransport::connect(&config.ws_url, &config.token, config.connection_timeout).await
        {
            Ok((transport, deliveries)) => {
                session.attach_transport(Arc::new(transport)).await;
                println!("{} Connected to {}", "✓".green(), config.ws_url.cyan());
                Some(deliveries)
            }
            Err(e) => {
                eprintln!(
                    "{} Real-time connection failed: {} (history only)",
                    "✗".red().bold(),
                    e
                );
                None
            }
        };

    if let Err(e) = session.refresh_conversations().await {
        eprintln!("{} Could not load conversations: {}", "✗".red().bold(), e);
    }
    print_conversations(&session, None);
    println!("{}", "Type /help for commands".dimmed());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut timers = time::interval(Duration::from_secs(1));

    loop {
        let deadline = session.next_typing_deadline();
        let mut closed = false;

        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if !handle_line(&mut session, &line).await {
                            break;
                        }
                    }
                    None => break,
                }
            }
            delivery = next_delivery(&mut deliveries) => {
                match delivery {
                    Some(delivery) => {
                        if let Some(event) = session.handle_delivery(delivery).await {
                            render_event(&session, &event);
                        }
                    }
                    None => closed = true,
                }
            }
            _ = wait_until(deadline) => {
                session.tick(Instant::now()).await;
            }
            _ = timers.tick() => {
                if session.tick(Instant::now()).await {
                    print_typing(&session);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }

        if closed {
            warn!("Broker connection closed");
            eprintln!("{} Real-time connection lost", "✗".red().bold());
            deliveries = None;
        }
    }

    session.teardown().await;
    println!("{}", "Bye".dimmed());
    Ok(())
}

async fn next_delivery(deliveries: &mut Option<DeliveryReceiver>) -> Option<Delivery> {
    match deliveries {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Returns false when the user asked to quit
async fn handle_line(session: &mut ChatSession, line: &str) -> bool {
    match parse_input(line) {
        Input::Text(text) => {
            if text.is_empty() {
                return true;
            }
            match session.send_message(&text).await {
                Ok(Some(placeholder)) => {
                    print_message(session, placeholder);
                    if !session.is_connected() {
                        println!("{}", "  (offline: message not delivered)".yellow());
                    }
                }
                Ok(None) => {}
                Err(e) => report(e),
            }
        }
        Input::List => {
            if let Err(e) = session.refresh_conversations().await {
                report(e);
            }
            print_conversations(session, None);
        }
        Input::Find(query) => print_conversations(session, Some(&query)),
        Input::Open(id) => open(session, id).await,
        Input::Leave => session.close_conversation().await,
        Input::Older => match session.load_older_messages().await {
            Ok(0) => println!("{}", "  (no older messages)".dimmed()),
            Ok(_) => print_messages(session),
            Err(e) => report(e),
        },
        Input::New(user_id) => match session.create_conversation(vec![user_id], false, None).await {
            Ok(conversation) => open(session, conversation.conversation_id).await,
            Err(e) => report(e),
        },
        Input::Group {
            name,
            participant_ids,
        } => match session
            .create_conversation(participant_ids, true, Some(name))
            .await
        {
            Ok(conversation) => open(session, conversation.conversation_id).await,
            Err(e) => report(e),
        },
        Input::Hide(id) => match session.delete_conversation(id).await {
            Ok(()) => println!("{} Conversation {} removed", "✓".green(), id),
            Err(e) => report(e),
        },
        Input::React(id, emoji) => {
            match session.toggle_reaction(MessageId::Server(id), &emoji).await {
                Ok(Some(_)) => print_message(session, MessageId::Server(id)),
                Ok(None) => println!("{}", "  (reaction not saved)".yellow()),
                Err(e) => report(e),
            }
        }
        Input::Edit(id, text) => match session.edit_message(MessageId::Server(id), &text).await {
            Ok(()) => print_message(session, MessageId::Server(id)),
            Err(e) => report(e),
        },
        Input::Delete(id) => match session.delete_message(MessageId::Server(id)).await {
            Ok(()) => println!("{} Message {} deleted", "✓".green(), id),
            Err(e) => report(e),
        },
        Input::Search(query) => match session.search_messages(&query).await {
            Ok(hits) if hits.is_empty() => println!("{}", "  (no matches)".dimmed()),
            Ok(hits) => hits.iter().for_each(|m| println!("{}", format_message(m))),
            Err(e) => report(e),
        },
        Input::Typing => session.on_input().await,
        Input::Help => print_help(),
        Input::Quit => return false,
        Input::Invalid(line) => {
            eprintln!("{} Unknown command: {}", "✗".red().bold(), line.red());
        }
    }
    true
}

async fn open(session: &mut ChatSession, conversation_id: i64) {
    let result = session.open_conversation(conversation_id).await;
    let title = session
        .directory()
        .get(conversation_id)
        .map(|c| session.directory().display_name(c))
        .unwrap_or_else(|| format!("#{}", conversation_id));
    println!("{} {}", "──".dimmed(), title.bright_white().bold());
    match result {
        Ok(()) => print_messages(session),
        Err(e) => report(e),
    }
}

fn report(error: crate::error::ChatError) {
    eprintln!("{} {}", "✗".red().bold(), error.to_string().red());
}

fn format_message(message: &Message) -> String {
    let time = message.created_at.format("%H:%M").to_string();
    let id = match message.id {
        MessageId::Server(id) => format!("#{}", id),
        MessageId::Local(_) => "…".to_string(),
    };
    let mut line = format!(
        "{} {} {}: {}",
        time.dimmed(),
        id.dimmed(),
        message.sender.name.cyan(),
        message.text()
    );
    if message.is_edited {
        line.push_str(&format!(" {}", "(edited)".dimmed()));
    }
    for (emoji, reactors) in message.reactions.iter() {
        line.push_str(&format!(" {}{}", emoji, reactors.len()));
    }
    line
}

fn print_messages(session: &ChatSession) {
    let stream = session.stream();
    if stream.state() == StreamState::Ready && stream.messages().is_empty() {
        println!("{}", "  (no messages yet)".dimmed());
    }
    if stream.has_more() {
        println!("{}", "  /older for earlier messages".dimmed());
    }
    for message in stream.messages() {
        println!("{}", format_message(message));
    }
}

fn print_message(session: &ChatSession, id: MessageId) {
    if let Some(message) = session.stream().get(id) {
        println!("{}", format_message(message));
    }
}

fn print_typing(session: &ChatSession) {
    let names = session.typing_users();
    if !names.is_empty() {
        println!("{}", format!("  {} typing…", names.join(", ")).dimmed());
    }
}

fn render_event(session: &ChatSession, event: &ChatEvent) {
    match event {
        ChatEvent::Message(message) => {
            if message.sender.user_id != session.user().user_id {
                println!("{}", format_message(message));
            }
        }
        ChatEvent::Typing(_) => print_typing(session),
        ChatEvent::ReactionsChanged(message) | ChatEvent::Edited(message) => {
            print_message(session, message.id)
        }
        ChatEvent::Deleted { message_id } => {
            println!("{}", format!("  message #{} was deleted", message_id).dimmed())
        }
    }
}

fn print_conversations(session: &ChatSession, query: Option<&str>) {
    let directory = session.directory();
    let conversations = match query {
        Some(query) => directory.search(query),
        None => directory.list().iter().collect(),
    };
    if conversations.is_empty() {
        println!("{}", "  (no conversations)".dimmed());
        return;
    }
    println!(
        "{} ({} unread)",
        "Conversations".bright_white().bold(),
        directory.unread_conversations()
    );
    for conversation in conversations {
        let unread = if conversation.unread_count > 0 {
            format!(" [{}]", conversation.unread_count).yellow().to_string()
        } else {
            String::new()
        };
        let preview = conversation
            .last_message
            .as_ref()
            .map(|m| m.text().chars().take(40).collect::<String>())
            .unwrap_or_default();
        println!(
            "  {:>4} {}{} {}",
            conversation.conversation_id.to_string().cyan(),
            directory.display_name(conversation),
            unread,
            preview.dimmed()
        );
    }
}

fn print_help() {
    println!("{}", "Commands:".bright_white().bold());
    let rows = [
        ("/list", "Refresh and list conversations"),
        ("/find <text>", "Filter conversations by name"),
        ("/open <id>", "Open a conversation"),
        ("/leave", "Close the open conversation"),
        ("/older", "Load earlier messages"),
        ("/new <user_id>", "Start (or reuse) a 1-on-1 conversation"),
        ("/group <name> <ids>", "Create a group, ids comma separated"),
        ("/hide <id>", "Delete a conversation for yourself"),
        ("/react <msg> <emoji>", "Toggle a reaction"),
        ("/edit <msg> <text>", "Edit one of your messages"),
        ("/delete <msg>", "Delete one of your messages"),
        ("/search <text>", "Search the open conversation"),
        ("/typing", "Tell others you are composing"),
        ("/quit", "Exit"),
    ];
    for (command, help) in rows {
        println!("  {:<22} {}", command.cyan(), help);
    }
    println!("  Anything else is sent to the open conversation.");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_sent() {
        assert_eq!(parse_input("  hello there "), Input::Text("hello there".into()));
    }

    #[test]
    fn test_commands_with_ids() {
        assert_eq!(parse_input("/open 12"), Input::Open(12));
        assert_eq!(parse_input("/react 5 👍"), Input::React(5, "👍".into()));
        assert_eq!(parse_input("/edit 5 fixed typo"), Input::Edit(5, "fixed typo".into()));
        assert_eq!(
            parse_input("/group rustaceans 2,3 4"),
            Input::Group {
                name: "rustaceans".into(),
                participant_ids: vec![2, 3, 4]
            }
        );
    }

    #[test]
    fn test_pending_message_line_shows_text() {
        colored::control::set_override(false);
        let sender = crate::model::UserSummary {
            user_id: 1,
            name: "Ada".into(),
            email: String::new(),
        };
        let pending = Message::placeholder(3, sender, "on my way".into());
        let line = format_message(&pending);
        assert!(line.contains("… Ada: on my way"));
    }

    #[test]
    fn test_malformed_commands_are_invalid() {
        assert!(matches!(parse_input("/open abc"), Input::Invalid(_)));
        assert!(matches!(parse_input("/edit 5"), Input::Invalid(_)));
        assert!(matches!(parse_input("/group"), Input::Invalid(_)));
        assert!(matches!(parse_input("/frobnicate"), Input::Invalid(_)));
    }
}
