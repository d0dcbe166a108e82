// Terminal client: same state and services as the GUI, driven from stdin.
use std::time::Duration;

use clap::Parser;
use log::{info, warn};
use tokio::io::{stdin, AsyncBufReadExt, BufReader};

use charla::client::config::{BackendKind, ClientConfig};
use charla::client::models::app_state::{ChatAppState, ReplyPreview};
use charla::client::services::command_dispatcher::COMMANDS;
use charla::client::session::{ChatSession, LiveUpdate, SubmitOutcome};
use charla::client::utils::identity_store::IdentityStore;
use charla::common::models::ChatMessage;
use charla::utils::logger::CharlaLogger;

#[derive(Parser, Debug)]
#[command(name = "charla-cli")]
#[command(about = "Terminal client for Charla group chat")]
struct Args {
    /// Use the in-process backend instead of the hosted one
    #[arg(long)]
    memory: bool,
    /// Do not read or persist the display name
    #[arg(long)]
    ephemeral: bool,
    /// Display name for this session (also persisted unless --ephemeral)
    #[arg(short, long)]
    name: Option<String>,
}

const RESUME_DELAY: Duration = Duration::from_secs(2);

const LOCAL_COMMANDS: &[(&str, &str)] = &[
    ("/groups", "List groups"),
    ("/open <n>", "Open the n-th group of /groups"),
    ("/create <name> [--private]", "Create a group"),
    ("/reply <message id>", "Reply to a message (/reply alone cancels)"),
    ("/attach <path or url>", "Attach an image to the next message"),
    ("/name <new name>", "Change your display name"),
    ("/quit", "Exit"),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = ClientConfig::from_env();
    if args.memory {
        config.backend = BackendKind::Memory;
    }
    if let Err(e) = CharlaLogger::init(&config.log_level) {
        eprintln!("[CLIENT] Logger setup failed: {}", e);
    }

    let service = config.build_service()?;
    let identity = if args.ephemeral { IdentityStore::ephemeral() } else { config.build_identity() };
    let mut session = ChatSession::new(ChatAppState::new(identity), service);

    let mut input = BufReader::new(stdin()).lines();

    if let Some(name) = &args.name {
        session.set_name(name);
    }
    while !session.state.is_ready() {
        println!("[CLIENT] Choose a display name:");
        let Some(line) = input.next_line().await? else {
            return Ok(());
        };
        session.set_name(&line);
    }
    println!("[CLIENT] Hi {}! Type /help for commands.", session.state.username());

    session.start().await;
    print_groups(&session);

    loop {
        tokio::select! {
            line = input.next_line() => {
                let Some(line) = line? else { break };
                if !handle_line(&mut session, line.trim_end()).await {
                    break;
                }
            }
            update = session.next_update() => match update {
                LiveUpdate::Group(group) => println!("[NEW GROUP] {}", group.name),
                LiveUpdate::Message(msg) => print_message(&session.state, &msg),
                LiveUpdate::Ignored => {}
                LiveUpdate::Closed => {
                    warn!("[SYNC] All live channels closed, reopening in {}s", RESUME_DELAY.as_secs());
                    tokio::time::sleep(RESUME_DELAY).await;
                    session.resume().await;
                }
            },
        }
    }

    session.shutdown();
    info!("[CLIENT] Bye");
    Ok(())
}

/// Returns false when the user asked to quit.
async fn handle_line(session: &mut ChatSession, line: &str) -> bool {
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((c, r)) => (c, r.trim()),
        None => (line, ""),
    };
    match command {
        "/quit" => return false,
        "/help" => print_help(),
        "/groups" => print_groups(session),
        "/open" => {
            let groups = session.state.groups.to_ordered_list();
            match rest.parse::<usize>().ok().and_then(|n| groups.get(n.wrapping_sub(1))) {
                Some(group) => {
                    session.select_group(&group.id).await;
                    println!("[CLIENT] Now in {}", group.name);
                    for msg in session.state.messages.to_ordered_list() {
                        print_message(&session.state, &msg);
                    }
                }
                None => println!("[CLIENT] No such group, see /groups"),
            }
        }
        "/create" => {
            let is_private = rest.ends_with("--private");
            let name = rest.trim_end_matches("--private").trim();
            if name.is_empty() {
                println!("[CLIENT] Usage: /create <name> [--private]");
                return true;
            }
            if let Ok(group) = session.create_group(name, is_private).await {
                match &group.invite_code {
                    Some(code) => println!("[CLIENT] Created private group {} (invite code {})", group.name, code),
                    None => println!("[CLIENT] Created group {}", group.name),
                }
            }
        }
        "/reply" => {
            let target = (!rest.is_empty()).then(|| rest.to_string());
            session.state.set_reply_target(target);
        }
        "/attach" => {
            session.state.set_attachment(Some(rest.to_string()));
        }
        "/name" => {
            if session.set_name(rest) {
                println!("[CLIENT] You are now {}", session.state.username());
            }
        }
        _ => match session.submit_text(line).await {
            SubmitOutcome::Sent(msg) => print_message(&session.state, &msg),
            SubmitOutcome::Joined(group) => {
                println!("[CLIENT] Joined {}", group.name);
                for msg in session.state.messages.to_ordered_list() {
                    print_message(&session.state, &msg);
                }
            }
            // failures surface through the alert below
            SubmitOutcome::Failed(_) | SubmitOutcome::Nothing => {}
        },
    }
    if let Some(alert) = session.state.alert.take() {
        println!("[ALERT] {}", alert);
    }
    true
}

fn print_help() {
    for cmd in COMMANDS {
        println!("  {:<28} {}", cmd.usage, cmd.description);
    }
    for (usage, description) in LOCAL_COMMANDS {
        println!("  {:<28} {}", usage, description);
    }
}

fn print_groups(session: &ChatSession) {
    if session.state.groups.is_empty() {
        println!("[CLIENT] No groups yet. /create one or /join <code>");
        return;
    }
    for (i, group) in session.state.groups.iter().enumerate() {
        let marker = if session.state.current_group.as_deref() == Some(group.id.as_str()) { "*" } else { " " };
        println!("{} {:>2}. {}{}", marker, i + 1, group.name, if group.is_private { " (private)" } else { "" });
    }
}

fn print_message(state: &ChatAppState, msg: &ChatMessage) {
    if let Some(target) = &msg.reply_to {
        match state.reply_preview(target) {
            ReplyPreview::Found(original) => println!("    ↪ {}: {}", original.user_id, original.preview(40)),
            ReplyPreview::Missing => println!("    ↪ original message unavailable"),
        }
    }
    let who = if state.is_own_message(msg) { "you" } else { msg.user_id.as_str() };
    let mut line = format!("[{}] {} ({}): {}", msg.created_at.format("%H:%M"), who, msg.id, msg.content);
    if let Some(url) = msg.image_url.as_deref().filter(|_| msg.has_image()) {
        line.push_str(&format!(" [image {}]", url));
    }
    println!("{}", line);
}
