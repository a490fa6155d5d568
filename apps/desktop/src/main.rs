use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{bail, Context, Result};
use clap::Parser;
use delivery_core::{
    config::load_settings, push::WsPushChannel, transport::HttpTransport, ClientEvent,
    ControllerDependencies, ConversationController, ConversationSnapshot, Message,
    MessagePresenter, OutgoingFile, Placement, SidebarNotifier, StaticIdentity, ViewRef,
};
use shared::domain::{AccountId, ConversationId, MediaKind, MemberInfo};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    /// TOML settings file; `DELIVERY__*` variables override it.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    account: String,
    #[arg(long)]
    conversation: String,
    #[arg(long)]
    message: Option<String>,
    #[arg(long = "attach")]
    attachments: Vec<PathBuf>,
    /// Keep printing push activity for this many seconds before exiting.
    #[arg(long, default_value_t = 0)]
    listen_secs: u64,
}

#[derive(Default)]
struct StdoutPresenter {
    next_view: AtomicU64,
}

fn display_name(account_id: &AccountId, member_info: &MemberInfo) -> String {
    member_info
        .display_name
        .clone()
        .unwrap_or_else(|| account_id.to_string())
}

impl MessagePresenter for StdoutPresenter {
    fn render(&self, message: &Message, placement: Placement) -> ViewRef {
        let view = ViewRef(self.next_view.fetch_add(1, Ordering::Relaxed) + 1);
        let marker = match placement {
            Placement::Top => '^',
            Placement::Bottom => '+',
        };
        println!(
            "{marker} #{} {}: {} [{:?}, {} media]",
            view.0,
            message.sender_id,
            message.content,
            message.status,
            message.media.len()
        );
        view
    }

    fn refresh(&self, view: ViewRef, message: &Message) {
        println!("~ #{} now {:?}", view.0, message.status);
    }

    fn remove(&self, view: ViewRef) {
        println!("- #{} merged into an existing message", view.0);
    }

    fn set_sent_indicator(&self, view: ViewRef, visible: bool) {
        if visible {
            println!("~ #{} sent", view.0);
        }
    }

    fn move_seen_marker(&self, account_id: &AccountId, member_info: &MemberInfo, view: ViewRef) {
        println!(
            "~ #{} seen by {}",
            view.0,
            display_name(account_id, member_info)
        );
    }

    fn show_typing(&self, account_id: &AccountId, member_info: &MemberInfo) {
        println!("… {} is typing", display_name(account_id, member_info));
    }

    fn hide_typing(&self, _account_id: &AccountId) {}

    fn reset(&self) {
        println!("-- conversation cleared --");
    }
}

struct StdoutSidebar;

impl SidebarNotifier for StdoutSidebar {
    fn conversation_preview_updated(&self, conversation_id: &ConversationId, preview: &str) {
        println!("[sidebar] {conversation_id}: {preview}");
    }

    fn unread_count_changed(&self, conversation_id: &ConversationId) {
        println!("[sidebar] {conversation_id}: unread changed");
    }
}

async fn read_attachment(path: &Path) -> Result<OutgoingFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read attachment {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("attachment.bin")
        .to_string();
    let mime_type = mime_guess::from_path(path).first_raw().map(str::to_string);
    let kind = match mime_type.as_deref() {
        Some(mime) if mime.starts_with("video/") => MediaKind::Video,
        Some(mime) if mime.starts_with("image/") => MediaKind::Image,
        _ => bail!("unsupported attachment type: {}", path.display()),
    };
    let file = OutgoingFile::new(filename, kind, bytes);
    Ok(match mime_type {
        Some(mime) => file.with_mime_type(mime),
        None => file,
    })
}

fn print_snapshot(snapshot: &ConversationSnapshot) {
    println!(
        "== {} (generation {}, {} messages, more history: {}) ==",
        snapshot.conversation_id,
        snapshot.generation,
        snapshot.messages.len(),
        snapshot.has_more
    );
    for (index, message) in snapshot.messages.iter().enumerate() {
        let id = message
            .id
            .as_ref()
            .map_or_else(|| "-".to_string(), ToString::to_string);
        let sent = if snapshot.sent_indicator == Some(index) {
            " (sent)"
        } else {
            ""
        };
        println!(
            "{index:>3} {id} {}: {} [{:?}]{sent}",
            message.sender_id, message.content, message.status
        );
        for marker in snapshot
            .seen_markers
            .iter()
            .filter(|marker| marker.message_index == index)
        {
            println!(
                "    seen by {}",
                display_name(&marker.account_id, &marker.member_info)
            );
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();
    let settings = load_settings(args.config.as_deref())?;

    let transport = HttpTransport::new(settings.server_url.clone(), settings.request_timeout())?;
    let mut dependencies = ControllerDependencies::new(
        Arc::new(transport),
        Arc::new(StaticIdentity(AccountId::new(&args.account))),
    )
    .with_presenter(Arc::new(StdoutPresenter::default()))
    .with_sidebar(Arc::new(StdoutSidebar));

    let push_url = settings.push_url()?;
    let push_events = match WsPushChannel::connect(&push_url, settings.event_buffer()).await {
        Ok((channel, events)) => {
            dependencies = dependencies.with_push_channel(channel);
            Some(events)
        }
        Err(err) => {
            warn!(error = %err, "desktop: continuing without push channel");
            None
        }
    };

    let controller = ConversationController::new(dependencies, &settings);
    let pump = push_events.map(|events| controller.attach_push_stream(events));

    let mut events = controller.subscribe_events();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ClientEvent::MessageFailed {
                    correlation_id,
                    reason,
                    ..
                }) => println!("! send {correlation_id} failed: {reason}"),
                Ok(ClientEvent::Error(message)) => println!("! {message}"),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "desktop: event printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let conversation_id = ConversationId::new(&args.conversation);
    let outcome = controller.open_conversation(&conversation_id).await?;
    println!("opened {conversation_id}: {outcome:?}");

    if args.message.is_some() || !args.attachments.is_empty() {
        let mut files = Vec::with_capacity(args.attachments.len());
        for path in &args.attachments {
            files.push(read_attachment(path).await?);
        }
        let handle = controller
            .send(&conversation_id, args.message.unwrap_or_default(), files)
            .await?;
        println!("submitted {}", handle.correlation_id());
        match handle.settled().await {
            Some(outcome) => println!("settled: {outcome:?}"),
            None => println!("submission task was cancelled"),
        }
    }

    if args.listen_secs > 0 {
        tokio::time::sleep(Duration::from_secs(args.listen_secs)).await;
    }

    if let Some(snapshot) = controller.snapshot().await {
        print_snapshot(&snapshot);
    }
    controller.close_conversation().await;
    if let Some(pump) = pump {
        pump.abort();
    }
    printer.abort();
    Ok(())
}
