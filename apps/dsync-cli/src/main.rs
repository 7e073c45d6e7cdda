//! # DSync CLI
//!
//! A standalone CLI for watching differential synchronization at work.
//! The `demo` and `offline` commands run a client against an in-memory relay
//! that keeps its own copy of the document; `connect` follows a document on
//! a real WebSocket sync server.
//!
//! ## Relay model
//!
//! ```text
//! client ──add/patch──▶ relay     relay applies the client's diffs to its copy
//! client ◀──edits────── relay     numbered by server version, may repeat
//! ```

use std::fmt::Display;

use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use dsync_sdk::{
    memory_network, ClientConfigBuilder, Document, DocumentId, Edit, JsonPatchStrategy,
    MemoryConnector, MemoryListener, MemoryPeer, Message, PatchMessage, PatchOperation, SdkError,
    Strategy, SyncClient, TextDiffStrategy, TransportError, WebSocketConnector,
};
use serde_json::{json, Value};

// ─── CLI ───────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "dsync-cli")]
#[command(about = "Differential synchronization explorer (DSync SDK)")]
#[command(version)]
struct Cli {
    /// Log protocol internals (same as RUST_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Local edit, remote edit, duplicate delivery and version gap
    Demo,
    /// Edit while disconnected, reconnect and flush the coalesced queue
    Offline {
        /// Number of edits made while offline
        #[arg(short, long, default_value_t = 5)]
        edits: usize,
    },
    /// Connect to a WebSocket sync server and follow one document
    Connect {
        /// Server URL, e.g. ws://localhost:7777/sync
        url: String,
        /// Document id
        #[arg(long, default_value = "notes")]
        id: String,
        /// Diff strategy
        #[arg(long, value_enum, default_value_t = StrategyKind::Json)]
        strategy: StrategyKind,
        /// Initial content (JSON for `json`, plain text for `text`)
        #[arg(long)]
        content: Option<String>,
        /// Client id (defaults to a fresh ULID)
        #[arg(long)]
        client_id: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyKind {
    Json,
    Text,
}

// ─── Relay: the server end of an in-memory connection ─────────────────────

struct Relay {
    peer: MemoryPeer,
    id: DocumentId,
    content: Value,
    server_version: u64,
}

impl Relay {
    fn new(peer: MemoryPeer, id: DocumentId) -> Self {
        Self {
            peer,
            id,
            content: Value::Null,
            server_version: 0,
        }
    }

    /// Read and apply everything the client sent, printing each frame.
    fn absorb(&mut self) -> usize {
        let frames = self.peer.drain();
        for frame in &frames {
            wire("client", "relay", frame);
            match serde_json::from_str::<Message<Value, PatchOperation>>(frame) {
                Ok(Message::Add(doc)) => {
                    self.content = doc.content;
                    self.server_version = 0;
                }
                Ok(Message::Patch(msg)) => {
                    for edit in msg.edits {
                        match JsonPatchStrategy.apply(&self.content, &edit.diffs) {
                            Ok(next) => self.content = next,
                            Err(e) => {
                                step(&format!("relay rejected edit: {}", e).red().to_string())
                            }
                        }
                    }
                }
                Err(e) => step(&format!("relay could not decode frame: {}", e)),
            }
        }
        frames.len()
    }

    /// Change the relay's copy and return the edit frame for it.
    fn edit(&mut self, next: Value) -> Result<String, SdkError> {
        let diffs = JsonPatchStrategy.diff(&self.content, &next);
        let frame = self.frame(self.server_version, diffs)?;
        self.content = next;
        self.server_version += 1;
        Ok(frame)
    }

    fn frame(&self, server_version: u64, diffs: Vec<PatchOperation>) -> Result<String, SdkError> {
        let msg = PatchMessage {
            id: self.id.clone(),
            client_id: "relay".to_string(),
            edits: vec![Edit::new(0, server_version, diffs)],
        };
        Ok(serde_json::to_string(&msg)?)
    }

    fn send(&self, frame: &str) -> Result<(), SdkError> {
        wire("relay", "client", frame);
        self.peer.send(frame)?;
        Ok(())
    }
}

// ─── Pretty printing ──────────────────────────────────────────────────────

fn header(text: &str) {
    let bar = "═".repeat(60);
    println!("\n{}", bar.bright_cyan());
    println!("  {}", text.bold().bright_white());
    println!("{}", bar.bright_cyan());
}

fn section(text: &str) {
    println!("\n{} {}", "▸".bright_yellow(), text.bold());
}

fn step(text: &str) {
    println!("  {} {}", "•".bright_green(), text);
}

fn wire(from: &str, to: &str, frame: &str) {
    println!(
        "  {} {} {}  {}",
        from.bright_magenta(),
        "──▶".bright_cyan(),
        to.bright_magenta(),
        frame.dimmed()
    );
}

fn show_state(client: &SyncClient<MemoryConnector>, relay: &Relay) {
    let border = "─".repeat(56);
    println!("  ┌{}┐", border);
    if let (Some(doc), Some(shadow)) = (
        client.document(&relay.id),
        client.engine().get_shadow(&relay.id),
    ) {
        println!("  │ {:<54} │", format!("client document: {}", doc.content));
        println!(
            "  │ {:<54} │",
            format!(
                "client shadow:   v(client={}, server={})",
                shadow.client_version, shadow.server_version
            )
        );
    }
    println!("  │ {:<54} │", format!("relay copy:      {}", relay.content));
    println!("  └{}┘", border);
}

fn convergence_result(converged: bool) {
    if converged {
        println!(
            "\n  {} {}",
            "✓".bright_green().bold(),
            "CONVERGED: client and relay hold the same document"
                .bright_green()
                .bold()
        );
    } else {
        println!(
            "\n  {} {}",
            "✗".bright_red().bold(),
            "DIVERGENCE DETECTED: client and relay differ"
                .bright_red()
                .bold()
        );
    }
}

fn converged(client: &SyncClient<MemoryConnector>, relay: &Relay) -> bool {
    client
        .document(&relay.id)
        .map(|doc| doc.content == relay.content)
        .unwrap_or(false)
}

fn demo_client(
    connector: MemoryConnector,
    client_id: &str,
) -> Result<SyncClient<MemoryConnector>, SdkError> {
    let config = ClientConfigBuilder::new()
        .server_url("mem://relay")
        .client_id(client_id)
        .on_open(|| step(&"on_open: connection established".bright_green().to_string()))
        .on_close(|| step(&"on_close: connection closed".bright_yellow().to_string()))
        .on_sync(|doc| step(&format!("on_sync: {} = {}", doc.id, doc.content)))
        .on_error(|err| step(&format!("on_error: {}", err).bright_red().to_string()))
        .build();
    SyncClient::new(config, connector)
}

async fn deliver(client: &mut SyncClient<MemoryConnector>) -> Result<(), SdkError> {
    match client.next_event().await {
        Some(result) => result,
        None => Err(TransportError::Closed.into()),
    }
}

fn accept(listener: &mut MemoryListener, id: &DocumentId) -> Result<Relay, SdkError> {
    let peer = listener
        .try_accept()
        .ok_or(TransportError::ConnectionFailed("relay did not accept".to_string()))?;
    Ok(Relay::new(peer, id.clone()))
}

// ─── Demo ──────────────────────────────────────────────────────────────────

async fn run_demo() -> Result<(), SdkError> {
    header("DEMO: Differential Sync over an In-Memory Relay");

    section("Phase 1: Connect and register a document");
    let (connector, mut listener) = memory_network();
    let mut client = demo_client(connector, "alice")?;
    let id = DocumentId::from("groceries");

    client.connect().await?;
    let mut relay = accept(&mut listener, &id)?;
    client
        .add_document(Document::new(
            id.clone(),
            "alice",
            json!({ "title": "Groceries", "items": ["milk"] }),
        ))
        .await?;
    relay.absorb();
    show_state(&client, &relay);

    section("Phase 2: Local edit, staged on the shadow and synced");
    if let Some(shadow) = client.shadow_mut(&id) {
        shadow.content = json!({ "title": "Groceries", "items": ["milk", "eggs"] });
    }
    step("alice: items += \"eggs\"");
    client.sync(&id).await?;
    relay.absorb();
    show_state(&client, &relay);

    section("Phase 3: Remote edit from the relay");
    let mut next = relay.content.clone();
    if let Some(fields) = next.as_object_mut() {
        fields.insert("title".to_string(), json!("Weekly groceries"));
    }
    let frame = relay.edit(next)?;
    relay.send(&frame)?;
    deliver(&mut client).await?;
    show_state(&client, &relay);

    section("Phase 4: The same edit delivered twice");
    let before = client.engine().get_shadow(&id).map(|s| s.server_version);
    relay.send(&frame)?;
    deliver(&mut client).await?;
    let after = client.engine().get_shadow(&id).map(|s| s.server_version);
    if before == after {
        step(&format!(
            "Idempotent ✓  server version stayed {}",
            after.unwrap_or_default()
        ));
    } else {
        step(&format!("IDEMPOTENCE FAILURE: {:?} → {:?} ✗", before, after));
    }

    section("Phase 5: Version gap, the client resyncs");
    let gap = relay.frame(relay.server_version + 3, Vec::new())?;
    relay.send(&gap)?;
    deliver(&mut client).await?;
    relay.absorb();
    show_state(&client, &relay);

    convergence_result(converged(&client, &relay));
    Ok(())
}

// ─── Offline ───────────────────────────────────────────────────────────────

async fn run_offline(edits: usize) -> Result<(), SdkError> {
    header("OFFLINE: Queue While Disconnected, Flush on Reconnect");

    section("Phase 1: Connect and register a counter document");
    let (connector, mut listener) = memory_network();
    let mut client = demo_client(connector, "bob")?;
    let id = DocumentId::from(1);

    client.connect().await?;
    let mut relay = accept(&mut listener, &id)?;
    client
        .add_document(Document::new(id.clone(), "bob", json!({ "count": 0 })))
        .await?;
    relay.absorb();

    section("Phase 2: Go offline and keep editing");
    client.disconnect().await?;
    listener.set_online(false);
    for _ in 0..edits {
        if let Some(shadow) = client.shadow_mut(&id) {
            let count = shadow.content["count"].as_u64().unwrap_or(0);
            shadow.content = json!({ "count": count + 1 });
        }
        client.sync(&id).await?;
    }
    step(&format!(
        "{} edits made offline, {} queued message(s)",
        edits,
        client.queue().len()
    ));
    show_state(&client, &relay);

    section("Phase 3: Reconnect attempt while the relay is unreachable");
    if client.connect().await.is_err() {
        step(&format!("still {:?}, queue kept", client.state()));
    }

    section("Phase 4: Relay back online, queue flushed");
    listener.set_online(true);
    client.connect().await?;
    relay.peer = accept(&mut listener, &id)?.peer;
    let frames = relay.absorb();
    step(&format!("{} frame(s) delivered", frames));
    show_state(&client, &relay);

    convergence_result(converged(&client, &relay));
    Ok(())
}

// ─── Connect ───────────────────────────────────────────────────────────────

async fn follow<S>(
    url: String,
    client_id: Option<String>,
    strategy: S,
    id: String,
    content: S::Content,
) -> Result<(), SdkError>
where
    S: Strategy,
    S::Content: Display,
{
    let mut builder = ClientConfigBuilder::with_strategy(strategy)
        .server_url(url)
        .on_open(|| step(&"connected".bright_green().to_string()))
        .on_close(|| step(&"connection closed".bright_yellow().to_string()))
        .on_sync(|doc| step(&format!("{} = {}", doc.id.to_string().bright_white(), doc.content)))
        .on_error(|err| step(&err.to_string().bright_red().to_string()));
    if let Some(client_id) = client_id {
        builder = builder.client_id(client_id);
    }

    let mut client = SyncClient::new(builder.build(), WebSocketConnector)?;
    header(&format!("CONNECT: {} as {}", client.server_url(), client.client_id()));
    client.connect().await?;
    let doc = Document::new(id, client.client_id().to_string(), content);
    client.add_document(doc).await?;
    client.run().await
}

async fn run_connect(
    url: String,
    id: String,
    strategy: StrategyKind,
    content: Option<String>,
    client_id: Option<String>,
) -> Result<(), SdkError> {
    match strategy {
        StrategyKind::Json => {
            let content: Value = serde_json::from_str(content.as_deref().unwrap_or("{}"))?;
            follow(url, client_id, JsonPatchStrategy, id, content).await
        }
        StrategyKind::Text => {
            let content = content.unwrap_or_default();
            follow(url, client_id, TextDiffStrategy, id, content).await
        }
    }
}

// ─── Entry point ───────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let result = match cli.command {
        Commands::Demo => run_demo().await,
        Commands::Offline { edits } => run_offline(edits).await,
        Commands::Connect {
            url,
            id,
            strategy,
            content,
            client_id,
        } => run_connect(url, id, strategy, content, client_id).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "error:".bright_red().bold(), e);
        std::process::exit(1);
    }
}
