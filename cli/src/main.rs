#[cfg(test)]
#[path = "main_test.rs"]
mod main_test;

mod display;
mod session;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use layers::consts::UNOWNED;
use layers::engine::{EngineError, ProtocolEngine};
use layers::error::ErrorCode;
use layers::layer::{LayerId, LayerKind};
use layers::protocol::ProtocolError;
use layers::raster::{Color, Stroke};
use layers::text::TextInfo;
use tokio::time::Instant;

use crate::display::RoomRow;
use crate::session::Session;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid relay URL: {0}")]
    InvalidUrl(String),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue),
    #[error("websocket failed: {0}")]
    Ws(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("websocket closed")]
    WsClosed,
    #[error("timed out waiting for the relay")]
    Timeout,
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("layer {layer} went to user {owner} first")]
    OwnerChanged { layer: LayerId, owner: u32 },
    #[error("layer {0} was deleted")]
    LayerGone(LayerId),
    #[error("user {0} owns no paint layer")]
    NoPaintLayer(u32),
    #[error("invalid color {0:?}; expected #rrggbb or #rrggbbaa")]
    InvalidColor(String),
}

impl ErrorCode for CliError {
    fn error_code(&self) -> &'static str {
        match self {
            CliError::InvalidUrl(_) => "E_INVALID_URL",
            CliError::Http(_) => "E_HTTP",
            CliError::InvalidHeader(_) => "E_INVALID_HEADER",
            CliError::Ws(_) => "E_WEBSOCKET",
            CliError::WsClosed => "E_WS_CLOSED",
            CliError::Timeout => "E_TIMEOUT",
            CliError::Engine(err) => err.error_code(),
            CliError::Protocol(err) => err.error_code(),
            CliError::OwnerChanged { .. } => "E_OWNER_CHANGED",
            CliError::LayerGone(_) => "E_LAYER_GONE",
            CliError::NoPaintLayer(_) => "E_NO_PAINT_LAYER",
            CliError::InvalidColor(_) => "E_INVALID_COLOR",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "layerboard-cli", about = "Headless layerboard client")]
struct Cli {
    #[arg(long, env = "LAYERBOARD_URL", default_value = "ws://127.0.0.1:8080/ws")]
    url: String,

    /// Session token; the relay issues a fresh user id without one.
    #[arg(long, env = "LAYERBOARD_SESSION")]
    session: Option<String>,

    /// Seconds to wait for each relay echo.
    #[arg(long, default_value_t = 5)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the layer stack and presence on every change.
    Watch {
        /// Stop after this many seconds.
        #[arg(long)]
        duration_secs: Option<u64>,
    },
    /// Draw one stroke on your own paint layer.
    Draw(DrawArgs),
    /// Create a text layer and set its content.
    Text(TextArgs),
    /// Set your display name.
    Rename { name: String },
    /// Take ownership of an unowned layer.
    Claim { layer: LayerId },
    /// Give up ownership of a layer.
    Release { layer: LayerId },
    /// List public rooms.
    Rooms,
}

#[derive(Args, Debug)]
struct DrawArgs {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    #[arg(long, default_value = "#000000")]
    color: String,
    #[arg(long, default_value_t = 5.0)]
    width: f64,
    /// Erase instead of paint.
    #[arg(long, default_value_t = false)]
    erase: bool,
    /// Paint layer to draw on; defaults to your first one.
    #[arg(long)]
    layer: Option<LayerId>,
}

#[derive(Args, Debug)]
struct TextArgs {
    content: String,
    #[arg(long)]
    x: Option<i32>,
    #[arg(long)]
    y: Option<i32>,
    #[arg(long)]
    font_size: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let timeout = Duration::from_secs(cli.timeout_secs);

    if matches!(cli.command, Command::Rooms) {
        return list_rooms(&cli.url).await;
    }

    let mut session = Session::connect(&cli.url, cli.session.as_deref(), timeout).await?;
    match cli.command {
        Command::Watch { duration_secs } => watch(&mut session, duration_secs.map(Duration::from_secs)).await?,
        Command::Draw(args) => draw(&mut session, args).await?,
        Command::Text(args) => text(&mut session, args).await?,
        Command::Rename { name } => rename(&mut session, &name).await?,
        Command::Claim { layer } => {
            let request = session.engine().request_claim(layer)?;
            session.send(request).await?;
            let me = session.engine().local_user();
            await_owner(&mut session, layer, UNOWNED, me).await?;
            println!("claimed layer {layer}");
        }
        Command::Release { layer } => {
            let request = session.engine().request_release(layer)?;
            session.send(request).await?;
            let me = session.engine().local_user();
            await_owner(&mut session, layer, me, UNOWNED).await?;
            println!("released layer {layer}");
        }
        Command::Rooms => {}
    }
    session.close().await
}

/// Wait for `layer`'s owner to move off `from`, then require it to be `to`.
async fn await_owner(session: &mut Session, layer: LayerId, from: u32, to: u32) -> Result<(), CliError> {
    session.wait_for(|e| ownership_settled(e, layer, from, to).is_some()).await?;
    ownership_settled(session.engine(), layer, from, to).unwrap_or(Err(CliError::Timeout))
}

/// `None` while the owner is still `from`.
fn ownership_settled(engine: &ProtocolEngine, layer: LayerId, from: u32, to: u32) -> Option<Result<(), CliError>> {
    match engine.registry().get(layer).map(|l| l.owner) {
        Some(owner) if owner == from => None,
        Some(owner) if owner == to => Some(Ok(())),
        Some(owner) => Some(Err(CliError::OwnerChanged { layer, owner })),
        None => Some(Err(CliError::LayerGone(layer))),
    }
}

async fn list_rooms(ws_url: &str) -> Result<(), CliError> {
    let url = display::rooms_url(ws_url).ok_or_else(|| CliError::InvalidUrl(ws_url.to_owned()))?;
    let rooms: Vec<RoomRow> = reqwest::get(&url).await?.error_for_status()?.json().await?;
    print!("{}", display::render_rooms(&rooms));
    Ok(())
}

async fn watch(session: &mut Session, duration: Option<Duration>) -> Result<(), CliError> {
    let changed = Arc::new(AtomicBool::new(true));
    {
        let engine = session.engine_mut();
        let flag = Arc::clone(&changed);
        engine.registry_mut().subscribe(move |_| flag.store(true, Ordering::Relaxed));
        let flag = Arc::clone(&changed);
        engine.directory_mut().subscribe(move |_| flag.store(true, Ordering::Relaxed));
    }

    let deadline = duration.map(|d| Instant::now() + d);
    loop {
        if changed.swap(false, Ordering::Relaxed) {
            println!("{}", display::render_state(session.engine()));
        }
        let wait = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Ok(());
                }
                remaining
            }
            None => Duration::from_secs(60),
        };
        session.pump(wait).await?;
    }
}

async fn draw(session: &mut Session, args: DrawArgs) -> Result<(), CliError> {
    let me = session.engine().local_user();
    let layer = match args.layer {
        Some(layer) => layer,
        None => session
            .engine()
            .registry()
            .owned_by(me)
            .find(|l| l.kind() == LayerKind::Paint)
            .map(|l| l.id)
            .ok_or(CliError::NoPaintLayer(me))?,
    };

    let stroke = if args.erase {
        Stroke::erase(args.x1, args.y1, args.x2, args.y2, args.width)
    } else {
        let color = Color::parse_hex(&args.color).ok_or_else(|| CliError::InvalidColor(args.color.clone()))?;
        Stroke::line(args.x1, args.y1, args.x2, args.y2, color, args.width)
    };

    match session.engine_mut().draw_segment(layer, &stroke)? {
        Some(patch) => {
            session.send(patch).await?;
            println!("drew on layer {layer}");
        }
        None => println!("stroke is off the canvas; nothing sent"),
    }
    Ok(())
}

async fn text(session: &mut Session, args: TextArgs) -> Result<(), CliError> {
    let me = session.engine().local_user();
    let before: HashSet<LayerId> = session.engine().registry().ids().into_iter().collect();

    let request = session.engine_mut().request_create(LayerKind::Text);
    session.send(request).await?;
    session.wait_for(|e| new_text_layer(e, &before, me).is_some()).await?;
    let layer = new_text_layer(session.engine(), &before, me).ok_or(CliError::Timeout)?;
    // Absorb the default record that follows the create echo.
    session.settle().await?;

    let mut info = TextInfo::default_for(session.engine().size());
    info.text_content = args.content;
    info.x = args.x.unwrap_or(info.x);
    info.y = args.y.unwrap_or(info.y);
    info.font_size = args.font_size.unwrap_or(info.font_size);

    let set = session.engine_mut().set_text(layer, info)?;
    session.send(set).await?;
    println!("created text layer {layer}");
    Ok(())
}

/// A text layer owned by `me` that was not in `before`.
fn new_text_layer(engine: &ProtocolEngine, before: &HashSet<LayerId>, me: u32) -> Option<LayerId> {
    engine
        .registry()
        .owned_by(me)
        .find(|l| l.kind() == LayerKind::Text && !before.contains(&l.id))
        .map(|l| l.id)
}

async fn rename(session: &mut Session, name: &str) -> Result<(), CliError> {
    let request = session.engine().request_set_username(name)?;
    session.send(request).await?;
    let me = session.engine().local_user();
    let wanted = name.trim().to_owned();
    session.wait_for(|e| e.directory().name(me) == wanted).await?;
    println!("you are now {wanted}");
    Ok(())
}
