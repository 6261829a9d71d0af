// marker-bridge: capture marked text and save it under a chosen directory
//
// Commands:
//   marker-bridge run [--root <dir>] [--notify] [--verbose]
//   marker-bridge save [<file> | -] [--root <dir>]
//   marker-bridge parse [<file> | -] [--json]
//   marker-bridge status [--json]

use anyhow::{anyhow, bail, Context, Result};
use crossterm::event::{
    self, DisableFocusChange, EnableFocusChange, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use marker_bridge_lib::{
    config::{expand_home, Config},
    foreground::{
        describe_save, BannerManager, CaptureAgent, CaptureEvent, ClipboardSource, Feedback, Key,
        KeyInput, ModalController, SystemClipboard, TerminalSurface,
    },
    init_tracing, marker,
    persistence::{StateStore, LAST_DIRECTORY_KEY},
    privileged::{FixedPicker, InputGate, LocalStorage, TerminalPicker},
    protocol::{Action, ActionMessage, SaveFilePayload},
    runtime::Bridge,
    transport::Transport,
};
use std::{
    env,
    io::{self, Read},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const KEY_POLL_MS: u64 = 100;
const PAUSED_SLEEP_MS: u64 = 50;

const HELP: &str = r##"marker-bridge - save marked clipboard text to files

USAGE:
    marker-bridge <COMMAND> [OPTIONS]

COMMANDS:
    run                Watch the clipboard and listen for bridge-mode keys
    save [file|-]      Save one marked text block (stdin by default)
    parse [file|-]     Show the marker detected in a text block
    status             Show configuration and the last chosen directory
    help               Show this help message

OPTIONS:
    --root <dir>       Use a fixed target directory instead of prompting
    --notify           Also raise desktop notifications (OSC 9 / OSC 777)
    --json             Output in JSON format (parse, status)
    --verbose, -v      Debug logging (RUST_LOG takes precedence)

KEYS (run):
    Ctrl+B             Open bridge mode
    s / l / d          Save clipboard / load / choose directory
    Esc                Close bridge mode
    Ctrl+C             Quit

MARKERS:
    The first non-blank line names the file, e.g. "// src/app.ts",
    "# notes/todo.md" or "<!-- docs/index.html -->".

ENVIRONMENT:
    MARKER_BRIDGE_DIR, MARKER_BRIDGE_ROOT, MARKER_BRIDGE_FOCUS_ONLY,
    MARKER_BRIDGE_*_TIMEOUT_MS, MARKER_BRIDGE_BANNER_MS, MARKER_BRIDGE_POLL_MS
"##;

fn print_help() {
    print!("{}", HELP);
}

struct Options {
    input: Option<String>,
    root: Option<String>,
    notify: bool,
    json: bool,
    verbose: bool,
}

fn parse_options(args: &[String]) -> Result<Options> {
    let mut options = Options {
        input: None,
        root: None,
        notify: false,
        json: false,
        verbose: false,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--root" | "-r" => {
                i += 1;
                let root = args
                    .get(i)
                    .ok_or_else(|| anyhow!("--root requires a directory"))?;
                options.root = Some(root.clone());
            }
            "--notify" => options.notify = true,
            "--json" => options.json = true,
            "--verbose" | "-v" => options.verbose = true,
            other if other.starts_with("--") => bail!("Unknown option: {}", other),
            other => {
                if options.input.is_some() {
                    bail!("Unexpected argument: {}", other);
                }
                options.input = Some(other.to_string());
            }
        }
        i += 1;
    }

    Ok(options)
}

fn read_input(input: Option<&str>) -> Result<String> {
    match input {
        None | Some("-") => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            Ok(text)
        }
        Some(path) => std::fs::read_to_string(expand_home(path))
            .with_context(|| format!("Failed to read {}", path)),
    }
}

fn start_bridge(config: &Config, gate: &InputGate) -> Bridge {
    let state = Some(StateStore::new(config));
    match &config.target_root {
        Some(root) => {
            info!("Using fixed target root {}", root.display());
            Bridge::start(config, LocalStorage::new(FixedPicker::new(root)), state)
        }
        None => Bridge::start(
            config,
            LocalStorage::new(TerminalPicker::new(gate.clone())),
            state,
        ),
    }
}

enum TerminalInput {
    Key(KeyInput),
    Focus(bool),
    Quit,
}

fn map_key(key: KeyEvent) -> Option<TerminalInput> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let input = match key.code {
        KeyCode::Char(c) if ctrl && c.eq_ignore_ascii_case(&'c') => return Some(TerminalInput::Quit),
        KeyCode::Char(c) if ctrl => KeyInput::ctrl(c),
        KeyCode::Char(c) => KeyInput::char(c),
        KeyCode::Esc => KeyInput::escape(),
        _ => KeyInput {
            key: Key::Other,
            ..KeyInput::escape()
        },
    };
    Some(TerminalInput::Key(input))
}

/// Consume the pending event only if no prompt has paused the gate
fn read_if_open<T>(gate: &InputGate, read: impl FnOnce() -> io::Result<T>) -> Option<io::Result<T>> {
    if gate.is_paused() {
        None
    } else {
        Some(read())
    }
}

/// Blocking terminal reader; stands aside while a directory prompt owns the terminal
fn spawn_key_reader(
    tx: mpsc::UnboundedSender<TerminalInput>,
    gate: InputGate,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while !stop.load(Ordering::SeqCst) {
            if gate.is_paused() {
                thread::sleep(Duration::from_millis(PAUSED_SLEEP_MS));
                continue;
            }
            match event::poll(Duration::from_millis(KEY_POLL_MS)) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!("Terminal poll failed: {}", e);
                    break;
                }
            }
            let input = match read_if_open(&gate, event::read) {
                // A prompt claimed the terminal while we were polling
                None => continue,
                Some(Ok(Event::Key(key))) => map_key(key),
                Some(Ok(Event::FocusGained)) => Some(TerminalInput::Focus(true)),
                Some(Ok(Event::FocusLost)) => Some(TerminalInput::Focus(false)),
                Some(Ok(_)) => None,
                Some(Err(e)) => {
                    warn!("Terminal read failed: {}", e);
                    break;
                }
            };
            if let Some(input) = input {
                if tx.send(input).is_err() {
                    break;
                }
            }
        }
    })
}

fn ready_message(state: &StateStore) -> String {
    match state.get(LAST_DIRECTORY_KEY) {
        Some(name) => format!(
            "Bridge ready: Press Ctrl+B to open (last directory: {})",
            name
        ),
        None => "Bridge ready: Press Ctrl+B to open".to_string(),
    }
}

async fn run(config: Config, notify: bool) -> Result<()> {
    config
        .ensure_dirs()
        .context("Failed to create state directory")?;
    let state = StateStore::new(&config);

    let gate = InputGate::new();
    let bridge = start_bridge(&config, &gate);
    let coordinator: Arc<dyn Transport> = Arc::new(bridge.coordinator_transport());

    let banner = Arc::new(BannerManager::new(
        TerminalSurface::new().with_desktop_notifications(notify),
        config.banner_duration,
    ));
    let clipboard: Arc<dyn ClipboardSource> = Arc::new(SystemClipboard);
    let controller = ModalController::new(
        Arc::clone(&coordinator),
        banner.clone(),
        Arc::clone(&clipboard),
    )
    .with_focus_gate(config.focus_only);
    let agent = Arc::new(CaptureAgent::new(coordinator, banner.clone(), clipboard));
    agent.prime().await;

    enable_raw_mode().context("Failed to enable raw mode")?;
    if let Err(e) = execute!(io::stderr(), EnableFocusChange) {
        debug!("Focus reporting unavailable: {}", e);
    }
    banner.show(&ready_message(&state));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let stop = Arc::new(AtomicBool::new(false));
    let reader = spawn_key_reader(tx, gate, Arc::clone(&stop));

    let mut poll = tokio::time::interval(config.poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = poll.tick() => {
                let agent = Arc::clone(&agent);
                tokio::spawn(async move {
                    agent.check().await;
                });
            }
            input = rx.recv() => match input {
                Some(TerminalInput::Key(key)) => {
                    let agent = Arc::clone(&agent);
                    let event = CaptureEvent::from_key(&key);
                    tokio::spawn(async move {
                        agent.on_event(event).await;
                    });
                    let outcome = controller.on_key(key);
                    if let Some(command) = outcome.command {
                        debug!(?command, state = ?controller.state(), "key command");
                    }
                }
                Some(TerminalInput::Focus(focused)) => controller.set_window_focused(focused),
                Some(TerminalInput::Quit) | None => break,
            },
            _ = &mut ctrl_c => break,
        }
    }

    stop.store(true, Ordering::SeqCst);
    let _ = execute!(io::stderr(), DisableFocusChange);
    let _ = disable_raw_mode();
    eprintln!();
    bridge.shutdown();
    if tokio::task::spawn_blocking(move || reader.join())
        .await
        .is_err()
    {
        warn!("Key reader did not stop cleanly");
    }
    Ok(())
}

async fn save(config: Config, input: Option<&str>) -> Result<()> {
    let from_stdin = matches!(input, None | Some("-"));
    if from_stdin && config.target_root.is_none() && !TerminalPicker::has_terminal() {
        bail!("No terminal for the directory prompt; pass --root or set MARKER_BRIDGE_ROOT");
    }
    let content = read_input(input)?;
    if marker::parse(&content).is_none() {
        bail!("No file marker found on the first non-blank line");
    }
    config
        .ensure_dirs()
        .context("Failed to create state directory")?;

    let bridge = start_bridge(&config, &InputGate::new());
    let result = bridge
        .coordinator_transport()
        .send(ActionMessage::new(
            Action::SaveFile,
            SaveFilePayload { content },
        ))
        .await
        .map_err(|e| e.to_string());
    bridge.shutdown();

    let succeeded = matches!(&result, Ok(response) if response.success);
    let summary = describe_save(result);
    if succeeded {
        println!("{}", summary);
        Ok(())
    } else {
        bail!(summary)
    }
}

fn parse(input: Option<&str>, json: bool) -> Result<()> {
    let text = read_input(input)?;
    let Some(parsed) = marker::parse(&text) else {
        bail!("No file marker found on the first non-blank line");
    };

    if json {
        let value = serde_json::json!({
            "filepath": &parsed.filepath,
            "file_name": parsed.file_name(),
            "body": &parsed.body,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("filepath:  {}", parsed.filepath);
        println!("file name: {}", parsed.file_name());
        println!("body:      {} bytes", parsed.body.len());
    }
    Ok(())
}

fn status(config: &Config, json: bool) -> Result<()> {
    let last_directory = StateStore::new(config).get(LAST_DIRECTORY_KEY);

    if json {
        let value = serde_json::json!({
            "state_dir": config.state_dir(),
            "state_file": config.state_file(),
            "target_root": config.target_root,
            "focus_only": config.focus_only,
            "ready_timeout_ms": config.ready_timeout.as_millis() as u64,
            "grace_timeout_ms": config.grace_timeout.as_millis() as u64,
            "request_timeout_ms": config.request_timeout.as_millis() as u64,
            "last_directory": last_directory,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("State dir:       {}", config.state_dir().display());
    println!("State file:      {}", config.state_file().display());
    match &config.target_root {
        Some(root) => println!("Target root:     {}", root.display()),
        None => println!("Target root:     (prompt)"),
    }
    println!("Focus only:      {}", config.focus_only);
    println!(
        "Timeouts:        ready {:?}, grace {:?}, request {:?}",
        config.ready_timeout, config.grace_timeout, config.request_timeout
    );
    println!(
        "Last directory:  {}",
        last_directory.as_deref().unwrap_or("(none)")
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    let command = args[1].as_str();
    if matches!(command, "help" | "--help" | "-h") {
        print_help();
        return Ok(());
    }

    let options = parse_options(&args[2..])?;
    init_tracing(options.verbose);

    let mut config = Config::from_env();
    if let Some(root) = &options.root {
        config.target_root = Some(expand_home(root));
    }

    match command {
        "run" => run(config, options.notify).await,
        "save" => save(config, options.input.as_deref()).await,
        "parse" => parse(options.input.as_deref(), options.json),
        "status" => status(&config, options.json),
        other => {
            eprintln!("Unknown command: {}", other);
            print_help();
            std::process::exit(1);
        }
    }
}
