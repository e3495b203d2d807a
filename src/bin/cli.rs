// Signaling relay CLI validation tool
// Exercises a running relay through its health endpoint and WebSocket signaling flow

use clap::{Parser, Subcommand};
use colored::*;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SCENARIOS: [&str; 4] = ["relay", "buffered-offer", "disconnect-notice", "reject-missing-role"];

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Signaling relay CLI validation tool", long_about = None)]
struct Cli {
    /// Server address (default: 127.0.0.1:8080)
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server health endpoint
    Health,

    /// Join a room and print every event received
    Join {
        /// Room key
        #[arg(short, long)]
        room: String,

        /// teacher or student
        #[arg(long, default_value = "student")]
        role: String,

        /// Display name (optional)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Join a room and send signaling messages typed on stdin
    Interactive {
        #[arg(short, long)]
        room: String,

        #[arg(long, default_value = "teacher")]
        role: String,

        #[arg(short, long)]
        name: Option<String>,
    },

    /// Run end-to-end validation scenarios
    Validate {
        /// Run all validation scenarios
        #[arg(short, long)]
        all: bool,

        /// Run a single scenario
        #[arg(short = 'c', long)]
        scenario: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Health => {
            check_health(&cli.server).await;
        }
        Commands::Join { room, role, name } => {
            join_room(&cli.server, room, role, name.as_deref()).await;
        }
        Commands::Interactive { room, role, name } => {
            interactive_mode(&cli.server, room, role, name.as_deref()).await;
        }
        Commands::Validate { all, scenario } => {
            if *all {
                run_all_validations(&cli.server).await;
            } else if let Some(s) = scenario {
                run_scenario(&cli.server, s).await;
            } else {
                println!("{}", "Use --all or --scenario <name>".yellow());
                list_scenarios();
            }
        }
    }
}

fn ws_url(server: &str, room: Option<&str>, role: Option<&str>, name: Option<&str>) -> String {
    let params: Vec<String> = [("room", room), ("role", role), ("name", name)]
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| format!("{}={}", key, urlencoding::encode(v))))
        .collect();

    format!("ws://{}/ws?{}", server, params.join("&"))
}

fn unique_room(scenario: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("validate-{}-{}", scenario, millis)
}

async fn connect_participant(server: &str, room: &str, role: &str, name: Option<&str>) -> Option<WsStream> {
    let url = ws_url(server, Some(room), Some(role), name);

    match connect_async(url.as_str()).await {
        Ok((ws_stream, _)) => Some(ws_stream),
        Err(e) => {
            println!("{} Cannot connect as {}: {}", "✗".red(), role, e);
            None
        }
    }
}

/// Next text frame, or None on close, error or timeout.
async fn next_text(ws: &mut WsStream) -> Option<String> {
    loop {
        match timeout(Duration::from_secs(3), ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return Some(text),
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => return None,
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(e))) => {
                println!("{} Connection error: {}", "✗".red(), e);
                return None;
            }
            Err(_) => {
                println!("{} Timeout waiting for message", "✗".red());
                return None;
            }
        }
    }
}

async fn next_json(ws: &mut WsStream) -> Option<Value> {
    let text = next_text(ws).await?;
    serde_json::from_str(&text).ok()
}

/// Joins a teacher and a student and consumes the join traffic.
async fn join_pair(server: &str, room: &str) -> Option<(WsStream, WsStream)> {
    let mut teacher = connect_participant(server, room, "teacher", Some("validator-teacher")).await?;
    next_json(&mut teacher).await?;

    let mut student = connect_participant(server, room, "student", Some("validator-student")).await?;
    next_json(&mut teacher).await?;
    next_json(&mut student).await?;
    next_json(&mut student).await?;

    Some((teacher, student))
}

fn print_event(text: &str) {
    match serde_json::from_str::<Value>(text) {
        Ok(event) => match event["type"].as_str() {
            Some("joined") => println!(
                "{} joined room {} as {}",
                "◀".green(),
                event["room"].as_str().unwrap_or("?").bold(),
                event["role"].as_str().unwrap_or("?").cyan()
            ),
            Some("info") => println!("{} {}", "◀".yellow(), event["text"].as_str().unwrap_or("").yellow()),
            Some(kind) => println!("{} [{}] {}", "◀".green(), kind.cyan(), text.bright_white()),
            None => println!("{} {}", "◀".green(), text.bright_white()),
        },
        Err(_) => println!("{} {}", "◀".green(), text.bright_white()),
    }
}

async fn check_health(server: &str) {
    println!("{}", "Checking server health...".cyan());

    let url = format!("http://{}/health", server);
    let client = reqwest::Client::new();

    match client.get(&url).send().await {
        Ok(resp) => {
            let status = resp.status();
            if status.is_success() {
                println!("{} Health check passed", "✓".green());

                if let Ok(body) = resp.json::<Value>().await {
                    println!("  Status: {}", body["status"].as_str().unwrap_or("unknown"));
                    println!("  Service: {}", body["service"].as_str().unwrap_or("unknown"));
                    println!("  Version: {}", body["version"].as_str().unwrap_or("unknown"));
                    println!("  Live rooms: {}", body["rooms"]);
                }
            } else {
                println!("{} Health check failed: {}", "✗".red(), status);
            }
        }
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
            println!("  Make sure the server is running on {}", server);
        }
    }
}

async fn join_room(server: &str, room: &str, role: &str, name: Option<&str>) {
    println!("{}", "Joining room...".cyan());
    println!("  Room: {}", room);
    println!("  Role: {}", role);
    if let Some(n) = name {
        println!("  Name: {}", n);
    }

    let Some(mut ws) = connect_participant(server, room, role, name).await else {
        return;
    };

    println!("{} Connected. Press {} to leave.", "✓".green(), "Ctrl+C".bold());

    loop {
        tokio::select! {
            msg = ws.next() => match msg {
                Some(Ok(Message::Text(text))) => print_event(&text),
                Some(Ok(Message::Close(_))) | None => {
                    println!("{} Server closed the connection", "✗".yellow());
                    break;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    println!("{} Connection error: {}", "✗".red(), e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                let _ = ws.close(None).await;
                println!("\n{} Left room", "✓".green());
                break;
            }
        }
    }
}

fn list_scenarios() {
    println!("\n{}", "Available Validation Scenarios:".bold());
    println!("  {} - Answer relayed verbatim to the peer", "relay".cyan());
    println!("  {} - Offer held until the student joins", "buffered-offer".cyan());
    println!("  {} - Peer told when the teacher leaves", "disconnect-notice".cyan());
    println!("  {} - Handshake without role refused", "reject-missing-role".cyan());
    println!("\nExample: relay-cli validate --scenario buffered-offer");
}

async fn validate(server: &str, scenario: &str) -> Option<bool> {
    let result = match scenario {
        "relay" => validate_relay(server).await,
        "buffered-offer" => validate_buffered_offer(server).await,
        "disconnect-notice" => validate_disconnect_notice(server).await,
        "reject-missing-role" => validate_reject_missing_role(server).await,
        _ => return None,
    };
    Some(result)
}

async fn run_scenario(server: &str, scenario: &str) {
    println!("\n{} {}", "Running scenario:".bold(), scenario.cyan());
    println!("{}", "─".repeat(60));

    match validate(server, scenario).await {
        Some(true) => println!("\n{}", "Scenario passed".green().bold()),
        Some(false) => println!("\n{}", "Scenario failed".red().bold()),
        None => {
            println!("{} Unknown scenario: {}", "✗".red(), scenario);
            list_scenarios();
        }
    }
}

async fn run_all_validations(server: &str) {
    println!("\n{}", "Running All Validation Tests".bold().green());
    println!("{}\n", "═".repeat(60).green());

    let mut passed = 0;
    let mut failed = 0;

    for scenario in SCENARIOS {
        println!("\n{} Testing: {}", "▶".cyan(), scenario.bold());
        println!("{}", "─".repeat(60));

        if validate(server, scenario).await == Some(true) {
            passed += 1;
        } else {
            failed += 1;
        }

        sleep(Duration::from_millis(200)).await;
    }

    println!("\n{}", "═".repeat(60).green());
    println!("{}", "Validation Summary".bold());
    println!("{}", "═".repeat(60).green());
    println!("  {} Passed: {}", "✓".green(), passed.to_string().green());
    println!("  {} Failed: {}", "✗".red(), failed.to_string().red());
    println!("  Total: {}", passed + failed);

    if failed == 0 {
        println!("\n{}", "All validations passed!".green().bold());
    } else {
        println!("\n{}", "Some validations failed. Check output above.".yellow());
    }
}

async fn validate_relay(server: &str) -> bool {
    let room = unique_room("relay");
    let Some((mut teacher, mut student)) = join_pair(server, &room).await else {
        println!("{} Could not set up teacher and student", "✗".red());
        return false;
    };

    let answer = json!({"type": "answer", "sdp": "validator-sdp"}).to_string();
    if teacher.send(Message::Text(answer.clone())).await.is_err() {
        println!("{} Failed to send answer", "✗".red());
        return false;
    }

    match next_text(&mut student).await {
        Some(text) if text == answer => {
            println!("{} Student received the answer unmodified", "✓".green());
            true
        }
        Some(text) => {
            println!("{} Unexpected message: {}", "✗".red(), text);
            false
        }
        None => false,
    }
}

async fn validate_buffered_offer(server: &str) -> bool {
    let room = unique_room("buffered");
    let Some(mut teacher) = connect_participant(server, &room, "teacher", None).await else {
        return false;
    };
    if next_json(&mut teacher).await.is_none() {
        return false;
    }

    let offer = json!({"type": "offer", "sdp": "validator-offer"}).to_string();
    if teacher.send(Message::Text(offer.clone())).await.is_err() {
        println!("{} Failed to send offer", "✗".red());
        return false;
    }
    println!("{} Offer sent with no student present", "✓".green());
    sleep(Duration::from_millis(200)).await;

    let Some(mut student) = connect_participant(server, &room, "student", None).await else {
        return false;
    };

    match next_text(&mut student).await {
        Some(text) if text == offer => {
            println!("{} Student received the buffered offer on join", "✓".green());
            true
        }
        Some(text) => {
            println!("{} Expected buffered offer, got: {}", "✗".red(), text);
            false
        }
        None => false,
    }
}

async fn validate_disconnect_notice(server: &str) -> bool {
    let room = unique_room("disconnect");
    let Some((mut teacher, mut student)) = join_pair(server, &room).await else {
        println!("{} Could not set up teacher and student", "✗".red());
        return false;
    };

    let _ = teacher.close(None).await;

    match next_json(&mut student).await {
        Some(event) if event["type"] == "info" && event["from_role"] == "teacher" => {
            println!("{} {}", "✓".green(), event["text"].as_str().unwrap_or(""));
            true
        }
        Some(event) => {
            println!("{} Unexpected event: {}", "✗".red(), event);
            false
        }
        None => false,
    }
}

async fn validate_reject_missing_role(server: &str) -> bool {
    let room = unique_room("reject");
    let url = ws_url(server, Some(room.as_str()), None, None);

    match connect_async(url.as_str()).await {
        Ok(_) => {
            println!("{} Server accepted a handshake without role", "✗".red());
            false
        }
        Err(e) => {
            println!("{} Handshake refused: {}", "✓".green(), e);
            true
        }
    }
}

async fn interactive_mode(server: &str, room: &str, role: &str, name: Option<&str>) {
    println!("\n{}", "Interactive Mode".bold().green());
    println!("{}", "═".repeat(60).green());
    println!("Type {} for help, {} to quit\n", "help".cyan(), "quit".cyan());

    let Some(ws_stream) = connect_participant(server, room, role, name).await else {
        return;
    };
    println!("{} Connected to room {} as {}", "✓".green(), room.bold(), role.cyan());

    let (mut write, mut read) = ws_stream.split();

    // Spawn task to receive messages
    let receive_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = read.next().await {
            if let Message::Text(text) = msg {
                println!();
                print_event(&text);
            }
        }
    });

    loop {
        print!("{} ", "►".cyan());
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        let (command, rest) = input.split_once(' ').unwrap_or((input, ""));
        let payload = match command {
            "quit" | "exit" => {
                println!("Goodbye!");
                break;
            }
            "help" => {
                print_interactive_help();
                continue;
            }
            "offer" => json!({"type": "offer", "sdp": rest}).to_string(),
            "answer" => json!({"type": "answer", "sdp": rest}).to_string(),
            "ice" => json!({"type": "ice-candidate", "candidate": rest}).to_string(),
            "raw" => match serde_json::from_str::<Value>(rest) {
                Ok(parsed) => parsed.to_string(),
                Err(_) => {
                    println!("{} Invalid JSON. Type 'help' for examples.", "✗".yellow());
                    continue;
                }
            },
            _ => {
                println!("{} Unknown command. Type 'help'.", "✗".yellow());
                continue;
            }
        };

        if write.send(Message::Text(payload)).await.is_ok() {
            println!("{} Message sent", "✓".green());
        } else {
            println!("{} Failed to send message", "✗".red());
            break;
        }
    }

    let _ = write.close().await;
    receive_task.abort();
}

fn print_interactive_help() {
    println!("\n{}", "Interactive Mode Commands".bold());
    println!("{}", "─".repeat(60));
    println!("  {} <sdp>        send an offer", "offer".cyan());
    println!("  {} <sdp>       send an answer", "answer".cyan());
    println!("  {} <candidate>    send an ICE candidate", "ice".cyan());
    println!("  {} <json>         send any JSON envelope", "raw".cyan());
    println!("\n{}:", "Example".bold());
    println!(r#"  raw {{"type":"offer","sdp":"v=0","extra":"kept verbatim"}}"#);
    println!("\n{}: quit, exit", "Commands".bold());
    println!();
}
