//! QuantumViz voice client.
//!
//! Wires the controller loop to the real effect runner and drives it from
//! stdin: one command per line for recording, typed chat, and the
//! circuit-generation endpoints.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use quantumviz_voice::backend::{BackendClient, HtmlFiles};
use quantumviz_voice::effects::VoiceEffectRunner;
use quantumviz_voice::state_machine::Event;
use quantumviz_voice::{settings, ControllerHandle, UiState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env if present; production uses real environment variables.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = settings::load();
    tracing::info!(backend = %settings.backend_url, "starting quantumviz voice client");

    let backend = Arc::new(BackendClient::new(
        &settings.backend_url,
        settings.request_timeout(),
    )?);

    let runner = Arc::new(VoiceEffectRunner::new(backend.clone()));
    let controller = ControllerHandle::spawn(runner);

    // Print every published snapshot so the terminal mirrors what a UI
    // would render.
    let mut ui = controller.ui();
    tokio::spawn(async move {
        while ui.changed().await.is_ok() {
            let snapshot = ui.borrow_and_update().clone();
            match &snapshot.state {
                UiState::Recording { elapsed_secs } => {
                    println!("[recording {}s]", elapsed_secs);
                }
                UiState::Error { message } => println!("[error] {}", message),
                other => {
                    if let Ok(tag) = serde_json::to_value(other) {
                        println!("[{}]", tag["status"].as_str().unwrap_or("?"));
                    }
                }
            }
            if let Some(last) = snapshot.messages.last() {
                let who = if last.is_user { "you" } else { "quantumviz" };
                println!("{}: {}", who, last.text);
            }
        }
    });

    println!("commands: record | stop | cancel | send <text> | audio <path> | gen <prompt> | code <prompt> | image <path> | quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (cmd, rest) = match line.split_once(' ') {
            Some((cmd, rest)) => (cmd, rest.trim()),
            None => (line, ""),
        };

        match cmd {
            "" => {}
            "record" => controller.send(Event::StartRecording).await?,
            "stop" => controller.send(Event::StopRecording).await?,
            "cancel" => controller.send(Event::Cancel).await?,
            "send" => {
                controller
                    .send(Event::SendText {
                        text: rest.to_string(),
                    })
                    .await?
            }
            "gen" => match backend.process_prompt(rest).await {
                Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                Err(e) => eprintln!("prompt failed: {}", e),
            },
            "code" => match backend.get_qiskit_code(rest).await {
                Ok(generated) => {
                    println!("{}", generated.code);
                    match &generated.html_files {
                        HtmlFiles::Names(names) => {
                            for name in names {
                                println!("plot: {}", backend.plot_file_url(name));
                            }
                        }
                        HtmlFiles::Documents(docs) => {
                            for name in docs.keys() {
                                println!("plot document: {}", name);
                            }
                        }
                    }
                }
                Err(e) => eprintln!("code generation failed: {}", e),
            },
            // Transcribe a prerecorded audio file through the chat widget's
            // endpoint and dispatch the resulting text as a turn.
            "audio" => match tokio::fs::read(rest).await {
                Ok(bytes) => match backend.chat_transcribe_audio(vec![bytes.into()]).await {
                    Ok(text) => {
                        controller.send(Event::SendText { text }).await?;
                    }
                    Err(e) => eprintln!("audio transcription failed: {}", e),
                },
                Err(e) => eprintln!("could not read {}: {}", rest, e),
            },
            "image" => match tokio::fs::read(rest).await {
                Ok(bytes) => match backend.process_image(rest, bytes).await {
                    Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                    Err(e) => eprintln!("image upload failed: {}", e),
                },
                Err(e) => eprintln!("could not read {}: {}", rest, e),
            },
            "quit" | "exit" => {
                controller.send(Event::Exit).await?;
                break;
            }
            other => eprintln!("unknown command: {}", other),
        }
    }

    Ok(())
}
