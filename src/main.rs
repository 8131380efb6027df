use anyhow::Result;
use kaiwa::avatar::AvatarCueEmitter;
use kaiwa::config::AppConfig;
use kaiwa::inference::InferenceClient;
use kaiwa::messages::Transcript;
use kaiwa::speech::{SpeechInputAdapter, SpeechOutputAdapter};
use kaiwa::turn::{ControllerChannels, ControllerCommand, ControllerEvent, TurnController};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kaiwa=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Kaiwa conversation orchestrator");

    let config = AppConfig::from_env();
    config.validate()?;

    let client = InferenceClient::new(config.inference.clone())?;
    let (inference_tx, inference_rx) = kaiwa::inference::spawn_worker(client);

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let (synthesis_tx, synthesis_rx) = mpsc::unbounded_channel();
    // The console build has no recognition engine; the channel stays open
    // but idle so the spoken entry point reports itself unavailable.
    let (_recognition_tx, recognition_rx) = mpsc::unbounded_channel();

    let controller = TurnController::new(
        SpeechInputAdapter::new(None),
        SpeechOutputAdapter::new(config.speech.clone(), None, synthesis_tx),
        AvatarCueEmitter::new(config.avatar.clone()),
        Transcript::new(),
        inference_tx,
        event_tx,
    );

    let controller_task = tokio::spawn(controller.run(ControllerChannels {
        command_rx,
        recognition_rx,
        inference_rx,
        synthesis_rx,
    }));

    // Read typed input from stdin; /quit and /clear are local commands
    let input_tx = command_tx.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let command = match line.trim() {
                "/quit" => ControllerCommand::Shutdown,
                "/clear" => ControllerCommand::ClearTranscript,
                text => ControllerCommand::SubmitText(text.to_string()),
            };
            let quitting = matches!(command, ControllerCommand::Shutdown);
            if input_tx.send(command).is_err() || quitting {
                break;
            }
        }
    });

    println!("Type a message and press enter. /clear resets the conversation, /quit exits.");

    while let Some(event) = event_rx.recv().await {
        match event {
            ControllerEvent::UserMessage(message) => {
                println!("you: {}", message.text);
            }
            ControllerEvent::AssistantMessage(message) => {
                println!("assistant: {}", message.text);
            }
            ControllerEvent::TurnFailed { message, detail } => {
                warn!("turn failed: {}", detail);
                println!("[{}]", message);
            }
            ControllerEvent::InputDisabled(message) => {
                println!("[{}]", message);
            }
            ControllerEvent::Shutdown => break,
            _ => {}
        }
    }

    controller_task.await?;
    info!("Kaiwa stopped");
    Ok(())
}
