use std::sync::Arc;

use anyhow::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::chat::{
    Attachment, Conversation, ConversationObserver, MessageId, ModelConfig, SubmitOutcome,
};
use crate::core::AppConfig;
use crate::core::logging::init_tracing;
use crate::openai::OpenAiClient;
use crate::thinking::{self, RevealScheduler, RevealState, StreamingTranscript, ThinkingStep};

#[derive(Debug, PartialEq)]
enum Input<'a> {
    Clear,
    Image(&'a str),
    Message(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    if line == "/clear" {
        return Input::Clear;
    }
    match line.strip_prefix("/image") {
        Some(path) if path.is_empty() || path.starts_with(char::is_whitespace) => {
            Input::Image(path.trim())
        }
        _ => Input::Message(line),
    }
}

fn print_step(number: usize, step: &ThinkingStep) {
    println!("  Step {}: {}", number, step.title);
    for line in step.content.lines() {
        println!("    {}", line);
    }
}

/// Print each step as the scheduler makes it visible. Returns once all
/// steps are out or the schedule goes away.
async fn print_steps(steps: Vec<ThinkingStep>, mut progress: watch::Receiver<RevealState>) {
    let mut printed = 0;
    loop {
        let visible = progress.borrow_and_update().visible().min(steps.len());
        for (idx, step) in steps.iter().enumerate().take(visible).skip(printed) {
            print_step(idx + 1, step);
        }
        printed = printed.max(visible);

        if printed >= steps.len() || progress.changed().await.is_err() {
            break;
        }
    }
}

/// Renders a streaming reply to the terminal.
#[derive(Default)]
struct TerminalRenderer {
    announced: bool,
    printer: Option<JoinHandle<()>>,
}

impl ConversationObserver for TerminalRenderer {
    fn on_reply(&mut self, id: MessageId, reply: &StreamingTranscript, reveal: &RevealScheduler) {
        if reply.is_open() && !self.announced {
            println!("Thinking...");
            self.announced = true;
        }

        // The steps are final once the block closes
        if reply.is_closed() && self.printer.is_none() {
            if let Some(progress) = reveal.subscribe(id) {
                let steps = reply.thinking().to_vec();
                self.printer = Some(tokio::spawn(print_steps(steps, progress)));
            }
        }
    }
}

impl TerminalRenderer {
    async fn finish(self) {
        if let Some(printer) = self.printer {
            if let Err(e) = printer.await {
                tracing::warn!("Printing thinking steps failed: {}", e);
            }
        }
    }
}

pub async fn run() -> Result<()> {
    init_tracing(&format!("{}=warn", env!("CARGO_CRATE_NAME")));

    let config = AppConfig::default();
    let service = Arc::new(OpenAiClient::from_config(&config));
    let mut conversation = Conversation::new(
        service,
        ModelConfig::from(&config),
        config.reveal_interval(),
    );

    let mut rl = DefaultEditor::new()?;
    let mut pending_attachment: Option<Attachment> = None;

    println!("Type a message. `/image <path>` attaches an image, `/clear` starts over.");

    loop {
        let readline = rl.readline(">>> ");
        let line = match readline {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        };
        let _ = rl.add_history_entry(line.as_str());

        match parse_input(&line) {
            Input::Clear => {
                conversation.clear();
                pending_attachment = None;
                println!("Conversation cleared.");
            }
            Input::Image("") => println!("Usage: /image <path>"),
            Input::Image(path) => match Attachment::from_path(path) {
                Ok(attachment) => {
                    println!("Attached {}. It will be sent with your next message.", path);
                    pending_attachment = Some(attachment);
                }
                Err(e) => println!("Error: {}", e),
            },
            Input::Message(text) => {
                let mut renderer = TerminalRenderer::default();
                let outcome = conversation
                    .submit(text, pending_attachment.take(), &mut renderer)
                    .await;
                renderer.finish().await;

                match outcome {
                    SubmitOutcome::Ignored => {}
                    SubmitOutcome::Completed(_) => {
                        if let Some(reply) = conversation.messages().last() {
                            println!("{}", thinking::parse(reply.content()).answer);
                        }
                    }
                    SubmitOutcome::Failed(message) => println!("Error: {}", message),
                }
            }
        }
    }

    Ok(())
}
