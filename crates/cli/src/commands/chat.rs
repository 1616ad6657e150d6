//! `deliberate chat`: single-message or interactive chat.

use deliberate_agent::{AdvisorChain, ChainStreamEvent, standard_chain};
use deliberate_config::AppConfig;
use deliberate_core::message::ConversationId;
use deliberate_memory::InMemoryChatMemory;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(message: Option<String>, stream: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let provider = deliberate_providers::provider_from_config(&config)?;

    let runtime = super::start_runtime(&config).await?;
    let chain = standard_chain(
        &config,
        provider,
        Arc::new(InMemoryChatMemory::new()),
        runtime.registry(),
    );
    let conversation = ConversationId::new();

    let result = match message {
        Some(text) => answer(&chain, &conversation, &text, stream).await,
        None => interactive(&chain, &conversation, &config, runtime.descriptors().len(), stream).await,
    };

    super::stop_runtime(runtime).await;
    result
}

async fn interactive(
    chain: &AdvisorChain,
    conversation: &ConversationId,
    config: &AppConfig,
    tool_count: usize,
    stream: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.default_model);
    println!("  Advisors:  {}", chain.advisor_names().join(" → "));
    println!("  Tools:     {tool_count}");
    println!();
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        if let Err(e) = answer(chain, conversation, line, stream).await {
            eprintln!("  [Error] {e}");
        }
        println!();
    }

    println!();
    Ok(())
}

async fn answer(
    chain: &AdvisorChain,
    conversation: &ConversationId,
    text: &str,
    stream: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let request = chain.request(conversation.clone(), text);

    if !stream {
        let response = chain.call(request).await?;
        println!("{}", response.final_text().unwrap_or_default());
        if response.context.force_stopped {
            eprintln!("  (reasoning stopped after {} rounds)", response.context.iterations);
        }
        return Ok(());
    }

    let mut events = chain.stream(request).await?;
    let mut streamed = String::new();
    while let Some(event) = events.recv().await {
        match event {
            ChainStreamEvent::Chunk { content } => {
                print!("{content}");
                std::io::stdout().flush()?;
                streamed.push_str(&content);
            }
            ChainStreamEvent::ToolCall { name, .. } => eprintln!("\n  [tool] {name}"),
            ChainStreamEvent::ToolResult { name, success, .. } if !success => {
                eprintln!("  [tool] {name} failed");
            }
            ChainStreamEvent::ToolResult { .. } => {}
            ChainStreamEvent::Done { answer, revised, .. } => {
                println!();
                if revised && let Some(answer) = answer.filter(|a| *a != streamed) {
                    println!();
                    println!("  Revised answer:");
                    println!("{answer}");
                }
            }
            ChainStreamEvent::Error { message } => return Err(message.into()),
        }
    }
    Ok(())
}
