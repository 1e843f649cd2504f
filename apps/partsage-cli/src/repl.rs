//! Interactive chat loop. Input, output and the interrupt source are passed
//! in so the loop runs the same against a terminal or a test buffer.
use anyhow::Result;
use chrono::Utc;
use std::fmt::Write as _;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use partsage_agent::Assistant;
use partsage_core::types::AnswerPayload;

use crate::conversation::{ConversationStats, ConversationStore};

pub const BANNER: &str = "Ask about refrigerator or dishwasher parts. Ctrl-C cancels an answer or exits at the prompt. \
Commands: /new /reset /regen /stats /threads /quit";

/// Forwards every Ctrl-C to one channel for the life of the process.
pub fn forward_interrupts() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).is_err() { break; }
        }
    });
    rx
}

pub fn render_payload(payload: &AnswerPayload) -> String {
    let mut out = format!("\n{}\n\n", payload.text);
    for citation in &payload.citations {
        match citation.urls.first() {
            Some(url) => { let _ = writeln!(out, "  📎 {} {url}", citation.label); }
            None => { let _ = writeln!(out, "  📎 {}", citation.label); }
        }
    }
    let intent = payload.intent.map(|i| i.as_str()).unwrap_or("-");
    let _ = writeln!(
        out,
        "\n  [{intent} | {:?} | structured={} semantic={} fallback={}]",
        payload.outcome, payload.sources.structured, payload.sources.semantic, payload.sources.semantic_fallback
    );
    out
}

fn render_stats(stats: &ConversationStats) -> String {
    format!(
        "{}: {} messages ({} from you), ~{} tokens, started {}, last active {}",
        stats.thread_id,
        stats.total_messages(),
        stats.user_messages,
        stats.estimated_tokens,
        stats.created_at.format("%H:%M:%S"),
        stats.last_activity.format("%H:%M:%S"),
    )
}

/// Runs until `/quit`, end of input, or an interrupt at the prompt. An
/// interrupt while an answer is being produced cancels only that answer.
pub async fn run<R, W>(
    assistant: &Assistant,
    store: &mut ConversationStore,
    input: R,
    output: &mut W,
    interrupts: &mut mpsc::UnboundedReceiver<()>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut thread_id = store.create();
    let mut lines = input.lines();
    output.write_all(format!("{BANNER}\n").as_bytes()).await?;

    loop {
        output.write_all(b"\n> ").await?;
        output.flush().await?;
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = interrupts.recv() => None,
        };
        let Some(line) = line else { break };
        let line = line.trim().to_string();

        let query = match line.as_str() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/new" => {
                store.cleanup(Utc::now());
                thread_id = store.create();
                output.write_all(format!("Started {thread_id}\n").as_bytes()).await?;
                continue;
            }
            "/reset" => {
                store.reset(&thread_id);
                output.write_all(b"History cleared\n").await?;
                continue;
            }
            "/stats" => {
                if let Some(stats) = store.stats(&thread_id) {
                    output.write_all(format!("{}\n", render_stats(&stats)).as_bytes()).await?;
                }
                continue;
            }
            "/threads" => {
                let threads = store.threads();
                let mut listing = format!("{} active thread(s)\n", threads.len());
                for stats in &threads {
                    let marker = if stats.thread_id == thread_id { "*" } else { " " };
                    let _ = writeln!(listing, "{marker} {}", render_stats(stats));
                }
                output.write_all(listing.as_bytes()).await?;
                continue;
            }
            "/regen" => match store.remove_last_exchange(&thread_id) {
                Some(previous) => previous,
                None => {
                    output.write_all(b"Nothing to regenerate\n").await?;
                    continue;
                }
            },
            _ => line,
        };

        // a Ctrl-C pressed before this question must not cancel it
        while interrupts.try_recv().is_ok() {}
        let cancelled = async {
            if interrupts.recv().await.is_none() {
                std::future::pending::<()>().await;
            }
        };
        let result = assistant.answer_or_cancel(&query, &thread_id, store.history(&thread_id), cancelled).await;
        match result {
            Ok(payload) => {
                output.write_all(render_payload(&payload).as_bytes()).await?;
                store.append_exchange(&thread_id, &query, &payload.text);
            }
            Err(e) => output.write_all(format!("({e})\n").as_bytes()).await?,
        }
    }
    output.flush().await?;
    Ok(())
}
