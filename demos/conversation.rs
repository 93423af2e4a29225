//! # Example: scripted chat conversations
//!
//! Two fiber-backed handlers talk to two users through a fake transport:
//!
//! - `results :query` lists results three at a time and waits for `more`
//!   from the same user (timed wait, 2 s).
//! - `forget :item` asks for confirmation and waits for `yes` on the next
//!   message only; anything else cancels.
//!
//! ```text
//! <alice> results rust           → page 1, waits for "more" (user:alice)
//! <bob>   more                   → nothing waits for bob
//! <alice> more                   → page 2, waits again
//! <bob>   forget notes           → "really forget notes? (yes)"
//! <bob>   hello                  → next message was not "yes": cancelled
//! <alice> more                   → last page, conversation ends
//! ```
//!
//! Run with:
//! ```bash
//! RUST_LOG=fibervisor=debug cargo run --example conversation --features logging
//! ```

use std::sync::Arc;
use std::time::Duration;

use fibervisor::{
    Config, Dispatcher, Fiber, HandlerError, HandlerFn, HandlerRef, LogWriter, Message, Reply,
    RouteOptions, RoutedEvent, TemplateRouter, WaitError, WaitOptions,
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Prints replies as `-> [user] text`.
struct Console(String);

impl Reply for Console {
    fn reply(&self, text: &str) {
        println!("-> [{}] {text}", self.0);
    }
}

fn say(user: &str, text: &str) -> Message {
    println!("<{user}> {text}");
    Message::new(user.to_string(), text.to_string()).with_reply(Arc::new(Console(user.to_string())))
}

fn results() -> HandlerRef {
    HandlerFn::arc("results", |mut fiber: Fiber, ev: RoutedEvent| async move {
        let query = ev.param("query").unwrap_or("anything").to_string();
        let hits: Vec<String> = (1..=7).map(|i| format!("{query} result #{i}")).collect();
        let source = ev.message().sender_scope();
        let mut reply_to = ev.message().clone();

        for (page, chunk) in hits.chunks(3).enumerate() {
            reply_to.reply(&format!("page {}: {}", page + 1, chunk.join(", ")));
            if (page + 1) * 3 >= hits.len() {
                reply_to.reply("that's all");
                break;
            }
            reply_to.reply("say 'more' for the next page");

            match fiber
                .suspend(source.clone(), "more", WaitOptions::timed(Duration::from_secs(2)))
                .await
            {
                Ok(next) => reply_to = next.message().clone(),
                Err(WaitError::Expired { .. }) => {
                    reply_to.reply("paging timed out");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok::<(), HandlerError>(())
    })
}

fn forget() -> HandlerRef {
    HandlerFn::arc("forget", |mut fiber: Fiber, ev: RoutedEvent| async move {
        let item = ev.param("item").unwrap_or("it").to_string();
        ev.message().reply(&format!("really forget {item}? (yes)"));

        let source = ev.message().sender_scope();
        match fiber.suspend(source, "yes", WaitOptions::next_message()).await {
            Ok(answer) => answer.message().reply(&format!("forgot {item}")),
            Err(WaitError::Invalidated) => ev.message().reply("ok, keeping it"),
            Err(e) => return Err(e.into()),
        }
        Ok::<(), HandlerError>(())
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "fibervisor=debug".into()))
        .init();

    let router = Arc::new(TemplateRouter::new());
    router.map("results :query", results(), RouteOptions::fiber());
    router.map("forget :item", forget(), RouteOptions::fiber());

    let cfg = Config {
        grace: Duration::from_secs(1),
        reply_diagnostics: true,
        ..Config::default()
    };
    let dispatcher = Dispatcher::builder(router)
        .with_config(cfg)
        .with_subscriber(Arc::new(LogWriter::new()))
        .build();

    let (tx, inbox) = mpsc::channel(16);
    let runner = tokio::spawn({
        let dispatcher = Arc::clone(&dispatcher);
        async move { dispatcher.run(inbox).await }
    });

    for (user, text) in [
        ("alice", "results rust"),
        ("bob", "more"),
        ("alice", "more"),
        ("bob", "forget notes"),
        ("bob", "hello"),
        ("alice", "more"),
    ] {
        tx.send(say(user, text)).await?;
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    drop(tx);

    runner.await??;
    println!("pending waits left: {}", dispatcher.pending_len());
    Ok(())
}
