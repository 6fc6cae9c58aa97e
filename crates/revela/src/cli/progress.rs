//! Running engine work off the async runtime with a progress bar and Ctrl-C
//! cancellation.

use indicatif::{ProgressBar, ProgressStyle};
use revela_core::{CancelToken, ProgressEvent, ProgressSink, Stage};
use tokio::sync::mpsc;

/// Run `work` on a blocking thread.
///
/// Progress events travel over a channel to an indicatif bar; Ctrl-C flips
/// the cancellation token so the engine stops at the next frame boundary.
pub async fn run_blocking<T, F>(work: F) -> anyhow::Result<T>
where
    F: FnOnce(&dyn ProgressSink, &CancelToken) -> T + Send + 'static,
    T: Send + 'static,
{
    let cancel = CancelToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();

    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted; stopping after the current frame");
                cancel.cancel();
            }
        })
    };

    let display = tokio::spawn(async move {
        let mut bars = StageBars::default();
        while let Some(event) = rx.recv().await {
            bars.update(&event);
        }
        bars.finish();
    });

    let result = tokio::task::spawn_blocking(move || {
        let sink = move |event: ProgressEvent| {
            // The receiver only disappears once the display task has ended.
            let _ = tx.send(event);
        };
        work(&sink, &cancel)
    })
    .await;

    interrupt.abort();
    display.await?;
    Ok(result?)
}

/// One bar per stage, replaced when the stage changes.
#[derive(Default)]
struct StageBars {
    current: Option<(Stage, ProgressBar)>,
}

impl StageBars {
    fn update(&mut self, event: &ProgressEvent) {
        let stale = matches!(&self.current, Some((stage, _)) if *stage != event.stage);
        if stale {
            self.finish();
        }
        let (_, bar) = self
            .current
            .get_or_insert_with(|| (event.stage, create_progress_bar(event.total as u64)));
        bar.set_position(event.done as u64);
        bar.set_message(format!("{}: {}", event.stage, event.message));
    }

    fn finish(&mut self) {
        if let Some((_, bar)) = self.current.take() {
            bar.finish();
        }
    }
}

fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("##-");
    pb.set_style(style);
    pb.set_message("starting...");
    pb
}
