use std::path::PathBuf;

use anyhow::Result;
use tokio::time::{sleep, Duration};

use greatwork::{GameService, Settings};

/// Run the digest scheduler: one service instance, one beat loop. All
/// mutation happens on this task; adapters drive the service elsewhere.
#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env();
    let interval = Duration::from_secs(settings.digest_interval_secs.max(60));
    let db_path = PathBuf::from(&settings.db_path);
    let mut service = GameService::open(&db_path, settings)?;

    eprintln!(
        "[greatwork] digest loop starting (db={}, year={})",
        db_path.display(),
        service.current_year()?
    );

    loop {
        if service.is_paused() {
            // Allow-listed scheduled press still leaves the queue.
            match service.release_scheduled_press(None) {
                Ok(released) => {
                    for press in released {
                        eprintln!("[press] {} :: {}", press.press_type, press.headline);
                    }
                }
                Err(err) => eprintln!("[greatwork] paused release failed: {err}"),
            }
            eprintln!(
                "[greatwork] paused: {}",
                service.pause_reason().unwrap_or("no reason recorded")
            );
        } else {
            match service.advance_digest() {
                Ok(releases) => {
                    for press in releases {
                        eprintln!("[press] {} :: {}", press.press_type, press.headline);
                    }
                }
                Err(err) => eprintln!("[greatwork] digest failed: {err}"),
            }
        }
        for note in service.drain_admin_notifications() {
            eprintln!("[admin] {note}");
        }
        sleep(interval).await;
    }
}
